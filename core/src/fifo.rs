//! The thread-crossing FIFO model
//!
//! A FIFO materializes one partition-crossing edge group. It is created by
//! the optimizer, mutated by delay absorption and merging, and read-only to
//! the emitters. The generated C allocates the shared buffer and the two
//! atomic cursors in the coordinator; the model here only describes layout
//! and initial contents.
use anyhow::anyhow;
use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::clock::ClockDomain;
use crate::datatype::DataType;
use crate::error::{CompileError, ResultExt, TypedResult};
use crate::graph::partition_suffix;
use crate::numeric::NumericValue;

/// How data moves between FIFO buffers and compute locals
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum CopyMode {
    /// Element-wise assignment loops
    Assign,
    /// `memcpy` per port
    #[default]
    Memcpy,
    /// A hand-unrolled copy loop the compiler can inline
    InlinedMemcpy,
    /// The generated SIMD helper `fast_copy_unaligned_ramp_in`
    SimdFastCopy,
}

/// Physical layout of the shared block array
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    /// Ring of `capacity_blocks + 1` slots; cursors address slots directly
    NoExtraLen,
    /// Physical length `2 * capacity_blocks`; every write is mirrored to the
    /// other half so a consumer always sees a contiguous window.  Used
    /// whenever `block_size > 1`
    DoubleLen,
    /// Physical length `capacity_blocks + delay - 1` with a conditional
    /// mirror write
    PlusDelayLenM1,
}

/// Which remote cursors a thread may snapshot locally
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CachingPolicy {
    None,
    ProducerCache,
    ConsumerCache,
    #[default]
    ProducerConsumerCache,
}

/// The role of the thread touching a FIFO at a given emission site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// No defined role; cached values are not used
    None,
    Producer,
    Consumer,
    /// Producer that also uses a cached consumer cursor when possible
    ProducerFullCache,
    /// Consumer that also uses a cached producer cursor when possible
    ConsumerFullCache,
}

impl Role {
    pub fn is_producer(&self) -> bool {
        matches!(self, Role::Producer | Role::ProducerFullCache)
    }

    pub fn is_consumer(&self) -> bool {
        matches!(self, Role::Consumer | Role::ConsumerFullCache)
    }

    pub fn uses_remote_cache(&self) -> bool {
        matches!(self, Role::ProducerFullCache | Role::ConsumerFullCache)
    }
}

/// One input/output port pair of a FIFO
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FifoPort {
    /// Type of one sample on this port, not expanded for the block
    pub dtype: DataType,
    /// Samples per block on this port
    pub block_size: usize,
    /// Outermost-dimension stride at the producing end
    pub sub_block_in: usize,
    /// Outermost-dimension stride at the consuming end
    pub sub_block_out: usize,
    /// Initial contents in elements, oldest first.  The length must be a
    /// multiple of `block_size * elements-per-sample`
    pub init_conditions: Vec<NumericValue>,
    pub clock: ClockDomain,
}

impl FifoPort {
    pub fn new(dtype: DataType, block_size: usize) -> Self {
        Self {
            dtype,
            block_size,
            sub_block_in: 1,
            sub_block_out: 1,
            init_conditions: Vec::new(),
            clock: ClockDomain::BASE,
        }
    }

    /// Scalar elements per sample on this port
    pub fn elements_per_sample(&self) -> usize {
        self.dtype.elements()
    }

    /// Scalar elements per block on this port
    pub fn elements_per_block(&self) -> usize {
        self.block_size * self.elements_per_sample()
    }

    /// Bytes of one block of this port in CPU storage
    pub fn block_bytes(&self) -> usize {
        self.elements_per_block() * self.dtype.element_bytes()
    }

    /// Initial occupancy contributed by this port, in blocks
    pub fn init_blocks(&self) -> usize {
        self.init_conditions.len() / self.elements_per_block()
    }
}

/// A bounded single-producer single-consumer FIFO between two partitions
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ThreadCrossingFifo {
    pub name: String,
    pub src_partition: i32,
    pub dst_partition: i32,
    /// Buffer length in blocks
    pub capacity_blocks: usize,
    /// Port pairs carried by this FIFO (more than one after merging)
    pub ports: Vec<FifoPort>,
    pub copy_mode: CopyMode,
    /// If set, producers and consumers work on pointers into the shared
    /// buffer instead of copying through local scratch
    pub in_place: bool,
    pub buffer_kind: BufferKind,
    pub caching: CachingPolicy,
}

impl ThreadCrossingFifo {
    /// The conventional name for the `k`-th FIFO between two partitions
    pub fn crossing_name(src: i32, dst: i32, index: usize) -> String {
        format!(
            "PartitionCrossingFIFO_{}_TO_{}_{}",
            partition_suffix(src),
            partition_suffix(dst),
            index
        )
    }

    pub fn new(name: impl Into<String>, src: i32, dst: i32, capacity_blocks: usize) -> Self {
        Self {
            name: name.into(),
            src_partition: src,
            dst_partition: dst,
            capacity_blocks,
            ports: Vec::new(),
            copy_mode: CopyMode::default(),
            in_place: true,
            buffer_kind: BufferKind::NoExtraLen,
            caching: CachingPolicy::default(),
        }
    }

    /// Base block size of the FIFO: the block size of its first port
    pub fn block_size(&self) -> usize {
        self.ports.first().map(|p| p.block_size).unwrap_or(1)
    }

    /// Picks the buffer layout implied by the block size
    pub fn assign_buffer_kind(&mut self) {
        if self.block_size() > 1 {
            self.buffer_kind = BufferKind::DoubleLen;
        } else {
            self.buffer_kind = BufferKind::NoExtraLen;
        }
    }

    /// Physical array length in blocks for the chosen layout
    pub fn array_length_blocks(&self) -> usize {
        match self.buffer_kind {
            BufferKind::NoExtraLen => self.capacity_blocks + 1,
            BufferKind::DoubleLen => 2 * self.capacity_blocks,
            BufferKind::PlusDelayLenM1 => {
                (self.capacity_blocks + self.init_blocks()).saturating_sub(1)
            }
        }
    }

    /// Initial occupancy in blocks (identical across ports after validation)
    pub fn init_blocks(&self) -> usize {
        self.ports.first().map(|p| p.init_blocks()).unwrap_or(0)
    }

    /// Total bytes of the shared block array
    pub fn buffer_bytes(&self) -> usize {
        let per_block: usize = self.ports.iter().map(|p| p.block_bytes()).sum();
        per_block * self.array_length_blocks()
    }

    /// Human readable buffer size for log output
    pub fn buffer_size_display(&self) -> ByteSize {
        ByteSize::b(self.buffer_bytes() as u64)
    }

    /// The C type name of one buffer slot
    pub fn struct_type_name(&self) -> String {
        format!("{}_t", self.name)
    }

    /// Shared-variable names, allocated by the coordinator and passed to
    /// both endpoint threads
    pub fn array_var(&self) -> String {
        format!("{}_array", self.name)
    }

    pub fn write_offset_var(&self) -> String {
        format!("{}_writeOffsetPtr", self.name)
    }

    pub fn read_offset_var(&self) -> String {
        format!("{}_readOffsetPtr", self.name)
    }

    /// Thread-local cached cursor names
    pub fn write_offset_cached_var(&self) -> String {
        format!("{}_writeOffsetCached", self.name)
    }

    pub fn read_offset_cached_var(&self) -> String {
        format!("{}_readOffsetCached", self.name)
    }

    /// Name of the local variable a consumer reads blocks from / a producer
    /// writes blocks into when the FIFO is not in place
    pub fn read_temp_var(&self) -> String {
        format!("{}_readTemp", self.name)
    }

    pub fn write_temp_var(&self) -> String {
        format!("{}_writeTemp", self.name)
    }

    /// Field name of one port within the slot record
    pub fn port_field(&self, port: usize, imag: bool) -> String {
        let suffix = if imag { "_im" } else { "" };
        format!("port{port}{suffix}")
    }

    /// Checks the FIFO invariants; failures are fatal structural or type
    /// errors naming this FIFO
    pub fn validate(&self) -> TypedResult<()> {
        if self.src_partition == self.dst_partition {
            return Err(anyhow!(
                "FIFO {} is mapped to its own partition {}",
                self.name,
                self.src_partition
            ))
            .typ(CompileError::Structural);
        }

        if self.ports.is_empty() {
            return Err(anyhow!("FIFO {} has no ports", self.name)).typ(CompileError::Structural);
        }

        if self.capacity_blocks == 0 {
            return Err(anyhow!("FIFO {} has zero capacity", self.name))
                .typ(CompileError::Structural);
        }

        let occupancy = self.ports[0].init_blocks();
        for (idx, port) in self.ports.iter().enumerate() {
            if port.block_size == 0 {
                return Err(anyhow!("FIFO {} port {idx} has zero block size", self.name))
                    .typ(CompileError::Structural);
            }

            let per_block = port.elements_per_block();
            if port.init_conditions.len() % per_block != 0 {
                return Err(anyhow!(
                    "FIFO {} port {idx} has {} initial conditions, which is not a multiple of \
                     the {} elements per block",
                    self.name,
                    port.init_conditions.len(),
                    per_block
                ))
                .typ(CompileError::Type);
            }

            if port.init_blocks() > self.capacity_blocks {
                return Err(anyhow!(
                    "FIFO {} port {idx} has {} blocks of initial conditions but only {} blocks \
                     of capacity",
                    self.name,
                    port.init_blocks(),
                    self.capacity_blocks
                ))
                .typ(CompileError::Type);
            }

            if port.init_blocks() != occupancy {
                return Err(anyhow!(
                    "FIFO {} ports disagree on initial occupancy ({} vs {} blocks)",
                    self.name,
                    occupancy,
                    port.init_blocks()
                ))
                .typ(CompileError::Type);
            }

            if port.block_size > 1 && self.buffer_kind == BufferKind::NoExtraLen {
                return Err(anyhow!(
                    "FIFO {} port {idx} has block size {} but a plain ring layout; \
                     multi-block transactions require the double-length layout",
                    self.name,
                    port.block_size
                ))
                .typ(CompileError::UnsupportedConfig);
            }
        }

        Ok(())
    }
}

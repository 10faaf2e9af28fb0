//! Per-FIFO C code fragments
//!
//! The generated protocol is a lockless single-producer single-consumer
//! ring. The write cursor addresses the next slot to fill and the read
//! cursor the next slot to drain. For the plain ring the array holds
//! `capacity + 1` slots and cursors wrap at the array length; for the
//! double-length layout the array holds `2 * capacity` slots, cursors run
//! modulo `2 * capacity` and every write is mirrored into the other half so
//! consumers always see a contiguous window.
//!
//! The producer stores data with relaxed ordering and publishes its cursor
//! with a release store; the consumer acquires the producer cursor before
//! touching the data, and symmetrically for the read side. Cursor caching
//! only changes when the remote cursor is re-loaded, never the ordering of
//! the load itself.
use laminar_core::fifo::{BufferKind, CachingPolicy, CopyMode, Role, ThreadCrossingFifo};

use crate::emit::cwriter::{binop, call, cast, lit, var, CExpr, CWriter};

/// Atomic cursor type used in all generated files
pub const CURSOR_TYPE: &str = "_Atomic int32_t";

/// Maps the configured caching policy to the role an endpoint assumes
pub fn role_for(producer: bool, policy: CachingPolicy) -> Role {
    if producer {
        match policy {
            CachingPolicy::ProducerCache | CachingPolicy::ProducerConsumerCache => {
                Role::ProducerFullCache
            }
            _ => Role::Producer,
        }
    } else {
        match policy {
            CachingPolicy::ConsumerCache | CachingPolicy::ProducerConsumerCache => {
                Role::ConsumerFullCache
            }
            _ => Role::Consumer,
        }
    }
}

/// Code generator for one FIFO
pub struct FifoGen<'a> {
    pub fifo: &'a ThreadCrossingFifo,
}

impl<'a> FifoGen<'a> {
    pub fn new(fifo: &'a ThreadCrossingFifo) -> Self {
        Self { fifo }
    }

    fn capacity(&self) -> usize {
        self.fifo.capacity_blocks
    }

    fn array_len(&self) -> usize {
        self.fifo.array_length_blocks()
    }

    /// Modulus of the cursor counters
    fn cursor_modulus(&self) -> usize {
        match self.fifo.buffer_kind {
            BufferKind::DoubleLen => 2 * self.capacity(),
            _ => self.array_len(),
        }
    }

    /// The slot addressed by a cursor value
    fn slot_expr(&self, cursor: CExpr) -> CExpr {
        match self.fifo.buffer_kind {
            BufferKind::DoubleLen => binop("%", cursor, lit(self.capacity())),
            _ => cursor,
        }
    }

    /// Wrap-around advance of a local cursor variable by one block
    fn advance_stmt(&self, cursor_var: &str) -> String {
        let wrap = self.cursor_modulus() - 1;
        format!("{cursor_var} = ({cursor_var} >= {wrap}) ? 0 : ({cursor_var} + 1);")
    }

    fn not_empty_expr(&self, write: CExpr, read: CExpr) -> CExpr {
        binop("!=", write, read)
    }

    fn not_full_expr(&self, write: CExpr, read: CExpr) -> CExpr {
        match self.fifo.buffer_kind {
            BufferKind::DoubleLen => {
                let modulus = self.cursor_modulus();
                let occupied = binop(
                    "%",
                    binop("-", binop("+", write, lit(modulus)), read),
                    lit(modulus),
                );
                binop("!=", occupied, lit(self.capacity()))
            }
            _ => {
                // The producer advancing once must not land on the consumer
                let next = CExpr::Ternary(
                    Box::new(binop(">=", write.clone(), lit(self.array_len() - 1))),
                    Box::new(lit(0)),
                    Box::new(binop("+", write, lit(1))),
                );
                binop("!=", next, read)
            }
        }
    }

    /// Typedef of one buffer slot.  Complex ports store real and imaginary
    /// parts in separate arrays.
    pub fn struct_typedef(&self) -> String {
        let mut w = CWriter::new();
        w.open("typedef struct");
        for (index, port) in self.fifo.ports.iter().enumerate() {
            let expanded = port.dtype.expand_for_block(port.block_size);
            let base = port.dtype.c_type();
            let dims = expanded.c_dims();
            if port.dtype.complex {
                w.line(format!(
                    "{base} {}{dims};",
                    self.fifo.port_field(index, false)
                ));
                w.line(format!(
                    "{base} {}{dims};",
                    self.fifo.port_field(index, true)
                ));
            } else {
                w.line(format!(
                    "{base} {}{dims};",
                    self.fifo.port_field(index, false)
                ));
            }
        }
        w.close_with(format!("}} {};", self.fifo.struct_type_name()));
        w.finish()
    }

    /// Shared variables passed from the coordinator to both endpoint
    /// threads: (C declaration, variable name)
    pub fn shared_var_decls(&self) -> Vec<(String, String)> {
        vec![
            (
                format!("{}* {}", self.fifo.struct_type_name(), self.fifo.array_var()),
                self.fifo.array_var(),
            ),
            (
                format!("{CURSOR_TYPE}* {}", self.fifo.write_offset_var()),
                self.fifo.write_offset_var(),
            ),
            (
                format!("{CURSOR_TYPE}* {}", self.fifo.read_offset_var()),
                self.fifo.read_offset_var(),
            ),
        ]
    }

    /// Allocation of the shared buffer and cursors, NUMA-aware when a core
    /// is given
    pub fn emit_create_shared(&self, w: &mut CWriter, core: Option<i32>) {
        let struct_ty = self.fifo.struct_type_name();
        let array_bytes = binop(
            "*",
            call("sizeof", vec![var(struct_ty.clone())]),
            lit(self.array_len()),
        );
        let cursor_bytes = call("sizeof", vec![var(CURSOR_TYPE.to_string())]);

        let alloc = |size: CExpr| match core {
            Some(core) => call(
                "vitis_aligned_alloc_core",
                vec![var("VITIS_MEM_ALIGNMENT"), size, lit(core)],
            ),
            None => call(
                "vitis_aligned_alloc",
                vec![var("VITIS_MEM_ALIGNMENT"), size],
            ),
        };

        w.line(format!(
            "{struct_ty}* {} = {};",
            self.fifo.array_var(),
            cast(format!("{struct_ty}*"), alloc(array_bytes))
        ));
        w.line(format!(
            "{CURSOR_TYPE}* {} = {};",
            self.fifo.write_offset_var(),
            cast(format!("{CURSOR_TYPE}*"), alloc(cursor_bytes.clone()))
        ));
        w.line(format!(
            "{CURSOR_TYPE}* {} = {};",
            self.fifo.read_offset_var(),
            cast(format!("{CURSOR_TYPE}*"), alloc(cursor_bytes))
        ));
    }

    /// Writes the initial conditions into the head of the buffer and sets
    /// the cursors to the initial occupancy
    pub fn emit_init_shared(&self, w: &mut CWriter) {
        let occupancy = self.fifo.init_blocks();

        for (port_index, port) in self.fifo.ports.iter().enumerate() {
            let eps = port.elements_per_sample();
            let floating = port.dtype.floating;

            for (element_index, value) in port.init_conditions.iter().enumerate() {
                let block = element_index / port.elements_per_block();
                let within_block = element_index % port.elements_per_block();
                let sample = within_block / eps;
                let element = within_block % eps;

                let mut targets = vec![(false, value.c_literal_re(floating))];
                if port.dtype.complex {
                    targets.push((true, value.c_literal_im(floating)));
                }

                for (imag, literal) in targets {
                    let field = var(self.fifo.array_var())
                        .index(lit(block))
                        .field(self.fifo.port_field(port_index, imag));
                    let lvalue = element_target(field, port, sample, element);
                    w.line(format!("{lvalue} = {literal};"));

                    if self.fifo.buffer_kind == BufferKind::DoubleLen {
                        let mirror = var(self.fifo.array_var())
                            .index(lit(block + self.capacity()))
                            .field(self.fifo.port_field(port_index, imag));
                        let lvalue = element_target(mirror, port, sample, element);
                        w.line(format!("{lvalue} = {literal};"));
                    }
                }
            }
        }

        w.line(format!(
            "atomic_init({}, {occupancy});",
            self.fifo.write_offset_var()
        ));
        w.line(format!("atomic_init({}, 0);", self.fifo.read_offset_var()));
    }

    /// Thread-local cursor variables for the given role
    pub fn emit_local_var_decls(&self, w: &mut CWriter, role: Role) {
        match role {
            Role::Producer => {
                w.line(format!("int32_t {};", self.fifo.write_offset_cached_var()));
            }
            Role::Consumer => {
                w.line(format!("int32_t {};", self.fifo.read_offset_cached_var()));
            }
            Role::ProducerFullCache | Role::ConsumerFullCache | Role::None => {
                w.line(format!("int32_t {};", self.fifo.write_offset_cached_var()));
                w.line(format!("int32_t {};", self.fifo.read_offset_cached_var()));
            }
        }
    }

    /// Loads the local cursor variables.  The thread's own cursor is always
    /// primed; the remote cursor only when the role caches it.
    pub fn emit_init_local_vars(&self, w: &mut CWriter, role: Role) {
        let load_write = format!(
            "{} = atomic_load_explicit({}, memory_order_acquire);",
            self.fifo.write_offset_cached_var(),
            self.fifo.write_offset_var()
        );
        let load_read = format!(
            "{} = atomic_load_explicit({}, memory_order_acquire);",
            self.fifo.read_offset_cached_var(),
            self.fifo.read_offset_var()
        );

        match role {
            Role::Producer => w.line(load_write),
            Role::Consumer => w.line(load_read),
            _ => {
                w.line(load_write);
                w.line(load_read);
            }
        }
    }

    /// Contributes this FIFO's readiness to `check_var` inside its own
    /// block scope.  Producers check for room, consumers for data.
    pub fn emit_readiness(&self, w: &mut CWriter, producer: bool, role: Role, check_var: &str) {
        w.open_scope();

        let (own_cached, remote_cached, remote_ptr) = if producer {
            (
                self.fifo.write_offset_cached_var(),
                self.fifo.read_offset_cached_var(),
                self.fifo.read_offset_var(),
            )
        } else {
            (
                self.fifo.read_offset_cached_var(),
                self.fifo.write_offset_cached_var(),
                self.fifo.write_offset_var(),
            )
        };

        let condition = |write: CExpr, read: CExpr| {
            if producer {
                self.not_full_expr(write, read)
            } else {
                self.not_empty_expr(write, read)
            }
        };

        match role {
            Role::None => {
                // No cached state: pull both cursors fresh
                let local = format!("{}_local", remote_cached);
                w.line(format!(
                    "int32_t {local} = atomic_load_explicit({remote_ptr}, memory_order_acquire);"
                ));
                let own_local = format!("{}_local", own_cached);
                let own_ptr = if producer {
                    self.fifo.write_offset_var()
                } else {
                    self.fifo.read_offset_var()
                };
                w.line(format!(
                    "int32_t {own_local} = atomic_load_explicit({own_ptr}, memory_order_acquire);"
                ));
                let (write, read) = if producer {
                    (var(own_local), var(local))
                } else {
                    (var(local), var(own_local))
                };
                w.line(format!("{check_var} &= {};", condition(write, read)));
            }
            Role::Producer | Role::Consumer => {
                // Own cursor cached, remote loaded every poll
                let local = format!("{}_local", remote_cached);
                w.line(format!(
                    "int32_t {local} = atomic_load_explicit({remote_ptr}, memory_order_acquire);"
                ));
                let (write, read) = if producer {
                    (var(own_cached), var(local))
                } else {
                    (var(local), var(own_cached))
                };
                w.line(format!("{check_var} &= {};", condition(write, read)));
            }
            Role::ProducerFullCache | Role::ConsumerFullCache => {
                // Refresh the cached remote cursor only when the cached view
                // says the FIFO blocks
                let (write, read) = if producer {
                    (var(own_cached.clone()), var(remote_cached.clone()))
                } else {
                    (var(remote_cached.clone()), var(own_cached.clone()))
                };
                let cached_ok = condition(write.clone(), read.clone());
                w.open(format!("if (!{cached_ok})"));
                w.line(format!(
                    "{remote_cached} = atomic_load_explicit({remote_ptr}, memory_order_acquire);"
                ));
                w.close();
                w.line(format!("{check_var} &= {};", condition(write, read)));
            }
        }

        w.close();
    }

    /// Obtains the read pointer (in place) or copies one block into the
    /// read scratch (not in place).  Advances the local read cursor; the
    /// release store happens in [FifoGen::emit_push_read].
    pub fn emit_read(&self, w: &mut CWriter, role: Role, force_not_in_place: bool) {
        let cached = self.fifo.read_offset_cached_var();
        let local = format!("{cached}_local");
        let in_place = self.fifo.in_place && !force_not_in_place;

        if in_place {
            w.line(format!(
                "{}* {}_readPtr;",
                self.fifo.struct_type_name(),
                self.fifo.name
            ));
        }

        w.comment(format!(" {} FIFO read", self.fifo.name));
        w.open_scope();
        match role {
            Role::None => w.line(format!(
                "int32_t {local} = atomic_load_explicit({}, memory_order_acquire);",
                self.fifo.read_offset_var()
            )),
            _ => w.line(format!("int32_t {local} = {cached};")),
        }

        let slot = self.slot_expr(var(local.clone()));
        if in_place {
            w.line(format!(
                "{}_readPtr = {} + {slot};",
                self.fifo.name,
                self.fifo.array_var()
            ));
        } else {
            self.emit_copy_block(w, false, &slot.to_string());
        }

        w.line(self.advance_stmt(&local));
        w.line(format!("{cached} = {local};"));
        w.close();
    }

    /// Obtains the write pointer (in place) or copies the write scratch
    /// into the FIFO (not in place).  Advances the local write cursor; the
    /// release store happens in [FifoGen::emit_push_write].
    pub fn emit_write(&self, w: &mut CWriter, role: Role, force_not_in_place: bool) {
        let cached = self.fifo.write_offset_cached_var();
        let local = format!("{cached}_local");
        let in_place = self.fifo.in_place && !force_not_in_place;

        if in_place {
            w.line(format!(
                "{}* {}_writePtr;",
                self.fifo.struct_type_name(),
                self.fifo.name
            ));
        }

        w.comment(format!(" {} FIFO write", self.fifo.name));
        w.open_scope();
        match role {
            Role::None => w.line(format!(
                "int32_t {local} = atomic_load_explicit({}, memory_order_acquire);",
                self.fifo.write_offset_var()
            )),
            _ => w.line(format!("int32_t {local} = {cached};")),
        }

        let slot = self.slot_expr(var(local.clone()));
        if in_place {
            w.line(format!(
                "{}_writePtr = {} + {slot};",
                self.fifo.name,
                self.fifo.array_var()
            ));
        } else {
            self.emit_copy_block(w, true, &slot.to_string());
            self.emit_mirror_copy(w, &slot.to_string());
        }

        w.line(self.advance_stmt(&local));
        w.line(format!("{cached} = {local};"));
        w.close();
    }

    /// Mirror fix-up for in-place double-length FIFOs, emitted after the
    /// compute call has filled the write slot
    pub fn emit_mirror_fixup(&self, w: &mut CWriter) {
        if self.fifo.buffer_kind != BufferKind::DoubleLen || !self.fifo.in_place {
            return;
        }
        w.line(format!(
            "memcpy({name}_writePtr + {cap}, {name}_writePtr, sizeof({ty}));",
            name = self.fifo.name,
            cap = self.capacity(),
            ty = self.fifo.struct_type_name()
        ));
    }

    /// Publishes the consumed block with a release store of the read cursor
    pub fn emit_push_read(&self, w: &mut CWriter) {
        w.line(format!(
            "atomic_store_explicit({}, {}, memory_order_release);",
            self.fifo.read_offset_var(),
            self.fifo.read_offset_cached_var()
        ));
    }

    /// Publishes the produced block with a release store of the write cursor
    pub fn emit_push_write(&self, w: &mut CWriter) {
        w.line(format!(
            "atomic_store_explicit({}, {}, memory_order_release);",
            self.fifo.write_offset_var(),
            self.fifo.write_offset_cached_var()
        ));
    }

    /// Declares the scratch block for the non-in-place side
    pub fn emit_scratch_decls(&self, w: &mut CWriter, producer: bool) {
        let ty = self.fifo.struct_type_name();
        if producer {
            w.line(format!("{ty} {};", self.fifo.write_temp_var()));
        } else {
            w.line(format!("{ty} {};", self.fifo.read_temp_var()));
        }
    }

    /// Copies one block between the scratch and the buffer slot using the
    /// configured copy discipline
    fn emit_copy_block(&self, w: &mut CWriter, to_fifo: bool, slot: &str) {
        let ty = self.fifo.struct_type_name();
        let scratch = if to_fifo {
            self.fifo.write_temp_var()
        } else {
            self.fifo.read_temp_var()
        };
        let slot_ptr = format!("({} + {slot})", self.fifo.array_var());
        let (dst, src) = if to_fifo {
            (slot_ptr.clone(), format!("(&{scratch})"))
        } else {
            (format!("(&{scratch})"), slot_ptr.clone())
        };

        match self.fifo.copy_mode {
            CopyMode::Assign => {
                for (port_index, port) in self.fifo.ports.iter().enumerate() {
                    let expanded = port.dtype.expand_for_block(port.block_size);
                    let mut fields = vec![self.fifo.port_field(port_index, false)];
                    if port.dtype.complex {
                        fields.push(self.fifo.port_field(port_index, true));
                    }
                    for field in fields {
                        emit_assign_loops(w, &expanded.shape, &scratch, &slot_ptr, &field, to_fifo);
                    }
                }
            }
            CopyMode::Memcpy => {
                w.line(format!("memcpy({dst}, {src}, sizeof({ty}));"));
            }
            CopyMode::InlinedMemcpy => {
                w.open_scope();
                w.line(format!("char* restrict copyDst = (char* restrict) {dst};"));
                w.line(format!("const char* restrict copySrc = (const char* restrict) {src};"));
                w.open(format!("for (size_t i = 0; i < sizeof({ty}); i++)"));
                w.line("copyDst[i] = copySrc[i];");
                w.close();
                w.close();
            }
            CopyMode::SimdFastCopy => {
                w.line(format!(
                    "fast_copy_unaligned_ramp_in({dst}, {src}, sizeof({ty}), 1);"
                ));
            }
        }
    }

    /// Non-in-place double-length FIFOs mirror at copy time
    fn emit_mirror_copy(&self, w: &mut CWriter, slot: &str) {
        if self.fifo.buffer_kind != BufferKind::DoubleLen {
            return;
        }
        w.line(format!(
            "memcpy({array} + {slot} + {cap}, {array} + {slot}, sizeof({ty}));",
            array = self.fifo.array_var(),
            cap = self.capacity(),
            ty = self.fifo.struct_type_name()
        ));
    }
}

/// Indexes an element inside a (possibly block-expanded) port field
fn element_target(
    field: CExpr,
    port: &laminar_core::fifo::FifoPort,
    sample: usize,
    element: usize,
) -> CExpr {
    let expanded = port.dtype.expand_for_block(port.block_size);
    if expanded.is_scalar() {
        return field;
    }

    // Unflatten (sample, element) into the expanded dimension vector
    let mut remaining = sample * port.elements_per_sample() + element;
    let mut indices: Vec<usize> = Vec::new();
    for dim in expanded.shape.iter().rev() {
        indices.push(remaining % dim);
        remaining /= dim;
    }
    indices.reverse();

    field.index_all(indices.into_iter().map(lit).collect())
}

/// Nested per-element assignment loops for the ASSIGN copy mode
fn emit_assign_loops(
    w: &mut CWriter,
    shape: &[usize],
    scratch: &str,
    slot_ptr: &str,
    field: &str,
    to_fifo: bool,
) {
    let scalar = shape.iter().all(|d| *d == 1);
    if scalar {
        let (dst, src) = if to_fifo {
            (format!("{slot_ptr}->{field}"), format!("{scratch}.{field}"))
        } else {
            (format!("{scratch}.{field}"), format!("{slot_ptr}->{field}"))
        };
        w.line(format!("{dst} = {src};"));
        return;
    }

    let index_vars: Vec<String> = (0..shape.len()).map(|d| format!("i{d}")).collect();
    for (dim, index_var) in shape.iter().zip(&index_vars) {
        w.open(format!(
            "for (int32_t {index_var} = 0; {index_var} < {dim}; {index_var}++)"
        ));
    }
    let indices: String = index_vars.iter().map(|v| format!("[{v}]")).collect();
    let (dst, src) = if to_fifo {
        (
            format!("{slot_ptr}->{field}{indices}"),
            format!("{scratch}.{field}{indices}"),
        )
    } else {
        (
            format!("{scratch}.{field}{indices}"),
            format!("{slot_ptr}->{field}{indices}"),
        )
    };
    w.line(format!("{dst} = {src};"));
    for _ in shape {
        w.close();
    }
}

/// Assembles the readiness check over a set of FIFOs.
///
/// Blocking checks loop until every FIFO is ready and re-poll from the top;
/// non-blocking checks evaluate once. Short-circuiting stops polling later
/// FIFOs once one is not ready. A cancellation point is inserted between
/// poll iterations so a stuck worker can be torn down.
#[allow(clippy::too_many_arguments)]
pub fn emit_fifo_checks(
    w: &mut CWriter,
    fifos: &[&ThreadCrossingFifo],
    producer: bool,
    check_var: &str,
    short_circuit: bool,
    blocking: bool,
    include_cancel_check: bool,
    policy: CachingPolicy,
) {
    if blocking {
        w.line(format!("bool {check_var} = false;"));
        w.open(format!("while (!{check_var})"));
        w.line(format!("{check_var} = true;"));
    } else {
        w.line(format!("bool {check_var} = true;"));
    }

    if include_cancel_check {
        w.line("pthread_testcancel();");
    }

    let role = role_for(producer, policy);

    let mut open_conditions = 0;
    for (index, fifo) in fifos.iter().enumerate() {
        FifoGen::new(fifo).emit_readiness(w, producer, role, check_var);

        if short_circuit && blocking {
            w.open(format!("if (!{check_var})"));
            w.line("continue;");
            w.close();
        } else if short_circuit && index + 1 < fifos.len() {
            // Only poll the next FIFO while everything so far is ready
            w.open(format!("if ({check_var})"));
            open_conditions += 1;
        }
    }

    for _ in 0..open_conditions {
        w.close();
    }

    if blocking {
        w.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminar_core::datatype::DataType;
    use laminar_core::fifo::FifoPort;
    use laminar_core::numeric::NumericValue;

    fn scalar_fifo() -> ThreadCrossingFifo {
        let mut fifo = ThreadCrossingFifo::new("PartitionCrossingFIFO_0_TO_1_0", 0, 1, 4);
        fifo.ports
            .push(FifoPort::new(DataType::new(false, true, false, 32), 1));
        fifo
    }

    fn blocked_fifo() -> ThreadCrossingFifo {
        let mut fifo = ThreadCrossingFifo::new("PartitionCrossingFIFO_0_TO_1_0", 0, 1, 4);
        fifo.ports
            .push(FifoPort::new(DataType::new(false, true, false, 32), 4));
        fifo.assign_buffer_kind();
        fifo
    }

    #[test]
    fn typedef_shapes() {
        let scalar = scalar_fifo();
        let gen = FifoGen::new(&scalar);
        let typedef = gen.struct_typedef();
        assert!(typedef.contains("int32_t port0;"));
        assert!(typedef.contains("} PartitionCrossingFIFO_0_TO_1_0_t;"));

        let mut complex = scalar_fifo();
        complex.ports[0].dtype.complex = true;
        complex.ports[0].block_size = 2;
        complex.buffer_kind = BufferKind::DoubleLen;
        let gen = FifoGen::new(&complex);
        let typedef = gen.struct_typedef();
        assert!(typedef.contains("int32_t port0[2];"));
        assert!(typedef.contains("int32_t port0_im[2];"));
    }

    #[test]
    fn blocking_check_loops_and_cancels() {
        let fifo = scalar_fifo();
        let mut w = CWriter::new();
        emit_fifo_checks(
            &mut w,
            &[&fifo],
            false,
            "inputFIFOsReady",
            true,
            true,
            true,
            CachingPolicy::None,
        );
        let text = w.finish();
        assert!(text.contains("while (!inputFIFOsReady)"));
        assert!(text.contains("pthread_testcancel();"));
        assert!(text.contains("memory_order_acquire"));
        assert!(text.contains("continue;"));
    }

    #[test]
    fn non_blocking_short_circuit_nests() {
        let a = scalar_fifo();
        let mut b = scalar_fifo();
        b.name = "PartitionCrossingFIFO_0_TO_1_1".to_string();
        let mut w = CWriter::new();
        emit_fifo_checks(
            &mut w,
            &[&a, &b],
            true,
            "outputFIFOsReady",
            true,
            false,
            false,
            CachingPolicy::ProducerConsumerCache,
        );
        let text = w.finish();
        assert!(text.contains("bool outputFIFOsReady = true;"));
        assert!(!text.contains("while"));
        // The second FIFO is only polled when the first was ready
        assert!(text.contains("if (outputFIFOsReady)"));
    }

    #[test]
    fn full_cache_refreshes_lazily() {
        let fifo = scalar_fifo();
        let mut w = CWriter::new();
        FifoGen::new(&fifo).emit_readiness(
            &mut w,
            true,
            Role::ProducerFullCache,
            "ready",
        );
        let text = w.finish();
        // The remote cursor is only re-loaded when the cached view blocks
        assert!(text.contains("if (!"));
        assert!(text.contains(
            "PartitionCrossingFIFO_0_TO_1_0_readOffsetCached = atomic_load_explicit"
        ));
    }

    #[test]
    fn init_shared_presets_cursors() {
        let mut fifo = scalar_fifo();
        fifo.ports[0].init_conditions = vec![NumericValue::Int(1), NumericValue::Int(2)];
        let mut w = CWriter::new();
        FifoGen::new(&fifo).emit_init_shared(&mut w);
        let text = w.finish();
        assert!(text.contains("PartitionCrossingFIFO_0_TO_1_0_array[0].port0 = 1;"));
        assert!(text.contains("PartitionCrossingFIFO_0_TO_1_0_array[1].port0 = 2;"));
        assert!(text.contains("atomic_init(PartitionCrossingFIFO_0_TO_1_0_writeOffsetPtr, 2);"));
        assert!(text.contains("atomic_init(PartitionCrossingFIFO_0_TO_1_0_readOffsetPtr, 0);"));
    }

    #[test]
    fn double_len_init_mirrors() {
        let mut fifo = blocked_fifo();
        fifo.ports[0].init_conditions = (0..4).map(NumericValue::Int).collect();
        let mut w = CWriter::new();
        FifoGen::new(&fifo).emit_init_shared(&mut w);
        let text = w.finish();
        // One block of four samples lands at slot 0 and its mirror slot 4
        assert!(text.contains("_array[0].port0[0] = 0;"));
        assert!(text.contains("_array[0].port0[3] = 3;"));
        assert!(text.contains("_array[4].port0[0] = 0;"));
        assert!(text.contains("_array[4].port0[3] = 3;"));
    }

    #[test]
    fn in_place_write_returns_pointer_and_mirrors() {
        let fifo = blocked_fifo();
        let gen = FifoGen::new(&fifo);
        let mut w = CWriter::new();
        gen.emit_write(&mut w, Role::Producer, false);
        gen.emit_mirror_fixup(&mut w);
        let text = w.finish();
        assert!(text.contains("PartitionCrossingFIFO_0_TO_1_0_writePtr ="));
        // Cursor runs modulo 2*capacity, the slot modulo capacity
        assert!(text.contains("% 4"));
        assert!(text.contains(">= 7"));
        assert!(text.contains("memcpy(PartitionCrossingFIFO_0_TO_1_0_writePtr + 4"));
    }

    #[test]
    fn copy_modes_render() {
        let mut fifo = scalar_fifo();
        fifo.in_place = false;
        fifo.copy_mode = CopyMode::SimdFastCopy;
        let mut w = CWriter::new();
        FifoGen::new(&fifo).emit_read(&mut w, Role::Consumer, false);
        assert!(w.finish().contains("fast_copy_unaligned_ramp_in"));

        fifo.copy_mode = CopyMode::Assign;
        let mut w = CWriter::new();
        FifoGen::new(&fifo).emit_read(&mut w, Role::Consumer, false);
        let text = w.finish();
        assert!(text.contains("_readTemp.port0 ="));
    }
}

//! Emission of the generated C file set
//!
//! Every emitter renders into memory ([cwriter::GeneratedFile]); the
//! orchestrator writes the files only after the whole set rendered without
//! error, so a failed run leaves no partial output behind.
use laminar_core::config::EmitConfig;
use laminar_core::error::TypedResult;
use laminar_core::fifo::ThreadCrossingFifo;
use laminar_core::graph::{partition_suffix, Graph, NodeId};

pub mod compute;
pub mod cwriter;
pub mod fifo_gen;
pub mod index;
pub mod io_thread;
pub mod kernel;
pub mod makefile;
pub mod support;
pub mod thread;

/// Everything the per-partition emitters need to know about one partition
pub struct PartitionContext<'a> {
    pub graph: &'a Graph,
    pub config: &'a EmitConfig,
    pub partition: i32,
    /// FIFO nodes this partition consumes, in graph order
    pub input_fifos: Vec<NodeId>,
    /// FIFO nodes this partition produces, in graph order
    pub output_fifos: Vec<NodeId>,
}

impl<'a> PartitionContext<'a> {
    pub fn new(graph: &'a Graph, config: &'a EmitConfig, partition: i32) -> Self {
        let mut input_fifos = Vec::new();
        let mut output_fifos = Vec::new();

        for fifo_id in graph.fifo_nodes() {
            let fifo = graph.node(fifo_id).as_fifo().expect("node to be a FIFO");
            if fifo.dst_partition == partition {
                input_fifos.push(fifo_id);
            }
            if fifo.src_partition == partition {
                output_fifos.push(fifo_id);
            }
        }

        Self {
            graph,
            config,
            partition,
            input_fifos,
            output_fifos,
        }
    }

    pub fn suffix(&self) -> String {
        partition_suffix(self.partition)
    }

    pub fn state_type_name(&self) -> String {
        format!(
            "{}_partition{}_state_t",
            self.config.design_name,
            self.suffix()
        )
    }

    pub fn thread_args_type_name(&self) -> String {
        format!(
            "{}_partition{}_threadArgs_t",
            self.config.design_name,
            self.suffix()
        )
    }

    pub fn thread_args_var_name(&self) -> String {
        format!(
            "{}_partition{}_threadArgs",
            self.config.design_name,
            self.suffix()
        )
    }

    pub fn compute_fn_name(&self) -> String {
        format!(
            "{}_partition{}_compute",
            self.config.design_name,
            self.suffix()
        )
    }

    pub fn reset_fn_name(&self) -> String {
        format!(
            "{}_partition{}_reset",
            self.config.design_name,
            self.suffix()
        )
    }

    pub fn thread_fn_name(&self) -> String {
        format!(
            "{}_partition{}_thread",
            self.config.design_name,
            self.suffix()
        )
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_partition{}",
            self.config.file_name_prefix,
            self.suffix()
        )
    }

    pub fn fifo(&self, id: NodeId) -> &ThreadCrossingFifo {
        self.graph.node(id).as_fifo().expect("node to be a FIFO")
    }

    /// State variables of every node in this partition, in schedule order
    pub fn state_vars(&self) -> Vec<laminar_core::graph::Variable> {
        let mut vars = Vec::new();
        for node_id in self.graph.scheduled_nodes(self.partition) {
            vars.extend(self.graph.node(node_id).state_vars());
        }
        vars
    }

    /// Checks that every FIFO touched by this partition agrees on the
    /// in-place discipline; mixed disciplines per thread are not generated
    pub fn validate_in_place_agreement(&self) -> TypedResult<()> {
        use anyhow::anyhow;
        use laminar_core::error::{CompileError, ResultExt};

        let mut flags = self
            .input_fifos
            .iter()
            .chain(self.output_fifos.iter())
            .map(|id| self.fifo(*id).in_place);
        let first = flags.next();
        if let Some(first) = first {
            if flags.any(|f| f != first) {
                return Err(anyhow!(
                    "partition {} mixes in-place and copying FIFOs",
                    self.partition
                ))
                .typ(CompileError::Structural);
            }
        }
        Ok(())
    }
}

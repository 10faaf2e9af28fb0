//! Emission of the build script for the generated file set
use itertools::Itertools;
use laminar_core::config::EmitConfig;
use laminar_core::graph::{partition_suffix, Graph, IO_PARTITION};

use crate::emit::cwriter::{CWriter, GeneratedFile};
use crate::emit::support;

/// `Makefile_<prefix>_<iosuffix>.mk` linking every generated object with
/// pthreads, the realtime clock library and optionally libatomic / libpapi
pub fn emit_makefile(graph: &Graph, config: &EmitConfig) -> GeneratedFile {
    let prefix = &config.file_name_prefix;
    let io = &config.io_suffix;
    let file_name = format!("Makefile_{prefix}_{io}.mk");

    let mut sources = vec![
        format!("{prefix}_{io}_driver.c"),
        format!("{prefix}_{io}_kernel.c"),
        format!("{prefix}_{io}.c"),
        format!("{}.c", support::NUMA_ALLOC_HELPERS_NAME),
    ];
    for partition in graph.partitions() {
        if partition != IO_PARTITION {
            sources.push(format!(
                "{prefix}_partition{}.c",
                partition_suffix(partition)
            ));
        }
    }

    let mut libs = vec!["-pthread", "-lrt", "-latomic"];
    if config.telemetry.level.uses_papi() {
        libs.push("-lpapi");
    }

    let mut w = CWriter::new();
    w.line("CC = gcc");
    w.line("CFLAGS = -O3 -march=native -std=gnu11 -pthread");
    w.line(format!("LIBS = {}", libs.iter().join(" ")));
    w.blank();
    w.line(format!("SRCS = {}", sources.iter().join(" ")));
    w.line("OBJS = $(SRCS:.c=.o)");
    w.line(format!("TARGET = {prefix}_{io}"));
    w.blank();
    w.line("all: $(TARGET)");
    w.blank();
    w.line("$(TARGET): $(OBJS)");
    w.line("\t$(CC) $(CFLAGS) -o $(TARGET) $(OBJS) $(LIBS)");
    w.blank();
    w.line("%.o: %.c");
    w.line("\t$(CC) $(CFLAGS) -c -o $@ $<");
    w.blank();
    w.line("clean:");
    w.line("\trm -f $(OBJS) $(TARGET)");
    w.blank();
    w.line(".PHONY: all clean");

    GeneratedFile::new(file_name, w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminar_core::datatype::DataType;
    use laminar_core::fifo::{FifoPort, ThreadCrossingFifo};
    use laminar_core::graph::NodeKind;

    #[test]
    fn makefile_lists_partitions_and_libs() {
        let mut g = Graph::new();
        let mut fifo = ThreadCrossingFifo::new("f", IO_PARTITION, 0, 4);
        fifo.ports
            .push(FifoPort::new(DataType::new(false, true, false, 32), 1));
        g.add_node("f", None, IO_PARTITION, NodeKind::Fifo(fifo));
        g.add_node(
            "n",
            None,
            0,
            NodeKind::Primitive(laminar_core::graph::Operator::Product),
        );

        let config: laminar_core::config::EmitConfig = serde_yaml::from_str(
            "design_name: toy\nfile_name_prefix: toy\n\
             telemetry:\n  level: papi_full\n  papi_helper_header: papiHelper.h\n",
        )
        .unwrap();

        let makefile = emit_makefile(&g, &config);
        assert_eq!(makefile.name, "Makefile_toy_io.mk");
        assert!(makefile.contents.contains("toy_partition0.c"));
        assert!(makefile.contents.contains("toy_io_kernel.c"));
        assert!(makefile.contents.contains("vitisNumaAllocHelpers.c"));
        assert!(makefile.contents.contains("-pthread -lrt -latomic -lpapi"));
    }
}

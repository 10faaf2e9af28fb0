//! End-to-end backend run: load, rewrite, render, write
//!
//! The generator is a pure function from (graph, config) to a file set.
//! Every file is rendered in memory first; only a fully rendered set is
//! written to disk, so a failed run leaves the output directory untouched.
use std::fs;
use std::path::Path;

use anyhow::anyhow;
use laminar_core::config::EmitConfig;
use laminar_core::error::{CompileError, ResultExt, TypedResult};
use laminar_core::graph::{DesignDescription, Graph, NodeKind, IO_PARTITION};

use crate::emit::cwriter::GeneratedFile;
use crate::emit::{io_thread, kernel, makefile, support, thread, PartitionContext};
use crate::passes::absorption::{
    absorb_adjacent_delays_into_fifos, reshape_fifo_initial_conditions_for_block_size,
};
use crate::passes::insertion::{insert_partition_crossing_fifos, FifoTable};
use crate::passes::merge::merge_fifos;

/// Loads the design and configuration, runs the optimization passes and
/// writes the generated file set into `out_dir`
pub fn run_backend(graph_path: &Path, config_path: &Path, out_dir: &Path) -> TypedResult<()> {
    let design_text = fs::read_to_string(graph_path).typ(CompileError::Io)?;
    let design: DesignDescription =
        serde_yaml::from_str(&design_text).typ(CompileError::Config)?;

    let config_text = fs::read_to_string(config_path).typ(CompileError::Io)?;
    let config: EmitConfig = serde_yaml::from_str(&config_text).typ(CompileError::Config)?;

    info!(
        "generating design {} into {}",
        config.design_name,
        out_dir.display()
    );

    let mut graph = Graph::try_from(design)?;
    let files = emit_design(&mut graph, &config)?;

    fs::create_dir_all(out_dir).typ(CompileError::Io)?;
    for file in &files {
        info!("emitting {}", file.name);
        fs::write(out_dir.join(&file.name), &file.contents).typ(CompileError::Io)?;
    }

    info!("wrote {} files", files.len());
    Ok(())
}

/// Runs the passes and renders the whole artifact set in memory
pub fn emit_design(graph: &mut Graph, config: &EmitConfig) -> TypedResult<Vec<GeneratedFile>> {
    config.validate()?;
    check_no_compute_in_io(graph)?;

    // Rewrite the graph: materialize, absorb, reshape, merge
    let table = insert_partition_crossing_fifos(graph, config)?;
    absorb_adjacent_delays_into_fifos(graph, &table)?;
    for fifos in table.values() {
        for fifo_id in fifos {
            reshape_fifo_initial_conditions_for_block_size(graph, *fifo_id)?;
        }
    }
    let table = merge_fifos(graph, table)?;

    validate_fifos(graph, config, &table)?;
    support::log_communication_report(graph);

    render_files(graph, config, &table)
}

fn render_files(
    graph: &Graph,
    config: &EmitConfig,
    table: &FifoTable,
) -> TypedResult<Vec<GeneratedFile>> {
    let mut files = Vec::new();

    files.push(support::emit_fifo_types_header(graph, config));
    if let Some(simd) = support::emit_fifo_support_header(graph, config) {
        files.push(simd);
    }
    files.push(support::emit_platform_params(config));
    let (numa_h, numa_c) = support::emit_numa_alloc_helpers();
    files.push(numa_h);
    files.push(numa_c);

    for partition in graph.partitions() {
        if partition == IO_PARTITION {
            continue;
        }
        let ctx = PartitionContext::new(graph, config, partition);
        ctx.validate_in_place_agreement()?;
        files.push(thread::emit_partition_header(&ctx));
        files.push(thread::emit_partition_source(&ctx)?);
    }

    let io_ctx = PartitionContext::new(graph, config, IO_PARTITION);
    files.push(io_thread::emit_io_header(&io_ctx));
    files.push(io_thread::emit_io_source(&io_ctx)?);

    files.push(kernel::emit_kernel_header(config));
    files.push(kernel::emit_kernel_source(graph, config, table)?);
    files.push(kernel::emit_driver(config));
    files.push(makefile::emit_makefile(graph, config));

    if config.telemetry.level.enabled() {
        files.push(support::emit_telem_config(graph, config));
    }

    Ok(files)
}

/// The I/O partition hosts only master ports and FIFO endpoints; compute
/// nodes there would never be emitted
fn check_no_compute_in_io(graph: &Graph) -> TypedResult<()> {
    for node in graph.nodes() {
        if node.partition != IO_PARTITION {
            continue;
        }
        match node.kind {
            NodeKind::MasterInput
            | NodeKind::MasterOutput
            | NodeKind::Subsystem
            | NodeKind::Fifo(_) => {}
            _ => {
                return Err(anyhow!(
                    "node {} is assigned to the I/O partition but is not an I/O master",
                    graph.fully_qualified_name(node.id)
                ))
                .typ(CompileError::Structural)
            }
        }
    }
    Ok(())
}

fn validate_fifos(graph: &Graph, config: &EmitConfig, table: &FifoTable) -> TypedResult<()> {
    for fifos in table.values() {
        for fifo_id in fifos {
            let fifo = graph.node(*fifo_id).as_fifo().expect("node to be a FIFO");
            fifo.validate()?;

            if config.double_buffer.enabled() {
                if !fifo.in_place {
                    return Err(anyhow!(
                        "double buffering requested but FIFO {} is not in place",
                        fifo.name
                    ))
                    .typ(CompileError::Structural);
                }
                if fifo
                    .ports
                    .iter()
                    .any(|p| p.sub_block_in > 1 || p.sub_block_out > 1)
                {
                    return Err(anyhow!(
                        "double buffering with sub-blocked FIFO {} is not supported",
                        fifo.name
                    ))
                    .typ(CompileError::UnsupportedConfig);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminar_core::datatype::DataType;
    use laminar_core::graph::{DelayState, Operator, Port, PortRef};
    use laminar_core::numeric::NumericValue;

    fn int32() -> DataType {
        DataType::new(false, true, false, 32)
    }

    fn build_graph() -> Graph {
        let mut g = Graph::new();
        let t = int32();
        let src = g.add_node("src", None, IO_PARTITION, NodeKind::MasterInput);
        g.node_mut(src).outputs = vec![Port::new(t.clone())];
        let gain = g.add_node(
            "scale",
            None,
            0,
            NodeKind::Primitive(Operator::Gain {
                gain: NumericValue::Int(3),
            }),
        );
        g.node_mut(gain).inputs = vec![Port::new(t.clone())];
        g.node_mut(gain).outputs = vec![Port::new(t.clone())];
        g.node_mut(gain).sched_order = 0;
        let delay = g.add_node(
            "hold",
            None,
            0,
            NodeKind::Delay(DelayState {
                delay_len: 1,
                init: vec![NumericValue::Int(7)],
                earliest_first: false,
            }),
        );
        g.node_mut(delay).inputs = vec![Port::new(t.clone())];
        g.node_mut(delay).outputs = vec![Port::new(t.clone())];
        g.node_mut(delay).sched_order = 1;
        let sink = g.add_node("sink", None, IO_PARTITION, NodeKind::MasterOutput);
        g.node_mut(sink).inputs = vec![Port::new(t.clone())];

        g.connect(PortRef::new(src, 0), PortRef::new(gain, 0), t.clone(), 0.0);
        g.connect(PortRef::new(gain, 0), PortRef::new(delay, 0), t.clone(), 0.0);
        g.connect(PortRef::new(delay, 0), PortRef::new(sink, 0), t, 0.0);
        g
    }

    fn config(extra: &str) -> EmitConfig {
        serde_yaml::from_str(&format!(
            "design_name: toy\nfile_name_prefix: toy\n{extra}"
        ))
        .unwrap()
    }

    #[test]
    fn full_artifact_set() {
        let mut g = build_graph();
        let files = emit_design(&mut g, &config("")).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();

        for expected in [
            "toy_fifoTypes.h",
            "vitisPlatformParams.h",
            "vitisNumaAllocHelpers.h",
            "vitisNumaAllocHelpers.c",
            "toy_partition0.h",
            "toy_partition0.c",
            "toy_io.h",
            "toy_io.c",
            "toy_io_kernel.h",
            "toy_io_kernel.c",
            "toy_io_driver.c",
            "Makefile_toy_io.mk",
        ] {
            assert!(names.contains(&expected), "missing {expected}: {names:?}");
        }
        // No SIMD copy requested, no support header
        assert!(!names.contains(&"toy_fifoSupport.h"));
    }

    #[test]
    fn option_matrix_renders() {
        // Every supported option combination renders a complete file set
        for extra in [
            "telemetry:\n  level: rate_and_breakdown\n  dump_file_prefix: toy_telem_\n",
            "telemetry:\n  level: papi_full\n  papi_helper_header: papiHelpers.h\n",
            "double_buffer: input_and_output\nblock_size: 4\n",
            "copy_mode: simd_fast_copy\nin_place_fifos: false\n",
            "fifo_index_caching: none\nuse_sched_fifo: true\npartition_map: [2, 0]\n",
            "copy_mode: assign\nblock_size: 8\nthread_debug_print: true\n",
        ] {
            let files = emit_design(&mut build_graph(), &config(extra)).unwrap();
            assert!(files.len() >= 12, "thin artifact set for: {extra}");
        }
    }

    #[test]
    fn emission_is_idempotent() {
        // Emitting the same design twice produces byte-identical files
        let files_a = emit_design(&mut build_graph(), &config("")).unwrap();
        let files_b = emit_design(&mut build_graph(), &config("")).unwrap();
        assert_eq!(files_a, files_b);
    }

    #[test]
    fn delay_absorbed_before_emission() {
        let mut g = build_graph();
        let files = emit_design(&mut g, &config("")).unwrap();

        // The delay ahead of the output FIFO became initial conditions
        assert!(g.nodes().all(|n| !n.is_delay()));
        let kernel = files
            .iter()
            .find(|f| f.name == "toy_io_kernel.c")
            .unwrap();
        assert!(kernel.contents.contains("_array[0].port0 = 7;"));
        assert!(kernel.contents.contains("writeOffsetPtr, 1);"));
    }

    #[test]
    fn compute_nodes_in_io_partition_are_rejected() {
        let mut g = build_graph();
        let rogue = g.add_node(
            "rogue",
            None,
            IO_PARTITION,
            NodeKind::Primitive(Operator::Product),
        );
        g.node_mut(rogue).sched_order = 5;

        let err = emit_design(&mut g, &config("")).unwrap_err();
        assert_eq!(err.err(), CompileError::Structural);
    }

    #[test]
    fn run_backend_writes_files(){
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("design.yaml");
        let config_path = dir.path().join("emit.yaml");
        let out_dir = dir.path().join("out");

        fs::write(
            &graph_path,
            r#"
name: toy
nodes:
  - name: src
    partition: -2
    kind: master_input
    outputs: [ { dtype: { total_bits: 32, signed: true } } ]
  - name: scale
    partition: 0
    sched_order: 0
    kind: primitive
    op: gain
    gain: 3
    inputs: [ { dtype: { total_bits: 32, signed: true } } ]
    outputs: [ { dtype: { total_bits: 32, signed: true } } ]
  - name: sink
    partition: -2
    kind: master_output
    inputs: [ { dtype: { total_bits: 32, signed: true } } ]
arcs:
  - { from: "src:0", to: "scale:0", dtype: { total_bits: 32, signed: true } }
  - { from: "scale:0", to: "sink:0", dtype: { total_bits: 32, signed: true } }
"#,
        )
        .unwrap();
        fs::write(&config_path, "design_name: toy\nfile_name_prefix: toy\n").unwrap();

        run_backend(&graph_path, &config_path, &out_dir).unwrap();
        assert!(out_dir.join("toy_partition0.c").exists());
        assert!(out_dir.join("Makefile_toy_io.mk").exists());
    }
}

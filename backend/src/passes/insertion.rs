//! FIFO insertion at partition boundaries
//!
//! One FIFO is inserted per group of partition-crossing arcs that share a
//! source port. The FIFO is placed in the partition of the source node
//! because the downstream emitters treat nodes with state differently and
//! the write side owns the buffer placement.
use std::collections::BTreeMap;

use anyhow::anyhow;
use laminar_core::config::EmitConfig;
use laminar_core::error::{CompileError, ResultExt, TypedResult};
use laminar_core::fifo::{FifoPort, ThreadCrossingFifo};
use laminar_core::graph::{ArcId, Graph, NodeId, NodeKind, Port, PortRef};

/// FIFO nodes per `(src, dst)` partition pair, in insertion order
pub type FifoTable = BTreeMap<(i32, i32), Vec<NodeId>>;

/// Inserts a thread-crossing FIFO for every partition-crossing arc group
/// and rewires the group through it.
///
/// The group's source-side arc is replaced by a single arc into the FIFO
/// input; each original arc is re-sourced from the FIFO output with its
/// destination port untouched.
pub fn insert_partition_crossing_fifos(
    graph: &mut Graph,
    config: &EmitConfig,
) -> TypedResult<FifoTable> {
    let mut table = FifoTable::new();
    let arc_groups = graph.crossing_arc_groups();

    for ((src_partition, dst_partition), groups) in arc_groups {
        let mut fifos = Vec::new();

        for (group_index, group) in groups.iter().enumerate() {
            let fifo = insert_fifo_for_group(
                graph,
                config,
                (src_partition, dst_partition),
                group_index,
                group,
            )?;
            fifos.push(fifo);
        }

        table.insert((src_partition, dst_partition), fifos);
    }

    Ok(table)
}

fn insert_fifo_for_group(
    graph: &mut Graph,
    config: &EmitConfig,
    (src_partition, dst_partition): (i32, i32),
    group_index: usize,
    group: &[ArcId],
) -> TypedResult<NodeId> {
    let first_arc = *group
        .first()
        .ok_or_else(|| anyhow!("found a partition crossing group with no arcs"))
        .typ(CompileError::Structural)?;

    let src_port = graph.arc(first_arc).src;
    let src_node = graph.node(src_port.node);

    if src_node.partition != src_partition {
        return Err(anyhow!(
            "the source {} of a partition crossing arc group disagrees with the stated \
             source partition {src_partition}",
            graph.fully_qualified_name(src_port.node)
        ))
        .typ(CompileError::Structural);
    }

    for arc_id in group {
        let arc = graph.arc(*arc_id);
        if arc.src != src_port {
            return Err(anyhow!(
                "arc group between partitions {src_partition} and {dst_partition} mixes source \
                 ports of {}",
                graph.fully_qualified_name(src_port.node)
            ))
            .typ(CompileError::Structural);
        }
        let dst_node = graph.node(arc.dst.node);
        if dst_node.partition != dst_partition {
            return Err(anyhow!(
                "arc into {} crosses into partition {} but was grouped for partition \
                 {dst_partition}",
                graph.fully_qualified_name(arc.dst.node),
                dst_node.partition
            ))
            .typ(CompileError::Structural);
        }
    }

    // The FIFO shares the parent of its source.  An enable-output source
    // drives the FIFO from inside an enabled context, so the FIFO moves one
    // level further up to sit outside that context.
    let parent = if matches!(src_node.kind, NodeKind::EnableOutput) {
        src_node
            .parent
            .and_then(|p| graph.node(p).parent)
    } else {
        src_node.parent
    };

    let sample_port = src_node
        .outputs
        .get(src_port.port)
        .cloned()
        .unwrap_or_else(|| Port::new(graph.arc(first_arc).dtype.clone()));
    let dtype = graph.arc(first_arc).dtype.clone();
    let sample_time = graph.arc(first_arc).sample_time;
    let clock = sample_port.clock;

    if !clock.divides_block(config.block_size) {
        return Err(anyhow!(
            "clock rate {}/{} of {} does not divide the base block size {}",
            clock.numerator,
            clock.denominator,
            graph.fully_qualified_name(src_port.node),
            config.block_size
        ))
        .typ(CompileError::UnsupportedConfig);
    }

    let block_size = clock.scale_block_size(config.block_size);

    // Only the double-length layout rounds to a power of two; a plain ring
    // keeps the requested capacity
    let capacity = if block_size > 1 {
        config.fifo_capacity_blocks.next_power_of_two()
    } else {
        config.fifo_capacity_blocks
    };

    let name = ThreadCrossingFifo::crossing_name(src_partition, dst_partition, group_index);
    let mut fifo = ThreadCrossingFifo::new(&name, src_partition, dst_partition, capacity);
    let mut port = FifoPort::new(dtype.clone(), block_size);
    port.clock = clock;
    fifo.ports.push(port);
    fifo.copy_mode = config.copy_mode;
    fifo.caching = config.fifo_index_caching;
    fifo.in_place = config.in_place_fifos;
    fifo.assign_buffer_kind();

    let fifo_id = graph.add_node(name, parent, src_partition, NodeKind::Fifo(fifo));
    {
        let node = graph.node_mut(fifo_id);
        node.inputs = vec![Port {
            dtype: dtype.clone(),
            sample_time,
            clock,
        }];
        node.outputs = vec![Port {
            dtype,
            sample_time,
            clock,
        }];
    }

    // One arc feeds the FIFO; the original arcs now fan out of it
    let feed_dtype = graph.arc(first_arc).dtype.clone();
    graph.connect(
        src_port,
        PortRef::new(fifo_id, 0),
        feed_dtype,
        sample_time,
    );
    for arc_id in group {
        graph.rewire_src(*arc_id, PortRef::new(fifo_id, 0));
    }

    debug!(
        "inserted {} for {} arcs crossing partition {src_partition} -> {dst_partition}",
        graph.node(fifo_id).name,
        group.len()
    );

    Ok(fifo_id)
}

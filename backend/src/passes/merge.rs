//! Merging of FIFOs that cross the same partition boundary
//!
//! Two FIFOs between the same pair of partitions can share one buffer and
//! one pair of cursors when their transactions are interchangeable: same
//! block size, same clock rate, same copy discipline and the same initial
//! occupancy. Merging widens the slot record by one field per absorbed
//! port; the readiness checks and cursor traffic of the absorbed FIFO
//! disappear entirely.
use itertools::Itertools;
use laminar_core::error::TypedResult;
use laminar_core::graph::{Graph, NodeId};

use crate::passes::insertion::FifoTable;

/// Merges compatible FIFOs per partition pair, returning the updated table
pub fn merge_fifos(graph: &mut Graph, table: FifoTable) -> TypedResult<FifoTable> {
    let mut merged_table = FifoTable::new();

    for (pair, fifos) in table {
        let mut remaining: Vec<NodeId> = Vec::new();

        for fifo_id in fifos {
            let target = remaining
                .iter()
                .copied()
                .find(|candidate| mergeable(graph, *candidate, fifo_id));

            match target {
                Some(target_id) => merge_into(graph, target_id, fifo_id),
                None => remaining.push(fifo_id),
            }
        }

        merged_table.insert(pair, remaining);
    }

    Ok(merged_table)
}

/// FIFOs merge only when every per-transaction property agrees
fn mergeable(graph: &Graph, a: NodeId, b: NodeId) -> bool {
    let fa = graph.node(a).as_fifo().expect("node to be a FIFO");
    let fb = graph.node(b).as_fifo().expect("node to be a FIFO");

    let ports_agree = fa
        .ports
        .iter()
        .cartesian_product(fb.ports.iter())
        .all(|(pa, pb)| {
            pa.block_size == pb.block_size
                && pa.clock == pb.clock
                && pa.sub_block_in == pb.sub_block_in
                && pa.sub_block_out == pb.sub_block_out
        });

    fa.src_partition == fb.src_partition
        && fa.dst_partition == fb.dst_partition
        && fa.capacity_blocks == fb.capacity_blocks
        && fa.in_place == fb.in_place
        && fa.copy_mode == fb.copy_mode
        && fa.buffer_kind == fb.buffer_kind
        && fa.init_blocks() == fb.init_blocks()
        && ports_agree
}

fn merge_into(graph: &mut Graph, target_id: NodeId, victim_id: NodeId) {
    let victim = graph.remove_node(victim_id).expect("FIFO to be live");
    let victim_fifo = victim.as_fifo().expect("node to be a FIFO").clone();

    let port_base = {
        let target = graph.node_mut(target_id);
        let base = target.inputs.len();
        target.inputs.extend(victim.inputs.iter().cloned());
        target.outputs.extend(victim.outputs.iter().cloned());
        let fifo = target.as_fifo_mut().expect("node to be a FIFO");
        fifo.ports.extend(victim_fifo.ports.iter().cloned());
        base
    };

    // Redirect both endpoints of every victim port onto the widened target
    for arc_id in graph.arcs().map(|a| a.id).collect::<Vec<_>>() {
        let arc = graph.arc(arc_id).clone();
        if arc.dst.node == victim_id {
            graph.rewire_dst(
                arc_id,
                laminar_core::graph::PortRef::new(target_id, port_base + arc.dst.port),
            );
        }
        if arc.src.node == victim_id {
            graph.rewire_src(
                arc_id,
                laminar_core::graph::PortRef::new(target_id, port_base + arc.src.port),
            );
        }
    }

    debug!(
        "merged FIFO {} into {} ({} ports total)",
        victim.name,
        graph.node(target_id).name,
        graph.node(target_id).inputs.len()
    );
}

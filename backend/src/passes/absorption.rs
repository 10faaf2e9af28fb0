//! Absorption of unit delays into FIFO initial conditions
//!
//! A delay that abuts a FIFO is pure buffered state. Folding its initial
//! contents into the FIFO removes the node from the compute loop while the
//! downstream partition observes the identical sample sequence: an upstream
//! delay's contents drain after the FIFO's current initial conditions
//! (appended), a downstream delay's contents drain before them (prepended).
use anyhow::anyhow;
use laminar_core::error::{CompileError, ResultExt, TypedResult};
use laminar_core::graph::{ArcId, DelayState, Graph, NodeId, NodeKind};
use laminar_core::numeric::NumericValue;

use crate::passes::insertion::FifoTable;

/// Outcome of one absorption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsorptionStatus {
    NoAbsorption,
    /// The delay disappeared into the FIFO entirely
    FullAbsorption,
    /// The FIFO filled up; the remainder of the delay stays outside
    PartialAbsorptionFullFifo,
    /// Part of the delay moved into the FIFO; the delay shrank in place
    PartialAbsorptionMergeInitCond,
}

/// Absorbs delays adjacent to every FIFO, iterating per FIFO until no
/// further absorption applies (a chain of delays is folded one by one).
pub fn absorb_adjacent_delays_into_fifos(
    graph: &mut Graph,
    table: &FifoTable,
) -> TypedResult<()> {
    for fifos in table.values() {
        for &fifo_id in fifos {
            loop {
                let input = absorb_adjacent_input_delay_if_possible(graph, fifo_id)?;
                let output = absorb_adjacent_output_delay_if_possible(graph, fifo_id)?;

                // Only a full absorption can expose another adjacent delay
                if input != AbsorptionStatus::FullAbsorption
                    && output != AbsorptionStatus::FullAbsorption
                {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Absorbs a delay feeding the FIFO input if legal.
///
/// Legal when the delay lies in the FIFO's input partition, the FIFO is the
/// sole consumer of the delay's output, and the FIFO has no order-constraint
/// input arcs.
pub fn absorb_adjacent_input_delay_if_possible(
    graph: &mut Graph,
    fifo_id: NodeId,
) -> TypedResult<AbsorptionStatus> {
    let in_arcs = graph.in_arcs(fifo_id);
    if in_arcs
        .iter()
        .any(|a| graph.arc(*a).order_constraint)
    {
        return Ok(AbsorptionStatus::NoAbsorption);
    }

    for arc_id in in_arcs {
        let port_index = graph.arc(arc_id).dst.port;
        let delay_id = graph.arc(arc_id).src.node;

        let Some(delay) = delay_of(graph, delay_id) else {
            continue;
        };
        if graph.node(delay_id).partition != fifo_src_partition(graph, fifo_id) {
            continue;
        }
        // The FIFO must be the sole consumer of the delay output
        if graph.out_arcs(delay_id).len() != 1 {
            continue;
        }

        check_delay(graph, delay_id, &delay)?;
        check_sub_blocking(graph, fifo_id, delay_id, port_index, &delay)?;

        let eps = elements_per_sample(graph, fifo_id, port_index);
        let space = free_init_elements(graph, fifo_id, port_index);
        if space == 0 {
            return Ok(AbsorptionStatus::NoAbsorption);
        }

        if delay.init.len() <= space {
            // The whole delay becomes FIFO initial state
            let moved = delay.init.clone();
            fifo_port_mut(graph, fifo_id, port_index)
                .init_conditions
                .extend(moved);

            let feed_arc = graph
                .in_arcs(delay_id)
                .into_iter()
                .find(|a| !graph.arc(*a).order_constraint)
                .expect("delay to have a data input");
            graph.rewire_dst(feed_arc, graph.arc(arc_id).dst);
            graph.remove_arc(arc_id);
            let removed = graph.remove_node(delay_id).expect("delay to be live");
            debug!(
                "fully absorbed delay {} into {}",
                removed.name,
                graph.node(fifo_id).name
            );
            return Ok(AbsorptionStatus::FullAbsorption);
        }

        // Move as many whole samples as fit; the oldest samples reach the
        // FIFO first and therefore move first
        let samples = space / eps;
        if samples == 0 {
            return Ok(AbsorptionStatus::NoAbsorption);
        }
        let moved: Vec<NumericValue> = delay.init[..samples * eps].to_vec();
        fifo_port_mut(graph, fifo_id, port_index)
            .init_conditions
            .extend(moved);
        update_delay(graph, delay_id, |d| {
            d.init.drain(..samples * eps);
            d.delay_len -= samples;
        });
        debug!(
            "partially absorbed {samples} samples of delay {} into {} (FIFO full)",
            graph.node(delay_id).name,
            graph.node(fifo_id).name
        );
        return Ok(AbsorptionStatus::PartialAbsorptionFullFifo);
    }

    Ok(AbsorptionStatus::NoAbsorption)
}

/// Absorbs the delays consuming the FIFO output if legal.
///
/// Legal when every consumer of the FIFO output is a delay, all consumers
/// carry identical initial conditions, they lie in the FIFO's output
/// partition, and the FIFO has no order-constraint output arcs.
pub fn absorb_adjacent_output_delay_if_possible(
    graph: &mut Graph,
    fifo_id: NodeId,
) -> TypedResult<AbsorptionStatus> {
    let out_arcs = graph.out_arcs(fifo_id);
    if out_arcs
        .iter()
        .any(|a| graph.arc(*a).order_constraint)
    {
        return Ok(AbsorptionStatus::NoAbsorption);
    }

    let port_count = graph.node(fifo_id).outputs.len();
    for port_index in 0..port_count {
        let port_arcs: Vec<ArcId> = out_arcs
            .iter()
            .copied()
            .filter(|a| graph.arc(*a).src.port == port_index)
            .collect();
        if port_arcs.is_empty() {
            continue;
        }

        let mut delays: Vec<(ArcId, NodeId, DelayState)> = Vec::new();
        let mut all_delays = true;
        for arc_id in &port_arcs {
            let dst = graph.arc(*arc_id).dst.node;
            match delay_of(graph, dst) {
                Some(state)
                    if graph.node(dst).partition == fifo_dst_partition(graph, fifo_id)
                        && graph.in_arcs(dst).len() == 1 =>
                {
                    delays.push((*arc_id, dst, state));
                }
                _ => {
                    all_delays = false;
                    break;
                }
            }
        }
        if !all_delays || delays.is_empty() {
            continue;
        }

        // All delays must agree before their shared state can move
        let reference = delays[0].2.clone();
        if delays.iter().any(|(_, _, d)| {
            d.init != reference.init
                || d.delay_len != reference.delay_len
                || d.earliest_first != reference.earliest_first
        }) {
            continue;
        }

        for (_, delay_id, state) in &delays {
            check_delay(graph, *delay_id, state)?;
            check_sub_blocking(graph, fifo_id, *delay_id, port_index, state)?;
        }

        let eps = elements_per_sample(graph, fifo_id, port_index);
        let space = free_init_elements(graph, fifo_id, port_index);
        if space == 0 {
            return Ok(AbsorptionStatus::NoAbsorption);
        }

        if reference.init.len() <= space {
            // Downstream state drains first: prepend
            let port = fifo_port_mut(graph, fifo_id, port_index);
            let mut init = reference.init.clone();
            init.extend(port.init_conditions.drain(..));
            port.init_conditions = init;

            for (arc_id, delay_id, _) in delays {
                for consumer_arc in graph.out_arcs(delay_id) {
                    graph.rewire_src(consumer_arc, graph.arc(arc_id).src);
                }
                graph.remove_arc(arc_id);
                let removed = graph.remove_node(delay_id).expect("delay to be live");
                debug!(
                    "fully absorbed downstream delay {} into {}",
                    removed.name,
                    graph.node(fifo_id).name
                );
            }
            return Ok(AbsorptionStatus::FullAbsorption);
        }

        let samples = (space / eps).min(reference.delay_len);
        if samples == 0 {
            return Ok(AbsorptionStatus::NoAbsorption);
        }

        // The newest part of the delay state is what sits logically inside
        // the FIFO; the delays keep their oldest samples
        let keep = reference.init.len() - samples * eps;
        let moved: Vec<NumericValue> = reference.init[keep..].to_vec();
        {
            let port = fifo_port_mut(graph, fifo_id, port_index);
            let mut init = moved;
            init.extend(port.init_conditions.drain(..));
            port.init_conditions = init;
        }
        for (_, delay_id, _) in &delays {
            update_delay(graph, *delay_id, |d| {
                d.init.truncate(keep);
                d.delay_len -= samples;
            });
        }
        debug!(
            "merged {samples} samples of downstream delay state into {}",
            graph.node(fifo_id).name
        );
        return Ok(AbsorptionStatus::PartialAbsorptionMergeInitCond);
    }

    Ok(AbsorptionStatus::NoAbsorption)
}

/// Restores the FIFO initial-condition invariant after absorption: the
/// element count of every port must be a multiple of the port's elements
/// per block. The trailing samples (the last to drain) spill back into a
/// delay inserted on the FIFO input side.
pub fn reshape_fifo_initial_conditions_for_block_size(
    graph: &mut Graph,
    fifo_id: NodeId,
) -> TypedResult<()> {
    let port_count = graph.node(fifo_id).inputs.len();
    for port_index in 0..port_count {
        let port = fifo_port(graph, fifo_id, port_index).clone();
        let remainder = port.init_conditions.len() % port.elements_per_block();
        if remainder == 0 {
            continue;
        }
        let target = port.init_conditions.len() - remainder;
        reshape_fifo_initial_conditions_to_size(graph, fifo_id, port_index, target)?;
    }

    Ok(())
}

/// Spills initial conditions beyond `target_elements` into a new delay on
/// the FIFO input side
pub fn reshape_fifo_initial_conditions_to_size(
    graph: &mut Graph,
    fifo_id: NodeId,
    port_index: usize,
    target_elements: usize,
) -> TypedResult<()> {
    let eps = elements_per_sample(graph, fifo_id, port_index);
    let current = fifo_port(graph, fifo_id, port_index).init_conditions.len();
    if current <= target_elements {
        return Ok(());
    }

    let spilled_elements = current - target_elements;
    if spilled_elements % eps != 0 {
        return Err(anyhow!(
            "cannot spill {spilled_elements} elements from {}: not a whole number of samples",
            graph.node(fifo_id).name
        ))
        .typ(CompileError::Type);
    }
    let spilled_samples = spilled_elements / eps;

    let spilled: Vec<NumericValue> = {
        let port = fifo_port_mut(graph, fifo_id, port_index);
        port.init_conditions.split_off(target_elements)
    };

    let feed_arc = graph
        .in_arcs(fifo_id)
        .into_iter()
        .find(|a| graph.arc(*a).dst.port == port_index && !graph.arc(*a).order_constraint)
        .ok_or_else(|| {
            anyhow!(
                "FIFO {} port {port_index} has no input arc to spill into",
                graph.node(fifo_id).name
            )
        })
        .typ(CompileError::Structural)?;

    let fifo_node = graph.node(fifo_id);
    let partition = fifo_node.partition;
    let parent = fifo_node.parent;
    let name = format!("{}_initCondSpill_port{port_index}", fifo_node.name);
    let port_desc = fifo_node.inputs[port_index].clone();

    let delay_id = graph.add_node(
        name,
        parent,
        partition,
        NodeKind::Delay(DelayState {
            delay_len: spilled_samples,
            init: spilled,
            earliest_first: false,
        }),
    );
    {
        let sched = next_sched_order(graph, partition);
        let node = graph.node_mut(delay_id);
        node.inputs = vec![port_desc.clone()];
        node.outputs = vec![port_desc.clone()];
        node.sched_order = sched;
    }

    let fifo_dst = graph.arc(feed_arc).dst;
    graph.rewire_dst(feed_arc, laminar_core::graph::PortRef::new(delay_id, 0));
    graph.connect(
        laminar_core::graph::PortRef::new(delay_id, 0),
        fifo_dst,
        port_desc.dtype,
        port_desc.sample_time,
    );

    debug!(
        "spilled {spilled_samples} samples of initial conditions out of {} into a new delay",
        graph.node(fifo_id).name
    );

    Ok(())
}

fn delay_of(graph: &Graph, node: NodeId) -> Option<DelayState> {
    match &graph.node(node).kind {
        NodeKind::Delay(d) => Some(d.clone()),
        _ => None,
    }
}

fn update_delay(graph: &mut Graph, node: NodeId, f: impl FnOnce(&mut DelayState)) {
    if let NodeKind::Delay(d) = &mut graph.node_mut(node).kind {
        f(d);
    }
}

fn fifo_src_partition(graph: &Graph, fifo: NodeId) -> i32 {
    graph.node(fifo).as_fifo().expect("node to be a FIFO").src_partition
}

fn fifo_dst_partition(graph: &Graph, fifo: NodeId) -> i32 {
    graph.node(fifo).as_fifo().expect("node to be a FIFO").dst_partition
}

fn fifo_port<'a>(
    graph: &'a Graph,
    fifo: NodeId,
    port: usize,
) -> &'a laminar_core::fifo::FifoPort {
    &graph.node(fifo).as_fifo().expect("node to be a FIFO").ports[port]
}

fn fifo_port_mut<'a>(
    graph: &'a mut Graph,
    fifo: NodeId,
    port: usize,
) -> &'a mut laminar_core::fifo::FifoPort {
    &mut graph
        .node_mut(fifo)
        .as_fifo_mut()
        .expect("node to be a FIFO")
        .ports[port]
}

fn elements_per_sample(graph: &Graph, fifo: NodeId, port: usize) -> usize {
    fifo_port(graph, fifo, port).elements_per_sample()
}

/// Free room for initial conditions, in elements
fn free_init_elements(graph: &Graph, fifo: NodeId, port: usize) -> usize {
    let fifo_model = graph.node(fifo).as_fifo().expect("node to be a FIFO");
    let port = &fifo_model.ports[port];
    fifo_model.capacity_blocks * port.elements_per_block() - port.init_conditions.len()
}

fn next_sched_order(graph: &Graph, partition: i32) -> i64 {
    graph
        .nodes()
        .filter(|n| n.partition == partition)
        .map(|n| n.sched_order)
        .max()
        .unwrap_or(-1)
        + 1
}

/// A delay's declared initial-condition count must match its length, and
/// its input and output port types must agree
fn check_delay(graph: &Graph, delay_id: NodeId, state: &DelayState) -> TypedResult<()> {
    let node = graph.node(delay_id);

    let in_type = &node.inputs[0].dtype;
    let out_type = &node.outputs[0].dtype;
    if in_type != out_type {
        return Err(anyhow!(
            "delay {} input type {} disagrees with its output type {}",
            graph.fully_qualified_name(delay_id),
            in_type,
            out_type
        ))
        .typ(CompileError::Type);
    }

    let expected = state.delay_len * in_type.elements();
    if state.init.len() != expected {
        return Err(anyhow!(
            "delay {} declares {} initial conditions but its length {} requires {expected}",
            graph.fully_qualified_name(delay_id),
            state.init.len(),
            state.delay_len
        ))
        .typ(CompileError::Type);
    }

    Ok(())
}

/// `earliest_first` initial-condition ordering is incompatible with
/// multi-sample blocks; reject instead of silently reordering
fn check_sub_blocking(
    graph: &Graph,
    fifo_id: NodeId,
    delay_id: NodeId,
    port_index: usize,
    state: &DelayState,
) -> TypedResult<()> {
    if state.earliest_first && fifo_port(graph, fifo_id, port_index).block_size > 1 {
        return Err(anyhow!(
            "delay {} uses earliest-first initial conditions but FIFO {} moves blocks of {} \
             samples",
            graph.fully_qualified_name(delay_id),
            graph.node(fifo_id).name,
            fifo_port(graph, fifo_id, port_index).block_size
        ))
        .typ(CompileError::UnsupportedConfig);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminar_core::config::EmitConfig;
    use laminar_core::datatype::DataType;
    use laminar_core::graph::{Operator, Port, PortRef};

    use crate::passes::insertion::insert_partition_crossing_fifos;

    fn int32() -> DataType {
        DataType::new(false, true, false, 32)
    }

    fn sum_kind() -> NodeKind {
        NodeKind::Primitive(Operator::Sum {
            signs: "++".to_string(),
        })
    }

    fn delay_kind(values: &[i64]) -> NodeKind {
        NodeKind::Delay(DelayState {
            delay_len: values.len(),
            init: values.iter().map(|v| NumericValue::Int(*v)).collect(),
            earliest_first: false,
        })
    }

    fn config() -> EmitConfig {
        serde_yaml::from_str("design_name: toy\nfile_name_prefix: toy\nfifo_capacity_blocks: 4\n")
            .unwrap()
    }

    /// Builds src -> [delays...] -> sink crossing partitions 0 -> 1 and
    /// inserts the FIFO behind the last delay
    fn chain_with_upstream_delays(delay_inits: &[&[i64]]) -> (Graph, NodeId) {
        let mut g = Graph::new();
        let src = g.add_node("src", None, 0, sum_kind());
        g.node_mut(src).outputs = vec![Port::new(int32())];
        g.node_mut(src).sched_order = 0;

        let mut tail = PortRef::new(src, 0);
        for (i, init) in delay_inits.iter().enumerate() {
            let d = g.add_node(format!("d{i}"), None, 0, delay_kind(init));
            g.node_mut(d).inputs = vec![Port::new(int32())];
            g.node_mut(d).outputs = vec![Port::new(int32())];
            g.node_mut(d).sched_order = 1 + i as i64;
            g.connect(tail, PortRef::new(d, 0), int32(), 0.0);
            tail = PortRef::new(d, 0);
        }

        let sink = g.add_node("sink", None, 1, sum_kind());
        g.node_mut(sink).inputs = vec![Port::new(int32())];
        g.node_mut(sink).sched_order = 0;
        g.connect(tail, PortRef::new(sink, 0), int32(), 0.0);

        let table = insert_partition_crossing_fifos(&mut g, &config()).unwrap();
        let fifo_id = table[&(0, 1)][0];
        (g, fifo_id)
    }

    #[test]
    fn upstream_unit_delay_is_fully_absorbed() {
        // The delay node disappears and its value becomes FIFO state
        let (mut g, fifo_id) = chain_with_upstream_delays(&[&[7]]);

        let status = absorb_adjacent_input_delay_if_possible(&mut g, fifo_id).unwrap();
        assert_eq!(status, AbsorptionStatus::FullAbsorption);

        let fifo = g.node(fifo_id).as_fifo().unwrap();
        assert_eq!(fifo.ports[0].init_conditions, vec![NumericValue::Int(7)]);
        assert!(g.nodes().all(|n| !n.is_delay()));
        // src now feeds the FIFO directly
        let feed = g.in_arcs(fifo_id);
        assert_eq!(feed.len(), 1);
        assert_eq!(g.node(g.arc(feed[0]).src.node).name, "src");
        fifo.validate().unwrap();
    }

    #[test]
    fn delay_chain_preserves_drain_order() {
        // src -> d0[7] -> d1[8] -> FIFO: the consumer must observe 8 then 7
        let (mut g, fifo_id) = chain_with_upstream_delays(&[&[7], &[8]]);

        absorb_adjacent_delays_into_fifos(
            &mut g,
            &FifoTable::from([((0, 1), vec![fifo_id])]),
        )
        .unwrap();

        let fifo = g.node(fifo_id).as_fifo().unwrap();
        assert_eq!(
            fifo.ports[0].init_conditions,
            vec![NumericValue::Int(8), NumericValue::Int(7)]
        );
        assert!(g.nodes().all(|n| !n.is_delay()));
    }

    #[test]
    fn oversized_delay_fills_fifo_and_remains() {
        // Capacity 4: a 6-sample delay leaves 2 samples outside
        let (mut g, fifo_id) = chain_with_upstream_delays(&[&[1, 2, 3, 4, 5, 6]]);

        let status = absorb_adjacent_input_delay_if_possible(&mut g, fifo_id).unwrap();
        assert_eq!(status, AbsorptionStatus::PartialAbsorptionFullFifo);

        let fifo = g.node(fifo_id).as_fifo().unwrap();
        // The oldest samples reached the FIFO first
        assert_eq!(
            fifo.ports[0].init_conditions,
            [1, 2, 3, 4].map(NumericValue::Int).to_vec()
        );
        let remaining: Vec<_> = g.nodes().filter(|n| n.is_delay()).collect();
        assert_eq!(remaining.len(), 1);
        match &remaining[0].kind {
            NodeKind::Delay(d) => {
                assert_eq!(d.delay_len, 2);
                assert_eq!(d.init, [5, 6].map(NumericValue::Int).to_vec());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn downstream_delay_prepends() {
        // FIFO -> delay[5] -> sink: the delay state drains before anything
        // the producer enqueues
        let mut g = Graph::new();
        let src = g.add_node("src", None, 0, sum_kind());
        g.node_mut(src).outputs = vec![Port::new(int32())];
        g.node_mut(src).sched_order = 0;
        let d = g.add_node("d", None, 1, delay_kind(&[5]));
        g.node_mut(d).inputs = vec![Port::new(int32())];
        g.node_mut(d).outputs = vec![Port::new(int32())];
        g.node_mut(d).sched_order = 0;
        let sink = g.add_node("sink", None, 1, sum_kind());
        g.node_mut(sink).inputs = vec![Port::new(int32())];
        g.node_mut(sink).sched_order = 1;

        g.connect(PortRef::new(src, 0), PortRef::new(d, 0), int32(), 0.0);
        let to_sink = g.connect(PortRef::new(d, 0), PortRef::new(sink, 0), int32(), 0.0);

        let table = insert_partition_crossing_fifos(&mut g, &config()).unwrap();
        let fifo_id = table[&(0, 1)][0];
        // Seed the FIFO with existing state so prepending is observable
        g.node_mut(fifo_id).as_fifo_mut().unwrap().ports[0]
            .init_conditions
            .push(NumericValue::Int(9));

        let status = absorb_adjacent_output_delay_if_possible(&mut g, fifo_id).unwrap();
        assert_eq!(status, AbsorptionStatus::FullAbsorption);

        let fifo = g.node(fifo_id).as_fifo().unwrap();
        assert_eq!(
            fifo.ports[0].init_conditions,
            vec![NumericValue::Int(5), NumericValue::Int(9)]
        );
        assert!(g.nodes().all(|n| !n.is_delay()));
        // The sink arc now sources from the FIFO
        assert_eq!(g.arc(to_sink).src.node, fifo_id);
    }

    #[test]
    fn order_constraint_blocks_absorption() {
        let (mut g, fifo_id) = chain_with_upstream_delays(&[&[7]]);
        let other = g.add_node("other", None, 0, sum_kind());
        g.node_mut(other).outputs = vec![Port::new(int32())];
        let constraint = g.connect(
            PortRef::new(other, 0),
            PortRef::new(fifo_id, 0),
            int32(),
            0.0,
        );
        g.arc_mut(constraint).order_constraint = true;

        let status = absorb_adjacent_input_delay_if_possible(&mut g, fifo_id).unwrap();
        assert_eq!(status, AbsorptionStatus::NoAbsorption);
    }

    #[test]
    fn reshape_spills_trailing_partial_block() {
        let (mut g, fifo_id) = chain_with_upstream_delays(&[]);
        {
            let fifo = g.node_mut(fifo_id).as_fifo_mut().unwrap();
            fifo.ports[0].block_size = 2;
            fifo.ports[0].init_conditions =
                [1, 2, 3].map(NumericValue::Int).to_vec();
            fifo.assign_buffer_kind();
        }

        reshape_fifo_initial_conditions_for_block_size(&mut g, fifo_id).unwrap();

        let fifo = g.node(fifo_id).as_fifo().unwrap();
        assert_eq!(
            fifo.ports[0].init_conditions,
            vec![NumericValue::Int(1), NumericValue::Int(2)]
        );
        fifo.validate().unwrap();

        // The last-to-drain sample now sits in a delay feeding the FIFO
        let spill: Vec<_> = g.nodes().filter(|n| n.is_delay()).collect();
        assert_eq!(spill.len(), 1);
        match &spill[0].kind {
            NodeKind::Delay(d) => {
                assert_eq!(d.delay_len, 1);
                assert_eq!(d.init, vec![NumericValue::Int(3)]);
            }
            _ => unreachable!(),
        }
        let spill_id = spill[0].id;
        assert_eq!(g.arc(g.in_arcs(fifo_id)[0]).src.node, spill_id);
    }

    #[test]
    fn earliest_first_with_blocks_is_rejected() {
        let (mut g, fifo_id) = chain_with_upstream_delays(&[&[7]]);
        {
            let fifo = g.node_mut(fifo_id).as_fifo_mut().unwrap();
            fifo.ports[0].block_size = 2;
            fifo.assign_buffer_kind();
        }
        let delay_id = g.nodes().find(|n| n.is_delay()).unwrap().id;
        update_delay(&mut g, delay_id, |d| d.earliest_first = true);

        let err = absorb_adjacent_input_delay_if_possible(&mut g, fifo_id).unwrap_err();
        assert_eq!(err.err(), CompileError::UnsupportedConfig);
    }
}

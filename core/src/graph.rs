//! The partitioned, scheduled design graph
//!
//! Nodes carry a partition number and a schedule order assigned by an
//! external scheduler; this crate never re-partitions or re-schedules.
//! The node kinds collapse the deep inheritance of typical dataflow front
//! ends into one closed enum with per-variant operation tables (state
//! variables, combinational-path predicate, reset values).
use std::collections::{BTreeMap, BTreeSet};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::clock::ClockDomain;
use crate::datatype::DataType;
use crate::error::{CompileError, ResultExt, TypedResult};
use crate::fifo::ThreadCrossingFifo;
use crate::numeric::NumericValue;

/// Distinguished partition number of the I/O partition.
///
/// Negative partition numbers render with an `N` prefix in generated names.
pub const IO_PARTITION: i32 = -2;

/// Renders a partition number for use in generated identifiers
pub fn partition_suffix(partition: i32) -> String {
    if partition < 0 {
        format!("N{}", -partition)
    } else {
        partition.to_string()
    }
}

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ArcId(pub usize);

/// One end of an arc: a node and a port number on it
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PortRef {
    pub node: NodeId,
    pub port: usize,
}

impl PortRef {
    pub fn new(node: NodeId, port: usize) -> Self {
        Self { node, port }
    }
}

/// A typed port on a node
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Port {
    pub dtype: DataType,
    #[serde(default)]
    pub sample_time: f64,
    #[serde(default)]
    pub clock: ClockDomain,
}

impl Port {
    pub fn new(dtype: DataType) -> Self {
        Self {
            dtype,
            sample_time: 0.0,
            clock: ClockDomain::BASE,
        }
    }
}

/// A C state variable owned by a node
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dtype: DataType,
    #[serde(default)]
    pub init: Vec<NumericValue>,
}

impl Variable {
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
            init: Vec::new(),
        }
    }

    /// The C identifier for this variable.  Complex variables store their
    /// imaginary part in a second variable with the `_im` suffix.
    pub fn c_name(&self, imag: bool) -> String {
        if imag {
            format!("{}_im", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// State carried by a delay node
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DelayState {
    /// Delay length in samples
    pub delay_len: usize,
    /// Initial contents, oldest value first.  Length must equal
    /// `delay_len * elements-per-sample` of the port type.
    #[serde(default)]
    pub init: Vec<NumericValue>,
    /// If set, initial conditions drain oldest-first across sub-blocks.
    /// Only legal with block size 1.
    #[serde(default)]
    pub earliest_first: bool,
}

/// A black-box node providing its own C implementation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BlackBoxSpec {
    /// The C function called per sample / per block
    pub call_name: String,
    /// Name of the reset function, empty if the box is stateless
    #[serde(default)]
    pub reset_name: String,
    /// Verbatim global declarations emitted once per partition file
    #[serde(default)]
    pub outer_decls: String,
    /// State variables owned by the box
    #[serde(default)]
    pub state_vars: Vec<Variable>,
}

/// Primitive operators lowered by the compute emitter
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operator {
    /// Per-input signs, e.g. `"+-"` for a subtractor
    Sum { signs: String },
    Gain { gain: NumericValue },
    Product,
}

/// The closed set of node kinds
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Primitive(Operator),
    Delay(DelayState),
    Subsystem,
    EnableOutput,
    MasterInput,
    MasterOutput,
    BlackBox(BlackBoxSpec),
    #[serde(skip)]
    Fifo(ThreadCrossingFifo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub partition: i32,
    /// Order within the partition schedule; nodes with a negative order are
    /// not emitted
    pub sched_order: i64,
    pub kind: NodeKind,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub external_includes: BTreeSet<String>,
}

impl Node {
    /// True for kinds which carry state between iterations
    pub fn has_state(&self) -> bool {
        match &self.kind {
            NodeKind::Delay(_) | NodeKind::Fifo(_) => true,
            NodeKind::BlackBox(bb) => !bb.state_vars.is_empty(),
            _ => false,
        }
    }

    /// True if an input change is observable at the output within the same
    /// iteration.  Delays lose their combinational path once their length
    /// meets the block size; FIFO outputs are published state.
    pub fn has_combinational_path(&self, block_size: usize) -> bool {
        match &self.kind {
            NodeKind::Delay(d) => d.delay_len < block_size,
            NodeKind::Fifo(_) => false,
            _ => true,
        }
    }

    /// State variables to be placed in the partition state struct
    pub fn state_vars(&self) -> Vec<Variable> {
        match &self.kind {
            NodeKind::Delay(d) => {
                let dtype = self.inputs[0].dtype.expand_for_block(d.delay_len.max(1));
                let mut var = Variable::new(format!("{}_state", sanitize(&self.name)), dtype);
                var.init = d.init.clone();
                vec![var]
            }
            NodeKind::BlackBox(bb) => bb.state_vars.clone(),
            _ => Vec::new(),
        }
    }

    pub fn as_fifo(&self) -> Option<&ThreadCrossingFifo> {
        match &self.kind {
            NodeKind::Fifo(fifo) => Some(fifo),
            _ => None,
        }
    }

    pub fn as_fifo_mut(&mut self) -> Option<&mut ThreadCrossingFifo> {
        match &mut self.kind {
            NodeKind::Fifo(fifo) => Some(fifo),
            _ => None,
        }
    }

    pub fn is_delay(&self) -> bool {
        matches!(self.kind, NodeKind::Delay(_))
    }
}

/// Replaces characters that cannot appear in a C identifier
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arc {
    pub id: ArcId,
    pub src: PortRef,
    pub dst: PortRef,
    pub dtype: DataType,
    pub sample_time: f64,
    /// Order-constraint arcs carry no data; they pin relative schedule order
    pub order_constraint: bool,
}

/// The design graph.  All stores are ordered maps so that every walk over
/// the graph is deterministic and emission is reproducible.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    arcs: BTreeMap<ArcId, Arc>,
    next_node: usize,
    next_arc: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        partition: i32,
        kind: NodeKind,
    ) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                name: name.into(),
                parent,
                partition,
                sched_order: -1,
                kind,
                inputs: Vec::new(),
                outputs: Vec::new(),
                external_includes: BTreeSet::new(),
            },
        );
        id
    }

    pub fn connect(
        &mut self,
        src: PortRef,
        dst: PortRef,
        dtype: DataType,
        sample_time: f64,
    ) -> ArcId {
        let id = ArcId(self.next_arc);
        self.next_arc += 1;
        self.arcs.insert(
            id,
            Arc {
                id,
                src,
                dst,
                dtype,
                sample_time,
                order_constraint: false,
            },
        );
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[&id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(&id).expect("node id to be live")
    }

    pub fn arc(&self, id: ArcId) -> &Arc {
        &self.arcs[&id]
    }

    pub fn arc_mut(&mut self, id: ArcId) -> &mut Arc {
        self.arcs.get_mut(&id).expect("arc id to be live")
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn arcs(&self) -> impl Iterator<Item = &Arc> {
        self.arcs.values()
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn remove_arc(&mut self, id: ArcId) -> Option<Arc> {
        self.arcs.remove(&id)
    }

    /// Moves the source end of `arc` to a new port
    pub fn rewire_src(&mut self, arc: ArcId, src: PortRef) {
        self.arc_mut(arc).src = src;
    }

    /// Moves the destination end of `arc` to a new port
    pub fn rewire_dst(&mut self, arc: ArcId, dst: PortRef) {
        self.arc_mut(arc).dst = dst;
    }

    /// Arcs whose destination is a port of `node`
    pub fn in_arcs(&self, node: NodeId) -> Vec<ArcId> {
        self.arcs
            .values()
            .filter(|a| a.dst.node == node)
            .map(|a| a.id)
            .collect()
    }

    /// Arcs whose source is a port of `node`
    pub fn out_arcs(&self, node: NodeId) -> Vec<ArcId> {
        self.arcs
            .values()
            .filter(|a| a.src.node == node)
            .map(|a| a.id)
            .collect()
    }

    pub fn out_arcs_of_port(&self, port: PortRef) -> Vec<ArcId> {
        self.arcs
            .values()
            .filter(|a| a.src == port)
            .map(|a| a.id)
            .collect()
    }

    /// The hierarchical name of a node, parents first
    pub fn fully_qualified_name(&self, id: NodeId) -> String {
        let mut path = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current);
            path.push(node.name.clone());
            cursor = node.parent;
        }
        path.reverse();
        path.join("/")
    }

    /// The set of partitions present in the graph, I/O partition included
    pub fn partitions(&self) -> BTreeSet<i32> {
        self.nodes.values().map(|n| n.partition).collect()
    }

    /// Groups the data arcs crossing partition boundaries.
    ///
    /// Keyed by `(src, dst)` partition pair; within a pair, arcs sharing a
    /// single source port form one group (fan-out from one port into a
    /// partition is served by one FIFO).
    pub fn crossing_arc_groups(&self) -> BTreeMap<(i32, i32), Vec<Vec<ArcId>>> {
        let mut groups: BTreeMap<(i32, i32), BTreeMap<PortRef, Vec<ArcId>>> = BTreeMap::new();

        for arc in self.arcs.values() {
            if arc.order_constraint {
                continue;
            }
            let src_part = self.node(arc.src.node).partition;
            let dst_part = self.node(arc.dst.node).partition;
            if src_part == dst_part {
                continue;
            }
            groups
                .entry((src_part, dst_part))
                .or_default()
                .entry(arc.src)
                .or_default()
                .push(arc.id);
        }

        groups
            .into_iter()
            .map(|(pair, by_port)| (pair, by_port.into_values().collect()))
            .collect()
    }

    /// Nodes of one partition in schedule order, unscheduled nodes excluded
    pub fn scheduled_nodes(&self, partition: i32) -> Vec<NodeId> {
        let mut nodes: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.partition == partition && n.sched_order >= 0)
            .collect();
        nodes.sort_by_key(|n| (n.sched_order, n.id));
        nodes.iter().map(|n| n.id).collect()
    }

    /// All FIFO nodes, in id order
    pub fn fifo_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.as_fifo().is_some())
            .map(|n| n.id)
            .collect()
    }
}

/// The on-disk YAML form of a design, converted into a [Graph]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DesignDescription {
    pub name: String,
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub arcs: Vec<ArcDescription>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeDescription {
    pub name: String,
    pub partition: i32,
    #[serde(default = "unscheduled")]
    pub sched_order: i64,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub external_includes: BTreeSet<String>,
}

fn unscheduled() -> i64 {
    -1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ArcDescription {
    /// `node:port`, e.g. `source:0`
    pub from: String,
    pub to: String,
    pub dtype: DataType,
    #[serde(default)]
    pub sample_time: f64,
    #[serde(default)]
    pub order_constraint: bool,
}

impl TryFrom<DesignDescription> for Graph {
    type Error = crate::error::TypedError;

    fn try_from(desc: DesignDescription) -> TypedResult<Graph> {
        let mut graph = Graph::new();
        let mut by_name: BTreeMap<String, NodeId> = BTreeMap::new();

        for node in &desc.nodes {
            if by_name.contains_key(&node.name) {
                return Err(anyhow!("duplicate node name: {}", node.name))
                    .typ(CompileError::Structural);
            }
            let id = graph.add_node(node.name.clone(), None, node.partition, node.kind.clone());
            {
                let n = graph.node_mut(id);
                n.sched_order = node.sched_order;
                n.inputs = node.inputs.clone();
                n.outputs = node.outputs.clone();
                n.external_includes = node.external_includes.clone();
            }
            by_name.insert(node.name.clone(), id);
        }

        // Resolve parent references in a second pass
        for node in &desc.nodes {
            if let Some(parent) = &node.parent {
                let parent_id = *by_name
                    .get(parent)
                    .ok_or_else(|| anyhow!("unknown parent node: {parent}"))
                    .typ(CompileError::Structural)?;
                graph.node_mut(by_name[&node.name]).parent = Some(parent_id);
            }
        }

        for arc in &desc.arcs {
            let src = parse_port_ref(&arc.from, &by_name).typ(CompileError::Structural)?;
            let dst = parse_port_ref(&arc.to, &by_name).typ(CompileError::Structural)?;
            let id = graph.connect(src, dst, arc.dtype.clone(), arc.sample_time);
            graph.arc_mut(id).order_constraint = arc.order_constraint;
        }

        Ok(graph)
    }
}

fn parse_port_ref(desc: &str, by_name: &BTreeMap<String, NodeId>) -> anyhow::Result<PortRef> {
    let (name, port) = desc
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("port reference must be `node:port`, got `{desc}`"))?;
    let node = *by_name
        .get(name)
        .ok_or_else(|| anyhow!("unknown node in port reference: {name}"))?;
    Ok(PortRef::new(node, port.parse()?))
}

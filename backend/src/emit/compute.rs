//! Emission of the per-partition compute and reset functions
//!
//! The compute function owns the inner schedule: it runs the partition's
//! operators in schedule order once per sample, wrapped in an outer block
//! loop when the base block size is larger than one. FIFO data arrives and
//! leaves through pointer arguments into buffer slots; the thread function
//! decides which slots those are.
use anyhow::anyhow;
use itertools::Itertools;
use laminar_core::clock::ClockDomain;
use laminar_core::error::{CompileError, ResultExt, TypedResult};
use laminar_core::graph::{sanitize, Node, NodeId, NodeKind, Operator, PortRef, Variable};

use crate::emit::cwriter::CWriter;
use crate::emit::{index, PartitionContext};

/// Name of the local holding one scheduled node's output component
fn out_var(node: &Node, imag: bool) -> String {
    format!(
        "{}_out{}",
        sanitize(&node.name),
        if imag { "_im" } else { "" }
    )
}

impl<'a> PartitionContext<'a> {
    /// Distinct clock rates used by the FIFOs of this partition
    pub fn rates(&self) -> std::collections::BTreeSet<ClockDomain> {
        self.input_fifos
            .iter()
            .chain(self.output_fifos.iter())
            .flat_map(|id| self.fifo(*id).ports.iter().map(|p| p.clock))
            .chain(std::iter::once(ClockDomain::BASE))
            .collect()
    }

    /// The compute argument name for a FIFO, before any double-buffer
    /// suffixing
    fn fifo_arg(&self, fifo_id: NodeId) -> String {
        self.fifo(fifo_id).name.clone()
    }
}

/// The typedef of the partition state struct
pub fn state_struct_typedef(ctx: &PartitionContext) -> String {
    let mut w = CWriter::new();
    let vars = ctx.state_vars();
    w.open("typedef struct");
    if vars.is_empty() {
        // An empty struct is not valid C
        w.line("char _unused;");
    }
    for var in &vars {
        emit_state_member(&mut w, var);
    }
    w.close_with(format!("}} {};", ctx.state_type_name()));
    w.finish()
}

fn emit_state_member(w: &mut CWriter, var: &Variable) {
    let base = var.dtype.c_type();
    let dims = var.dtype.c_dims();
    w.line(format!("{base} {}{dims};", var.c_name(false)));
    if var.dtype.complex {
        w.line(format!("{base} {}{dims};", var.c_name(true)));
    }
}

/// The compute function prototype.
///
/// Input FIFO slots are const; with double buffering the `next` input slot
/// and the `current`/`shared` output slots stay writable while `prev`
/// output is const.
pub fn compute_prototype(ctx: &PartitionContext) -> String {
    let mut args = vec![format!("{}* state", ctx.state_type_name())];

    for fifo_id in &ctx.input_fifos {
        let fifo = ctx.fifo(*fifo_id);
        let ty = fifo.struct_type_name();
        let arg = ctx.fifo_arg(*fifo_id);
        if ctx.config.double_buffer.inputs() {
            args.push(format!("const {ty}* {arg}_current"));
            args.push(format!("{ty}* {arg}_next"));
        } else {
            args.push(format!("const {ty}* {arg}"));
        }
    }

    for fifo_id in &ctx.output_fifos {
        let fifo = ctx.fifo(*fifo_id);
        let ty = fifo.struct_type_name();
        let arg = ctx.fifo_arg(*fifo_id);
        if ctx.config.double_buffer.outputs() {
            args.push(format!("{ty}* {arg}_current"));
            args.push(format!("const {ty}* {arg}_prev"));
        } else {
            args.push(format!("{ty}* {arg}"));
        }
    }

    format!(
        "void {}({})",
        ctx.compute_fn_name(),
        args.iter().join(", ")
    )
}

/// The call matching [compute_prototype], as placed in the thread loop
pub fn compute_call(ctx: &PartitionContext) -> String {
    let mut args = vec!["&state".to_string()];

    for fifo_id in &ctx.input_fifos {
        let fifo = ctx.fifo(*fifo_id);
        if ctx.config.double_buffer.inputs() {
            args.push(format!("{}_current", fifo.name));
            args.push(format!("{}_next", fifo.name));
        } else if fifo.in_place {
            args.push(format!("{}_readPtr", fifo.name));
        } else {
            args.push(format!("&{}", fifo.read_temp_var()));
        }
    }

    for fifo_id in &ctx.output_fifos {
        let fifo = ctx.fifo(*fifo_id);
        if ctx.config.double_buffer.outputs() {
            args.push(format!("{}_current", fifo.name));
            args.push(format!("{}_prev", fifo.name));
        } else if fifo.in_place {
            args.push(format!("{}_writePtr", fifo.name));
        } else {
            args.push(format!("&{}", fifo.write_temp_var()));
        }
    }

    format!("{}({});", ctx.compute_fn_name(), args.iter().join(", "))
}

/// Emits the full compute function definition
pub fn compute_function(ctx: &PartitionContext) -> TypedResult<String> {
    let mut w = CWriter::new();
    let block_size = ctx.config.block_size;
    let plans = index::plan_rates(&ctx.rates(), block_size);

    w.open(compute_prototype(ctx));

    index::emit_declarations(&mut w, &plans);

    if block_size > 1 {
        w.open(format!(
            "for (int32_t blkInd = 0; blkInd < {block_size}; blkInd++)"
        ));
    }

    for node_id in ctx.graph.scheduled_nodes(ctx.partition) {
        emit_node(ctx, &mut w, node_id)?;
    }

    emit_output_fifo_assignments(ctx, &mut w)?;

    index::emit_advancement(&mut w, &plans);
    emit_double_buffer_boundary_copies(ctx, &mut w, &plans);

    if block_size > 1 {
        w.close();
    }

    w.close();
    Ok(w.finish())
}

/// Emits the reset function: state variables return to their declared
/// initial values and black boxes get their reset call
pub fn reset_function(ctx: &PartitionContext) -> String {
    let mut w = CWriter::new();
    w.open(format!(
        "void {}({}* state)",
        ctx.reset_fn_name(),
        ctx.state_type_name()
    ));

    for node_id in ctx.graph.scheduled_nodes(ctx.partition) {
        let node = ctx.graph.node(node_id);
        for var in node.state_vars() {
            emit_state_reset(&mut w, &var);
        }
        if let NodeKind::BlackBox(bb) = &node.kind {
            if !bb.reset_name.is_empty() {
                w.line(format!("{}(state);", bb.reset_name));
            }
        }
    }

    w.close();
    w.finish()
}

fn emit_state_reset(w: &mut CWriter, var: &Variable) {
    let elements = var.dtype.elements();
    let floating = var.dtype.floating;

    for element in 0..elements {
        let value = var.init.get(element);
        let re = value.map_or_else(|| zero_literal(floating), |v| v.c_literal_re(floating));
        w.line(format!(
            "state->{}{} = {re};",
            var.c_name(false),
            element_suffix(&var.dtype.shape, element)
        ));
        if var.dtype.complex {
            let im = value.map_or_else(|| zero_literal(floating), |v| v.c_literal_im(floating));
            w.line(format!(
                "state->{}{} = {im};",
                var.c_name(true),
                element_suffix(&var.dtype.shape, element)
            ));
        }
    }
}

fn zero_literal(floating: bool) -> String {
    if floating {
        "0.0".to_string()
    } else {
        "0".to_string()
    }
}

/// Renders `[i][j]` for the flat element index within `shape`
fn element_suffix(shape: &[usize], flat: usize) -> String {
    if shape.iter().all(|d| *d == 1) {
        return String::new();
    }
    let mut remaining = flat;
    let mut indices = Vec::new();
    for dim in shape.iter().rev() {
        indices.push(remaining % dim);
        remaining /= dim;
    }
    indices.reverse();
    indices.iter().map(|i| format!("[{i}]")).collect()
}

/// Resolves the C expression feeding `port` of `node`
fn input_expr(
    ctx: &PartitionContext,
    node_id: NodeId,
    port: usize,
    imag: bool,
) -> TypedResult<String> {
    let arc_id = ctx
        .graph
        .in_arcs(node_id)
        .into_iter()
        .find(|a| {
            let arc = ctx.graph.arc(*a);
            !arc.order_constraint && arc.dst.port == port
        })
        .ok_or_else(|| {
            anyhow!(
                "{} input {port} is unconnected",
                ctx.graph.fully_qualified_name(node_id)
            )
        })
        .typ(CompileError::Structural)?;

    port_value_expr(ctx, ctx.graph.arc(arc_id).src, imag)
}

/// The C expression reading the value currently on a source port
fn port_value_expr(ctx: &PartitionContext, src: PortRef, imag: bool) -> TypedResult<String> {
    let node = ctx.graph.node(src.node);

    if let Some(fifo) = node.as_fifo() {
        let arg = if ctx.config.double_buffer.inputs() {
            format!("{}_current", fifo.name)
        } else {
            fifo.name.clone()
        };
        let port = &fifo.ports[src.port];
        let field = fifo.port_field(src.port, imag);
        let index = if port.block_size > 1 {
            format!("[{}]", port.clock.index_var_name())
        } else {
            String::new()
        };
        return Ok(format!("{arg}->{field}{index}"));
    }

    match &node.kind {
        NodeKind::MasterInput => Err(anyhow!(
            "master input {} feeds partition {} directly; I/O must cross through a FIFO",
            ctx.graph.fully_qualified_name(src.node),
            ctx.partition
        ))
        .typ(CompileError::Structural),
        _ => Ok(out_var(node, imag)),
    }
}

/// Emits one scheduled node.  Complex data is carried componentwise; the
/// imaginary component mirrors the real one.
fn emit_node(ctx: &PartitionContext, w: &mut CWriter, node_id: NodeId) -> TypedResult<()> {
    let node = ctx.graph.node(node_id);

    match &node.kind {
        NodeKind::Primitive(op) => emit_primitive(ctx, w, node, op),
        NodeKind::Delay(_) => emit_delay(ctx, w, node),
        NodeKind::BlackBox(bb) => {
            let inputs: Vec<String> = (0..node.inputs.len())
                .map(|p| input_expr(ctx, node_id, p, false))
                .collect::<TypedResult<_>>()?;
            let ctype = node.outputs[0].dtype.c_type();
            w.line(format!(
                "{ctype} {} = {}({});",
                out_var(node, false),
                bb.call_name,
                inputs.iter().join(", ")
            ));
            Ok(())
        }
        // Hierarchy and I/O markers produce no compute statements
        NodeKind::Subsystem
        | NodeKind::EnableOutput
        | NodeKind::MasterInput
        | NodeKind::MasterOutput
        | NodeKind::Fifo(_) => Ok(()),
    }
}

fn scalar_guard(ctx: &PartitionContext, node: &Node) -> TypedResult<()> {
    let vector = node
        .inputs
        .iter()
        .chain(node.outputs.iter())
        .any(|p| !p.dtype.is_scalar());
    if vector {
        return Err(anyhow!(
            "operator {} has vector-shaped ports; only scalar operands are lowered",
            ctx.graph.fully_qualified_name(node.id)
        ))
        .typ(CompileError::UnsupportedConfig);
    }
    Ok(())
}

fn emit_primitive(
    ctx: &PartitionContext,
    w: &mut CWriter,
    node: &Node,
    op: &Operator,
) -> TypedResult<()> {
    scalar_guard(ctx, node)?;

    let out_type = &node.outputs[0].dtype;
    let complex = out_type.complex;
    let ctype = out_type.c_type();

    let components: &[bool] = if complex { &[false, true] } else { &[false] };
    for &imag in components {
        let expr = match op {
            Operator::Sum { signs } => {
                if signs.len() != node.inputs.len() {
                    return Err(anyhow!(
                        "sum {} has {} inputs but {} signs",
                        ctx.graph.fully_qualified_name(node.id),
                        node.inputs.len(),
                        signs.len()
                    ))
                    .typ(CompileError::Structural);
                }
                let mut expr = String::new();
                for (port, sign) in signs.chars().enumerate() {
                    let term = input_expr(ctx, node.id, port, imag)?;
                    if expr.is_empty() {
                        if sign == '+' {
                            expr = term;
                        } else {
                            expr = format!("{sign}{term}");
                        }
                    } else {
                        expr = format!("{expr} {sign} {term}");
                    }
                }
                format!("({expr})")
            }
            Operator::Gain { gain } => {
                let term = input_expr(ctx, node.id, 0, imag)?;
                let literal = gain.c_literal_re(out_type.floating);
                format!("({term} * {literal})")
            }
            Operator::Product => {
                if complex {
                    return Err(anyhow!(
                        "product {} on complex operands is not lowered",
                        ctx.graph.fully_qualified_name(node.id)
                    ))
                    .typ(CompileError::Type);
                }
                let terms: Vec<String> = (0..node.inputs.len())
                    .map(|p| input_expr(ctx, node.id, p, false))
                    .collect::<TypedResult<_>>()?;
                format!("({})", terms.join(" * "))
            }
        };
        w.line(format!("{ctype} {} = {expr};", out_var(node, imag)));
    }

    Ok(())
}

/// A delay publishes its oldest stored sample, then shifts its state and
/// stores the incoming sample
fn emit_delay(ctx: &PartitionContext, w: &mut CWriter, node: &Node) -> TypedResult<()> {
    scalar_guard(ctx, node)?;

    let in_type = &node.inputs[0].dtype;
    let out_type = &node.outputs[0].dtype;
    if in_type != out_type {
        return Err(anyhow!(
            "delay {} input type {} disagrees with its output type {}",
            ctx.graph.fully_qualified_name(node.id),
            in_type,
            out_type
        ))
        .typ(CompileError::Type);
    }

    let state_var = &node.state_vars()[0];
    let delay_len = match &node.kind {
        NodeKind::Delay(d) => d.delay_len,
        _ => unreachable!("emit_delay called on a non-delay node"),
    };
    let ctype = out_type.c_type();

    let components: &[bool] = if out_type.complex {
        &[false, true]
    } else {
        &[false]
    };
    for &imag in components {
        let sv = state_var.c_name(imag);
        let input = input_expr(ctx, node.id, 0, imag)?;

        if delay_len <= 1 {
            w.line(format!("{ctype} {} = state->{sv};", out_var(node, imag)));
            w.line(format!("state->{sv} = {input};"));
        } else {
            w.line(format!(
                "{ctype} {} = state->{sv}[0];",
                out_var(node, imag)
            ));
            w.open(format!(
                "for (int32_t dlyIdx = 0; dlyIdx < {}; dlyIdx++)",
                delay_len - 1
            ));
            w.line(format!("state->{sv}[dlyIdx] = state->{sv}[dlyIdx + 1];"));
            w.close();
            w.line(format!("state->{sv}[{}] = {input};", delay_len - 1));
        }
    }

    Ok(())
}

/// Stores the values feeding each output FIFO port into the FIFO slot
/// argument at the block position of the port's clock domain
fn emit_output_fifo_assignments(ctx: &PartitionContext, w: &mut CWriter) -> TypedResult<()> {
    for fifo_id in &ctx.output_fifos {
        let fifo = ctx.fifo(*fifo_id);
        let arg = if ctx.config.double_buffer.outputs() {
            format!("{}_current", fifo.name)
        } else {
            fifo.name.clone()
        };

        for (port_index, port) in fifo.ports.iter().enumerate() {
            if !port.dtype.is_scalar() {
                return Err(anyhow!(
                    "FIFO {} port {port_index} carries vector samples; only scalar samples \
                     are lowered into the compute body",
                    fifo.name
                ))
                .typ(CompileError::UnsupportedConfig);
            }
            let arc_id = ctx
                .graph
                .in_arcs(*fifo_id)
                .into_iter()
                .find(|a| {
                    let arc = ctx.graph.arc(*a);
                    !arc.order_constraint && arc.dst.port == port_index
                })
                .ok_or_else(|| {
                    anyhow!("FIFO {} port {port_index} has no producer", fifo.name)
                })
                .typ(CompileError::Structural)?;
            let src = ctx.graph.arc(arc_id).src;

            let index = if port.block_size > 1 {
                format!("[{}]", port.clock.index_var_name())
            } else {
                String::new()
            };

            let components: &[bool] = if port.dtype.complex {
                &[false, true]
            } else {
                &[false]
            };
            for &imag in components {
                let value = port_value_expr(ctx, src, imag)?;
                let field = fifo.port_field(port_index, imag);
                w.line(format!("{arg}->{field}{index} = {value};"));
            }
        }
    }

    Ok(())
}

/// After a rate's period boundary the freshly advanced block positions are
/// mirrored between the double buffers so the next swap starts consistent
fn emit_double_buffer_boundary_copies(
    ctx: &PartitionContext,
    w: &mut CWriter,
    plans: &[index::RatePlan],
) {
    if !ctx.config.double_buffer.enabled() {
        return;
    }

    for plan in plans {
        let Some(counter) = &plan.counter_var else {
            continue;
        };

        let copies = double_buffer_copies_for_rate(ctx, plan.rate);
        if copies.is_empty() {
            continue;
        }

        w.open(format!("if ({counter} == 0)"));
        for copy in copies {
            w.line(copy);
        }
        w.close();
    }
}

fn double_buffer_copies_for_rate(ctx: &PartitionContext, rate: ClockDomain) -> Vec<String> {
    let mut copies = Vec::new();

    if ctx.config.double_buffer.inputs() {
        for fifo_id in &ctx.input_fifos {
            let fifo = ctx.fifo(*fifo_id);
            for (port_index, port) in fifo.ports.iter().enumerate() {
                if port.clock != rate || port.block_size <= 1 {
                    continue;
                }
                let field = fifo.port_field(port_index, false);
                let idx = rate.index_var_name();
                copies.push(format!(
                    "{name}_next->{field}[{idx}] = {name}_current->{field}[{idx}];",
                    name = fifo.name
                ));
                if port.dtype.complex {
                    let field = fifo.port_field(port_index, true);
                    copies.push(format!(
                        "{name}_next->{field}[{idx}] = {name}_current->{field}[{idx}];",
                        name = fifo.name
                    ));
                }
            }
        }
    }

    if ctx.config.double_buffer.outputs() {
        for fifo_id in &ctx.output_fifos {
            let fifo = ctx.fifo(*fifo_id);
            for (port_index, port) in fifo.ports.iter().enumerate() {
                if port.clock != rate || port.block_size <= 1 {
                    continue;
                }
                let field = fifo.port_field(port_index, false);
                let idx = rate.index_var_name();
                copies.push(format!(
                    "{name}_current->{field}[{idx}] = {name}_prev->{field}[{idx}];",
                    name = fifo.name
                ));
                if port.dtype.complex {
                    let field = fifo.port_field(port_index, true);
                    copies.push(format!(
                        "{name}_current->{field}[{idx}] = {name}_prev->{field}[{idx}];",
                        name = fifo.name
                    ));
                }
            }
        }
    }

    copies
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminar_core::config::EmitConfig;
    use laminar_core::datatype::DataType;
    use laminar_core::graph::{DelayState, Graph, Port};
    use laminar_core::numeric::NumericValue;

    use crate::passes::insertion::insert_partition_crossing_fifos;

    fn int32() -> DataType {
        DataType::new(false, true, false, 32)
    }

    fn config(extra: &str) -> EmitConfig {
        serde_yaml::from_str(&format!(
            "design_name: toy\nfile_name_prefix: toy\n{extra}"
        ))
        .unwrap()
    }

    /// in FIFO -> gain(3) -> delay(z^-1, init 7) -> out FIFO in partition 1
    fn build(extra_config: &str) -> (Graph, EmitConfig) {
        let mut g = Graph::new();
        let src = g.add_node("src", None, 0, NodeKind::MasterInput);
        g.node_mut(src).outputs = vec![Port::new(int32())];
        g.node_mut(src).sched_order = 0;

        let gain = g.add_node(
            "scale",
            None,
            1,
            NodeKind::Primitive(Operator::Gain {
                gain: NumericValue::Int(3),
            }),
        );
        g.node_mut(gain).inputs = vec![Port::new(int32())];
        g.node_mut(gain).outputs = vec![Port::new(int32())];
        g.node_mut(gain).sched_order = 0;

        let delay = g.add_node(
            "hold",
            None,
            1,
            NodeKind::Delay(DelayState {
                delay_len: 1,
                init: vec![NumericValue::Int(7)],
                earliest_first: false,
            }),
        );
        g.node_mut(delay).inputs = vec![Port::new(int32())];
        g.node_mut(delay).outputs = vec![Port::new(int32())];
        g.node_mut(delay).sched_order = 1;

        let sink = g.add_node("sink", None, 2, NodeKind::MasterOutput);
        g.node_mut(sink).inputs = vec![Port::new(int32())];
        g.node_mut(sink).sched_order = 0;

        g.connect(PortRef::new(src, 0), PortRef::new(gain, 0), int32(), 0.0);
        g.connect(PortRef::new(gain, 0), PortRef::new(delay, 0), int32(), 0.0);
        g.connect(PortRef::new(delay, 0), PortRef::new(sink, 0), int32(), 0.0);

        let config = config(extra_config);
        insert_partition_crossing_fifos(&mut g, &config).unwrap();
        (g, config)
    }

    #[test]
    fn prototype_constness() {
        let (g, cfg) = build("");
        let ctx = PartitionContext::new(&g, &cfg, 1);
        let proto = compute_prototype(&ctx);
        assert!(proto.starts_with("void toy_partition1_compute(toy_partition1_state_t* state"));
        assert!(proto.contains("const PartitionCrossingFIFO_N2_TO_1_0_t* PartitionCrossingFIFO_N2_TO_1_0"));
        assert!(proto.contains("PartitionCrossingFIFO_1_TO_2_0_t* PartitionCrossingFIFO_1_TO_2_0"));
    }

    #[test]
    fn double_buffer_prototype_roles() {
        let (g, cfg) = build("double_buffer: input_and_output\n");
        let ctx = PartitionContext::new(&g, &cfg, 1);
        let proto = compute_prototype(&ctx);
        assert!(proto.contains("const PartitionCrossingFIFO_N2_TO_1_0_t* PartitionCrossingFIFO_N2_TO_1_0_current"));
        assert!(proto.contains("PartitionCrossingFIFO_N2_TO_1_0_t* PartitionCrossingFIFO_N2_TO_1_0_next"));
        assert!(proto.contains("PartitionCrossingFIFO_1_TO_2_0_t* PartitionCrossingFIFO_1_TO_2_0_current"));
        assert!(proto.contains("const PartitionCrossingFIFO_1_TO_2_0_t* PartitionCrossingFIFO_1_TO_2_0_prev"));
    }

    #[test]
    fn body_schedules_and_feeds_output() {
        let (g, cfg) = build("");
        let ctx = PartitionContext::new(&g, &cfg, 1);
        let body = compute_function(&ctx).unwrap();

        // Gain then delay, in schedule order
        let gain_pos = body.find("scale_out = (PartitionCrossingFIFO_N2_TO_1_0->port0 * 3)").unwrap();
        let delay_pos = body.find("hold_out = state->hold_state;").unwrap();
        assert!(gain_pos < delay_pos);
        assert!(body.contains("state->hold_state = scale_out;"));
        assert!(body.contains("PartitionCrossingFIFO_1_TO_2_0->port0 = hold_out;"));
        // Block size 1: no outer loop
        assert!(!body.contains("for (int32_t blkInd"));
    }

    #[test]
    fn block_loop_and_indexing() {
        let (g, cfg) = build("block_size: 4\n");
        let ctx = PartitionContext::new(&g, &cfg, 1);
        let body = compute_function(&ctx).unwrap();
        assert!(body.contains("for (int32_t blkInd = 0; blkInd < 4; blkInd++)"));
        assert!(body.contains("PartitionCrossingFIFO_N2_TO_1_0->port0[blkInd]"));
        assert!(body.contains("PartitionCrossingFIFO_1_TO_2_0->port0[blkInd] = hold_out;"));
    }

    #[test]
    fn downsample_domain_indexing_and_mirror_copies() {
        // A (1,2) domain inside a base block of 4: the domain index drives
        // the FIFO access and the double-buffer mirror copy runs once per
        // period boundary
        let mut g = Graph::new();
        let t = int32();
        let src = g.add_node("src", None, 0, NodeKind::MasterInput);
        g.node_mut(src).outputs = vec![Port::new(t.clone())];
        g.node_mut(src).outputs[0].clock = ClockDomain::new(1, 2);
        let gain = g.add_node(
            "scale",
            None,
            1,
            NodeKind::Primitive(Operator::Gain {
                gain: NumericValue::Int(2),
            }),
        );
        g.node_mut(gain).inputs = vec![Port::new(t.clone())];
        g.node_mut(gain).outputs = vec![Port::new(t.clone())];
        g.node_mut(gain).sched_order = 0;
        g.connect(PortRef::new(src, 0), PortRef::new(gain, 0), t, 0.0);

        let cfg = config("block_size: 4\ndouble_buffer: input\n");
        insert_partition_crossing_fifos(&mut g, &cfg).unwrap();

        let ctx = PartitionContext::new(&g, &cfg, 1);
        let body = compute_function(&ctx).unwrap();

        assert!(body.contains("blkInd_N1_D2 = 0;"));
        assert!(body.contains("blkInd_N1_D2_C = 0;"));
        assert!(body.contains("PartitionCrossingFIFO_0_TO_1_0_current->port0[blkInd_N1_D2]"));
        // Rate advancement with the phase counter at the loop foot
        assert!(body.contains("if (blkInd_N1_D2_C < 1)"));
        // Mirror copy guarded by the period boundary
        assert!(body.contains("if (blkInd_N1_D2_C == 0)"));
        assert!(body.contains(
            "PartitionCrossingFIFO_0_TO_1_0_next->port0[blkInd_N1_D2] = \
             PartitionCrossingFIFO_0_TO_1_0_current->port0[blkInd_N1_D2];"
        ));
    }

    #[test]
    fn reset_restores_initial_values() {
        let (g, cfg) = build("");
        let ctx = PartitionContext::new(&g, &cfg, 1);
        let reset = reset_function(&ctx);
        assert!(reset.contains("void toy_partition1_reset(toy_partition1_state_t* state)"));
        assert!(reset.contains("state->hold_state = 7;"));
    }

    #[test]
    fn state_struct_contains_delay() {
        let (g, cfg) = build("");
        let ctx = PartitionContext::new(&g, &cfg, 1);
        let typedef = state_struct_typedef(&ctx);
        assert!(typedef.contains("int32_t hold_state;"));
        assert!(typedef.contains("} toy_partition1_state_t;"));
    }
}

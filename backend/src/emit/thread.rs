//! Emission of the per-partition thread entry and the partition files
//!
//! The thread function is the worker's whole life: recover the FIFO
//! handles, reset the state, set up telemetry, prime the double buffers
//! and loop forever. It never returns; the coordinator cancels it after
//! the I/O thread finishes, and the only cancellation points sit inside
//! the FIFO readiness polls.
use itertools::Itertools;
use laminar_core::error::TypedResult;
use laminar_core::fifo::CopyMode;

use crate::emit::compute;
use crate::emit::cwriter::{header_guard, CWriter, GeneratedFile};
use crate::emit::fifo_gen::{emit_fifo_checks, role_for, FifoGen};
use crate::emit::PartitionContext;

/// Telemetry CSV columns in their fixed order for a given configuration
pub fn telemetry_columns(ctx: &PartitionContext) -> Vec<&'static str> {
    let telem = &ctx.config.telemetry;
    let mut cols = vec!["TimeStamp_s", "TimeStamp_ns", "Rate_msps"];
    if telem.level.breakdown() {
        cols.extend([
            "WaitingForInputFIFOs_s",
            "ReadingInputFIFOs_s",
            "WaitingForComputeToFinish_s",
            "WaitingForOutputFIFOs_s",
            "WritingOutputFIFOs_s",
            "Telemetry_Misc_s",
            "TotalTime_s",
        ]);
    }
    if telem.level.uses_papi() {
        cols.extend([
            "clock_cycles",
            "instructions_retired",
            "floating_point_operations_retired",
            "l1_data_cache_accesses",
        ]);
        if telem.level == laminar_core::config::TelemetryLevel::PapiComputeOnly {
            cols.push("timeWaitingForComputeToFinishPlusPAPI");
        }
    }
    cols
}

/// The thread argument struct: one pointer field per FIFO shared variable
pub fn thread_args_typedef(ctx: &PartitionContext) -> String {
    let mut w = CWriter::new();
    w.open("typedef struct");
    for fifo_id in ctx.input_fifos.iter().chain(ctx.output_fifos.iter()) {
        for (decl, _) in FifoGen::new(ctx.fifo(*fifo_id)).shared_var_decls() {
            w.line(format!("{decl};"));
        }
    }
    w.close_with(format!("}} {};", ctx.thread_args_type_name()));
    w.finish()
}

/// The partition header: state type, argument struct and the three entry
/// points
pub fn emit_partition_header(ctx: &PartitionContext) -> GeneratedFile {
    let file_name = ctx.file_name();
    let guard = header_guard(&file_name);
    let mut w = CWriter::new();

    w.line(format!("#ifndef {guard}"));
    w.line(format!("#define {guard}"));
    w.line("#include <stdint.h>");
    w.line("#include <stdbool.h>");
    w.line("#include <stdatomic.h>");
    w.line(format!("#include \"{}_fifoTypes.h\"", ctx.config.file_name_prefix));
    w.blank();
    w.raw(compute::state_struct_typedef(ctx));
    w.blank();
    w.raw(thread_args_typedef(ctx));
    w.blank();
    w.line(format!("{};", compute::compute_prototype(ctx)));
    w.line(format!(
        "void {}({}* state);",
        ctx.reset_fn_name(),
        ctx.state_type_name()
    ));
    w.line(format!("void* {}(void* args);", ctx.thread_fn_name()));
    w.line("#endif");

    GeneratedFile::new(format!("{file_name}.h"), w.finish())
}

/// The partition source: includes, global declarations, compute, reset and
/// the thread function
pub fn emit_partition_source(ctx: &PartitionContext) -> TypedResult<GeneratedFile> {
    let file_name = ctx.file_name();
    let mut w = CWriter::new();

    w.line("#ifndef _GNU_SOURCE");
    w.line("#define _GNU_SOURCE");
    w.line("#endif");
    w.line(format!("#include \"{file_name}.h\""));
    w.line("#include <pthread.h>");
    w.line("#include <stdio.h>");
    w.line("#include <string.h>");
    w.line("#include <time.h>");
    w.line(format!(
        "#include \"{}.h\"",
        crate::emit::support::PLATFORM_PARAMS_NAME
    ));
    if uses_simd_copy(ctx) {
        w.line(format!(
            "#include \"{}_fifoSupport.h\"",
            ctx.config.file_name_prefix
        ));
    }
    if ctx.config.telemetry.level.uses_papi() {
        w.line(format!(
            "#include \"{}\"",
            ctx.config.telemetry.papi_helper_header
        ));
    }
    for include in ctx
        .graph
        .scheduled_nodes(ctx.partition)
        .iter()
        .flat_map(|id| ctx.graph.node(*id).external_includes.iter())
        .unique()
    {
        w.line(format!("#include {include}"));
    }
    w.blank();

    // Global declarations contributed by black boxes
    for node_id in ctx.graph.scheduled_nodes(ctx.partition) {
        if let laminar_core::graph::NodeKind::BlackBox(bb) = &ctx.graph.node(node_id).kind {
            if !bb.outer_decls.is_empty() {
                w.raw(&bb.outer_decls);
                w.blank();
            }
        }
    }

    if ctx.config.telemetry.level.enabled() {
        w.raw(timespec_helper());
        w.blank();
    }

    w.raw(compute::compute_function(ctx)?);
    w.blank();
    w.raw(compute::reset_function(ctx));
    w.blank();
    w.raw(thread_function(ctx)?);

    Ok(GeneratedFile::new(format!("{file_name}.c"), w.finish()))
}

fn uses_simd_copy(ctx: &PartitionContext) -> bool {
    ctx.input_fifos
        .iter()
        .chain(ctx.output_fifos.iter())
        .any(|id| ctx.fifo(*id).copy_mode == CopyMode::SimdFastCopy)
}

fn timespec_helper() -> String {
    "static inline double difftimespec(const struct timespec* a, const struct timespec* b) {\n\
    \x20   return (a->tv_sec - b->tv_sec) + (a->tv_nsec - b->tv_nsec) * 1.0e-9;\n\
     }\n"
        .to_string()
}

/// Emits the whole thread function
pub fn thread_function(ctx: &PartitionContext) -> TypedResult<String> {
    let mut w = CWriter::new();
    let telem = &ctx.config.telemetry;
    let in_place = ctx
        .input_fifos
        .iter()
        .chain(ctx.output_fifos.iter())
        .next()
        .map(|id| ctx.fifo(*id).in_place)
        .unwrap_or(true);
    let db = ctx.config.double_buffer;

    w.open(format!("void* {}(void* args)", ctx.thread_fn_name()));

    // 1. Recover the argument struct and copy the FIFO handles to locals
    w.line(format!(
        "const {ty}* threadArgs = (const {ty}*) args;",
        ty = ctx.thread_args_type_name()
    ));
    for fifo_id in ctx.input_fifos.iter().chain(ctx.output_fifos.iter()) {
        for (decl, name) in FifoGen::new(ctx.fifo(*fifo_id)).shared_var_decls() {
            w.line(format!("{decl} = threadArgs->{name};"));
        }
    }
    if ctx.config.thread_debug_print {
        w.line(format!(
            "printf(\"Partition {} thread started\\n\");",
            ctx.suffix()
        ));
    }
    w.blank();

    // 2. Per-thread state lives on this thread's stack
    w.line(format!("{} state;", ctx.state_type_name()));
    w.line(format!("{}(&state);", ctx.reset_fn_name()));
    w.blank();

    // 3. Telemetry setup
    if telem.level.enabled() {
        emit_telemetry_setup(ctx, &mut w);
    }

    // 4. Cached cursor locals per FIFO role
    let consumer_role = role_for(false, ctx.config.fifo_index_caching);
    let producer_role = role_for(true, ctx.config.fifo_index_caching);
    for fifo_id in &ctx.input_fifos {
        let gen = FifoGen::new(ctx.fifo(*fifo_id));
        gen.emit_local_var_decls(&mut w, consumer_role);
        gen.emit_init_local_vars(&mut w, consumer_role);
    }
    for fifo_id in &ctx.output_fifos {
        let gen = FifoGen::new(ctx.fifo(*fifo_id));
        gen.emit_local_var_decls(&mut w, producer_role);
        gen.emit_init_local_vars(&mut w, producer_role);
    }
    w.blank();

    // 5. Copy scratch for non-in-place FIFOs
    if !in_place {
        for fifo_id in &ctx.input_fifos {
            FifoGen::new(ctx.fifo(*fifo_id)).emit_scratch_decls(&mut w, false);
        }
        for fifo_id in &ctx.output_fifos {
            FifoGen::new(ctx.fifo(*fifo_id)).emit_scratch_decls(&mut w, true);
        }
        w.blank();
    }

    // 6. Double-buffer working blocks
    if db.inputs() {
        for fifo_id in &ctx.input_fifos {
            let fifo = ctx.fifo(*fifo_id);
            let ty = fifo.struct_type_name();
            w.line(format!("{ty} {}_dbBufA;", fifo.name));
            w.line(format!("{ty} {}_dbBufB;", fifo.name));
            w.line(format!("{ty}* {name}_current = &{name}_dbBufA;", name = fifo.name));
            w.line(format!("{ty}* {name}_next = &{name}_dbBufB;", name = fifo.name));
        }
    }
    if db.outputs() {
        for fifo_id in &ctx.output_fifos {
            let fifo = ctx.fifo(*fifo_id);
            let ty = fifo.struct_type_name();
            w.line(format!("{ty} {}_dbBufA;", fifo.name));
            w.line(format!("{ty} {}_dbBufB;", fifo.name));
            w.line(format!("{ty}* {name}_current = &{name}_dbBufA;", name = fifo.name));
            w.line(format!("{ty}* {name}_prev = &{name}_dbBufB;", name = fifo.name));
        }
    }

    // 7. Prime the double buffers
    if db.inputs() && !ctx.input_fifos.is_empty() {
        w.comment(" Prime input double buffers");
        let fifos: Vec<_> = ctx.input_fifos.iter().map(|id| ctx.fifo(*id)).collect();
        emit_fifo_checks(
            &mut w,
            &fifos,
            false,
            "primeInputsReady",
            true,
            true,
            true,
            ctx.config.fifo_index_caching,
        );
        for fifo_id in &ctx.input_fifos {
            let fifo = ctx.fifo(*fifo_id);
            let gen = FifoGen::new(fifo);
            gen.emit_read(&mut w, consumer_role, false);
            w.line(format!(
                "memcpy({name}_current, {name}_readPtr, sizeof({ty}));",
                name = fifo.name,
                ty = fifo.struct_type_name()
            ));
            gen.emit_push_read(&mut w);
        }
        w.blank();
    }
    if db.outputs() && !ctx.output_fifos.is_empty() {
        w.comment(" Prime output double buffers: one discarded compute into prev");
        w.line(priming_compute_call(ctx));
        w.blank();
    }

    // 8. The main loop
    w.open("while (true)");

    if telem.level.enabled() {
        emit_telemetry_interval(ctx, &mut w);
    }

    // 8b. Block until every input FIFO holds a block
    let input_fifos: Vec<_> = ctx.input_fifos.iter().map(|id| ctx.fifo(*id)).collect();
    let output_fifos: Vec<_> = ctx.output_fifos.iter().map(|id| ctx.fifo(*id)).collect();

    emit_phase_timer_start(ctx, &mut w, "phaseStart");
    if !input_fifos.is_empty() {
        emit_fifo_checks(
            &mut w,
            &input_fifos,
            false,
            "inputFIFOsReady",
            true,
            true,
            true,
            ctx.config.fifo_index_caching,
        );
    }
    emit_phase_timer_stop(ctx, &mut w, "timeWaitingForInputFIFOs");

    // 8c. In-place FIFOs also need room on the output side before compute.
    // With output double buffering the check moves behind the compute call,
    // where the previous iteration's block is drained.
    if in_place && !db.outputs() && !output_fifos.is_empty() {
        emit_phase_timer_start(ctx, &mut w, "phaseStart");
        emit_fifo_checks(
            &mut w,
            &output_fifos,
            true,
            "outputFIFOsReady",
            true,
            true,
            true,
            ctx.config.fifo_index_caching,
        );
        emit_phase_timer_stop(ctx, &mut w, "timeWaitingForOutputFIFOs");
    }

    // 8d. Obtain read pointers / drain into scratch
    emit_phase_timer_start(ctx, &mut w, "phaseStart");
    for fifo_id in &ctx.input_fifos {
        let fifo = ctx.fifo(*fifo_id);
        let gen = FifoGen::new(fifo);
        if db.inputs() {
            gen.emit_read(&mut w, consumer_role, false);
            w.line(format!(
                "memcpy({name}_next, {name}_readPtr, sizeof({ty}));",
                name = fifo.name,
                ty = fifo.struct_type_name()
            ));
            gen.emit_push_read(&mut w);
        } else {
            gen.emit_read(&mut w, consumer_role, false);
            if !fifo.in_place {
                // Copying FIFOs publish the consumed slot immediately
                gen.emit_push_read(&mut w);
            }
        }
    }
    // In-place output slots are claimed before compute so it can write
    // straight into the buffer
    if in_place && !db.outputs() {
        for fifo_id in &ctx.output_fifos {
            FifoGen::new(ctx.fifo(*fifo_id)).emit_write(&mut w, producer_role, false);
        }
    }
    emit_phase_timer_stop(ctx, &mut w, "timeReadingInputFIFOs");

    // 8e. Compute
    if telem.level.uses_papi() {
        w.line("papiStartCounters(papiEventSet);");
    }
    emit_phase_timer_start(ctx, &mut w, "phaseStart");
    w.line(compute::compute_call(ctx));
    emit_phase_timer_stop(ctx, &mut w, "timeWaitingForComputeToFinish");
    if telem.level.uses_papi() {
        w.line("papiStopCounters(papiEventSet, papiCounters);");
    }

    // 8f/8g. Publish results
    emit_phase_timer_start(ctx, &mut w, "phaseStart");
    if db.outputs() {
        // Drain the block finished in the previous iteration
        if !output_fifos.is_empty() {
            emit_fifo_checks(
                &mut w,
                &output_fifos,
                true,
                "outputFIFOsReady",
                true,
                true,
                true,
                ctx.config.fifo_index_caching,
            );
        }
        for fifo_id in &ctx.output_fifos {
            let fifo = ctx.fifo(*fifo_id);
            let gen = FifoGen::new(fifo);
            gen.emit_write(&mut w, producer_role, false);
            w.line(format!(
                "memcpy({name}_writePtr, {name}_prev, sizeof({ty}));",
                name = fifo.name,
                ty = fifo.struct_type_name()
            ));
            gen.emit_mirror_fixup(&mut w);
            gen.emit_push_write(&mut w);
        }
        // Reads of the shared input slots are finished once compute returned
        for fifo_id in &ctx.input_fifos {
            if !db.inputs() {
                FifoGen::new(ctx.fifo(*fifo_id)).emit_push_read(&mut w);
            }
        }
    } else if in_place {
        for fifo_id in &ctx.output_fifos {
            let gen = FifoGen::new(ctx.fifo(*fifo_id));
            gen.emit_mirror_fixup(&mut w);
        }
        // Publish read completions only now: the compute worked directly on
        // the shared slots
        for fifo_id in &ctx.input_fifos {
            if !db.inputs() {
                FifoGen::new(ctx.fifo(*fifo_id)).emit_push_read(&mut w);
            }
        }
        for fifo_id in &ctx.output_fifos {
            FifoGen::new(ctx.fifo(*fifo_id)).emit_push_write(&mut w);
        }
    } else {
        // Copying FIFOs wait for room only after compute
        if !output_fifos.is_empty() {
            emit_fifo_checks(
                &mut w,
                &output_fifos,
                true,
                "outputFIFOsReady",
                true,
                true,
                true,
                ctx.config.fifo_index_caching,
            );
        }
        for fifo_id in &ctx.output_fifos {
            let gen = FifoGen::new(ctx.fifo(*fifo_id));
            gen.emit_write(&mut w, producer_role, false);
            gen.emit_push_write(&mut w);
        }
    }
    emit_phase_timer_stop(ctx, &mut w, "timeWritingOutputFIFOs");

    // 8h. Swap double buffers
    if db.inputs() {
        for fifo_id in &ctx.input_fifos {
            let fifo = ctx.fifo(*fifo_id);
            emit_pointer_swap(&mut w, &fifo.struct_type_name(), &fifo.name, "current", "next");
        }
    }
    if db.outputs() {
        for fifo_id in &ctx.output_fifos {
            let fifo = ctx.fifo(*fifo_id);
            emit_pointer_swap(&mut w, &fifo.struct_type_name(), &fifo.name, "current", "prev");
        }
    }

    if telem.level.enabled() {
        w.line("blocksProcessed++;");
        // Discard the warm-up iteration from the reported rates
        w.open("if (firstIteration)");
        w.line("firstIteration = false;");
        emit_telemetry_reset(ctx, &mut w);
        w.close();
    }

    w.close(); // while

    w.line("return NULL;");
    w.close();

    Ok(w.finish())
}

fn priming_compute_call(ctx: &PartitionContext) -> String {
    let mut args = vec!["&state".to_string()];

    for fifo_id in &ctx.input_fifos {
        let fifo = ctx.fifo(*fifo_id);
        if ctx.config.double_buffer.inputs() {
            args.push(format!("{}_current", fifo.name));
            args.push(format!("{}_next", fifo.name));
        } else {
            // Any allocated block works; the result is discarded
            args.push(fifo.array_var());
        }
    }
    for fifo_id in &ctx.output_fifos {
        let fifo = ctx.fifo(*fifo_id);
        // Swapped on purpose: the discarded block lands in prev
        args.push(format!("{}_prev", fifo.name));
        args.push(format!("{}_current", fifo.name));
    }

    format!("{}({});", ctx.compute_fn_name(), args.iter().join(", "))
}

fn emit_pointer_swap(w: &mut CWriter, ty: &str, name: &str, a: &str, b: &str) {
    w.open_scope();
    w.line(format!("{ty}* swapTmp = {name}_{a};"));
    w.line(format!("{name}_{a} = {name}_{b};"));
    w.line(format!("{name}_{b} = swapTmp;"));
    w.close();
}

fn emit_telemetry_setup(ctx: &PartitionContext, w: &mut CWriter) {
    let telem = &ctx.config.telemetry;

    w.line("struct timespec clockResolution;");
    w.line("clock_getres(CLOCK_MONOTONIC, &clockResolution);");
    if ctx.config.thread_debug_print {
        w.line(
            "printf(\"Clock resolution: %ld ns\\n\", clockResolution.tv_nsec);",
        );
    }
    w.line("struct timespec lastReportTime;");
    w.line("clock_gettime(CLOCK_MONOTONIC, &lastReportTime);");
    w.line("uint64_t blocksProcessed = 0;");
    w.line("uint64_t iterCount = 0;");
    w.line("bool firstIteration = true;");
    if telem.level.breakdown() {
        for timer in BREAKDOWN_TIMERS {
            w.line(format!("double {timer} = 0.0;"));
        }
        w.line("struct timespec phaseStart;");
        w.line("struct timespec phaseStop;");
    }
    if !telem.dump_file_prefix.is_empty() {
        let path = format!("{}{}.csv", telem.dump_file_prefix, ctx.suffix());
        w.line(format!("FILE* telemDumpFile = fopen(\"{path}\", \"w\");"));
        let columns = telemetry_columns(ctx).join(",");
        w.line(format!("fprintf(telemDumpFile, \"{columns}\\n\");"));
    }
    if telem.level.uses_papi() {
        w.line("int papiEventSet = papiSetupThreadEventSet();");
        w.line("long long papiCounters[4] = {0, 0, 0, 0};");
    }
    w.blank();
}

const BREAKDOWN_TIMERS: [&str; 6] = [
    "timeWaitingForInputFIFOs",
    "timeReadingInputFIFOs",
    "timeWaitingForComputeToFinish",
    "timeWaitingForOutputFIFOs",
    "timeWritingOutputFIFOs",
    "timeTelemetryMisc",
];

fn emit_phase_timer_start(ctx: &PartitionContext, w: &mut CWriter, var: &str) {
    if ctx.config.telemetry.level.breakdown() {
        w.line(format!("clock_gettime(CLOCK_MONOTONIC, &{var});"));
    }
}

fn emit_phase_timer_stop(ctx: &PartitionContext, w: &mut CWriter, accumulator: &str) {
    if ctx.config.telemetry.level.breakdown() {
        w.line("clock_gettime(CLOCK_MONOTONIC, &phaseStop);");
        w.line(format!(
            "{accumulator} += difftimespec(&phaseStop, &phaseStart);"
        ));
    }
}

fn emit_telemetry_interval(ctx: &PartitionContext, w: &mut CWriter) {
    let telem = &ctx.config.telemetry;
    let period = telem.report_period.as_secs_f64();

    w.open(format!(
        "if (iterCount % {} == 0)",
        telem.report_freq_block_freq.max(1)
    ));
    if telem.level.breakdown() {
        w.line("struct timespec telemStart;");
        w.line("clock_gettime(CLOCK_MONOTONIC, &telemStart);");
    }
    w.line("struct timespec now;");
    w.line("clock_gettime(CLOCK_MONOTONIC, &now);");
    w.line("double elapsed = difftimespec(&now, &lastReportTime);");
    w.open(format!("if (elapsed >= {period})"));
    w.line(format!(
        "double rateMsps = ((double) blocksProcessed) * {} / elapsed / 1.0e6;",
        ctx.config.block_size
    ));
    if ctx.config.thread_debug_print {
        w.line(format!(
            "printf(\"Partition {}: %f Msps\\n\", rateMsps);",
            ctx.suffix()
        ));
    }
    if !telem.dump_file_prefix.is_empty() {
        emit_telemetry_row(ctx, w);
        w.line("fflush(telemDumpFile);");
    }
    if !telem.averaged {
        emit_telemetry_reset(ctx, w);
    }
    w.close();
    if telem.level.breakdown() {
        w.line("struct timespec telemStop;");
        w.line("clock_gettime(CLOCK_MONOTONIC, &telemStop);");
        w.line("timeTelemetryMisc += difftimespec(&telemStop, &telemStart);");
    }
    w.close();
    w.line("iterCount++;");
    w.blank();
}

fn emit_telemetry_row(ctx: &PartitionContext, w: &mut CWriter) {
    let telem = &ctx.config.telemetry;
    let mut formats = vec!["%ld", "%ld", "%f"];
    let mut args = vec![
        "now.tv_sec".to_string(),
        "now.tv_nsec".to_string(),
        "rateMsps".to_string(),
    ];

    if telem.level.breakdown() {
        for timer in BREAKDOWN_TIMERS {
            formats.push("%f");
            args.push(timer.to_string());
        }
        formats.push("%f");
        args.push("elapsed".to_string());
    }
    if telem.level.uses_papi() {
        for i in 0..4 {
            formats.push("%lld");
            args.push(format!("papiCounters[{i}]"));
        }
        if telem.level == laminar_core::config::TelemetryLevel::PapiComputeOnly {
            formats.push("%f");
            args.push("timeWaitingForComputeToFinish".to_string());
        }
    }

    w.line(format!(
        "fprintf(telemDumpFile, \"{}\\n\", {});",
        formats.join(","),
        args.join(", ")
    ));
}

fn emit_telemetry_reset(ctx: &PartitionContext, w: &mut CWriter) {
    let telem = &ctx.config.telemetry;
    w.line("blocksProcessed = 0;");
    w.line("clock_gettime(CLOCK_MONOTONIC, &lastReportTime);");
    if telem.level.breakdown() {
        for timer in BREAKDOWN_TIMERS {
            w.line(format!("{timer} = 0.0;"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminar_core::config::EmitConfig;
    use laminar_core::datatype::DataType;
    use laminar_core::graph::{Graph, NodeKind, Operator, Port, PortRef};
    use laminar_core::numeric::NumericValue;

    use crate::passes::insertion::insert_partition_crossing_fifos;

    fn build(extra: &str) -> (Graph, EmitConfig) {
        let mut g = Graph::new();
        let src = g.add_node("src", None, laminar_core::graph::IO_PARTITION, NodeKind::MasterInput);
        g.node_mut(src).outputs = vec![Port::new(DataType::new(false, true, false, 32))];
        let gain = g.add_node(
            "scale",
            None,
            0,
            NodeKind::Primitive(Operator::Gain {
                gain: NumericValue::Int(2),
            }),
        );
        g.node_mut(gain).inputs = vec![Port::new(DataType::new(false, true, false, 32))];
        g.node_mut(gain).outputs = vec![Port::new(DataType::new(false, true, false, 32))];
        g.node_mut(gain).sched_order = 0;
        let sink = g.add_node("sink", None, laminar_core::graph::IO_PARTITION, NodeKind::MasterOutput);
        g.node_mut(sink).inputs = vec![Port::new(DataType::new(false, true, false, 32))];

        let t = DataType::new(false, true, false, 32);
        g.connect(PortRef::new(src, 0), PortRef::new(gain, 0), t.clone(), 0.0);
        g.connect(PortRef::new(gain, 0), PortRef::new(sink, 0), t, 0.0);

        let config: EmitConfig = serde_yaml::from_str(&format!(
            "design_name: toy\nfile_name_prefix: toy\n{extra}"
        ))
        .unwrap();
        insert_partition_crossing_fifos(&mut g, &config).unwrap();
        (g, config)
    }

    #[test]
    fn thread_recovers_args_and_loops() {
        let (g, cfg) = build("");
        let ctx = PartitionContext::new(&g, &cfg, 0);
        let body = thread_function(&ctx).unwrap();

        assert!(body.contains("void* toy_partition0_thread(void* args)"));
        assert!(body.contains(
            "const toy_partition0_threadArgs_t* threadArgs = (const toy_partition0_threadArgs_t*) args;"
        ));
        assert!(body.contains("toy_partition0_state_t state;"));
        assert!(body.contains("toy_partition0_reset(&state);"));
        assert!(body.contains("while (true)"));
        assert!(body.contains("while (!inputFIFOsReady)"));
        assert!(body.contains("pthread_testcancel();"));
        assert!(body.contains("toy_partition0_compute(&state"));
        // In-place: read completion publishes only after compute
        let compute_pos = body.find("toy_partition0_compute(&state").unwrap();
        let read_push = body
            .rfind("atomic_store_explicit(PartitionCrossingFIFO_N2_TO_0_0_readOffsetPtr")
            .unwrap();
        assert!(read_push > compute_pos);
        assert!(body.contains("return NULL;"));
    }

    #[test]
    fn telemetry_csv_schema() {
        let (g, cfg) = build(
            "telemetry:\n  level: rate_and_breakdown\n  dump_file_prefix: toy_telem_\n",
        );
        let ctx = PartitionContext::new(&g, &cfg, 0);
        assert_eq!(
            telemetry_columns(&ctx),
            vec![
                "TimeStamp_s",
                "TimeStamp_ns",
                "Rate_msps",
                "WaitingForInputFIFOs_s",
                "ReadingInputFIFOs_s",
                "WaitingForComputeToFinish_s",
                "WaitingForOutputFIFOs_s",
                "WritingOutputFIFOs_s",
                "Telemetry_Misc_s",
                "TotalTime_s",
            ]
        );
        let body = thread_function(&ctx).unwrap();
        assert!(body.contains("fopen(\"toy_telem_0.csv\", \"w\")"));
        assert!(body.contains("TimeStamp_s,TimeStamp_ns,Rate_msps,WaitingForInputFIFOs_s"));
        assert!(body.contains("firstIteration = false;"));
    }

    #[test]
    fn double_buffer_primes_and_swaps() {
        let (g, cfg) = build("double_buffer: input_and_output\n");
        let ctx = PartitionContext::new(&g, &cfg, 0);
        let body = thread_function(&ctx).unwrap();

        assert!(body.contains("PartitionCrossingFIFO_N2_TO_0_0_t* PartitionCrossingFIFO_N2_TO_0_0_current"));
        assert!(body.contains("Prime input double buffers"));
        // Output priming passes prev in the current position
        assert!(body.contains("PartitionCrossingFIFO_0_TO_N2_0_prev, PartitionCrossingFIFO_0_TO_N2_0_current);"));
        assert!(body.contains("swapTmp"));
    }

    #[test]
    fn header_declares_entry_points() {
        let (g, cfg) = build("");
        let ctx = PartitionContext::new(&g, &cfg, 0);
        let header = emit_partition_header(&ctx);
        assert_eq!(header.name, "toy_partition0.h");
        assert!(header.contents.contains("#ifndef TOY_PARTITION0_H"));
        assert!(header.contents.contains("void* toy_partition0_thread(void* args);"));
        assert!(header.contents.contains("typedef struct"));
        assert!(header.contents.contains("} toy_partition0_threadArgs_t;"));
    }
}

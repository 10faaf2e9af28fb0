//! Emission of the constant-feed benchmark I/O thread
//!
//! The I/O thread is the one worker the coordinator joins on; the design
//! runs for as long as it runs. This benchmark flavor feeds constant
//! blocks into the design-facing FIFOs and drains the result FIFOs,
//! counting blocks until a compile-time limit unblocks the join. Both
//! directions poll non-blocking so a deep pipeline cannot deadlock the
//! feeder.
use laminar_core::error::TypedResult;
use laminar_core::graph::IO_PARTITION;

use crate::emit::cwriter::{header_guard, CWriter, GeneratedFile};
use crate::emit::fifo_gen::{emit_fifo_checks, role_for, FifoGen};
use crate::emit::{thread, PartitionContext};

fn io_file_name(ctx: &PartitionContext) -> String {
    format!("{}_{}", ctx.config.file_name_prefix, ctx.config.io_suffix)
}

fn block_limit_macro(ctx: &PartitionContext) -> String {
    format!(
        "{}_{}_BLOCK_LIMIT",
        ctx.config.design_name.to_uppercase(),
        ctx.config.io_suffix.to_uppercase()
    )
}

/// The I/O thread header also carries the I/O partition's argument struct,
/// since no partition file is generated for the I/O partition
pub fn emit_io_header(ctx: &PartitionContext) -> GeneratedFile {
    assert_eq!(ctx.partition, IO_PARTITION);
    let file_name = io_file_name(ctx);
    let guard = header_guard(&file_name);
    let mut w = CWriter::new();

    w.line(format!("#ifndef {guard}"));
    w.line(format!("#define {guard}"));
    w.line("#include <stdint.h>");
    w.line("#include <stdbool.h>");
    w.line("#include <stdatomic.h>");
    w.line(format!(
        "#include \"{}_fifoTypes.h\"",
        ctx.config.file_name_prefix
    ));
    w.blank();
    w.raw(thread::thread_args_typedef(ctx));
    w.blank();
    w.line(format!(
        "void* {}_{}_thread(void* args);",
        ctx.config.design_name, ctx.config.io_suffix
    ));
    w.line("#endif");

    GeneratedFile::new(format!("{file_name}.h"), w.finish())
}

pub fn emit_io_source(ctx: &PartitionContext) -> TypedResult<GeneratedFile> {
    assert_eq!(ctx.partition, IO_PARTITION);
    let file_name = io_file_name(ctx);
    let limit = block_limit_macro(ctx);
    let mut w = CWriter::new();

    w.line(format!("#include \"{file_name}.h\""));
    w.line("#include <pthread.h>");
    w.line("#include <stdio.h>");
    w.line("#include <string.h>");
    w.blank();
    w.line(format!("#ifndef {limit}"));
    w.line(format!("#define {limit} (10000000)"));
    w.line("#endif");
    w.blank();

    w.open(format!(
        "void* {}_{}_thread(void* args)",
        ctx.config.design_name, ctx.config.io_suffix
    ));
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
        w.line("printf(\"I/O thread started\\n\");");
    }
    w.blank();

    let consumer_role = role_for(false, ctx.config.fifo_index_caching);
    let producer_role = role_for(true, ctx.config.fifo_index_caching);
    let in_place = ctx
        .input_fifos
        .iter()
        .chain(ctx.output_fifos.iter())
        .next()
        .map(|id| ctx.fifo(*id).in_place)
        .unwrap_or(true);
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
    if !in_place {
        for fifo_id in &ctx.input_fifos {
            FifoGen::new(ctx.fifo(*fifo_id)).emit_scratch_decls(&mut w, false);
        }
        for fifo_id in &ctx.output_fifos {
            FifoGen::new(ctx.fifo(*fifo_id)).emit_scratch_decls(&mut w, true);
        }
    }
    w.blank();

    w.line("uint64_t blocksSent = 0;");
    w.line("uint64_t blocksReceived = 0;");
    w.open(format!("while (blocksReceived < {limit})"));

    // Feed constant blocks toward the design while there is room
    let to_design: Vec<_> = ctx.output_fifos.iter().map(|id| ctx.fifo(*id)).collect();
    if !to_design.is_empty() {
        emit_fifo_checks(
            &mut w,
            &to_design,
            true,
            "toDesignReady",
            true,
            false,
            false,
            ctx.config.fifo_index_caching,
        );
        w.open("if (toDesignReady)");
        for fifo_id in &ctx.output_fifos {
            let fifo = ctx.fifo(*fifo_id);
            let gen = FifoGen::new(fifo);
            if in_place {
                gen.emit_write(&mut w, producer_role, false);
                w.line(format!(
                    "memset({name}_writePtr, 0, sizeof({ty}));",
                    name = fifo.name,
                    ty = fifo.struct_type_name()
                ));
                gen.emit_mirror_fixup(&mut w);
            } else {
                w.line(format!(
                    "memset(&{}, 0, sizeof({}));",
                    fifo.write_temp_var(),
                    fifo.struct_type_name()
                ));
                gen.emit_write(&mut w, producer_role, false);
            }
            gen.emit_push_write(&mut w);
        }
        w.line("blocksSent++;");
        w.close();
    }

    // Drain whatever the design finished
    let from_design: Vec<_> = ctx.input_fifos.iter().map(|id| ctx.fifo(*id)).collect();
    if !from_design.is_empty() {
        emit_fifo_checks(
            &mut w,
            &from_design,
            false,
            "fromDesignReady",
            true,
            false,
            false,
            ctx.config.fifo_index_caching,
        );
        w.open("if (fromDesignReady)");
        for fifo_id in &ctx.input_fifos {
            let gen = FifoGen::new(ctx.fifo(*fifo_id));
            gen.emit_read(&mut w, consumer_role, false);
            gen.emit_push_read(&mut w);
        }
        w.line("blocksReceived++;");
        w.close();
    }

    w.close(); // while

    if ctx.config.thread_debug_print {
        w.line(
            "printf(\"I/O thread done: %llu blocks sent, %llu received\\n\", \
             (unsigned long long) blocksSent, (unsigned long long) blocksReceived);",
        );
    }
    w.line("return NULL;");
    w.close();

    Ok(GeneratedFile::new(format!("{file_name}.c"), w.finish()))
}

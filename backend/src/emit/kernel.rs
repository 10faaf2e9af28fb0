//! Emission of the coordinator kernel and the process driver
//!
//! The kernel allocates every FIFO's shared buffer on the NUMA node of the
//! producing partition's core, seeds the initial conditions, builds the
//! per-thread argument structs, creates the pinned worker threads (I/O
//! thread last), reports each thread's stack placement and finally joins
//! the I/O thread before cancelling the workers.
use bytesize::ByteSize;
use laminar_core::config::EmitConfig;
use laminar_core::error::TypedResult;
use laminar_core::graph::{partition_suffix, Graph, IO_PARTITION};

use crate::emit::cwriter::{header_guard, CWriter, GeneratedFile};
use crate::emit::fifo_gen::FifoGen;
use crate::emit::support;
use crate::emit::PartitionContext;
use crate::passes::insertion::FifoTable;

fn kernel_file_name(config: &EmitConfig) -> String {
    format!("{}_{}_kernel", config.file_name_prefix, config.io_suffix)
}

pub fn kernel_fn_name(config: &EmitConfig) -> String {
    format!("{}_{}_kernel", config.design_name, config.io_suffix)
}

pub fn io_thread_fn_name(config: &EmitConfig) -> String {
    format!("{}_{}_thread", config.design_name, config.io_suffix)
}

pub fn emit_kernel_header(config: &EmitConfig) -> GeneratedFile {
    let file_name = kernel_file_name(config);
    let guard = header_guard(&file_name);
    let mut w = CWriter::new();

    w.line(format!("#ifndef {guard}"));
    w.line(format!("#define {guard}"));
    w.line("#include <stdint.h>");
    w.line("#include <stdbool.h>");
    w.line("#include <stdlib.h>");
    w.line("#include <pthread.h>");
    w.line("#include <errno.h>");
    w.line(format!("#include \"{}_fifoTypes.h\"", config.file_name_prefix));
    w.blank();
    w.line(format!("void {}();", kernel_fn_name(config)));
    w.line("#endif");

    GeneratedFile::new(format!("{file_name}.h"), w.finish())
}

pub fn emit_kernel_source(
    graph: &Graph,
    config: &EmitConfig,
    table: &FifoTable,
) -> TypedResult<GeneratedFile> {
    let file_name = kernel_file_name(config);
    let mut w = CWriter::new();

    let mut partitions: Vec<i32> = graph.partitions().into_iter().collect();
    partitions.sort_unstable();

    w.line("#ifndef _GNU_SOURCE");
    w.line("#define _GNU_SOURCE");
    w.line("#endif");
    w.line("#include <unistd.h>");
    w.line("#include <sched.h>");
    w.line("#include <stdio.h>");
    w.line("#include <errno.h>");
    w.line("#include <stdatomic.h>");
    w.line(format!("#include \"{file_name}.h\""));
    w.line(format!("#include \"{}.h\"", support::PLATFORM_PARAMS_NAME));
    w.line(format!("#include \"{}.h\"", support::NUMA_ALLOC_HELPERS_NAME));
    if config.telemetry.level.uses_papi() {
        w.line(format!("#include \"{}\"", config.telemetry.papi_helper_header));
    }
    for partition in &partitions {
        if *partition != IO_PARTITION {
            w.line(format!(
                "#include \"{}_partition{}.h\"",
                config.file_name_prefix,
                partition_suffix(*partition)
            ));
        }
    }
    w.line(format!(
        "#include \"{}_{}.h\"",
        config.file_name_prefix, config.io_suffix
    ));
    w.blank();

    w.open(format!("void {}()", kernel_fn_name(config)));
    w.comment(" Each partition thread resets its own state before processing samples");
    w.blank();

    // 1. Allocate and seed every FIFO on the producer's core
    w.comment(" Allocate and initialize FIFO shared state");
    for (&(src_partition, _), fifos) in table {
        let core = config.core_for_partition(src_partition)?;
        for fifo_id in fifos {
            let fifo = graph.node(*fifo_id).as_fifo().expect("node to be a FIFO");
            info!(
                "FIFO {}: {} blocks, {} buffer",
                fifo.name,
                fifo.capacity_blocks,
                ByteSize::b(fifo.buffer_bytes() as u64)
            );
            let gen = FifoGen::new(fifo);
            gen.emit_create_shared(&mut w, core);
            gen.emit_init_shared(&mut w);
        }
    }
    w.blank();

    // 2. Thread argument structs
    w.comment(" Create thread arguments");
    for partition in &partitions {
        let ctx = PartitionContext::new(graph, config, *partition);
        w.line(format!(
            "{} {};",
            ctx.thread_args_type_name(),
            ctx.thread_args_var_name()
        ));
        for fifo_id in ctx.input_fifos.iter().chain(ctx.output_fifos.iter()) {
            for (_, name) in FifoGen::new(ctx.fifo(*fifo_id)).shared_var_decls() {
                w.line(format!("{}.{name} = {name};", ctx.thread_args_var_name()));
            }
        }
    }
    w.blank();

    // 3. PAPI must exist before any thread samples counters
    if config.telemetry.level.uses_papi() {
        w.line("papiSetup();");
        w.blank();
    }

    // 4. Thread attributes, scheduling policy and affinity
    w.comment(" Create thread parameters");
    w.line("int status;");
    for partition in &partitions {
        let suffix = partition_suffix(*partition);
        w.line(format!("pthread_t thread_{suffix};"));
        w.line(format!("pthread_attr_t attr_{suffix};"));
        w.line(format!("status = pthread_attr_init(&attr_{suffix});"));
        emit_status_check(&mut w, "Could not create pthread attributes");

        if let Some(core) = config.core_for_partition(*partition)? {
            if config.use_sched_fifo {
                w.comment(format!(
                    " Partition {suffix} runs under SCHED_FIFO at maximum priority"
                ));
                w.line(format!(
                    "status = pthread_attr_setinheritsched(&attr_{suffix}, PTHREAD_EXPLICIT_SCHED);"
                ));
                emit_status_check(&mut w, "Could not set pthread explicit schedule attribute");
                w.line(format!(
                    "status = pthread_attr_setschedpolicy(&attr_{suffix}, SCHED_FIFO);"
                ));
                emit_status_check(&mut w, "Could not set pthread schedule policy to SCHED_FIFO");
                w.line(format!("struct sched_param threadParams_{suffix};"));
                w.line(format!(
                    "threadParams_{suffix}.sched_priority = sched_get_priority_max(SCHED_FIFO);"
                ));
                w.line(format!(
                    "status = pthread_attr_setschedparam(&attr_{suffix}, &threadParams_{suffix});"
                ));
                emit_status_check(&mut w, "Could not set pthread schedule parameter");
            }

            w.line(format!("cpu_set_t cpuset_{suffix};"));
            w.line(format!("CPU_ZERO(&cpuset_{suffix});"));
            w.line(format!("CPU_SET({core}, &cpuset_{suffix});"));
            w.line(format!(
                "status = pthread_attr_setaffinity_np(&attr_{suffix}, sizeof(cpu_set_t), &cpuset_{suffix});"
            ));
            emit_status_check(&mut w, "Could not set thread core affinity");
        }
        w.blank();
    }

    // 5. Workers first, the I/O thread last
    w.comment(" Start threads");
    for partition in &partitions {
        if *partition == IO_PARTITION {
            continue;
        }
        let suffix = partition_suffix(*partition);
        let ctx = PartitionContext::new(graph, config, *partition);
        w.line(format!(
            "status = pthread_create(&thread_{suffix}, &attr_{suffix}, {}, &{});",
            ctx.thread_fn_name(),
            ctx.thread_args_var_name()
        ));
        emit_status_check(&mut w, "Could not create a thread");
    }

    let io_suffix = partition_suffix(IO_PARTITION);
    let io_ctx = PartitionContext::new(graph, config, IO_PARTITION);
    w.line(format!(
        "status = pthread_create(&thread_{io_suffix}, &attr_{io_suffix}, {}, &{});",
        io_thread_fn_name(config),
        io_ctx.thread_args_var_name()
    ));
    emit_status_check(&mut w, "Could not create a thread");
    w.blank();

    // 6. Stack placement report
    w.comment(" Report stack placement of every created thread");
    w.line(format!(
        "FILE* stackInfo = fopen(\"{}_stack_info.txt\", \"w\");",
        config.design_name
    ));
    for partition in &partitions {
        let suffix = partition_suffix(*partition);
        w.line(format!("pthread_attr_t attrCreated_{suffix};"));
        w.line(format!(
            "status = pthread_getattr_np(thread_{suffix}, &attrCreated_{suffix});"
        ));
        emit_status_check(&mut w, "Could not get thread attributes from created thread");
        w.line(format!("size_t stackGuard_{suffix};"));
        w.line(format!(
            "status = pthread_attr_getguardsize(&attrCreated_{suffix}, &stackGuard_{suffix});"
        ));
        emit_status_check(&mut w, "Could not get thread stack guard");
        w.line(format!("void* stackBase_{suffix};"));
        w.line(format!("size_t stackSize_{suffix};"));
        w.line(format!(
            "status = pthread_attr_getstack(&attrCreated_{suffix}, &stackBase_{suffix}, &stackSize_{suffix});"
        ));
        emit_status_check(&mut w, "Could not get thread stack addr");

        w.line(format!(
            "fprintf(stackInfo, \"Thread %3s Guard: %zu\\n\", \"{suffix}\", stackGuard_{suffix});"
        ));
        w.open(format!("if (stackGuard_{suffix} < VITIS_MEM_ALIGNMENT)"));
        let warning = format!(
            "Warning, Thread {suffix} Stack Guard (%zu) Is Less than Cache Line Size (%d), \
             Cache Polution / Unexpected Communication Between Cores May Occur!\\n"
        );
        w.line(format!(
            "fprintf(stderr, \"{warning}\", stackGuard_{suffix}, VITIS_MEM_ALIGNMENT);"
        ));
        w.line(format!(
            "fprintf(stackInfo, \"{warning}\", stackGuard_{suffix}, VITIS_MEM_ALIGNMENT);"
        ));
        w.close();
        w.line(format!(
            "fprintf(stackInfo, \"Thread %3s Stack Base: %p, Size: %zu\\n\", \"{suffix}\", stackBase_{suffix}, stackSize_{suffix});"
        ));
    }
    w.line("fclose(stackInfo);");
    w.blank();

    // 7. The design runs until the I/O thread finishes
    w.comment(" Wait for the I/O thread to finish");
    w.line(format!("void* ioRes_{io_suffix};"));
    w.line(format!(
        "status = pthread_join(thread_{io_suffix}, &ioRes_{io_suffix});"
    ));
    emit_status_check(&mut w, "Could not join a thread");
    w.blank();

    w.comment(" Cancel the worker threads");
    for partition in &partitions {
        if *partition == IO_PARTITION {
            continue;
        }
        let suffix = partition_suffix(*partition);
        w.line(format!("status = pthread_cancel(thread_{suffix});"));
        emit_status_check(&mut w, "Could not cancel a thread");
    }

    w.close();

    Ok(GeneratedFile::new(format!("{file_name}.c"), w.finish()))
}

fn emit_status_check(w: &mut CWriter, message: &str) {
    w.open("if (status != 0)");
    w.line(format!("printf(\"{message} ... exiting\\n\");"));
    w.line("errno = status;");
    w.line("perror(NULL);");
    w.line("exit(1);");
    w.close();
}

/// The process entry point: run the kernel, then exit
pub fn emit_driver(config: &EmitConfig) -> GeneratedFile {
    let file_name = format!("{}_{}_driver", config.file_name_prefix, config.io_suffix);
    let mut w = CWriter::new();

    w.line("#include <stdio.h>");
    w.line("#include <stdlib.h>");
    w.line(format!(
        "#include \"{}.h\"",
        kernel_file_name(config)
    ));
    w.blank();
    w.open("int main(int argc, char* argv[])");
    w.line(format!("printf(\"Starting {}\\n\");", config.design_name));
    w.line(format!("{}();", kernel_fn_name(config)));
    w.line("return 0;");
    w.close();

    GeneratedFile::new(format!("{file_name}.c"), w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminar_core::datatype::DataType;
    use laminar_core::graph::{NodeKind, Operator, Port, PortRef};
    use laminar_core::numeric::NumericValue;

    use crate::passes::insertion::insert_partition_crossing_fifos;

    fn build(extra: &str) -> (Graph, EmitConfig, FifoTable) {
        let mut g = Graph::new();
        let t = DataType::new(false, true, false, 32);
        let src = g.add_node("src", None, IO_PARTITION, NodeKind::MasterInput);
        g.node_mut(src).outputs = vec![Port::new(t.clone())];
        let a = g.add_node(
            "a",
            None,
            0,
            NodeKind::Primitive(Operator::Gain {
                gain: NumericValue::Int(2),
            }),
        );
        g.node_mut(a).inputs = vec![Port::new(t.clone())];
        g.node_mut(a).outputs = vec![Port::new(t.clone())];
        g.node_mut(a).sched_order = 0;
        let b = g.add_node(
            "b",
            None,
            1,
            NodeKind::Primitive(Operator::Gain {
                gain: NumericValue::Int(3),
            }),
        );
        g.node_mut(b).inputs = vec![Port::new(t.clone())];
        g.node_mut(b).outputs = vec![Port::new(t.clone())];
        g.node_mut(b).sched_order = 0;
        let sink = g.add_node("sink", None, IO_PARTITION, NodeKind::MasterOutput);
        g.node_mut(sink).inputs = vec![Port::new(t.clone())];

        g.connect(PortRef::new(src, 0), PortRef::new(a, 0), t.clone(), 0.0);
        g.connect(PortRef::new(a, 0), PortRef::new(b, 0), t.clone(), 0.0);
        g.connect(PortRef::new(b, 0), PortRef::new(sink, 0), t, 0.0);

        let config: EmitConfig = serde_yaml::from_str(&format!(
            "design_name: toy\nfile_name_prefix: toy\n{extra}"
        ))
        .unwrap();
        let table = insert_partition_crossing_fifos(&mut g, &config).unwrap();
        (g, config, table)
    }

    #[test]
    fn pinning_follows_partition_map() {
        // Map [3, 0, 1] pins the I/O thread to core 3 and partitions
        // 0 and 1 to cores 0 and 1
        let (g, config, table) = build("partition_map: [3, 0, 1]\n");
        let kernel = emit_kernel_source(&g, &config, &table).unwrap();

        assert!(kernel.contents.contains("CPU_SET(3, &cpuset_N2);"));
        assert!(kernel.contents.contains("CPU_SET(0, &cpuset_0);"));
        assert!(kernel.contents.contains("CPU_SET(1, &cpuset_1);"));
        assert!(kernel.contents.contains("pthread_attr_setaffinity_np"));
        // NUMA allocation happens on the producing core
        assert!(kernel.contents.contains("vitis_aligned_alloc_core"));
        // Stack guard shortfall warns into the stack report
        assert!(kernel.contents.contains("fopen(\"toy_stack_info.txt\", \"w\")"));
        assert!(kernel
            .contents
            .contains("Is Less than Cache Line Size"));
    }

    #[test]
    fn empty_partition_map_skips_pinning() {
        let (g, config, table) = build("");
        let kernel = emit_kernel_source(&g, &config, &table).unwrap();
        assert!(!kernel.contents.contains("CPU_SET"));
        assert!(kernel.contents.contains("vitis_aligned_alloc(VITIS_MEM_ALIGNMENT"));
    }

    #[test]
    fn io_thread_created_last_then_joined() {
        let (g, config, table) = build("");
        let kernel = emit_kernel_source(&g, &config, &table).unwrap();
        let text = &kernel.contents;

        let create_0 = text.find("toy_partition0_thread, &toy_partition0_threadArgs").unwrap();
        let create_1 = text.find("toy_partition1_thread, &toy_partition1_threadArgs").unwrap();
        let create_io = text.find("toy_io_thread, &toy_partitionN2_threadArgs").unwrap();
        assert!(create_0 < create_io && create_1 < create_io);

        let join = text.find("pthread_join(thread_N2").unwrap();
        let cancel = text.find("pthread_cancel(thread_0").unwrap();
        assert!(join < cancel);
    }

    #[test]
    fn sched_fifo_request() {
        let (g, config, table) = build("partition_map: [3, 0, 1]\nuse_sched_fifo: true\n");
        let kernel = emit_kernel_source(&g, &config, &table).unwrap();
        assert!(kernel.contents.contains("pthread_attr_setschedpolicy"));
        assert!(kernel.contents.contains("sched_get_priority_max(SCHED_FIFO)"));
    }

    #[test]
    fn driver_calls_kernel() {
        let (_, config, _) = build("");
        let driver = emit_driver(&config);
        assert_eq!(driver.name, "toy_io_driver.c");
        assert!(driver.contents.contains("toy_io_kernel();"));
    }
}

//! Emission of the shared support files
//!
//! The FIFO record header, the SIMD copy helper, the NUMA-aware allocator
//! wrappers, the platform parameter header and the telemetry configuration
//! JSON. The allocator and platform file names are fixed parts of the
//! generated artifact set.
use itertools::Itertools;
use laminar_core::config::EmitConfig;
use laminar_core::fifo::CopyMode;
use laminar_core::graph::{partition_suffix, Graph, IO_PARTITION};
use serde_json::json;

use crate::emit::cwriter::{header_guard, CWriter, GeneratedFile};
use crate::emit::fifo_gen::FifoGen;

pub const NUMA_ALLOC_HELPERS_NAME: &str = "vitisNumaAllocHelpers";
pub const PLATFORM_PARAMS_NAME: &str = "vitisPlatformParams";

/// One record type per FIFO, each slot holding one block per port
pub fn emit_fifo_types_header(graph: &Graph, config: &EmitConfig) -> GeneratedFile {
    let file_name = format!("{}_fifoTypes", config.file_name_prefix);
    let guard = header_guard(&file_name);
    let mut w = CWriter::new();

    w.line(format!("#ifndef {guard}"));
    w.line(format!("#define {guard}"));
    w.line("#include <stdint.h>");
    w.line("#include <stdbool.h>");
    w.blank();
    for fifo_id in graph.fifo_nodes() {
        let fifo = graph.node(fifo_id).as_fifo().expect("node to be a FIFO");
        w.raw(FifoGen::new(fifo).struct_typedef());
        w.blank();
    }
    w.line("#endif");

    GeneratedFile::new(format!("{file_name}.h"), w.finish())
}

/// The SIMD byte-copy helper, emitted only when some FIFO asked for it
pub fn emit_fifo_support_header(graph: &Graph, config: &EmitConfig) -> Option<GeneratedFile> {
    let needed = graph.fifo_nodes().iter().any(|id| {
        graph
            .node(*id)
            .as_fifo()
            .map(|f| f.copy_mode == CopyMode::SimdFastCopy)
            .unwrap_or(false)
    });
    if !needed {
        return None;
    }

    let file_name = format!("{}_fifoSupport", config.file_name_prefix);
    let guard = header_guard(&file_name);
    let mut w = CWriter::new();

    w.line(format!("#ifndef {guard}"));
    w.line(format!("#define {guard}"));
    w.line("#include <stdint.h>");
    w.line("#include <stdbool.h>");
    w.line("#include <stddef.h>");
    w.line("#include <immintrin.h>");
    w.blank();
    w.raw(FAST_COPY_HELPER);
    w.line("#endif");

    Some(GeneratedFile::new(format!("{file_name}.h"), w.finish()))
}

/// Copies `elementSize * numElements` bytes: the misaligned tail first,
/// then whole vector words of the widest width the target offers
const FAST_COPY_HELPER: &str = r#"static inline void* fast_copy_unaligned_ramp_in(void* restrict dst, void* restrict src, size_t elementSize, size_t numElements) {
    size_t totalBytesToCopy = elementSize * numElements;

    #ifdef __AVX__
        size_t bytesPerBlock = 32; //256-bit wide vector
    #elif defined (__SSE2__)
        size_t bytesPerBlock = 16; //128-bit wide vector
    #else
        size_t bytesPerBlock = 8;  //64-bit word
    #endif

    size_t blocksToCopy = totalBytesToCopy / bytesPerBlock;
    size_t bytesToCopy = totalBytesToCopy % bytesPerBlock;

    char* restrict srcByte = (char* restrict) src;
    char* restrict dstByte = (char* restrict) dst;

    //Copy the ramp-in bytes
    for (size_t i = 0; i < bytesToCopy; i++) {
        dstByte[i] = srcByte[i];
    }

    char* restrict srcBlock = srcByte + bytesToCopy;
    char* restrict dstBlock = dstByte + bytesToCopy;

    //Copy the large blocks
    for (size_t i = 0; i < blocksToCopy; i++) {
        char* restrict srcCursor = srcBlock + i * bytesPerBlock;
        char* restrict dstCursor = dstBlock + i * bytesPerBlock;
        #ifdef __AVX__
            __m256i tmp = _mm256_loadu_si256((__m256i*) srcCursor);
            _mm256_storeu_si256((__m256i*) dstCursor, tmp);
        #elif defined (__SSE2__)
            __m128i tmp = _mm_loadu_si128((__m128i*) srcCursor);
            _mm_storeu_si128((__m128i*) dstCursor, tmp);
        #else
            *((int64_t*) dstCursor) = *((int64_t*) srcCursor);
        #endif
    }

    return dst;
}
"#;

/// The platform parameter header exporting the alignment constant
pub fn emit_platform_params(config: &EmitConfig) -> GeneratedFile {
    let guard = header_guard(PLATFORM_PARAMS_NAME);
    let mut w = CWriter::new();
    w.line(format!("#ifndef {guard}"));
    w.line(format!("#define {guard}"));
    w.line(format!(
        "#define VITIS_MEM_ALIGNMENT ({})",
        config.mem_alignment
    ));
    w.line("#endif");

    GeneratedFile::new(format!("{PLATFORM_PARAMS_NAME}.h"), w.finish())
}

/// The NUMA-aware allocation helpers.
///
/// Affinity-based allocation works by running the allocation on a helper
/// thread pinned to the target core, so first-touch placement lands on
/// that core's NUMA node. Platforms without affinity control fall back to
/// plain allocation with a warning.
pub fn emit_numa_alloc_helpers() -> (GeneratedFile, GeneratedFile) {
    let guard = header_guard(NUMA_ALLOC_HELPERS_NAME);
    let mut h = CWriter::new();
    h.line(format!("#ifndef {guard}"));
    h.line(format!("#define {guard}"));
    h.line("#include <stdint.h>");
    h.line("#include <stdlib.h>");
    h.line("#include <stdbool.h>");
    h.line("#include <string.h>");
    h.blank();
    h.line("void* vitis_malloc_core(size_t size, int core);");
    h.line("void* vitis__mm_malloc_core(size_t size, size_t alignment, int core);");
    h.line("void* vitis_aligned_alloc_core(size_t alignment, size_t size, int core);");
    h.line("void* vitis_aligned_alloc(size_t alignment, size_t size);");
    h.line("#endif");

    let header = GeneratedFile::new(format!("{NUMA_ALLOC_HELPERS_NAME}.h"), h.finish());

    let mut c = CWriter::new();
    c.line("#ifndef _GNU_SOURCE");
    c.line("#define _GNU_SOURCE");
    c.line("#endif");
    c.line(format!("#include \"{NUMA_ALLOC_HELPERS_NAME}.h\""));
    c.line("#include <stdio.h>");
    c.line("#include <sched.h>");
    c.line("#include <unistd.h>");
    c.line("#include <pthread.h>");
    c.line("#include <mm_malloc.h>");
    c.blank();
    c.raw(NUMA_ALLOC_BODY);

    let source = GeneratedFile::new(format!("{NUMA_ALLOC_HELPERS_NAME}.c"), c.finish());
    (header, source)
}

const NUMA_ALLOC_BODY: &str = r#"typedef struct {
    size_t size;
    size_t alignment;
} vitis_aligned_malloc_args_t;

void* vitis_aligned_alloc(size_t alignment, size_t size) {
    //aligned_alloc requires the size to be a multiple of the alignment
    size_t allocSize = size + (size % alignment == 0 ? 0 : alignment - (size % alignment));
    return aligned_alloc(alignment, allocSize);
}

#if __APPLE__
//Affinity based allocation is not available here
void* vitis_malloc_core(size_t size, int core) {
    printf("Warning, cannot allocate on a specific core on this platform\n");
    return malloc(size);
}

void* vitis__mm_malloc_core(size_t size, size_t alignment, int core) {
    printf("Warning, cannot allocate on a specific core on this platform\n");
    return _mm_malloc(size, alignment);
}

void* vitis_aligned_alloc_core(size_t alignment, size_t size, int core) {
    printf("Warning, cannot allocate on a specific core on this platform\n");
    return vitis_aligned_alloc(alignment, size);
}
#else
//Worker thread bodies: the allocation happens on a thread pinned to the
//target core so first-touch places the pages locally
static void* vitis_malloc_core_thread(void* argUncast) {
    size_t* size = (size_t*) argUncast;
    return malloc(*size);
}

static void* vitis__mm_malloc_core_thread(void* argUncast) {
    vitis_aligned_malloc_args_t* arg = (vitis_aligned_malloc_args_t*) argUncast;
    return _mm_malloc(arg->size, arg->alignment);
}

static void* vitis_aligned_alloc_core_thread(void* argUncast) {
    vitis_aligned_malloc_args_t* arg = (vitis_aligned_malloc_args_t*) argUncast;
    return vitis_aligned_alloc(arg->alignment, arg->size);
}

static void* vitis_run_on_core(void* (*fctn)(void*), void* arg, int core) {
    cpu_set_t cpuset;
    pthread_t thread;
    pthread_attr_t attr;
    void* res;

    int status = pthread_attr_init(&attr);
    if (status != 0) {
        printf("Could not create pthread attributes for core allocation ... exiting\n");
        exit(1);
    }

    CPU_ZERO(&cpuset);
    CPU_SET(core, &cpuset);
    status = pthread_attr_setaffinity_np(&attr, sizeof(cpu_set_t), &cpuset);
    if (status != 0) {
        printf("Could not set thread core affinity for core allocation ... exiting\n");
        exit(1);
    }

    status = pthread_create(&thread, &attr, fctn, arg);
    if (status != 0) {
        printf("Could not create a thread for core allocation ... exiting\n");
        perror(NULL);
        exit(1);
    }

    status = pthread_join(thread, &res);
    if (status != 0) {
        printf("Could not join a thread for core allocation ... exiting\n");
        perror(NULL);
        exit(1);
    }

    return res;
}

void* vitis_malloc_core(size_t size, int core) {
    return vitis_run_on_core(vitis_malloc_core_thread, &size, core);
}

void* vitis__mm_malloc_core(size_t size, size_t alignment, int core) {
    vitis_aligned_malloc_args_t args = {size, alignment};
    return vitis_run_on_core(vitis__mm_malloc_core_thread, &args, core);
}

void* vitis_aligned_alloc_core(size_t alignment, size_t size, int core) {
    vitis_aligned_malloc_args_t args = {size, alignment};
    return vitis_run_on_core(vitis_aligned_alloc_core_thread, &args, core);
}
#endif
"#;

/// The telemetry configuration consumed by external dashboards: dump file
/// per partition, the core map and the canonical column names
pub fn emit_telem_config(graph: &Graph, config: &EmitConfig) -> GeneratedFile {
    let telem = &config.telemetry;
    let prefix = &telem.dump_file_prefix;

    let compute_files: serde_json::Map<String, serde_json::Value> = graph
        .partitions()
        .iter()
        .filter(|p| **p != IO_PARTITION)
        .map(|p| {
            (
                p.to_string(),
                json!(format!("{prefix}{}.csv", partition_suffix(*p))),
            )
        })
        .collect();

    let partition_to_cpu: serde_json::Map<String, serde_json::Value> = graph
        .partitions()
        .iter()
        .map(|p| {
            let core = config
                .core_for_partition(*p)
                .ok()
                .flatten()
                .map(|c| c.to_string())
                .unwrap_or_default();
            (p.to_string(), json!(core))
        })
        .collect();

    let value = json!({
        "name": config.design_name,
        "ioTelemFiles": { IO_PARTITION.to_string(): format!("{prefix}IO.csv") },
        "computeTelemFiles": compute_files,
        "partitionToCPU": partition_to_cpu,
        "computeTimeMetricName": "WaitingForComputeToFinish_s",
        "totalTimeMetricName": "TotalTime_s",
        "timestampSecName": "TimeStamp_s",
        "timestampNSecName": "TimeStamp_ns",
        "rateMSPSName": "Rate_msps",
        "waitingForInputFIFOsMetricName": "WaitingForInputFIFOs_s",
        "readingInputFIFOsMetricName": "ReadingInputFIFOs_s",
        "waitingForOutputFIFOsMetricName": "WaitingForOutputFIFOs_s",
        "writingOutputFIFOsMetricName": "WritingOutputFIFOs_s",
        "telemetryMiscMetricName": "Telemetry_Misc_s",
    });

    let contents = format!(
        "{}\n",
        serde_json::to_string_pretty(&value).expect("telemetry config to serialize")
    );
    GeneratedFile::new(format!("{prefix}telemConfig.json"), contents)
}

/// Short per-FIFO communication summary logged after the passes settled
pub fn log_communication_report(graph: &Graph) {
    for fifo_id in graph.fifo_nodes() {
        let fifo = graph.node(fifo_id).as_fifo().expect("node to be a FIFO");
        let block_bytes: usize = fifo.ports.iter().map(|p| p.block_bytes()).sum();
        info!(
            "FIFO {}: {} ports, {} per block, {} buffered ({} blocks)",
            fifo.name,
            fifo.ports.len(),
            bytesize::ByteSize::b(block_bytes as u64),
            fifo.buffer_size_display(),
            fifo.capacity_blocks
        );
    }
}

/// Copy modes actually present, for deciding which support files to emit
pub fn copy_modes_used(graph: &Graph) -> Vec<CopyMode> {
    graph
        .fifo_nodes()
        .iter()
        .filter_map(|id| graph.node(*id).as_fifo().map(|f| f.copy_mode))
        .sorted()
        .dedup()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminar_core::datatype::DataType;
    use laminar_core::fifo::{FifoPort, ThreadCrossingFifo};
    use laminar_core::graph::NodeKind;

    fn graph_with_fifo(copy_mode: CopyMode) -> Graph {
        let mut g = Graph::new();
        let mut fifo = ThreadCrossingFifo::new("PartitionCrossingFIFO_0_TO_1_0", 0, 1, 4);
        fifo.ports
            .push(FifoPort::new(DataType::new(false, true, false, 32), 1));
        fifo.copy_mode = copy_mode;
        g.add_node(
            "PartitionCrossingFIFO_0_TO_1_0",
            None,
            0,
            NodeKind::Fifo(fifo),
        );
        g
    }

    fn config() -> EmitConfig {
        serde_yaml::from_str(
            "design_name: toy\nfile_name_prefix: toy\n\
             telemetry:\n  dump_file_prefix: toy_telem_\n\
             partition_map: [3, 0, 1]\n",
        )
        .unwrap()
    }

    #[test]
    fn fifo_types_header_lists_records() {
        let g = graph_with_fifo(CopyMode::Memcpy);
        let header = emit_fifo_types_header(&g, &config());
        assert_eq!(header.name, "toy_fifoTypes.h");
        assert!(header.contents.contains("#ifndef TOY_FIFOTYPES_H"));
        assert!(header.contents.contains("} PartitionCrossingFIFO_0_TO_1_0_t;"));
    }

    #[test]
    fn simd_helper_only_when_requested() {
        assert!(emit_fifo_support_header(&graph_with_fifo(CopyMode::Memcpy), &config()).is_none());

        let with_simd =
            emit_fifo_support_header(&graph_with_fifo(CopyMode::SimdFastCopy), &config()).unwrap();
        assert!(with_simd.contents.contains("fast_copy_unaligned_ramp_in"));
        assert!(with_simd.contents.contains("__AVX__"));
        assert!(with_simd.contents.contains("restrict"));
    }

    #[test]
    fn platform_params_exports_alignment() {
        let params = emit_platform_params(&config());
        assert_eq!(params.name, "vitisPlatformParams.h");
        assert!(params.contents.contains("#define VITIS_MEM_ALIGNMENT (64)"));
    }

    #[test]
    fn numa_helpers_cover_all_four_entry_points() {
        let (header, source) = emit_numa_alloc_helpers();
        assert_eq!(header.name, "vitisNumaAllocHelpers.h");
        assert_eq!(source.name, "vitisNumaAllocHelpers.c");
        for fctn in [
            "vitis_malloc_core",
            "vitis__mm_malloc_core",
            "vitis_aligned_alloc_core",
            "vitis_aligned_alloc",
        ] {
            assert!(header.contents.contains(fctn));
            assert!(source.contents.contains(fctn));
        }
        assert!(source.contents.contains("pthread_attr_setaffinity_np"));
        assert!(source.contents.contains("#if __APPLE__"));
    }

    #[test]
    fn telem_config_names_files_and_columns() {
        let g = graph_with_fifo(CopyMode::Memcpy);
        let telem = emit_telem_config(&g, &config());
        assert_eq!(telem.name, "toy_telem_telemConfig.json");
        let parsed: serde_json::Value = serde_json::from_str(&telem.contents).unwrap();
        assert_eq!(parsed["name"], "toy");
        assert_eq!(parsed["rateMSPSName"], "Rate_msps");
        assert_eq!(parsed["computeTelemFiles"]["0"], "toy_telem_0.csv");
        assert_eq!(parsed["partitionToCPU"]["0"], "0");
    }
}

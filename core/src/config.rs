//! Configuration of the multi-threaded emitter
//!
//! The configuration selects how the generated program communicates
//! (copy mode, cursor caching, double buffering), how it is scheduled
//! (core pinning, SCHED_FIFO) and what it reports (telemetry level, dump
//! files, PAPI counters). It is deserialized from YAML next to the design
//! graph.
//!
//! ```rust
//! # use laminar_core::config::EmitConfig;
//! # let yaml = "
//! design_name: rx_chain
//! file_name_prefix: rx_chain
//! io_suffix: io
//! telemetry:
//!   level: rate_and_breakdown
//!   report_period: 1s
//!   dump_file_prefix: rx_chain_telem_
//! partition_map: [3, 0, 1]
//! double_buffer: none
//! copy_mode: memcpy
//! # ";
//! # serde_yaml::from_str::<EmitConfig>(yaml).unwrap();
//! ```
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, ResultExt, TypedResult};
use crate::fifo::{CachingPolicy, CopyMode};

/// How much the generated worker threads measure and report
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryLevel {
    #[default]
    None,
    /// Rate only: timestamps and megasamples per second
    RateOnly,
    /// Rate plus the time breakdown across loop phases
    RateAndBreakdown,
    /// PAPI counters sampled around the compute call only
    PapiComputeOnly,
    /// PAPI counters sampled across the whole loop body
    PapiFull,
}

impl TelemetryLevel {
    pub fn enabled(&self) -> bool {
        *self != TelemetryLevel::None
    }

    pub fn uses_papi(&self) -> bool {
        matches!(self, TelemetryLevel::PapiComputeOnly | TelemetryLevel::PapiFull)
    }

    pub fn breakdown(&self) -> bool {
        matches!(
            self,
            TelemetryLevel::RateAndBreakdown
                | TelemetryLevel::PapiComputeOnly
                | TelemetryLevel::PapiFull
        )
    }
}

/// Which side of the compute call keeps alternating working buffers
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DoubleBufferMode {
    #[default]
    None,
    Input,
    Output,
    InputAndOutput,
}

impl DoubleBufferMode {
    pub fn enabled(&self) -> bool {
        *self != DoubleBufferMode::None
    }

    pub fn inputs(&self) -> bool {
        matches!(self, DoubleBufferMode::Input | DoubleBufferMode::InputAndOutput)
    }

    pub fn outputs(&self) -> bool {
        matches!(self, DoubleBufferMode::Output | DoubleBufferMode::InputAndOutput)
    }
}

/// Scheduler variants understood by the upstream scheduler.  Only the
/// topological variant with context awareness is supported by this emitter.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerVariant {
    #[default]
    TopologicalContext,
    Topological,
    BottomUp,
}

/// Telemetry options
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub level: TelemetryLevel,

    /// In-loop poll divisor: the interval check runs every
    /// `report_freq_block_freq` iterations
    #[serde(default = "default_report_freq")]
    pub report_freq_block_freq: u32,

    /// Wall-clock interval between telemetry rows
    #[serde(with = "humantime_serde", default = "default_report_period")]
    pub report_period: Duration,

    /// Prefix of the per-partition CSV dump files; empty disables dumping
    #[serde(default)]
    pub dump_file_prefix: String,

    /// Accumulate over the run instead of resetting each interval
    #[serde(default)]
    pub averaged: bool,

    /// Header providing the PAPI helper functions; empty disables PAPI
    #[serde(default)]
    pub papi_helper_header: String,
}

fn default_report_freq() -> u32 {
    16
}

fn default_report_period() -> Duration {
    Duration::from_secs(1)
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: TelemetryLevel::default(),
            report_freq_block_freq: default_report_freq(),
            report_period: default_report_period(),
            dump_file_prefix: String::new(),
            averaged: false,
            papi_helper_header: String::new(),
        }
    }
}

/// Main configuration of the emitter
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmitConfig {
    /// Name of the design; prefixes every generated symbol
    pub design_name: String,

    /// Prefix of every generated file name
    pub file_name_prefix: String,

    /// Suffix of the I/O thread artifacts (e.g. `io`); the I/O thread entry
    /// symbol is `<design_name>_<io_suffix>_thread`
    #[serde(default = "default_io_suffix")]
    pub io_suffix: String,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Emit debug prints at thread startup and per loop milestone
    #[serde(default)]
    pub thread_debug_print: bool,

    #[serde(default)]
    pub fifo_index_caching: CachingPolicy,

    #[serde(default)]
    pub double_buffer: DoubleBufferMode,

    /// Request SCHED_FIFO with maximum priority for pinned threads
    #[serde(default)]
    pub use_sched_fifo: bool,

    #[serde(default)]
    pub copy_mode: CopyMode,

    /// CPU core per partition.  Position 0 is the I/O partition; position
    /// `p + 1` is partition `p`.  Empty skips pinning entirely.
    #[serde(default)]
    pub partition_map: Vec<i32>,

    /// Cache line / shared buffer alignment in bytes
    #[serde(default = "default_mem_alignment")]
    pub mem_alignment: u32,

    /// Base block size: samples processed per iteration of a partition's
    /// outer compute loop
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Default capacity in blocks for inserted FIFOs
    #[serde(default = "default_fifo_capacity")]
    pub fifo_capacity_blocks: usize,

    /// Generate FIFOs whose endpoints work directly on the shared buffer
    /// instead of copying through local scratch
    #[serde(default = "default_true")]
    pub in_place_fifos: bool,

    #[serde(default)]
    pub scheduler: SchedulerVariant,
}

fn default_io_suffix() -> String {
    "io".to_string()
}

fn default_mem_alignment() -> u32 {
    64
}

fn default_block_size() -> usize {
    1
}

fn default_fifo_capacity() -> usize {
    16
}

fn default_true() -> bool {
    true
}

impl EmitConfig {
    /// Resolves the CPU core for a partition from the partition map.
    /// Returns None if no map was provided (pinning skipped).
    pub fn core_for_partition(&self, partition: i32) -> TypedResult<Option<i32>> {
        if self.partition_map.is_empty() {
            return Ok(None);
        }

        if partition == crate::graph::IO_PARTITION {
            let core = self.partition_map[0];
            debug!("pinning the I/O thread to CPU {core}");
            return Ok(Some(core));
        }

        if partition < 0 || (partition as usize) >= self.partition_map.len() - 1 {
            return Err(anyhow!(
                "the partition map has no entry for partition {partition}"
            ))
            .typ(CompileError::Config);
        }

        let core = self.partition_map[partition as usize + 1];
        debug!("pinning partition {partition} to CPU {core}");
        Ok(Some(core))
    }

    /// Checks the option combinations this emitter refuses to generate
    pub fn validate(&self) -> TypedResult<()> {
        if self.scheduler != SchedulerVariant::TopologicalContext {
            return Err(anyhow!(
                "only the topological_context scheduler variant is supported, got {:?}",
                self.scheduler
            ))
            .typ(CompileError::UnsupportedConfig);
        }

        if self.design_name.is_empty() || self.file_name_prefix.is_empty() {
            return Err(anyhow!("design_name and file_name_prefix must be non-empty"))
                .typ(CompileError::Config);
        }

        if self.telemetry.level.uses_papi() && self.telemetry.papi_helper_header.is_empty() {
            return Err(anyhow!(
                "telemetry level {:?} requires telemetry.papi_helper_header",
                self.telemetry.level
            ))
            .typ(CompileError::Config);
        }

        if self.block_size == 0 {
            return Err(anyhow!("block_size must be at least 1")).typ(CompileError::Config);
        }

        if self.double_buffer.enabled() && !self.in_place_fifos {
            return Err(anyhow!(
                "double buffering requires in-place FIFOs; in_place_fifos is disabled"
            ))
            .typ(CompileError::UnsupportedConfig);
        }

        if self.mem_alignment == 0 || !self.mem_alignment.is_power_of_two() {
            return Err(anyhow!(
                "mem_alignment must be a power of two, got {}",
                self.mem_alignment
            ))
            .typ(CompileError::Config);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> EmitConfig {
        serde_yaml::from_str(
            "design_name: toy\n\
             file_name_prefix: toy\n",
        )
        .unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = minimal();
        assert_eq!(cfg.io_suffix, "io");
        assert_eq!(cfg.mem_alignment, 64);
        assert_eq!(cfg.telemetry.level, TelemetryLevel::None);
        assert_eq!(cfg.copy_mode, CopyMode::Memcpy);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partition_map_lookup() {
        let mut cfg = minimal();
        assert_eq!(cfg.core_for_partition(0).unwrap(), None);

        cfg.partition_map = vec![3, 0, 1];
        assert_eq!(
            cfg.core_for_partition(crate::graph::IO_PARTITION).unwrap(),
            Some(3)
        );
        assert_eq!(cfg.core_for_partition(0).unwrap(), Some(0));
        assert_eq!(cfg.core_for_partition(1).unwrap(), Some(1));
        assert_eq!(
            cfg.core_for_partition(2).unwrap_err().err(),
            CompileError::Config
        );
    }

    #[test]
    fn papi_requires_helper_header() {
        let mut cfg = minimal();
        cfg.telemetry.level = TelemetryLevel::PapiFull;
        assert_eq!(cfg.validate().unwrap_err().err(), CompileError::Config);
    }

    #[test]
    fn scheduler_variant_guard() {
        let mut cfg = minimal();
        cfg.scheduler = SchedulerVariant::BottomUp;
        assert_eq!(
            cfg.validate().unwrap_err().err(),
            CompileError::UnsupportedConfig
        );
    }
}

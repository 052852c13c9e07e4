//! Benchmark profiles and fio command-line construction.
//!
//! A profile is either one of the built-in presets or a custom flag string.
//! Every profile forces terse v5 output with total-latency percentiles and
//! group reporting, because the terse decoder expects exactly that layout.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Flags every run gets so the output matches the terse v5 field table.
pub const TERSE_OUTPUT_FLAGS: &[&str] = &[
    "--output-format=terse",
    "--terse-version=5",
    "--lat_percentiles=1",
    "--clat_percentiles=0",
    "--group_reporting",
];

/// Errors raised while validating a benchmark profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("custom fio flags must be supplied when the benchmark is custom")]
    MissingCustomFlags,

    #[error("custom fio flags cannot contain the flag --output-format or --output")]
    ConflictingOutputFlag,

    #[error("custom fio flags cannot contain any percentile related flags")]
    ConflictingPercentileFlag,

    #[error("benchmark runtime must be at least one second")]
    ZeroRuntime,

    #[error("status update interval must be at least one second")]
    ZeroStatusInterval,
}

/// The closed set of benchmark presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkKind {
    /// Random read/write, 4 jobs, deep queue.
    Iops,
    /// Random read/write, single job, queue depth 1.
    #[default]
    Latency,
    /// Sequential read/write with large blocks.
    Throughput,
    /// Operator-supplied fio flags.
    Custom,
}

impl BenchmarkKind {
    pub const ALL: [BenchmarkKind; 4] = [
        BenchmarkKind::Iops,
        BenchmarkKind::Latency,
        BenchmarkKind::Throughput,
        BenchmarkKind::Custom,
    ];

    /// Label value used on every exported gauge.
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkKind::Iops => "iops",
            BenchmarkKind::Latency => "latency",
            BenchmarkKind::Throughput => "throughput",
            BenchmarkKind::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Workload flags of a preset. Custom has none of its own.
    pub fn preset_flags(&self) -> &'static [&'static str] {
        match self {
            BenchmarkKind::Iops => &[
                "--name=iops",
                "--numjobs=4",
                "--ioengine=libaio",
                "--direct=1",
                "--bs=4k",
                "--iodepth=128",
                "--readwrite=randrw",
            ],
            BenchmarkKind::Latency => &[
                "--name=latency",
                "--numjobs=1",
                "--ioengine=libaio",
                "--direct=1",
                "--bs=4k",
                "--iodepth=1",
                "--readwrite=randrw",
            ],
            BenchmarkKind::Throughput => &[
                "--name=throughput",
                "--numjobs=4",
                "--ioengine=libaio",
                "--direct=1",
                "--bs=128k",
                "--iodepth=64",
                "--readwrite=rw",
            ],
            BenchmarkKind::Custom => &[],
        }
    }
}

impl std::fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, validated benchmark selection.
///
/// Construct through [`BenchmarkProfile::new`] so the custom-flag checks
/// always run before anything is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkProfile {
    kind: BenchmarkKind,
    custom_flags: Option<String>,
    directory: PathBuf,
    file_size: String,
    runtime_secs: u64,
    status_interval_secs: Option<u64>,
}

/// Unvalidated profile inputs, as read from flags or the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSettings {
    pub kind: BenchmarkKind,
    pub custom_flags: Option<String>,
    pub directory: PathBuf,
    pub file_size: String,
    pub runtime_secs: u64,
    pub status_interval_secs: Option<u64>,
}

impl BenchmarkProfile {
    pub fn new(settings: ProfileSettings) -> Result<Self, ProfileError> {
        let custom_flags = settings
            .custom_flags
            .map(|flags| flags.trim().to_string())
            .filter(|flags| !flags.is_empty());

        if settings.kind == BenchmarkKind::Custom {
            let flags = custom_flags
                .as_deref()
                .ok_or(ProfileError::MissingCustomFlags)?;
            validate_custom_flags(flags)?;
        }

        if settings.runtime_secs == 0 {
            return Err(ProfileError::ZeroRuntime);
        }
        if settings.status_interval_secs == Some(0) {
            return Err(ProfileError::ZeroStatusInterval);
        }

        Ok(Self {
            kind: settings.kind,
            custom_flags,
            directory: settings.directory,
            file_size: settings.file_size,
            runtime_secs: settings.runtime_secs,
            status_interval_secs: settings.status_interval_secs,
        })
    }

    /// The `benchmark` label value for exported gauges.
    pub fn label(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn status_interval_secs(&self) -> Option<u64> {
        self.status_interval_secs
    }

    /// Resolve the full fio argument list (without the program name).
    pub fn command_args(&self) -> Vec<String> {
        if self.kind == BenchmarkKind::Custom {
            let custom = self.custom_flags.as_deref().unwrap_or_default();
            return TERSE_OUTPUT_FLAGS
                .iter()
                .map(|flag| flag.to_string())
                .chain(custom.split_whitespace().map(str::to_string))
                .collect();
        }

        let mut args: Vec<String> = self
            .kind
            .preset_flags()
            .iter()
            .map(|flag| flag.to_string())
            .collect();
        if let Some(secs) = self.status_interval_secs {
            args.push(format!("--status-interval={secs}"));
        }
        args.push(format!("--directory={}", self.directory.display()));
        args.push(format!("--size={}", self.file_size));
        args.push(format!("--runtime={}", self.runtime_secs));
        args.push("--time_based".to_string());
        args.extend(TERSE_OUTPUT_FLAGS.iter().map(|flag| flag.to_string()));
        args
    }
}

/// Reject custom flags that would change the output layout.
pub fn validate_custom_flags(flags: &str) -> Result<(), ProfileError> {
    if flags.trim().is_empty() {
        return Err(ProfileError::MissingCustomFlags);
    }
    if flags.contains("output") {
        return Err(ProfileError::ConflictingOutputFlag);
    }
    if flags.contains("percentile") {
        return Err(ProfileError::ConflictingPercentileFlag);
    }
    Ok(())
}

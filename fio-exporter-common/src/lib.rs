//! fio exporter - common library
//!
//! Benchmark profiles, configuration, logging and the terse record decoder
//! shared by the `fio-exporter` daemon and its tests.

#![forbid(unsafe_code)]

pub mod config;
pub mod logging;
pub mod profile;
pub mod terse;

pub use config::{ConfigError, ConfigLayer, ExporterConfig};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use profile::{BenchmarkKind, BenchmarkProfile, ProfileError, ProfileSettings};
pub use terse::{
    FIELD_TABLE, FieldError, FieldSpec, FieldTransform, MeasurementSet, Metric, MetricSink,
    RecordError, TERSE_V5_SIGNATURE, TerseRecord, decode_line,
};

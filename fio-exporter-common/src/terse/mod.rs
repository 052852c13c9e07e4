//! Decoding of fio terse v5 records into named measurements.
//!
//! A record is one semicolon-separated line. Each measurement in
//! [`FIELD_TABLE`] is decoded independently: a column that is missing or not
//! a number costs that one measurement and clears the record's success flag,
//! but never stops the other columns from being decoded and published.

pub mod fields;

pub use fields::{FIELD_TABLE, FieldSpec, FieldTransform, Metric, TERSE_V5_SIGNATURE};

use std::collections::BTreeMap;
use std::num::ParseFloatError;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a line was not treated as a terse record at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("empty line")]
    Empty,

    #[error("line does not have the fio terse v5 signature: {prefix:?}")]
    SignatureMismatch { prefix: String },
}

/// Why a single measurement could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{metric} (field {index}): record has only {available} fields")]
    MissingField {
        metric: Metric,
        index: usize,
        available: usize,
    },

    #[error("{metric} (field {index}): expected key=value, got {raw:?}")]
    MissingValue {
        metric: Metric,
        index: usize,
        raw: String,
    },

    #[error("{metric} (field {index}): invalid number {raw:?}: {source}")]
    InvalidNumber {
        metric: Metric,
        index: usize,
        raw: String,
        #[source]
        source: ParseFloatError,
    },
}

impl FieldError {
    pub fn metric(&self) -> Metric {
        match self {
            FieldError::MissingField { metric, .. }
            | FieldError::MissingValue { metric, .. }
            | FieldError::InvalidNumber { metric, .. } => *metric,
        }
    }
}

/// Where decoded measurements end up.
///
/// Implementations must make each call atomic and visible to readers
/// immediately; the scheduler guarantees a single writer per benchmark label.
pub trait MetricSink: Send + Sync {
    /// Set the gauge for `metric` under the given benchmark label.
    fn set_measurement(&self, benchmark: &str, metric: Metric, value: f64);

    /// Set the record-level success indicator.
    fn set_success(&self, benchmark: &str, success: bool);

    /// Count a field that failed to decode.
    fn record_field_error(&self, _benchmark: &str, _metric: Metric) {}

    /// Count a completed run.
    fn record_run(&self, _benchmark: &str) {}
}

/// One line of terse output split into positional fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerseRecord<'a> {
    fields: Vec<&'a str>,
}

impl<'a> TerseRecord<'a> {
    /// Check the signature and split the line. No field is decoded yet.
    pub fn parse(line: &'a str) -> Result<Self, RecordError> {
        if line.is_empty() {
            return Err(RecordError::Empty);
        }
        if !line.starts_with(TERSE_V5_SIGNATURE) {
            let prefix: String = line.chars().take(TERSE_V5_SIGNATURE.len()).collect();
            return Err(RecordError::SignatureMismatch { prefix });
        }
        Ok(Self {
            fields: line.split(';').collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&'a str> {
        self.fields.get(index).copied()
    }

    /// Decode a single table entry.
    pub fn decode_field(&self, spec: &FieldSpec) -> Result<f64, FieldError> {
        let raw = self.field(spec.index).ok_or(FieldError::MissingField {
            metric: spec.metric,
            index: spec.index,
            available: self.len(),
        })?;
        let value = spec
            .transform
            .extract(raw)
            .ok_or_else(|| FieldError::MissingValue {
                metric: spec.metric,
                index: spec.index,
                raw: raw.to_string(),
            })?;
        value
            .parse::<f64>()
            .map_err(|source| FieldError::InvalidNumber {
                metric: spec.metric,
                index: spec.index,
                raw: raw.to_string(),
                source,
            })
    }

    /// Decode every table entry into a measurement set.
    pub fn decode(&self) -> MeasurementSet {
        let mut set = MeasurementSet::default();
        for spec in FIELD_TABLE.iter() {
            match self.decode_field(spec) {
                Ok(value) => set.insert(spec.metric, value),
                Err(err) => set.push_failure(err),
            }
        }
        set
    }
}

/// Named values decoded from one record, plus the fields that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementSet {
    values: BTreeMap<Metric, f64>,
    failures: Vec<FieldError>,
}

impl MeasurementSet {
    fn insert(&mut self, metric: Metric, value: f64) {
        self.values.insert(metric, value);
    }

    fn push_failure(&mut self, err: FieldError) {
        self.failures.push(err);
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    pub fn values(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.values.iter().map(|(metric, value)| (*metric, *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn failures(&self) -> &[FieldError] {
        &self.failures
    }

    /// True when every field in the table decoded.
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Push decoded values to the sink. Failed fields keep whatever value the
    /// sink held before.
    pub fn publish(&self, sink: &dyn MetricSink, benchmark: &str) {
        for (metric, value) in self.values() {
            sink.set_measurement(benchmark, metric, value);
        }
        for failure in &self.failures {
            sink.record_field_error(benchmark, failure.metric());
        }
        sink.set_success(benchmark, self.success());
    }
}

/// Decode one output line, logging why it was discarded or which fields
/// failed. Returns `None` for lines that are not terse v5 records.
pub fn decode_line(line: &str) -> Option<MeasurementSet> {
    let record = match TerseRecord::parse(line) {
        Ok(record) => record,
        Err(RecordError::Empty) => return None,
        Err(err) => {
            warn!("{}, skipping", err);
            return None;
        }
    };

    debug!(fields = record.len(), "fio update: {}", line);
    let set = record.decode();
    for failure in set.failures() {
        warn!(metric = %failure.metric(), "error parsing terse field: {}", failure);
    }
    Some(set)
}

//! Prometheus metrics for the exporter.
//!
//! One gauge vector per terse measurement, plus the success indicator and a
//! handful of exporter self-metrics. All vectors carry the `benchmark` label.

use anyhow::Result;
use fio_exporter_common::{FIELD_TABLE, Metric, MetricSink};
use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::BTreeMap;

/// Label attached to every fio gauge.
pub const BENCHMARK_LABEL: &str = "benchmark";

lazy_static! {
    /// Global Prometheus registry served on `/metrics`.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Gauges fed by the scheduler.
    pub static ref FIO_GAUGES: FioGauges =
        FioGauges::new().expect("Failed to create fio gauges");

    /// Exporter version info (always 1, with version label).
    pub static ref EXPORTER_INFO: GaugeVec = GaugeVec::new(
        Opts::new("fio_exporter_info", "Exporter version info (always 1)"),
        &["version"]
    ).expect("Failed to create EXPORTER_INFO metric");
}

/// The fio gauge set, registrable on any registry.
///
/// Tests build their own instance on a private registry so runs do not
/// interfere through the global one.
#[derive(Clone)]
pub struct FioGauges {
    measurements: BTreeMap<Metric, GaugeVec>,
    success: GaugeVec,
    runs_total: CounterVec,
    field_errors_total: CounterVec,
    last_record_timestamp: GaugeVec,
}

impl FioGauges {
    pub fn new() -> prometheus::Result<Self> {
        let mut measurements = BTreeMap::new();
        for spec in FIELD_TABLE.iter() {
            let gauge = GaugeVec::new(
                Opts::new(spec.metric.name(), spec.metric.help()),
                &[BENCHMARK_LABEL],
            )?;
            measurements.insert(spec.metric, gauge);
        }

        Ok(Self {
            measurements,
            success: GaugeVec::new(
                Opts::new(
                    "fio_benchmark_success",
                    "1 if last benchmark was successful, 0 otherwise",
                ),
                &[BENCHMARK_LABEL],
            )?,
            runs_total: CounterVec::new(
                Opts::new("fio_exporter_runs_total", "Completed fio runs"),
                &[BENCHMARK_LABEL],
            )?,
            field_errors_total: CounterVec::new(
                Opts::new(
                    "fio_exporter_field_errors_total",
                    "Terse fields that failed to decode",
                ),
                &[BENCHMARK_LABEL, "field"],
            )?,
            last_record_timestamp: GaugeVec::new(
                Opts::new(
                    "fio_exporter_last_record_timestamp_seconds",
                    "Unix timestamp of the last decoded terse record",
                ),
                &[BENCHMARK_LABEL],
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        for gauge in self.measurements.values() {
            registry.register(Box::new(gauge.clone()))?;
        }
        registry.register(Box::new(self.success.clone()))?;
        registry.register(Box::new(self.runs_total.clone()))?;
        registry.register(Box::new(self.field_errors_total.clone()))?;
        registry.register(Box::new(self.last_record_timestamp.clone()))?;
        Ok(())
    }

    /// Current value of a measurement gauge.
    #[cfg(test)]
    pub fn measurement(&self, benchmark: &str, metric: Metric) -> Option<f64> {
        self.measurements
            .get(&metric)
            .and_then(|gauge| gauge.get_metric_with_label_values(&[benchmark]).ok())
            .map(|gauge| gauge.get())
    }

    /// Current value of the success indicator, `None` before the first
    /// record for `benchmark` was decoded.
    pub fn success(&self, benchmark: &str) -> Option<f64> {
        observed(&self.success, benchmark, |m| m.get_gauge().get_value())
    }

    /// Completed runs, `None` before the first run finished.
    pub fn runs_total(&self, benchmark: &str) -> Option<f64> {
        observed(&self.runs_total, benchmark, |m| m.get_counter().get_value())
    }

    #[cfg(test)]
    pub fn field_errors_total(&self, benchmark: &str, metric: Metric) -> f64 {
        self.field_errors_total
            .with_label_values(&[benchmark, metric.name()])
            .get()
    }
}

/// Look up an existing labelled child. Unlike `with_label_values` this
/// never creates one, so reading does not add series to `/metrics`.
fn observed<C, F>(collector: &C, benchmark: &str, value: F) -> Option<f64>
where
    C: Collector,
    F: Fn(&prometheus::proto::Metric) -> f64,
{
    collector
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .find(|metric| {
            metric
                .get_label()
                .iter()
                .any(|label| label.get_name() == BENCHMARK_LABEL && label.get_value() == benchmark)
        })
        .map(value)
}

impl MetricSink for FioGauges {
    fn set_measurement(&self, benchmark: &str, metric: Metric, value: f64) {
        if let Some(gauge) = self.measurements.get(&metric) {
            gauge.with_label_values(&[benchmark]).set(value);
        }
    }

    fn set_success(&self, benchmark: &str, success: bool) {
        self.success
            .with_label_values(&[benchmark])
            .set(if success { 1.0 } else { 0.0 });
        self.last_record_timestamp
            .with_label_values(&[benchmark])
            .set(chrono::Utc::now().timestamp() as f64);
    }

    fn record_field_error(&self, benchmark: &str, metric: Metric) {
        self.field_errors_total
            .with_label_values(&[benchmark, metric.name()])
            .inc();
    }

    fn record_run(&self, benchmark: &str) {
        self.runs_total.with_label_values(&[benchmark]).inc();
    }
}

/// Register all metrics with the global registry.
///
/// Should be called once at startup.
pub fn register_metrics() -> Result<()> {
    FIO_GAUGES.register(&REGISTRY)?;
    REGISTRY.register(Box::new(EXPORTER_INFO.clone()))?;
    Ok(())
}

/// Set exporter info (call once at startup).
pub fn set_exporter_info(version: &str) {
    EXPORTER_INFO.with_label_values(&[version]).set(1.0);
}

/// Encode all metrics on `registry` as Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauges_on_private_registry() -> (FioGauges, Registry) {
        let registry = Registry::new();
        let gauges = FioGauges::new().unwrap();
        gauges.register(&registry).unwrap();
        (gauges, registry)
    }

    #[test]
    fn test_register_twice_fails() {
        let (gauges, registry) = gauges_on_private_registry();
        assert!(gauges.register(&registry).is_err());
    }

    #[test]
    fn test_sink_sets_labelled_gauge() {
        let (gauges, _registry) = gauges_on_private_registry();
        gauges.set_measurement("iops", Metric::ReadIops, 1234.0);
        gauges.set_measurement("latency", Metric::ReadIops, 17.0);

        assert_eq!(gauges.measurement("iops", Metric::ReadIops), Some(1234.0));
        assert_eq!(gauges.measurement("latency", Metric::ReadIops), Some(17.0));
    }

    #[test]
    fn test_success_and_field_errors() {
        let (gauges, _registry) = gauges_on_private_registry();
        assert_eq!(gauges.success("latency"), None);
        gauges.set_success("latency", true);
        assert_eq!(gauges.success("latency"), Some(1.0));
        gauges.set_success("latency", false);
        assert_eq!(gauges.success("latency"), Some(0.0));

        gauges.record_field_error("latency", Metric::CpuSys);
        gauges.record_field_error("latency", Metric::CpuSys);
        assert_eq!(gauges.field_errors_total("latency", Metric::CpuSys), 2.0);
    }

    #[test]
    fn test_reads_do_not_create_series() {
        let (gauges, registry) = gauges_on_private_registry();
        assert_eq!(gauges.success("iops"), None);
        assert_eq!(gauges.runs_total("iops"), None);

        let output = encode_registry(&registry).unwrap();
        assert!(!output.contains("fio_benchmark_success{"), "{output}");
        assert!(!output.contains("fio_exporter_runs_total{"), "{output}");

        gauges.record_run("iops");
        assert_eq!(gauges.runs_total("iops"), Some(1.0));
        assert_eq!(gauges.runs_total("latency"), None);
    }

    #[test]
    fn test_encode_contains_fio_names() {
        let (gauges, registry) = gauges_on_private_registry();
        gauges.set_measurement("throughput", Metric::WriteBandwidth, 512000.0);
        gauges.set_success("throughput", true);
        gauges.record_run("throughput");

        let output = encode_registry(&registry).unwrap();
        assert!(output.contains("# HELP fio_write_bandwidth_kbps Write bandwidth (KiB/s)"));
        assert!(output.contains("# TYPE fio_write_bandwidth_kbps gauge"));
        assert!(output.contains("fio_write_bandwidth_kbps{benchmark=\"throughput\"} 512000"));
        assert!(output.contains("fio_benchmark_success{benchmark=\"throughput\"} 1"));
        assert!(output.contains("fio_exporter_runs_total{benchmark=\"throughput\"} 1"));
    }
}

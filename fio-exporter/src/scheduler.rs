//! Benchmark scheduling.
//!
//! Exactly one fio run is in flight at any time. In repeat mode the next
//! deadline is fixed when a run starts, so slow runs do not push the cadence
//! out, and a new run starts only after both the deadline has passed and the
//! previous run has finished. Run-once mode performs a single run, waits so
//! a final scrape can happen, and returns.

use fio_exporter_common::{MetricSink, decode_line};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::info;

use crate::runner::{self, RunError, RunInvocation};

/// How often runs happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    /// Run forever; a zero interval runs back to back.
    Repeat { interval: Duration },
    /// Run once, then wait before returning.
    RunOnce { wait: Duration },
}

/// Outcome of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    /// Lines fio wrote to stdout.
    pub lines: usize,
    /// Lines accepted as terse v5 records.
    pub records: usize,
    /// Records with at least one field that failed to decode.
    pub failed_records: usize,
}

pub struct Scheduler {
    invocation: RunInvocation,
    benchmark: String,
    mode: ScheduleMode,
    sink: Arc<dyn MetricSink>,
}

impl Scheduler {
    pub fn new(
        invocation: RunInvocation,
        benchmark: impl Into<String>,
        mode: ScheduleMode,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            invocation,
            benchmark: benchmark.into(),
            mode,
            sink,
        }
    }

    /// Run fio once, publishing every record as it arrives.
    pub async fn run_cycle(&self) -> Result<CycleReport, RunError> {
        let mut report = CycleReport::default();
        let sink = self.sink.as_ref();
        let benchmark = self.benchmark.as_str();

        let summary = runner::run(&self.invocation, |line| {
            if let Some(set) = decode_line(line) {
                report.records += 1;
                if !set.success() {
                    report.failed_records += 1;
                }
                set.publish(sink, benchmark);
            }
        })
        .await?;

        report.lines = summary.lines;
        sink.record_run(benchmark);
        info!(
            benchmark,
            lines = report.lines,
            records = report.records,
            failed_records = report.failed_records,
            "Benchmark complete"
        );
        Ok(report)
    }

    /// Drive runs according to the mode.
    ///
    /// Returns `Ok` only in run-once mode after the wait has elapsed. Any
    /// run error ends the loop.
    pub async fn run(self) -> Result<(), RunError> {
        match self.mode {
            ScheduleMode::RunOnce { wait } => {
                self.run_cycle().await?;
                info!(
                    "Waiting for run-once wait of {} to expire",
                    humantime::format_duration(wait)
                );
                sleep(wait).await;
                Ok(())
            }
            ScheduleMode::Repeat { interval } => {
                info!(
                    "Configured interval: {}",
                    humantime::format_duration(interval)
                );
                loop {
                    let next_run = next_deadline(interval);
                    self.run_cycle().await?;
                    sleep_until(next_run).await;
                }
            }
        }
    }
}

/// Deadline `interval` from now. Intervals too large to represent land
/// roughly thirty years out, which in practice never fires.
fn next_deadline(interval: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(interval)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::metrics::FioGauges;
    use fio_exporter_common::{FIELD_TABLE, FieldTransform, Metric};
    use std::io::Write;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// FioGauges plus a log of every success value set.
    struct HistorySink {
        gauges: FioGauges,
        successes: Mutex<Vec<bool>>,
        runs: AtomicUsize,
    }

    impl HistorySink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gauges: FioGauges::new().unwrap(),
                successes: Mutex::new(Vec::new()),
                runs: AtomicUsize::new(0),
            })
        }
    }

    impl MetricSink for HistorySink {
        fn set_measurement(&self, benchmark: &str, metric: Metric, value: f64) {
            self.gauges.set_measurement(benchmark, metric, value);
        }

        fn set_success(&self, benchmark: &str, success: bool) {
            self.gauges.set_success(benchmark, success);
            self.successes.lock().unwrap().push(success);
        }

        fn record_run(&self, benchmark: &str) {
            self.gauges.record_run(benchmark);
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn terse_line(read_iops: f64) -> String {
        let mut fields: Vec<String> = vec!["0".to_string(); 160];
        fields[0] = "5".to_string();
        fields[1] = "fio-3.36".to_string();
        fields[2] = "latency".to_string();
        for spec in FIELD_TABLE.iter() {
            fields[spec.index] = match spec.transform {
                FieldTransform::Plain => "1.0".to_string(),
                FieldTransform::Percent => "50.0%".to_string(),
                FieldTransform::KeyValue => "90.000000%=250".to_string(),
            };
        }
        fields[7] = format!("{read_iops}");
        fields.join(";")
    }

    fn output_file(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn cat(file: &tempfile::NamedTempFile) -> RunInvocation {
        RunInvocation::new("cat", vec![file.path().display().to_string()])
    }

    #[tokio::test]
    async fn test_cycle_last_record_wins() {
        let output = output_file(&[
            "fio-3.36 starting".to_string(),
            terse_line(1000.0),
            terse_line(2500.0),
        ]);
        let sink = HistorySink::new();
        let scheduler = Scheduler::new(
            cat(&output),
            "latency",
            ScheduleMode::Repeat {
                interval: Duration::ZERO,
            },
            sink.clone(),
        );

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(
            report,
            CycleReport {
                lines: 3,
                records: 2,
                failed_records: 0
            }
        );
        assert_eq!(*sink.successes.lock().unwrap(), vec![true, true]);
        assert_eq!(
            sink.gauges.measurement("latency", Metric::ReadIops),
            Some(2500.0)
        );
        assert_eq!(sink.gauges.success("latency"), Some(1.0));
        assert_eq!(sink.gauges.runs_total("latency"), Some(1.0));
    }

    #[tokio::test]
    async fn test_failed_field_keeps_previous_value() {
        let line = terse_line(0.0);
        let mut fields: Vec<&str> = line.split(';').collect();
        fields[7] = "garbage";
        let broken = fields.join(";");

        let output = output_file(&[terse_line(4000.0), broken]);
        let sink = HistorySink::new();
        let scheduler = Scheduler::new(
            cat(&output),
            "iops",
            ScheduleMode::RunOnce {
                wait: Duration::ZERO,
            },
            sink.clone(),
        );

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.failed_records, 1);
        assert_eq!(*sink.successes.lock().unwrap(), vec![true, false]);
        assert_eq!(sink.gauges.measurement("iops", Metric::ReadIops), Some(4000.0));
        assert_eq!(sink.gauges.success("iops"), Some(0.0));
        assert_eq!(
            sink.gauges.measurement("iops", Metric::ReadBandwidth),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_repeat_zero_interval_runs_back_to_back() {
        let output = output_file(&[terse_line(10.0), terse_line(20.0)]);
        let sink = HistorySink::new();
        let scheduler = Scheduler::new(
            cat(&output),
            "latency",
            ScheduleMode::Repeat {
                interval: Duration::ZERO,
            },
            sink.clone(),
        );

        let handle = tokio::spawn(scheduler.run());
        let deadline = Instant::now() + Duration::from_secs(10);
        while sink.runs.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(sink.runs.load(Ordering::SeqCst) >= 2);
        assert!(sink.successes.lock().unwrap().iter().all(|s| *s));
        assert_eq!(
            sink.gauges.measurement("latency", Metric::ReadIops),
            Some(20.0)
        );
    }

    #[tokio::test]
    async fn test_repeat_interval_limits_cadence() {
        let sink = HistorySink::new();
        let scheduler = Scheduler::new(
            RunInvocation::new("true", vec![]),
            "throughput",
            ScheduleMode::Repeat {
                interval: Duration::from_millis(200),
            },
            sink.clone(),
        );

        let handle = tokio::spawn(scheduler.run());
        sleep(Duration::from_millis(500)).await;
        handle.abort();

        let runs = sink.runs.load(Ordering::SeqCst);
        assert!(runs >= 1, "expected at least one run, got {runs}");
        assert!(runs <= 3, "interval not honoured: {runs} runs in 500ms");
    }

    #[tokio::test]
    async fn test_unrepresentable_interval_waits_instead_of_panicking() {
        let interval = humantime::parse_duration("300000000000y").unwrap();
        for interval in [interval, Duration::MAX] {
            let sink = HistorySink::new();
            let scheduler = Scheduler::new(
                RunInvocation::new("true", vec![]),
                "latency",
                ScheduleMode::Repeat { interval },
                sink.clone(),
            );

            let outcome =
                tokio::time::timeout(Duration::from_millis(500), scheduler.run()).await;
            assert!(outcome.is_err(), "scheduler returned: {outcome:?}");
            assert_eq!(sink.runs.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_next_deadline_saturates() {
        let before = Instant::now();
        assert!(next_deadline(Duration::MAX) > before + Duration::from_secs(86400 * 365));
        let near = next_deadline(Duration::from_secs(5));
        assert!(near >= before + Duration::from_secs(5));
        assert!(near <= Instant::now() + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_once_returns_after_single_run() {
        let output = output_file(&[terse_line(7.0)]);
        let sink = HistorySink::new();
        let scheduler = Scheduler::new(
            cat(&output),
            "latency",
            ScheduleMode::RunOnce {
                wait: Duration::ZERO,
            },
            sink.clone(),
        );

        scheduler.run().await.unwrap();
        assert_eq!(sink.runs.load(Ordering::SeqCst), 1);
        assert_eq!(sink.gauges.measurement("latency", Metric::ReadIops), Some(7.0));
    }

    #[tokio::test]
    async fn test_run_failure_stops_repeat_loop() {
        let sink = HistorySink::new();
        let scheduler = Scheduler::new(
            RunInvocation::new("false", vec![]),
            "latency",
            ScheduleMode::Repeat {
                interval: Duration::ZERO,
            },
            sink.clone(),
        );

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, RunError::Failed { exit_code: 1, .. }));
        assert_eq!(sink.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal() {
        let sink = HistorySink::new();
        let scheduler = Scheduler::new(
            RunInvocation::new("/nonexistent/fio", vec![]),
            "latency",
            ScheduleMode::RunOnce {
                wait: Duration::ZERO,
            },
            sink.clone(),
        );

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
        assert!(sink.successes.lock().unwrap().is_empty());
    }
}

//! The terse v5 field table.
//!
//! fio's terse output is positional: which column holds which statistic is
//! fixed per terse version and nowhere self-described, except for the latency
//! percentile columns which read `90.000000%=1234`. This table is the single
//! place that records those positions. When fio reorders columns, fix it here
//! and replay a captured line through the decoder tests.

/// Every measurement exported from a terse record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    ReadBandwidth,
    ReadIops,
    ReadLatP90,
    ReadLatP95,
    ReadLatP99,
    ReadLatMin,
    ReadLatMax,
    ReadLatMean,
    ReadBwMin,
    ReadBwMax,
    ReadBwMean,
    ReadIopsMin,
    ReadIopsMax,
    ReadIopsMean,
    WriteBandwidth,
    WriteIops,
    WriteLatP90,
    WriteLatP95,
    WriteLatP99,
    WriteLatMin,
    WriteLatMax,
    WriteLatMean,
    WriteBwMin,
    WriteBwMax,
    WriteBwMean,
    WriteIopsMin,
    WriteIopsMax,
    WriteIopsMean,
    CpuUser,
    CpuSys,
    IoDepth1,
    IoDepth2,
    IoDepth4,
    IoDepth8,
    IoDepth16,
    IoDepth32,
    IoDepth64,
}

impl Metric {
    /// Prometheus metric name.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::ReadBandwidth => "fio_read_bandwidth_kbps",
            Metric::ReadIops => "fio_read_iops",
            Metric::ReadLatP90 => "fio_read_lat_pct90",
            Metric::ReadLatP95 => "fio_read_lat_pct95",
            Metric::ReadLatP99 => "fio_read_lat_pct99",
            Metric::ReadLatMin => "fio_read_lat_min",
            Metric::ReadLatMax => "fio_read_lat_max",
            Metric::ReadLatMean => "fio_read_lat_mean",
            Metric::ReadBwMin => "fio_read_bw_min_kb",
            Metric::ReadBwMax => "fio_read_bw_max_kb",
            Metric::ReadBwMean => "fio_read_bw_mean_kb",
            Metric::ReadIopsMin => "fio_read_iops_min",
            Metric::ReadIopsMax => "fio_read_iops_max",
            Metric::ReadIopsMean => "fio_read_iops_mean",
            Metric::WriteBandwidth => "fio_write_bandwidth_kbps",
            Metric::WriteIops => "fio_write_iops",
            Metric::WriteLatP90 => "fio_write_lat_pct90",
            Metric::WriteLatP95 => "fio_write_lat_pct95",
            Metric::WriteLatP99 => "fio_write_lat_pct99",
            Metric::WriteLatMin => "fio_write_lat_min",
            Metric::WriteLatMax => "fio_write_lat_max",
            Metric::WriteLatMean => "fio_write_lat_mean",
            Metric::WriteBwMin => "fio_write_bw_min_kb",
            Metric::WriteBwMax => "fio_write_bw_max_kb",
            Metric::WriteBwMean => "fio_write_bw_mean_kb",
            Metric::WriteIopsMin => "fio_write_iops_min",
            Metric::WriteIopsMax => "fio_write_iops_max",
            Metric::WriteIopsMean => "fio_write_iops_mean",
            Metric::CpuUser => "fio_cpu_user",
            Metric::CpuSys => "fio_cpu_sys",
            Metric::IoDepth1 => "fio_iodepth_1",
            Metric::IoDepth2 => "fio_iodepth_2",
            Metric::IoDepth4 => "fio_iodepth_4",
            Metric::IoDepth8 => "fio_iodepth_8",
            Metric::IoDepth16 => "fio_iodepth_16",
            Metric::IoDepth32 => "fio_iodepth_32",
            Metric::IoDepth64 => "fio_iodepth_64",
        }
    }

    /// One-line help text for the exposition format.
    pub fn help(&self) -> &'static str {
        match self {
            Metric::ReadBandwidth => "Read bandwidth (KiB/s)",
            Metric::ReadIops => "Read IOPS",
            Metric::ReadLatP90 => "Read total latency 90th percentile (usec)",
            Metric::ReadLatP95 => "Read total latency 95th percentile (usec)",
            Metric::ReadLatP99 => "Read total latency 99th percentile (usec)",
            Metric::ReadLatMin => "Read total latency minimum (usec)",
            Metric::ReadLatMax => "Read total latency maximum (usec)",
            Metric::ReadLatMean => "Read total latency mean (usec)",
            Metric::ReadBwMin => "Read bandwidth minimum (KiB/s)",
            Metric::ReadBwMax => "Read bandwidth maximum (KiB/s)",
            Metric::ReadBwMean => "Read bandwidth mean (KiB/s)",
            Metric::ReadIopsMin => "Read IOPS minimum",
            Metric::ReadIopsMax => "Read IOPS maximum",
            Metric::ReadIopsMean => "Read IOPS mean",
            Metric::WriteBandwidth => "Write bandwidth (KiB/s)",
            Metric::WriteIops => "Write IOPS",
            Metric::WriteLatP90 => "Write total latency 90th percentile (usec)",
            Metric::WriteLatP95 => "Write total latency 95th percentile (usec)",
            Metric::WriteLatP99 => "Write total latency 99th percentile (usec)",
            Metric::WriteLatMin => "Write total latency minimum (usec)",
            Metric::WriteLatMax => "Write total latency maximum (usec)",
            Metric::WriteLatMean => "Write total latency mean (usec)",
            Metric::WriteBwMin => "Write bandwidth minimum (KiB/s)",
            Metric::WriteBwMax => "Write bandwidth maximum (KiB/s)",
            Metric::WriteBwMean => "Write bandwidth mean (KiB/s)",
            Metric::WriteIopsMin => "Write IOPS minimum",
            Metric::WriteIopsMax => "Write IOPS maximum",
            Metric::WriteIopsMean => "Write IOPS mean",
            Metric::CpuUser => "User CPU utilization (%)",
            Metric::CpuSys => "System CPU utilization (%)",
            Metric::IoDepth1 => "Queue depth <=1 (%)",
            Metric::IoDepth2 => "Queue depth 2 (%)",
            Metric::IoDepth4 => "Queue depth 4 (%)",
            Metric::IoDepth8 => "Queue depth 8 (%)",
            Metric::IoDepth16 => "Queue depth 16 (%)",
            Metric::IoDepth32 => "Queue depth 32 (%)",
            Metric::IoDepth64 => "Queue depth 64+ (%)",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a raw column is turned into the substring handed to the float parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTransform {
    /// The column is the number.
    Plain,
    /// Trailing `%` removed, e.g. `12.5%`.
    Percent,
    /// Self-labelled `key=value` column; the value half is the number.
    KeyValue,
}

impl FieldTransform {
    /// Extract the numeric substring, or `None` when the column lacks the
    /// shape this transform expects.
    pub fn extract<'a>(&self, raw: &'a str) -> Option<&'a str> {
        match self {
            FieldTransform::Plain => Some(raw),
            FieldTransform::Percent => Some(raw.trim_end_matches('%')),
            FieldTransform::KeyValue => raw.split('=').nth(1),
        }
    }
}

/// Position and decoding rule for one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub metric: Metric,
    pub index: usize,
    pub transform: FieldTransform,
}

const fn plain(metric: Metric, index: usize) -> FieldSpec {
    FieldSpec {
        metric,
        index,
        transform: FieldTransform::Plain,
    }
}

const fn percent(metric: Metric, index: usize) -> FieldSpec {
    FieldSpec {
        metric,
        index,
        transform: FieldTransform::Percent,
    }
}

const fn key_value(metric: Metric, index: usize) -> FieldSpec {
    FieldSpec {
        metric,
        index,
        transform: FieldTransform::KeyValue,
    }
}

/// Column 0 is the terse version, column 1 the fio version string.
pub const TERSE_V5_SIGNATURE: &str = "5;fio-";

/// Terse v5 layout with `--lat_percentiles=1 --clat_percentiles=0`.
pub const FIELD_TABLE: [FieldSpec; 37] = [
    // read status
    plain(Metric::ReadBandwidth, 6),
    plain(Metric::ReadIops, 7),
    key_value(Metric::ReadLatP90, 27),
    key_value(Metric::ReadLatP95, 28),
    key_value(Metric::ReadLatP99, 29),
    plain(Metric::ReadLatMin, 37),
    plain(Metric::ReadLatMax, 38),
    plain(Metric::ReadLatMean, 39),
    plain(Metric::ReadBwMin, 41),
    plain(Metric::ReadBwMax, 42),
    plain(Metric::ReadBwMean, 44),
    plain(Metric::ReadIopsMin, 47),
    plain(Metric::ReadIopsMax, 48),
    plain(Metric::ReadIopsMean, 49),
    // write status
    plain(Metric::WriteBandwidth, 53),
    plain(Metric::WriteIops, 54),
    key_value(Metric::WriteLatP90, 74),
    key_value(Metric::WriteLatP95, 75),
    key_value(Metric::WriteLatP99, 76),
    plain(Metric::WriteLatMin, 84),
    plain(Metric::WriteLatMax, 85),
    plain(Metric::WriteLatMean, 86),
    plain(Metric::WriteBwMin, 88),
    plain(Metric::WriteBwMax, 89),
    plain(Metric::WriteBwMean, 91),
    plain(Metric::WriteIopsMin, 94),
    plain(Metric::WriteIopsMax, 95),
    plain(Metric::WriteIopsMean, 96),
    // cpu usage
    percent(Metric::CpuUser, 146),
    percent(Metric::CpuSys, 147),
    // io depth distribution
    percent(Metric::IoDepth1, 151),
    percent(Metric::IoDepth2, 152),
    percent(Metric::IoDepth4, 153),
    percent(Metric::IoDepth8, 154),
    percent(Metric::IoDepth16, 155),
    percent(Metric::IoDepth32, 156),
    percent(Metric::IoDepth64, 157),
];

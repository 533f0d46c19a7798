// Result record shapes
//
// One PerformanceRecord per attempted backend, one StressRecord per load
// run. A measurement that fails still produces a record — the all-zero
// sentinel — so downstream consumers can assume row count == backends
// attempted.

use serde::{Deserialize, Serialize};

/// A record that can be appended to a fixed-schema CSV file
pub trait CsvRecord {
    /// Header line, without trailing newline
    const HEADER: &'static str;

    /// One data row, without trailing newline
    fn to_row(&self) -> String;
}

/// Startup/resource measurements for one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub platform: String,
    pub startup_time_sec: f64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub disk_mb: f64,
}

impl PerformanceRecord {
    /// All-zero sentinel row for a backend whose measurement failed
    pub fn sentinel(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            startup_time_sec: 0.0,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            disk_mb: 0.0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.startup_time_sec == 0.0
            && self.cpu_percent == 0.0
            && self.memory_mb == 0.0
            && self.disk_mb == 0.0
    }
}

impl CsvRecord for PerformanceRecord {
    const HEADER: &'static str = "platform,startup_time_sec,cpu_percent,memory_mb,disk_mb";

    fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.platform,
            fmt_metric(self.startup_time_sec),
            fmt_metric(self.cpu_percent),
            fmt_metric(self.memory_mb),
            fmt_metric(self.disk_mb),
        )
    }
}

/// Throughput/latency statistics for one load run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressRecord {
    pub platform: String,
    pub qps: f64,
    pub avg_latency_ms: f64,
    pub failed: u64,
    pub transfer_kbps: f64,
}

impl StressRecord {
    /// All-zero sentinel row for a load run that could not complete
    pub fn sentinel(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            qps: 0.0,
            avg_latency_ms: 0.0,
            failed: 0,
            transfer_kbps: 0.0,
        }
    }
}

impl CsvRecord for StressRecord {
    const HEADER: &'static str = "platform,qps,avg_latency_ms,failed,transfer_kbps";

    fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.platform,
            fmt_metric(self.qps),
            fmt_metric(self.avg_latency_ms),
            self.failed,
            fmt_metric(self.transfer_kbps),
        )
    }
}

/// Format a metric value for CSV output
///
/// Zero prints as a bare `0` so sentinel rows are exactly `name,0,0,0,0`.
fn fmt_metric(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("{:.2}", value)
    }
}

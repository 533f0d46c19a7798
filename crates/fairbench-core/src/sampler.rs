// CPU and memory sampling
//
// CPU is never read as an instantaneous percentage. The sampler opens a
// window over cumulative /proc tick counters, keeps the backend busy with a
// concurrent request burst for the whole window, closes the window, and
// derives percent from the tick delta. The same window discipline applies to
// both backend kinds, which is what makes the comparison fair.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::BurstConfig;
use crate::process::{ProcessSet, CLOCK_TICKS_PER_SEC};

/// One CPU-measurement window: tick counters and wall clock at both edges
#[derive(Debug, Clone, Copy)]
pub struct SamplingWindow {
    pub start_ticks: u64,
    pub end_ticks: u64,
    pub start_time: Instant,
    pub end_time: Instant,
}

impl SamplingWindow {
    pub fn cpu_percent(&self, clock_ticks_per_sec: f64) -> f64 {
        cpu_percent(
            self.start_ticks,
            self.end_ticks,
            clock_ticks_per_sec,
            (self.end_time - self.start_time).as_secs_f64(),
        )
    }
}

/// CPU percent from cumulative tick counters over a wall-clock window
///
/// `(Δticks / clk_tck) / Δwall × 100` — a deterministic function of work
/// done in the window, immune to sampling-granularity races.
pub fn cpu_percent(start_ticks: u64, end_ticks: u64, clock_ticks_per_sec: f64, wall_secs: f64) -> f64 {
    if wall_secs <= 0.0 || clock_ticks_per_sec <= 0.0 || end_ticks < start_ticks {
        return 0.0;
    }
    let cpu_secs = (end_ticks - start_ticks) as f64 / clock_ticks_per_sec;
    cpu_secs / wall_secs * 100.0
}

/// Backend-agnostic CPU/memory sampler
pub struct Sampler {
    client: reqwest::Client,
    burst: BurstConfig,
}

impl Sampler {
    pub fn new(client: reqwest::Client, burst: BurstConfig) -> Self {
        Self { client, burst }
    }

    /// CPU percent consumed by `set` while a request burst runs against
    /// `url`
    ///
    /// Returns 0 if the counters cannot be read at either edge; a failed
    /// CPU sample never aborts the measurement pass.
    pub async fn sample_cpu(&self, set: &ProcessSet, url: &str) -> f64 {
        let sys = crate::process::snapshot();
        let Some(start_ticks) = set.total_cpu_ticks(&sys) else {
            warn!("cpu sample skipped: no readable tick counters");
            return 0.0;
        };
        let start_time = Instant::now();

        self.run_burst(url).await;

        let sys = crate::process::snapshot();
        let end_time = Instant::now();
        let Some(end_ticks) = set.total_cpu_ticks(&sys) else {
            warn!("cpu sample skipped: tick counters vanished during window");
            return 0.0;
        };

        let window = SamplingWindow {
            start_ticks,
            end_ticks,
            start_time,
            end_time,
        };
        let percent = window.cpu_percent(CLOCK_TICKS_PER_SEC);
        debug!(
            start_ticks,
            end_ticks,
            wall = ?(end_time - start_time),
            percent,
            "cpu window closed"
        );
        percent
    }

    /// Resident memory of the set in MB, at a single instant
    ///
    /// Sampled after the CPU burst so the process set reflects a warmed,
    /// active backend rather than a freshly forked one.
    pub fn sample_memory(&self, set: &ProcessSet) -> f64 {
        let sys = crate::process::snapshot();
        crate::process::rss_sum_mb([set.total_rss_kb(&sys)])
    }

    /// Fixed-duration request burst with bounded concurrency
    ///
    /// Individual request failures are ignored: the burst exists to generate
    /// load inside the window, not to measure anything itself.
    async fn run_burst(&self, url: &str) {
        let deadline = Instant::now() + self.burst.duration;
        let semaphore = Arc::new(Semaphore::new(self.burst.concurrency));
        let mut tasks = JoinSet::new();

        while Instant::now() < deadline {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let client = self.client.clone();
            let url = url.to_string();
            tasks.spawn(async move {
                let _ = client
                    .get(&url)
                    .timeout(Duration::from_secs(2))
                    .send()
                    .await;
                drop(permit);
            });
        }

        while tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_percent_reference_values() {
        // 200 ticks at 100 Hz over a 2 s window: fully busy one core.
        assert_eq!(cpu_percent(1000, 1200, 100.0, 2.0), 100.0);
        // Half the ticks, same window: 50%.
        assert_eq!(cpu_percent(1000, 1100, 100.0, 2.0), 50.0);
        // No work done: 0%.
        assert_eq!(cpu_percent(1000, 1000, 100.0, 2.0), 0.0);
    }

    #[test]
    fn test_cpu_percent_degenerate_inputs() {
        // Counter went backwards (process restarted mid-window).
        assert_eq!(cpu_percent(1200, 1000, 100.0, 2.0), 0.0);
        assert_eq!(cpu_percent(0, 100, 100.0, 0.0), 0.0);
        assert_eq!(cpu_percent(0, 100, 0.0, 2.0), 0.0);
    }

    #[test]
    fn test_window_delegates_to_cpu_percent() {
        let start_time = Instant::now();
        let window = SamplingWindow {
            start_ticks: 1000,
            end_ticks: 1200,
            start_time,
            end_time: start_time + Duration::from_secs(2),
        };
        assert_eq!(window.cpu_percent(100.0), 100.0);
    }

    #[tokio::test]
    async fn test_burst_respects_duration() {
        // Burst against a closed port: every request fails fast, and the
        // loop must still stop at the deadline.
        let sampler = Sampler::new(
            reqwest::Client::new(),
            BurstConfig {
                duration: Duration::from_millis(100),
                concurrency: 4,
            },
        );

        let start = Instant::now();
        sampler.run_burst("http://127.0.0.1:9/").await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sample_cpu_empty_set_is_zero() {
        let sampler = Sampler::new(reqwest::Client::new(), BurstConfig {
            duration: Duration::from_millis(10),
            concurrency: 1,
        });
        let percent = sampler.sample_cpu(&ProcessSet::empty(), "http://127.0.0.1:9/").await;
        assert_eq!(percent, 0.0);
    }

    #[test]
    fn test_sample_memory_empty_set_is_zero() {
        let sampler = Sampler::new(reqwest::Client::new(), BurstConfig::default());
        assert_eq!(sampler.sample_memory(&ProcessSet::empty()), 0.0);
    }
}

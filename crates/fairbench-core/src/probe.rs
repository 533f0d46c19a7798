// Readiness and liveness probing
//
// A backend counts as ready only after three consecutive HTTP 200s from its
// root URL. A single 200 is not trusted: a server that has opened its
// listening socket can still flap while workers finish initializing, and a
// startup time stopped on the first 200 would under-report that backend.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, trace};

use crate::config::ProbeConfig;

/// Outcome of a readiness probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessResult {
    /// Whether the required consecutive-success streak was observed
    pub ready: bool,
    /// Time from probe start until the streak completed (or until the
    /// attempt budget ran out)
    pub elapsed: Duration,
}

/// Poll `url` until `required_successes` consecutive 200s or the attempt
/// budget is exhausted
///
/// Budget exhaustion is not an error: the caller treats `ready = false` as a
/// recoverable failure and emits a sentinel record.
pub async fn await_ready(client: &reqwest::Client, url: &str, cfg: &ProbeConfig) -> ReadinessResult {
    let start = Instant::now();
    let mut consecutive = 0u32;

    for attempt in 1..=cfg.max_attempts {
        let ok = matches!(
            client
                .get(url)
                .timeout(cfg.request_timeout)
                .send()
                .await,
            Ok(resp) if resp.status() == reqwest::StatusCode::OK
        );

        if ok {
            consecutive += 1;
            trace!(attempt, consecutive, "readiness probe succeeded");
            if consecutive >= cfg.required_successes {
                let elapsed = start.elapsed();
                debug!(?elapsed, attempt, "backend ready");
                return ReadinessResult {
                    ready: true,
                    elapsed,
                };
            }
        } else {
            // A failure resets the streak; the backend is flapping.
            consecutive = 0;
            trace!(attempt, "readiness probe failed");
        }

        tokio::time::sleep(cfg.interval).await;
    }

    ReadinessResult {
        ready: false,
        elapsed: start.elapsed(),
    }
}

/// Bounded liveness gate with jittered exponential backoff
///
/// Used before a full load run: there is no point handing an unreachable URL
/// to the load tool. Jitter avoids probing in lockstep with a backend that
/// restarts on a fixed cadence.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    /// Jitter factor (0.0-1.0)
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given attempt (1-based); the first attempt is
    /// immediate
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let retry_num = attempt - 1;
        let base = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(retry_num as i32 - 1);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_range = capped * self.jitter;
            let offset = rng.gen_range(-jitter_range..jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

/// Whether `url` answers HTTP 200 within the backoff budget
pub async fn await_live(client: &reqwest::Client, url: &str, policy: &BackoffPolicy) -> bool {
    for attempt in 1..=policy.max_attempts {
        let delay = policy.delay_for_attempt(attempt);
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        match client
            .get(url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => return true,
            Ok(resp) => debug!(attempt, status = %resp.status(), "liveness probe rejected"),
            Err(e) => debug!(attempt, error = %e, "liveness probe failed"),
        }
    }
    false
}

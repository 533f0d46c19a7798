// HTTP load generation
//
// Drives ApacheBench against a backend URL with fixed parameters. The same
// request count and concurrency are used for both backends; varying them
// between backends would invalidate the comparison. Concurrency is internal
// to ab — this module only gates, warms up, runs, and parses.

pub mod ab;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::StressConfig;
use crate::error::{BenchError, Result};
use crate::probe::{await_live, BackoffPolicy};
use crate::records::StressRecord;

pub struct LoadGenerator {
    client: reqwest::Client,
    /// ab binary name; overridable for an alternative install location
    binary: String,
    liveness: BackoffPolicy,
}

impl LoadGenerator {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            binary: "ab".to_string(),
            liveness: BackoffPolicy::default(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_liveness(mut self, policy: BackoffPolicy) -> Self {
        self.liveness = policy;
        self
    }

    /// Run one full load pass against `url`
    ///
    /// Errors here are recoverable by contract: the caller converts them to
    /// a zero StressRecord and continues with the next backend.
    pub async fn run(&self, url: &str, cfg: &StressConfig, platform: &str) -> Result<StressRecord> {
        if !await_live(&self.client, url, &self.liveness).await {
            return Err(BenchError::load_tool(format!(
                "{url} never answered 200 to the liveness probe"
            )));
        }

        // Warmup absorbs connection-pool and lazy-initialization costs so
        // the timed run sees steady state. Its statistics are discarded.
        info!(url, requests = cfg.warmup_requests, "warmup burst");
        if let Err(e) = self
            .invoke_ab(
                url,
                cfg.warmup_requests,
                u64::from(cfg.warmup_concurrency),
                cfg.keep_alive,
            )
            .await
        {
            warn!(error = %e, "warmup burst failed, continuing to timed run");
        }

        info!(
            url,
            requests = cfg.requests,
            concurrency = cfg.concurrency,
            keep_alive = cfg.keep_alive,
            "timed load run"
        );
        let output = self
            .invoke_ab(url, cfg.requests, u64::from(cfg.concurrency), cfg.keep_alive)
            .await?;

        let report = ab::parse(&output);
        debug!(?report, "parsed ab report");
        Ok(StressRecord {
            platform: platform.to_string(),
            qps: report.qps,
            avg_latency_ms: report.avg_latency_ms,
            failed: report.failed,
            transfer_kbps: report.transfer_kbps,
        })
    }

    async fn invoke_ab(
        &self,
        url: &str,
        requests: u64,
        concurrency: u64,
        keep_alive: bool,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-n")
            .arg(requests.to_string())
            .arg("-c")
            .arg(concurrency.to_string())
            .arg("-q");
        if keep_alive {
            cmd.arg("-k");
        }
        cmd.arg(url);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BenchError::tool_missing(self.binary.clone())
            } else {
                BenchError::load_tool(format!("failed to spawn {}: {e}", self.binary))
            }
        })?;

        if !output.status.success() {
            return Err(BenchError::load_tool(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

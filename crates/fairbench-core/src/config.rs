// Run configuration
//
// All configuration is resolved once at the boundary (CLI flag parsing) and
// passed down immutably. Nothing mutates these structs mid-run; a run that
// needs different parameters is a different run.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Which kind of backend an identity refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Vm,
    Container,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Vm => "vm",
            BackendKind::Container => "container",
        }
    }
}

/// Identity of one backend under measurement
///
/// Immutable once a run starts. The two backends bind distinct addresses by
/// default (loopback for the container, the VM's routable guest address for
/// the VM) precisely so the same numeric port never collides between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendIdentity {
    pub kind: BackendKind,
    /// Instance name (container name or VM instance name); also the
    /// `platform` label in CSV output
    pub name: String,
    /// Address the backend's service is reachable on from the host
    pub bind_addr: IpAddr,
    pub port: u16,
}

impl BackendIdentity {
    pub fn new(kind: BackendKind, name: impl Into<String>, bind_addr: IpAddr, port: u16) -> Self {
        Self {
            kind,
            name: name.into(),
            bind_addr,
            port,
        }
    }

    /// Root URL of the backend's HTTP service
    pub fn root_url(&self) -> String {
        format!("http://{}:{}/", self.bind_addr, self.port)
    }
}

/// Readiness probe parameters
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Delay between poll attempts
    pub interval: Duration,
    /// Total attempt budget; exhaustion means `ready = false`
    pub max_attempts: u32,
    /// Consecutive HTTP 200s required before the backend counts as ready
    pub required_successes: u32,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl ProbeConfig {
    /// Probe cadence for a container: it either starts in well under a
    /// second or not at all, so poll tightly.
    pub fn container() -> Self {
        Self {
            interval: Duration::from_millis(50),
            max_attempts: 240,
            required_successes: 3,
            request_timeout: Duration::from_secs(2),
        }
    }

    /// Probe cadence for a VM: boot variance is measured in seconds, so a
    /// longer interval with the same attempt budget.
    pub fn vm() -> Self {
        Self {
            interval: Duration::from_millis(250),
            max_attempts: 240,
            required_successes: 3,
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// CPU-window burst parameters
///
/// The burst exists so CPU is never sampled at idle; an idle sample would
/// read near-zero on both backends and make the comparison meaningless.
#[derive(Debug, Clone)]
pub struct BurstConfig {
    pub duration: Duration,
    pub concurrency: usize,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(2),
            concurrency: 8,
        }
    }
}

/// Configuration for the performance-measurement phase
#[derive(Debug, Clone)]
pub struct MeasureConfig {
    /// Directory for per-backend human-inspectable metric files
    pub output_dir: PathBuf,
    /// Performance CSV path
    pub perf_csv: PathBuf,
    pub burst: BurstConfig,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./results"),
            perf_csv: PathBuf::from("./results/performance_results.csv"),
            burst: BurstConfig::default(),
        }
    }
}

/// Configuration for one stress (load-generation) run
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Total requests in the timed run
    pub requests: u64,
    /// Concurrent connections in the timed run
    pub concurrency: u32,
    /// Use persistent connections
    pub keep_alive: bool,
    /// Stress CSV path
    pub output_csv: PathBuf,
    /// Warmup requests (statistics discarded)
    pub warmup_requests: u64,
    /// Warmup concurrency
    pub warmup_concurrency: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            requests: 10_000,
            concurrency: 50,
            keep_alive: false,
            output_csv: PathBuf::from("./results/stress_results.csv"),
            warmup_requests: 100,
            warmup_concurrency: 10,
        }
    }
}

impl StressConfig {
    pub fn with_requests(mut self, requests: u64) -> Self {
        self.requests = requests;
        self
    }

    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Validate the parameters; zero counts make no run at all
    pub fn validate(&self) -> Result<()> {
        if self.requests == 0 {
            return Err(BenchError::config("--requests must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(BenchError::config("--concurrency must be at least 1"));
        }
        if u64::from(self.concurrency) > self.requests {
            return Err(BenchError::config(
                "--concurrency cannot exceed --requests",
            ));
        }
        Ok(())
    }
}

/// Default loopback address used by the container backend
pub fn default_container_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

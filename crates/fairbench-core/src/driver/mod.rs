// Backend lifecycle drivers
//
// A driver owns the relationship with one backend for the duration of a run:
// it provisions a handle, starts the backend and times it to readiness,
// exposes the backend's process set for sampling, and reports its disk
// footprint. Drivers leave the backend running after measurement — teardown
// belongs to the external cleanup step, and the stress phase reuses the
// running backend.

pub mod container;
pub mod vm;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::BackendIdentity;
use crate::error::{BenchError, Result};
use crate::probe::ReadinessResult;
use crate::process::ProcessSet;

#[async_trait]
pub trait BackendDriver: Send + Sync {
    /// Lifecycle handle owned by this driver for one run
    type Handle: Send + Sync;

    fn identity(&self) -> &BackendIdentity;

    /// Validate the engine and backend exist and capture a handle; drops the
    /// OS page cache first so both backends start comparably cold
    async fn provision(&self) -> Result<Self::Handle>;

    /// Issue the start command and time until readiness
    ///
    /// `ready = false` after budget exhaustion is data, not an error: the
    /// caller records a sentinel row and continues.
    async fn start(&self, handle: &mut Self::Handle) -> Result<ReadinessResult>;

    /// All OS pids belonging to the backend (expanded to descendants at
    /// sample time)
    fn process_set(&self, handle: &Self::Handle) -> ProcessSet;

    /// Deploy-cost storage in MB; 0 when it cannot be determined
    async fn disk_footprint_mb(&self, handle: &Self::Handle) -> f64;

    /// Root URL for probes and load runs
    fn base_url(&self, _handle: &Self::Handle) -> String {
        self.identity().root_url()
    }

    /// Total reported startup time
    ///
    /// Default: readiness elapsed. The VM driver overrides this to add guest
    /// boot time — a VM's cold start genuinely includes kernel boot, while
    /// the container's equivalent cost is its create/start call. The
    /// asymmetry is the documented methodology, not a bug.
    fn startup_time_sec(&self, _handle: &Self::Handle, readiness: &ReadinessResult) -> f64 {
        if readiness.ready {
            readiness.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Run an engine command, collecting trimmed stdout
///
/// A missing binary maps to `ToolMissing` so the orchestrator can degrade
/// that backend to a sentinel row instead of crashing.
pub(crate) async fn run_engine_command(program: &str, args: &[&str]) -> Result<String> {
    debug!(program, ?args, "engine command");
    let output = Command::new(program).args(args).output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BenchError::tool_missing(program.to_string())
        } else {
            BenchError::engine(format!("failed to spawn {program}: {e}"))
        }
    })?;

    if !output.status.success() {
        return Err(BenchError::engine(format!(
            "{program} {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Best-effort OS page-cache drop before provisioning
///
/// Needs root; failure is logged and ignored. Both backends get the same
/// treatment, so a failed drop still leaves the comparison symmetric.
pub async fn drop_page_cache() {
    let _ = Command::new("sync").status().await;
    match std::fs::write("/proc/sys/vm/drop_caches", "3") {
        Ok(()) => debug!("page cache dropped"),
        Err(e) => warn!(error = %e, "could not drop page cache, continuing"),
    }
}

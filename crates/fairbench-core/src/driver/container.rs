// Container backend driver (docker CLI)

use async_trait::async_trait;
use tracing::{info, warn};

use super::{drop_page_cache, run_engine_command, BackendDriver};
use crate::config::{BackendIdentity, ProbeConfig};
use crate::error::{BenchError, Result};
use crate::probe::{await_ready, ReadinessResult};
use crate::process::ProcessSet;

pub struct ContainerDriver {
    identity: BackendIdentity,
    probe: ProbeConfig,
    client: reqwest::Client,
    engine: String,
}

/// Lifecycle handle for one container run
#[derive(Debug)]
pub struct ContainerHandle {
    /// Container init pid on the host, resolved from the engine after start
    root_pid: Option<u32>,
}

impl ContainerDriver {
    pub fn new(identity: BackendIdentity, client: reqwest::Client) -> Self {
        Self {
            identity,
            probe: ProbeConfig::container(),
            client,
            engine: "docker".to_string(),
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    async fn inspect(&self, format: &str) -> Result<String> {
        run_engine_command(
            &self.engine,
            &["inspect", "--format", format, &self.identity.name],
        )
        .await
    }
}

#[async_trait]
impl BackendDriver for ContainerDriver {
    type Handle = ContainerHandle;

    fn identity(&self) -> &BackendIdentity {
        &self.identity
    }

    async fn provision(&self) -> Result<Self::Handle> {
        // Engine reachable and container known, before anything is timed.
        run_engine_command(&self.engine, &["version", "--format", "{{.Server.Version}}"]).await?;
        let status = self.inspect("{{.State.Status}}").await?;
        info!(name = %self.identity.name, %status, "container provisioned");

        drop_page_cache().await;
        Ok(ContainerHandle { root_pid: None })
    }

    async fn start(&self, handle: &mut Self::Handle) -> Result<ReadinessResult> {
        // The timer covers the engine's start call plus service readiness.
        let started = std::time::Instant::now();
        run_engine_command(&self.engine, &["start", &self.identity.name]).await?;

        let probed = await_ready(&self.client, &self.identity.root_url(), &self.probe).await;
        let result = ReadinessResult {
            ready: probed.ready,
            elapsed: started.elapsed(),
        };

        if result.ready {
            // Resolve the init pid once from the engine; descendants (worker
            // processes) are expanded at sample time.
            match self.inspect("{{.State.Pid}}").await {
                Ok(pid_str) => match pid_str.parse::<u32>() {
                    Ok(pid) if pid > 0 => handle.root_pid = Some(pid),
                    _ => warn!(pid = %pid_str, "engine reported unusable container pid"),
                },
                Err(e) => warn!(error = %e, "could not resolve container pid"),
            }
        }

        Ok(result)
    }

    fn process_set(&self, handle: &Self::Handle) -> ProcessSet {
        match handle.root_pid {
            Some(pid) => ProcessSet::new(vec![pid]),
            None => ProcessSet::empty(),
        }
    }

    /// Image size: the complete runnable artifact is what deploying the
    /// container costs in storage
    async fn disk_footprint_mb(&self, _handle: &Self::Handle) -> f64 {
        let image = match self.inspect("{{.Config.Image}}").await {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "could not resolve container image");
                return 0.0;
            }
        };

        match run_engine_command(&self.engine, &["image", "inspect", "--format", "{{.Size}}", &image])
            .await
        {
            Ok(size) => size
                .parse::<f64>()
                .map(|bytes| bytes / (1024.0 * 1024.0))
                .unwrap_or_else(|_| {
                    warn!(size = %size, "unparseable image size");
                    0.0
                }),
            Err(e) => {
                warn!(error = %e, "image inspect failed");
                0.0
            }
        }
    }
}

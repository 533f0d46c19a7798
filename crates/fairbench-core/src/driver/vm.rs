// VM backend driver (multipass CLI)
//
// The VM's reported startup time is guest boot time plus service readiness:
// a VM cold start genuinely pays for a kernel boot, and hiding that would
// misrepresent the platform. Guest boot time comes from systemd-analyze
// inside the guest; the host-side cost of the VM (CPU, memory) is accounted
// against the hypervisor process tree, which is the only view of the guest
// the host's /proc has.

use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::{drop_page_cache, run_engine_command, BackendDriver};
use crate::config::{BackendIdentity, ProbeConfig};
use crate::error::{BenchError, Result};
use crate::probe::{await_ready, ReadinessResult};
use crate::process::{pids_matching_cmdline, snapshot, ProcessSet};

/// Guest paths whose on-disk size makes up the VM's deploy footprint:
/// server binary, configuration, static content, and logs. Shared libraries
/// are added from ldd output at sample time.
const DEFAULT_DISK_PATHS: &[&str] = &[
    "/usr/sbin/nginx",
    "/etc/nginx",
    "/usr/share/nginx",
    "/var/www/html",
    "/var/log/nginx",
];

/// Well-known file the resolved guest address is persisted to, for reuse by
/// the stress phase
pub const VM_IP_FILE: &str = "vm_ip.txt";

pub struct VmDriver {
    identity: BackendIdentity,
    probe: ProbeConfig,
    client: reqwest::Client,
    engine: String,
    /// Directory the resolved guest IP is persisted under
    output_dir: PathBuf,
    /// Guest binary whose footprint (plus its shared libraries) is measured
    server_binary: String,
    disk_paths: Vec<String>,
}

/// Lifecycle handle for one VM run
#[derive(Debug)]
pub struct VmHandle {
    guest_ip: Option<IpAddr>,
    /// Host-side hypervisor pids, resolved once at start
    hypervisor: ProcessSet,
    boot_time_sec: f64,
}

impl VmDriver {
    pub fn new(identity: BackendIdentity, client: reqwest::Client, output_dir: PathBuf) -> Self {
        Self {
            identity,
            probe: ProbeConfig::vm(),
            client,
            engine: "multipass".to_string(),
            output_dir,
            server_binary: "/usr/sbin/nginx".to_string(),
            disk_paths: DEFAULT_DISK_PATHS.iter().map(|s| s.to_string()).collect(),
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

    async fn exec_in_guest(&self, command: &str) -> Result<String> {
        run_engine_command(
            &self.engine,
            &["exec", &self.identity.name, "--", "sh", "-c", command],
        )
        .await
    }

    async fn resolve_guest_ip(&self) -> Result<IpAddr> {
        let raw = run_engine_command(
            &self.engine,
            &["info", &self.identity.name, "--format", "json"],
        )
        .await?;
        let info: Value = serde_json::from_str(&raw)
            .map_err(|e| BenchError::engine(format!("unparseable info output: {e}")))?;

        info["info"][&self.identity.name]["ipv4"]
            .as_array()
            .and_then(|addrs| addrs.first())
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                BenchError::engine(format!("no ipv4 address for instance {}", self.identity.name))
            })
    }

    fn persist_guest_ip(&self, ip: IpAddr) {
        let path = self.output_dir.join(VM_IP_FILE);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&path, format!("{ip}\n")) {
            warn!(error = %e, path = %path.display(), "could not persist guest ip");
        }
    }

    async fn guest_boot_time_sec(&self) -> f64 {
        match self.exec_in_guest("systemd-analyze").await {
            Ok(output) => parse_systemd_analyze(&output).unwrap_or_else(|| {
                warn!("unparseable systemd-analyze output, boot time degrades to 0");
                0.0
            }),
            Err(e) => {
                warn!(error = %e, "could not read guest boot time");
                0.0
            }
        }
    }
}

#[async_trait]
impl BackendDriver for VmDriver {
    type Handle = VmHandle;

    fn identity(&self) -> &BackendIdentity {
        &self.identity
    }

    async fn provision(&self) -> Result<Self::Handle> {
        run_engine_command(&self.engine, &["version"]).await?;
        info!(name = %self.identity.name, "vm provisioned");

        drop_page_cache().await;
        Ok(VmHandle {
            guest_ip: None,
            hypervisor: ProcessSet::empty(),
            boot_time_sec: 0.0,
        })
    }

    async fn start(&self, handle: &mut Self::Handle) -> Result<ReadinessResult> {
        let started = std::time::Instant::now();
        run_engine_command(&self.engine, &["start", &self.identity.name]).await?;

        let ip = self.resolve_guest_ip().await?;
        handle.guest_ip = Some(ip);
        self.persist_guest_ip(ip);

        let url = format!("http://{}:{}/", ip, self.identity.port);
        let probed = await_ready(&self.client, &url, &self.probe).await;
        let result = ReadinessResult {
            ready: probed.ready,
            elapsed: started.elapsed(),
        };

        if result.ready {
            // Pin the hypervisor process once; the instance name appears in
            // its command line. Sampling expands to descendants later.
            let sys = snapshot();
            let pids = pids_matching_cmdline(&sys, &["qemu", &self.identity.name]);
            handle.hypervisor = ProcessSet::new(pids);
            handle.boot_time_sec = self.guest_boot_time_sec().await;
        }

        Ok(result)
    }

    fn process_set(&self, handle: &Self::Handle) -> ProcessSet {
        handle.hypervisor.clone()
    }

    /// Sum of on-disk sizes of every file the installed server needs:
    /// binary, config, static content, logs, and the binary's shared
    /// libraries — the VM equivalent of a container image's size
    async fn disk_footprint_mb(&self, _handle: &Self::Handle) -> f64 {
        let mut paths = self.disk_paths.clone();

        match self.exec_in_guest(&format!("ldd {}", self.server_binary)).await {
            Ok(output) => paths.extend(parse_ldd_paths(&output)),
            Err(e) => warn!(error = %e, "ldd failed, shared libraries excluded from footprint"),
        }

        let du_cmd = format!("du -sb {} 2>/dev/null || true", paths.join(" "));
        match self.exec_in_guest(&du_cmd).await {
            Ok(output) => parse_du_total_bytes(&output) as f64 / (1024.0 * 1024.0),
            Err(e) => {
                warn!(error = %e, "du failed, disk footprint degrades to 0");
                0.0
            }
        }
    }

    fn base_url(&self, handle: &Self::Handle) -> String {
        match handle.guest_ip {
            Some(ip) => format!("http://{}:{}/", ip, self.identity.port),
            None => self.identity.root_url(),
        }
    }

    fn startup_time_sec(&self, handle: &Self::Handle, readiness: &ReadinessResult) -> f64 {
        if readiness.ready {
            handle.boot_time_sec + readiness.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Total bytes from `du -sb` output (`SIZE\tPATH` lines)
fn parse_du_total_bytes(output: &str) -> u64 {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|size| size.parse::<u64>().ok())
        .sum()
}

/// Library paths from ldd output (`libfoo.so => /path/libfoo.so (0x...)`)
fn parse_ldd_paths(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let (_, rest) = line.split_once("=>")?;
            let path = rest.split_whitespace().next()?;
            path.starts_with('/').then(|| path.to_string())
        })
        .collect()
}

/// Boot seconds from the systemd-analyze summary line
///
/// `Startup finished in 3.292s (kernel) + 11.289s (userspace) = 14.581s`;
/// the total after `=` may be spelled `1min 14.581s`.
fn parse_systemd_analyze(output: &str) -> Option<f64> {
    let line = output.lines().find(|l| l.contains("Startup finished"))?;
    let total = line.rsplit_once('=')?.1;

    let mut seconds = 0.0;
    let mut any = false;
    for token in total.split_whitespace() {
        if let Some(mins) = token.strip_suffix("min") {
            if let Ok(v) = mins.parse::<f64>() {
                seconds += v * 60.0;
                any = true;
            }
        } else if let Some(ms) = token.strip_suffix("ms") {
            if let Ok(v) = ms.parse::<f64>() {
                seconds += v / 1000.0;
                any = true;
            }
        } else if let Some(secs) = token.strip_suffix('s') {
            if let Ok(v) = secs.parse::<f64>() {
                seconds += v;
                any = true;
            }
        }
    }
    any.then_some(seconds)
}

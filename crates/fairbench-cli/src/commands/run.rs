// Full-pipeline command
//
// Measures both backends sequentially, then runs the stress phase against
// both with identical load parameters. Labels are shared between the
// performance file and the stress file so rows for the same backend line up.

use std::path::PathBuf;

use clap::Args;
use tracing::{error, info};

use fairbench_core::config::default_container_addr;
use fairbench_core::driver::vm::VM_IP_FILE;
use fairbench_core::orchestrator::{measure_backend, stress_backend};
use fairbench_core::{
    BackendIdentity, BackendKind, BurstConfig, ContainerDriver, LoadGenerator, MeasureConfig,
    ResultSink, StressConfig, StressRecord, VmDriver,
};

use super::{resolve_app_port, sampler_for, vm_placeholder_addr};

#[derive(Args)]
pub struct RunArgs {
    /// VM instance name
    #[arg(long, default_value = "ubuntu-vm")]
    pub vm_name: String,

    /// Container name
    #[arg(long, default_value = "bench-nginx")]
    pub container_name: String,

    /// Service port, same numeric port on both backends (they bind distinct
    /// addresses)
    #[arg(long, default_value = "8080")]
    pub app_port: u16,

    /// Directory for per-backend metric files
    #[arg(long, default_value = "./results")]
    pub output_dir: PathBuf,

    /// Performance CSV path
    #[arg(long, default_value = "./results/performance_results.csv")]
    pub perf_csv: PathBuf,

    /// Stress CSV path
    #[arg(long, default_value = "./results/stress_results.csv")]
    pub output_csv: PathBuf,

    /// Total requests per stress run
    #[arg(long, default_value = "10000")]
    pub requests: u64,

    /// Concurrent connections per stress run
    #[arg(long, default_value = "50")]
    pub concurrency: u32,

    /// Use persistent connections
    #[arg(long)]
    pub keep_alive: bool,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    // The container's loopback pair is the only host pair in play; the VM's
    // service binds inside the guest.
    let app_port = resolve_app_port(default_container_addr(), args.app_port)?;

    let client = reqwest::Client::new();
    let measure_cfg = MeasureConfig {
        output_dir: args.output_dir.clone(),
        perf_csv: args.perf_csv.clone(),
        burst: BurstConfig::default(),
    };
    let sampler = sampler_for(&measure_cfg);
    let perf_sink = ResultSink::new(&measure_cfg.perf_csv);

    // Phase 1: sequential measurement. One backend at a time owns the host.
    let vm_identity =
        BackendIdentity::new(BackendKind::Vm, &args.vm_name, vm_placeholder_addr(), app_port);
    let vm_driver = VmDriver::new(vm_identity, client.clone(), args.output_dir.clone());
    measure_backend(&vm_driver, &sampler, &perf_sink, &args.output_dir).await?;

    let container_identity = BackendIdentity::new(
        BackendKind::Container,
        &args.container_name,
        default_container_addr(),
        app_port,
    );
    let container_driver = ContainerDriver::new(container_identity.clone(), client.clone());
    measure_backend(&container_driver, &sampler, &perf_sink, &args.output_dir).await?;

    // Phase 2: stress both backends with identical parameters.
    let cfg = StressConfig {
        requests: args.requests,
        concurrency: args.concurrency,
        keep_alive: args.keep_alive,
        output_csv: args.output_csv.clone(),
        ..StressConfig::default()
    };
    let generator = LoadGenerator::new(client);
    let stress_sink = ResultSink::new(&cfg.output_csv);

    match persisted_vm_url(&args.output_dir, app_port) {
        Some(vm_url) => {
            stress_backend(&generator, &vm_url, &args.vm_name, &cfg, &stress_sink).await?;
        }
        None => {
            // No persisted guest address means the VM never reached
            // readiness. Guessing another URL would stress a different
            // backend under the VM's label, so record the failure instead.
            error!(
                backend = %args.vm_name,
                dir = %args.output_dir.display(),
                "no persisted guest address, recording stress sentinel"
            );
            stress_sink.append_row(&StressRecord::sentinel(&args.vm_name))?;
        }
    }

    stress_backend(
        &generator,
        &container_identity.root_url(),
        &args.container_name,
        &cfg,
        &stress_sink,
    )
    .await?;

    info!(
        perf = %args.perf_csv.display(),
        stress = %cfg.output_csv.display(),
        "run complete"
    );
    Ok(())
}

/// URL for the VM's service, from the address persisted during measurement
///
/// `None` when the file is absent or empty; there is no host address the VM
/// can be reached on instead.
fn persisted_vm_url(output_dir: &std::path::Path, port: u16) -> Option<String> {
    let ip = std::fs::read_to_string(output_dir.join(VM_IP_FILE)).ok()?;
    let ip = ip.trim();
    if ip.is_empty() {
        return None;
    }
    Some(format!("http://{ip}:{port}/"))
}

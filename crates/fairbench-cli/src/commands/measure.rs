// Per-backend measurement commands

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use fairbench_core::config::default_container_addr;
use fairbench_core::orchestrator::measure_backend;
use fairbench_core::{
    BackendIdentity, BackendKind, BurstConfig, ContainerDriver, CsvRecord, MeasureConfig,
    ResultSink, VmDriver,
};

use super::{resolve_app_port, sampler_for, vm_placeholder_addr};

#[derive(Args)]
pub struct VmArgs {
    /// VM instance name (also the CSV platform label)
    #[arg(long, default_value = "ubuntu-vm")]
    pub name: String,

    /// Port the server listens on inside the guest
    #[arg(long, default_value = "8080")]
    pub app_port: u16,

    /// Directory for per-backend metric files and the persisted guest IP
    #[arg(long, default_value = "./results")]
    pub output_dir: PathBuf,

    /// Performance CSV path
    #[arg(long, default_value = "./results/performance_results.csv")]
    pub perf_csv: PathBuf,
}

#[derive(Args)]
pub struct ContainerArgs {
    /// Container name (also the CSV platform label)
    #[arg(long = "container-name", default_value = "bench-nginx")]
    pub container_name: String,

    /// Host port the container's service is published on
    #[arg(long, default_value = "8080")]
    pub app_port: u16,

    /// Directory for per-backend metric files
    #[arg(long, default_value = "./results")]
    pub output_dir: PathBuf,

    /// Performance CSV path
    #[arg(long, default_value = "./results/performance_results.csv")]
    pub perf_csv: PathBuf,
}

pub async fn run_vm(args: VmArgs) -> anyhow::Result<()> {
    let app_port = resolve_app_port(vm_placeholder_addr(), args.app_port)?;
    let cfg = MeasureConfig {
        output_dir: args.output_dir,
        perf_csv: args.perf_csv,
        burst: BurstConfig::default(),
    };

    let identity = BackendIdentity::new(BackendKind::Vm, &args.name, vm_placeholder_addr(), app_port);
    let driver = VmDriver::new(identity, reqwest::Client::new(), cfg.output_dir.clone());
    let sink = ResultSink::new(&cfg.perf_csv);

    let record = measure_backend(&driver, &sampler_for(&cfg), &sink, &cfg.output_dir).await?;
    info!(row = %record.to_row(), "vm measured");
    Ok(())
}

pub async fn run_container(args: ContainerArgs) -> anyhow::Result<()> {
    let app_port = resolve_app_port(default_container_addr(), args.app_port)?;
    let cfg = MeasureConfig {
        output_dir: args.output_dir,
        perf_csv: args.perf_csv,
        burst: BurstConfig::default(),
    };

    let identity = BackendIdentity::new(
        BackendKind::Container,
        &args.container_name,
        default_container_addr(),
        app_port,
    );
    let driver = ContainerDriver::new(identity, reqwest::Client::new());
    let sink = ResultSink::new(&cfg.perf_csv);

    let record = measure_backend(&driver, &sampler_for(&cfg), &sink, &cfg.output_dir).await?;
    info!(row = %record.to_row(), "container measured");
    Ok(())
}

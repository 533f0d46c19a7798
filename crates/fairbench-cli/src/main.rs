// Fairbench CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing; every
// flag has a default so a bare subcommand is a valid run.
// Design Decision: Exit 0 even when measurements degraded to sentinel rows;
// non-zero only for configuration errors or unwritable output.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fairbench")]
#[command(about = "Fairly compare a VM backend and a container backend")]
#[command(version)]
pub struct Cli {
    /// Log filter (tracing syntax)
    #[arg(long, env = "FAIRBENCH_LOG", default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Measure the VM backend (startup, CPU, memory, disk)
    Vm(commands::measure::VmArgs),

    /// Measure the container backend (startup, CPU, memory, disk)
    Container(commands::measure::ContainerArgs),

    /// Run the HTTP load phase against one backend
    Stress(commands::stress::StressArgs),

    /// Full pipeline: measure both backends, then stress both
    Run(commands::run::RunArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command {
        Commands::Vm(args) => commands::measure::run_vm(args).await,
        Commands::Container(args) => commands::measure::run_container(args).await,
        Commands::Stress(args) => commands::stress::run(args).await,
        Commands::Run(args) => commands::run::run(args).await,
    }
}

// Load-generation command
//
// The URL can be given directly, or derived from the VM's persisted guest
// address so the stress phase can reuse a backend measured earlier in the
// same experiment.

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use fairbench_core::driver::vm::VM_IP_FILE;
use fairbench_core::orchestrator::stress_backend;
use fairbench_core::{BenchError, CsvRecord, LoadGenerator, ResultSink, StressConfig};

use super::validate_port;

#[derive(Args)]
pub struct StressArgs {
    /// Target URL; omit to reuse the persisted VM address
    #[arg(long)]
    pub url: Option<String>,

    /// Platform label for the CSV row (keep consistent with the
    /// performance file)
    #[arg(long, default_value = "ubuntu-vm")]
    pub platform: String,

    /// Port used when deriving the URL from the persisted VM address
    #[arg(long, default_value = "8080")]
    pub app_port: u16,

    /// Directory the VM address was persisted under
    #[arg(long, default_value = "./results")]
    pub output_dir: PathBuf,

    /// Total requests in the timed run
    #[arg(long, default_value = "10000")]
    pub requests: u64,

    /// Concurrent connections
    #[arg(long, default_value = "50")]
    pub concurrency: u32,

    /// Use persistent connections
    #[arg(long)]
    pub keep_alive: bool,

    /// Stress CSV path
    #[arg(long, default_value = "./results/stress_results.csv")]
    pub output_csv: PathBuf,
}

impl StressArgs {
    fn resolve_url(&self) -> Result<String, BenchError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let path = self.output_dir.join(VM_IP_FILE);
        let ip = std::fs::read_to_string(&path).map_err(|_| {
            BenchError::config(format!(
                "no --url given and no persisted address at {}",
                path.display()
            ))
        })?;
        Ok(format!("http://{}:{}/", ip.trim(), self.app_port))
    }
}

pub async fn run(args: StressArgs) -> anyhow::Result<()> {
    validate_port(args.app_port)?;
    let url = args.resolve_url()?;

    let cfg = StressConfig {
        requests: args.requests,
        concurrency: args.concurrency,
        keep_alive: args.keep_alive,
        output_csv: args.output_csv.clone(),
        ..StressConfig::default()
    };

    let generator = LoadGenerator::new(reqwest::Client::new());
    let sink = ResultSink::new(&cfg.output_csv);

    let record = stress_backend(&generator, &url, &args.platform, &cfg, &sink).await?;
    info!(row = %record.to_row(), "stress complete");
    Ok(())
}

// Run orchestration
//
// Backends are measured strictly sequentially: only one backend may own host
// CPU, memory, and page-cache state at a time, or both samples are
// contaminated by contention. Failure containment lives here — every
// attempted backend produces exactly one row per file, sentinel rows
// included, and only fatal errors (configuration, unwritable output)
// propagate out.

use std::path::Path;

use tracing::{error, info, warn};

use crate::config::StressConfig;
use crate::driver::BackendDriver;
use crate::error::{BenchError, Result};
use crate::loadgen::LoadGenerator;
use crate::ports;
use crate::records::{PerformanceRecord, StressRecord};
use crate::sampler::Sampler;
use crate::sink::ResultSink;

/// Measure one backend and append exactly one performance row
///
/// Recoverable failures (missing engine, readiness timeout) degrade to a
/// sentinel row; the error returned here is only ever fatal (the row could
/// not be written at all).
pub async fn measure_backend<D: BackendDriver>(
    driver: &D,
    sampler: &Sampler,
    sink: &ResultSink,
    output_dir: &Path,
) -> Result<PerformanceRecord> {
    let identity = driver.identity();
    let label = identity.name.clone();
    info!(backend = %label, kind = identity.kind.as_str(), "measuring backend");

    // Collision checks are scoped to the backend's own (address, port)
    // pair. An unspecified address is the VM's placeholder — its service
    // binds inside the guest and occupies no host pair, so a host-side
    // check would collide with whatever holds the same numeric port on any
    // interface (the container's loopback pair included).
    let host_pair_occupied = !identity.bind_addr.is_unspecified()
        && !ports::check_free(identity.bind_addr, identity.port);

    let record = if host_pair_occupied {
        // Something else already owns the pair; a cold start cannot be
        // measured against it.
        error!(
            addr = %identity.bind_addr,
            port = identity.port,
            "target port occupied, recording sentinel"
        );
        PerformanceRecord::sentinel(&label)
    } else {
        match run_measurement(driver, sampler).await {
            Ok(record) => record,
            Err(e) if !e.is_fatal() => {
                error!(backend = %label, error = %e, "measurement degraded to sentinel");
                PerformanceRecord::sentinel(&label)
            }
            Err(e) => return Err(e),
        }
    };

    sink.append_row(&record)?;
    persist_metric_files(output_dir, &record);
    Ok(record)
}

async fn run_measurement<D: BackendDriver>(
    driver: &D,
    sampler: &Sampler,
) -> Result<PerformanceRecord> {
    let mut handle = driver.provision().await?;
    let readiness = driver.start(&mut handle).await?;
    if !readiness.ready {
        return Err(BenchError::NotReady(driver.identity().name.clone()));
    }

    let startup_time_sec = driver.startup_time_sec(&handle, &readiness);
    let url = driver.base_url(&handle);
    let set = driver.process_set(&handle);

    // CPU first: its burst warms the backend, so the memory sample that
    // follows sees an active process set. Each sample degrades to 0 alone.
    let cpu_percent = sampler.sample_cpu(&set, &url).await;
    let memory_mb = sampler.sample_memory(&set);
    let disk_mb = driver.disk_footprint_mb(&handle).await;

    Ok(PerformanceRecord {
        platform: driver.identity().name.clone(),
        startup_time_sec,
        cpu_percent,
        memory_mb,
        disk_mb,
    })
}

/// Run the load phase against one backend URL and append exactly one stress
/// row
pub async fn stress_backend(
    generator: &LoadGenerator,
    url: &str,
    platform: &str,
    cfg: &StressConfig,
    sink: &ResultSink,
) -> Result<StressRecord> {
    cfg.validate()?;
    info!(backend = %platform, url, "stress phase");

    let record = match generator.run(url, cfg, platform).await {
        Ok(record) => record,
        Err(e) if !e.is_fatal() => {
            error!(backend = %platform, error = %e, "load run degraded to sentinel");
            StressRecord::sentinel(platform)
        }
        Err(e) => return Err(e),
    };

    sink.append_row(&record)?;
    Ok(record)
}

/// Human-inspectable per-backend metric files, one value per file
///
/// Best-effort companions to the CSV; a write failure here never fails the
/// run.
fn persist_metric_files(output_dir: &Path, record: &PerformanceRecord) {
    let dir = output_dir.join(&record.platform);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(error = %e, dir = %dir.display(), "could not create metrics dir");
        return;
    }

    let files = [
        ("startup_time.txt", record.startup_time_sec),
        ("cpu_percent.txt", record.cpu_percent),
        ("memory_mb.txt", record.memory_mb),
        ("disk_mb.txt", record.disk_mb),
    ];
    for (name, value) in files {
        if let Err(e) = std::fs::write(dir.join(name), format!("{value}\n")) {
            warn!(error = %e, file = name, "could not persist metric file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_metric_files() {
        let dir = tempfile::tempdir().unwrap();
        let record = PerformanceRecord {
            platform: "bench-nginx".into(),
            startup_time_sec: 1.5,
            cpu_percent: 40.0,
            memory_mb: 128.0,
            disk_mb: 187.0,
        };

        persist_metric_files(dir.path(), &record);

        let startup =
            std::fs::read_to_string(dir.path().join("bench-nginx/startup_time.txt")).unwrap();
        assert_eq!(startup.trim(), "1.5");
        assert!(dir.path().join("bench-nginx/disk_mb.txt").exists());
    }
}

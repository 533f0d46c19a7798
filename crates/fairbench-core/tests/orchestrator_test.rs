// Orchestrator integration tests
//
// Drive the measurement and stress pipeline with stub drivers and a stub
// HTTP backend, and check the row-shape guarantees: one row per attempted
// backend, exact sentinel rows on failure, and no failure below the
// orchestrator escaping as a fatal error.

use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use fairbench_core::orchestrator::{measure_backend, stress_backend};
use fairbench_core::probe::BackoffPolicy;
use fairbench_core::{
    BackendDriver, BackendIdentity, BackendKind, BenchError, BurstConfig, LoadGenerator,
    PerformanceRecord, ProcessSet, ReadinessResult, ResultSink, Sampler, StressConfig,
};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Always-200 HTTP stub for the CPU-window burst
async fn spawn_ok_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                    )
                    .await;
            });
        }
    });
    format!("http://{}/", addr)
}

/// A free (addr, port) pair for a stub identity
fn free_port() -> u16 {
    let listener = TcpListener::bind((LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

enum StubBehavior {
    /// Becomes ready; serves from `url`, samples its own process
    Ready { url: String },
    /// Exhausts the readiness budget
    NeverReady,
    /// Engine binary absent
    EngineMissing,
}

struct StubDriver {
    identity: BackendIdentity,
    behavior: StubBehavior,
}

impl StubDriver {
    fn new(name: &str, behavior: StubBehavior) -> Self {
        Self {
            identity: BackendIdentity::new(BackendKind::Container, name, LOCALHOST, free_port()),
            behavior,
        }
    }
}

#[async_trait]
impl BackendDriver for StubDriver {
    type Handle = ();

    fn identity(&self) -> &BackendIdentity {
        &self.identity
    }

    async fn provision(&self) -> fairbench_core::Result<()> {
        match self.behavior {
            StubBehavior::EngineMissing => Err(BenchError::tool_missing("stub-engine")),
            _ => Ok(()),
        }
    }

    async fn start(&self, _handle: &mut ()) -> fairbench_core::Result<ReadinessResult> {
        match self.behavior {
            StubBehavior::Ready { .. } => Ok(ReadinessResult {
                ready: true,
                elapsed: Duration::from_millis(150),
            }),
            _ => Ok(ReadinessResult {
                ready: false,
                elapsed: Duration::from_secs(12),
            }),
        }
    }

    fn process_set(&self, _handle: &()) -> ProcessSet {
        match self.behavior {
            StubBehavior::Ready { .. } => ProcessSet::new(vec![std::process::id()]),
            _ => ProcessSet::empty(),
        }
    }

    async fn disk_footprint_mb(&self, _handle: &()) -> f64 {
        42.0
    }

    fn base_url(&self, _handle: &()) -> String {
        match &self.behavior {
            StubBehavior::Ready { url } => url.clone(),
            _ => self.identity.root_url(),
        }
    }
}

fn short_burst_sampler() -> Sampler {
    Sampler::new(
        reqwest::Client::new(),
        BurstConfig {
            duration: Duration::from_millis(100),
            concurrency: 2,
        },
    )
}

#[tokio::test]
async fn one_row_per_attempted_backend() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ResultSink::new(dir.path().join("perf.csv"));
    let sampler = short_burst_sampler();
    let url = spawn_ok_server().await;

    let drivers = vec![
        StubDriver::new("healthy", StubBehavior::Ready { url }),
        StubDriver::new("stuck", StubBehavior::NeverReady),
        StubDriver::new("no-engine", StubBehavior::EngineMissing),
    ];

    for driver in &drivers {
        measure_backend(driver, &sampler, &sink, dir.path())
            .await
            .unwrap();
    }

    let content = std::fs::read_to_string(sink.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    // Header plus exactly one row per attempted backend.
    assert_eq!(lines.len(), 1 + drivers.len());
    assert_eq!(
        lines[0],
        "platform,startup_time_sec,cpu_percent,memory_mb,disk_mb"
    );
}

#[tokio::test]
async fn never_ready_backend_yields_exact_sentinel_row() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ResultSink::new(dir.path().join("perf.csv"));
    let sampler = short_burst_sampler();

    let driver = StubDriver::new("stuck", StubBehavior::NeverReady);
    let record = measure_backend(&driver, &sampler, &sink, dir.path())
        .await
        .unwrap();
    assert!(record.is_sentinel());

    let content = std::fs::read_to_string(sink.path()).unwrap();
    assert_eq!(content.lines().nth(1), Some("stuck,0,0,0,0"));
}

#[tokio::test]
async fn healthy_backend_yields_real_measurements() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ResultSink::new(dir.path().join("perf.csv"));
    let sampler = short_burst_sampler();
    let url = spawn_ok_server().await;

    let driver = StubDriver::new("healthy", StubBehavior::Ready { url });
    let record: PerformanceRecord = measure_backend(&driver, &sampler, &sink, dir.path())
        .await
        .unwrap();

    assert_eq!(record.platform, "healthy");
    assert!((record.startup_time_sec - 0.15).abs() < 1e-9);
    assert_eq!(record.disk_mb, 42.0);
    // Our own process is sampled, so RSS is necessarily non-zero.
    assert!(record.memory_mb > 0.0);

    // Per-backend metric files persisted alongside the CSV.
    assert!(dir.path().join("healthy/startup_time.txt").exists());
    assert!(dir.path().join("healthy/memory_mb.txt").exists());
}

#[tokio::test]
async fn occupied_port_degrades_to_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ResultSink::new(dir.path().join("perf.csv"));
    let sampler = short_burst_sampler();

    let mut driver = StubDriver::new("blocked", StubBehavior::NeverReady);
    let holder = TcpListener::bind((LOCALHOST, 0)).unwrap();
    driver.identity.port = holder.local_addr().unwrap().port();

    let record = measure_backend(&driver, &sampler, &sink, dir.path())
        .await
        .unwrap();
    assert!(record.is_sentinel());
}

#[tokio::test]
async fn guest_bound_backend_ignores_host_port_holder() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ResultSink::new(dir.path().join("perf.csv"));
    let sampler = short_burst_sampler();
    let url = spawn_ok_server().await;

    // The backend is reached on its own guest address (unspecified on the
    // host side); another process holding the same numeric port on loopback
    // is not a collision for it.
    let mut driver = StubDriver::new("guest-bound", StubBehavior::Ready { url });
    driver.identity.kind = BackendKind::Vm;
    driver.identity.bind_addr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    let holder = TcpListener::bind((LOCALHOST, 0)).unwrap();
    driver.identity.port = holder.local_addr().unwrap().port();

    let record = measure_backend(&driver, &sampler, &sink, dir.path())
        .await
        .unwrap();
    assert!(!record.is_sentinel());
    assert!((record.startup_time_sec - 0.15).abs() < 1e-9);
}

#[tokio::test]
async fn unreachable_url_yields_exact_stress_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ResultSink::new(dir.path().join("stress.csv"));
    let generator = LoadGenerator::new(reqwest::Client::new()).with_liveness(BackoffPolicy {
        max_attempts: 2,
        initial_interval: Duration::from_millis(10),
        ..BackoffPolicy::default()
    });

    let record = stress_backend(
        &generator,
        "http://127.0.0.1:9/",
        "unreachable",
        &StressConfig::default(),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(record.qps, 0.0);
    let content = std::fs::read_to_string(sink.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "platform,qps,avg_latency_ms,failed,transfer_kbps");
    assert_eq!(lines[1], "unreachable,0,0,0,0");
}

#[tokio::test]
async fn one_stress_row_per_attempted_backend() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ResultSink::new(dir.path().join("stress.csv"));
    let generator = LoadGenerator::new(reqwest::Client::new()).with_liveness(BackoffPolicy {
        max_attempts: 2,
        initial_interval: Duration::from_millis(10),
        ..BackoffPolicy::default()
    });

    let platforms = ["ubuntu-vm", "bench-nginx"];
    for platform in platforms {
        stress_backend(
            &generator,
            "http://127.0.0.1:9/",
            platform,
            &StressConfig::default(),
            &sink,
        )
        .await
        .unwrap();
    }

    let content = std::fs::read_to_string(sink.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    // Header plus exactly one row per attempted backend, labels in run order.
    assert_eq!(lines.len(), 1 + platforms.len());
    assert_eq!(lines[1], "ubuntu-vm,0,0,0,0");
    assert_eq!(lines[2], "bench-nginx,0,0,0,0");
}

#[tokio::test]
async fn invalid_stress_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ResultSink::new(dir.path().join("stress.csv"));
    let generator = LoadGenerator::new(reqwest::Client::new());

    let err = stress_backend(
        &generator,
        "http://127.0.0.1:9/",
        "vm",
        &StressConfig::default().with_requests(0),
        &sink,
    )
    .await
    .unwrap_err();

    assert!(err.is_fatal());
    // A fatal configuration error writes nothing.
    assert!(!sink.path().exists());
}

// fairbench-core
//
// Fair comparison of a VM backend and a container backend along cold-start
// latency, CPU under load, resident memory, disk footprint, and HTTP
// throughput. The point of the crate is measurement *equivalence*: identical
// readiness semantics, identical CPU sampling windows opened around an
// active load burst, and deploy-cost disk accounting on both sides, despite
// the two platforms' different process models.

pub mod config;
pub mod driver;
pub mod error;
pub mod loadgen;
pub mod orchestrator;
pub mod ports;
pub mod probe;
pub mod process;
pub mod records;
pub mod sampler;
pub mod sink;

pub use config::{
    BackendIdentity, BackendKind, BurstConfig, MeasureConfig, ProbeConfig, StressConfig,
};
pub use driver::{container::ContainerDriver, vm::VmDriver, BackendDriver};
pub use error::{BenchError, Result};
pub use loadgen::LoadGenerator;
pub use probe::ReadinessResult;
pub use process::ProcessSet;
pub use records::{CsvRecord, PerformanceRecord, StressRecord};
pub use sampler::Sampler;
pub use sink::ResultSink;

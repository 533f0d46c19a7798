pub mod measure;
pub mod run;
pub mod stress;

use std::net::{IpAddr, Ipv4Addr};

use tracing::warn;

use fairbench_core::{ports, BenchError, MeasureConfig, Sampler};

/// Upward search budget when the requested port is occupied
const PORT_SEARCH_ATTEMPTS: u16 = 10;

/// Reserved/invalid ports are a configuration error, caught before any
/// measurement starts
pub fn validate_port(port: u16) -> Result<(), BenchError> {
    if port == 0 {
        return Err(BenchError::config("--app-port must be non-zero"));
    }
    Ok(())
}

/// Effective app port for a backend bound on `addr`
///
/// If the requested pair is occupied, probe upward for the nearest free one;
/// exhausting the search budget is a fatal configuration error. An
/// unspecified address occupies no host pair (the service binds inside the
/// guest), so the request is taken as-is.
pub fn resolve_app_port(addr: IpAddr, requested: u16) -> Result<u16, BenchError> {
    validate_port(requested)?;
    if addr.is_unspecified() || ports::check_free(addr, requested) {
        return Ok(requested);
    }

    let port = ports::find_free(addr, requested, PORT_SEARCH_ATTEMPTS)?;
    warn!(%addr, requested, port, "requested port occupied, auto-selected next free pair");
    Ok(port)
}

/// Address the VM service is checked against before its guest IP is known.
/// Unspecified on purpose: the VM's service lives inside the guest and holds
/// no host pair.
pub fn vm_placeholder_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

pub fn sampler_for(cfg: &MeasureConfig) -> Sampler {
    Sampler::new(reqwest::Client::new(), cfg.burst.clone())
}

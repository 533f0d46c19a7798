// Port arbitration
//
// Collision checks are scoped to (address, port) pairs, never port number
// alone: the container binds loopback and the VM is reached on its own guest
// address, so both backends can legitimately use the same numeric port.

use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::{BenchError, Result};

/// Timeout for the connect fallback on non-local addresses
const CONNECT_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Whether `(addr, port)` is free
///
/// Local addresses are checked with a bind test. For an address the host
/// cannot bind (a VM guest address), fall back to a connect probe: an
/// accepted connection means something is already listening there.
pub fn check_free(addr: IpAddr, port: u16) -> bool {
    let sock = SocketAddr::new(addr, port);
    match TcpListener::bind(sock) {
        Ok(_) => true,
        Err(e) if e.kind() == std::io::ErrorKind::AddrNotAvailable => {
            TcpStream::connect_timeout(&sock, CONNECT_PROBE_TIMEOUT).is_err()
        }
        Err(_) => false,
    }
}

/// Linear probe for a free port starting at `start_port`
///
/// Bounded search; exhaustion is a fatal configuration error, since there is
/// no safe automatic fallback beyond the budget.
pub fn find_free(addr: IpAddr, start_port: u16, attempts: u16) -> Result<u16> {
    for offset in 0..attempts {
        let port = match start_port.checked_add(offset) {
            Some(p) => p,
            None => break,
        };
        if check_free(addr, port) {
            debug!(%addr, port, "selected free port");
            return Ok(port);
        }
    }
    Err(BenchError::PortsExhausted {
        addr: addr.to_string(),
        start: start_port,
        attempts,
    })
}

//! Backend port allocation

use crate::error::ProvisionError;
use std::net::TcpListener;
use tracing::debug;

/// Scan `start..=end` in ascending order and return the first port that
/// accepts an exclusive local bind.
///
/// The probe listener is dropped before returning, so the port is not
/// reserved; the caller is expected to hand it to the spawned backend
/// promptly. Ports bound by any running process are skipped.
pub fn allocate(start: u16, end: u16) -> Result<u16, ProvisionError> {
    for port in start..=end {
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(_listener) => {
                debug!(port, "Allocated free backend port");
                return Ok(port);
            }
            Err(_) => continue,
        }
    }
    Err(ProvisionError::NoFreePort { start, end })
}

//! Dynamic port allocation for repeated cluster bring-ups.
//!
//! Ports handed out here are remembered for the whole process lifetime, so a
//! second bring-up never collides with a port a stopped instance used earlier
//! (the OS may still hold it in TIME_WAIT, or a test may restart the role on
//! the same identity). The registry is the only cross-call shared mutable
//! state in the harness and must stay safe under concurrent allocation.

use std::net::TcpListener;

use dashmap::DashSet;
use lazy_static::lazy_static;
use tracing::debug;

use crate::PortError;
use crate::Result;

/// Bounded search window above the preferred port.
pub const MAX_PORT_SEARCH: u16 = 300;

lazy_static! {
    /// Every port this process has ever returned, plus ports currently being
    /// probed. Initialized once per process, never reset.
    static ref CLAIMED_PORTS: DashSet<u16> = DashSet::new();
}

/// Returns the first port at or after `preferred` that is unbound on the
/// local host and was never claimed during this process run.
///
/// Safe to call concurrently: the `DashSet::insert` claim is atomic, so two
/// racing calls can never be handed the same port.
///
/// # Errors
/// Returns [`PortError::Exhausted`] if no open port is found within
/// [`MAX_PORT_SEARCH`] attempts.
pub fn find_open_port(preferred: u16) -> Result<u16> {
    let limit = preferred.saturating_add(MAX_PORT_SEARCH);
    for port in preferred..limit {
        // Claim first, probe second. A failed probe releases the claim.
        if !CLAIMED_PORTS.insert(port) {
            continue;
        }
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => {
                drop(listener);
                debug!(port, preferred, "claimed open port");
                return Ok(port);
            }
            Err(_) => {
                CLAIMED_PORTS.remove(&port);
            }
        }
    }
    Err(PortError::Exhausted {
        preferred,
        attempts: MAX_PORT_SEARCH,
    }
    .into())
}

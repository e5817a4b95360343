//! Best-effort local address discovery.
//!
//! Used when the caller does not supply an explicit bind address: enumerate
//! the host's network interfaces and return the first usable IPv4 address.
//! On a multi-homed host the result depends on OS enumeration order, which is
//! accepted. This is a heuristic, not a routing decision.

use std::net::{IpAddr, Ipv4Addr};

use pnet::datalink::{self, NetworkInterface};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur during address resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The named interface does not exist on this host.
    #[error("no such network interface: {0}")]
    InterfaceNotFound(String),

    /// No interface yielded a usable IPv4 host address.
    #[error("unable to get the host address")]
    NoHostAddress,
}

/// Guess a usable local IPv4 address.
///
/// When `interface` is given, the search is restricted to that interface.
/// Interfaces that are loopback or down are skipped; the first IPv4 address
/// assigned to a surviving interface wins, in enumeration order, ignoring the
/// attached network prefix. Fails fast with no retries.
pub fn resolve(interface: Option<&str>) -> Result<Ipv4Addr, ResolveError> {
    let interfaces = match interface {
        Some(name) => {
            let iface = datalink::interfaces()
                .into_iter()
                .find(|i| i.name == name)
                .ok_or_else(|| ResolveError::InterfaceNotFound(name.to_string()))?;
            vec![iface]
        }
        None => datalink::interfaces(),
    };

    first_usable_v4(&interfaces).ok_or(ResolveError::NoHostAddress)
}

fn first_usable_v4(interfaces: &[NetworkInterface]) -> Option<Ipv4Addr> {
    for iface in interfaces {
        if iface.is_loopback() || !iface.is_up() {
            trace!(name = %iface.name, "skipping loopback or down interface");
            continue;
        }

        for network in &iface.ips {
            if let IpAddr::V4(addr) = network.ip() {
                debug!(name = %iface.name, address = %addr, "selected host address");
                return Some(addr);
            }
        }
    }
    None
}

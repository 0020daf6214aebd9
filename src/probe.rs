//! Network reachability probing.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Port the reachability checks probe - a machine is considered up once
/// its command channel answers
pub const SSH_PORT: u16 = 22;

/// A yes/no reachability check against a host and port
pub trait ReachabilityProbe {
    fn reachable(&self, host: &str, port: u16) -> bool;
}

/// TCP connect probe with a fixed per-attempt timeout
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ReachabilityProbe for TcpProbe {
    fn reachable(&self, host: &str, port: u16) -> bool {
        let Ok(addrs) = (host, port).to_socket_addrs() else {
            return false;
        };
        let addrs: Vec<SocketAddr> = addrs.collect();
        addrs
            .iter()
            .any(|addr| TcpStream::connect_timeout(addr, self.timeout).is_ok())
    }
}

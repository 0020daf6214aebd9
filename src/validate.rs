//! Precondition validation.
//!
//! Gates the orchestrator: every check runs in a fixed order, each one
//! fatal on failure, and none of them writes any external state. The
//! checks guard against the two ways a run can trample an existing
//! machine - an address that already answers, and a certificate request
//! left behind by a partial prior attempt.

use crate::probe::{ReachabilityProbe, SSH_PORT};
use crate::request::ProvisioningRequest;
use controlplane::CertAuthority;
use std::net::{Ipv4Addr, ToSocketAddrs};
use std::str::FromStr;
use thiserror::Error;

/// Why validation refused to let the run proceed
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("this command must run as root")]
    Privilege,

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("hostname '{host}' did not resolve to a valid IPv4 address")]
    Resolution { host: String },

    #[error("{addr} already answers on port {SSH_PORT} - refusing to provision over a live machine")]
    AddressInUse { addr: String },

    #[error("a certificate request for '{host}' is already pending - clean it up before re-running")]
    DuplicateRequest { host: String },

    #[error("could not query the certificate authority: {0}")]
    CaUnavailable(String),
}

/// Name lookup to an IPv4 address
pub trait Resolver {
    fn resolve_v4(&self, host: &str) -> Option<String>;
}

/// System resolver via the standard library
pub struct DnsResolver;

impl Resolver for DnsResolver {
    fn resolve_v4(&self, host: &str) -> Option<String> {
        let addrs = (host, 0u16).to_socket_addrs().ok()?;
        addrs
            .filter(|a| a.is_ipv4())
            .map(|a| a.ip().to_string())
            .next()
    }
}

/// Environment the validator checks against; injected so every branch is
/// reachable in tests
pub struct Preconditions<'a> {
    /// Whether the process runs with elevated privilege
    pub privileged: bool,
    pub resolver: &'a dyn Resolver,
    pub probe: &'a dyn ReachabilityProbe,
    pub ca: &'a dyn CertAuthority,
}

/// A dotted-quad string is the only address syntax the platform pushes
/// to guests; anything else is refused
pub fn is_dotted_quad(addr: &str) -> bool {
    Ipv4Addr::from_str(addr).is_ok()
}

/// Run every precondition check in order. Returns the resolved desired
/// address on success; the first failing check aborts.
pub fn validate(
    req: &ProvisioningRequest,
    bootstrap_address: Option<&str>,
    pre: &Preconditions,
) -> Result<Ipv4Addr, ValidationError> {
    // 1. privilege
    if !pre.privileged {
        return Err(ValidationError::Privilege);
    }

    // 2. input shape: present, and not something that leaked in as a flag
    for (name, value) in [("hostname", &req.hostname), ("role", &req.role)] {
        if value.is_empty() {
            return Err(ValidationError::MalformedInput(format!("{name} is empty")));
        }
        if value.starts_with('-') {
            return Err(ValidationError::MalformedInput(format!(
                "{name} '{value}' looks like an option flag"
            )));
        }
    }

    // 3. name lookup must yield a syntactically valid dotted quad
    let resolved = pre
        .resolver
        .resolve_v4(&req.hostname)
        .ok_or_else(|| ValidationError::Resolution {
            host: req.hostname.clone(),
        })?;
    let desired_ip = Ipv4Addr::from_str(&resolved).map_err(|_| ValidationError::Resolution {
        host: req.hostname.clone(),
    })?;

    // 4. the desired address must not already be a live machine
    if pre.probe.reachable(&resolved, SSH_PORT) {
        return Err(ValidationError::AddressInUse { addr: resolved });
    }

    // 5. neither may a fixed bootstrap address
    if let Some(bootstrap) = bootstrap_address
        && pre.probe.reachable(bootstrap, SSH_PORT)
    {
        return Err(ValidationError::AddressInUse {
            addr: bootstrap.to_string(),
        });
    }

    // 6. no leftover certificate request from a partial prior attempt
    match pre.ca.has_pending(&req.hostname) {
        Ok(true) => {
            return Err(ValidationError::DuplicateRequest {
                host: req.hostname.clone(),
            });
        }
        Ok(false) => {}
        Err(e) => return Err(ValidationError::CaUnavailable(e.to_string())),
    }

    Ok(desired_ip)
}

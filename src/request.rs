//! The validated identity and intent for one provisioning run.

use serde::{Deserialize, Serialize};

/// Everything one provisioning run needs to know, resolved from flags,
/// config defaults or a batch node record. Immutable once validation has
/// passed; the mutable run state lives in the orchestrator's context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    /// Fully-qualified hostname
    pub hostname: String,
    /// Short VM name - the hostname's first label
    pub vm_name: String,
    /// Server role
    pub role: String,
    /// Puppet environment
    pub environment: String,
    /// Hiera environment tag
    pub hiera_environment: String,
    /// Template to clone
    pub template: String,
    /// Virtual CPU count
    pub cpus: u32,
    /// Memory size in MiB
    pub memory_mib: u64,
    /// Suppress interactive prompts
    pub unattended: bool,
}

impl ProvisioningRequest {
    /// Derive the short VM name from a fully-qualified hostname
    pub fn vm_name_for(hostname: &str) -> String {
        hostname.split('.').next().unwrap_or(hostname).to_string()
    }
}

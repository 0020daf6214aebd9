//! Error taxonomy for the sizing-change client.
//!
//! Each precondition conflict maps to a distinct exit condition so an
//! operator (or the orchestrator) can tell a missing VM from an ambiguous
//! name from a powered-on guest without parsing diagnostics.

use thiserror::Error;

/// Provider-reported fault while submitting a configuration change,
/// classified into the failure modes worth distinct diagnostics.
#[derive(Debug, Error)]
pub enum ReconfigureFault {
    /// The requested CPU count exceeds what the virtual hardware supports
    #[error("too many devices for the virtual hardware: {0}")]
    TooManyDevices(String),

    /// The device specification was rejected as invalid
    #[error("invalid device specification: {0}")]
    InvalidDeviceSpec(String),

    /// A backing file operation conflicted with another task
    #[error("file conflict while applying change: {0}")]
    FileConflict(String),

    /// Any other provider fault
    #[error("control plane fault: {0}")]
    Provider(String),
}

impl ReconfigureFault {
    /// Classify a provider diagnostic into a fault kind.
    ///
    /// Matches the fault type names the control plane embeds in its
    /// error text; anything unrecognized becomes `Provider`.
    pub fn classify(stderr: &str) -> Self {
        let msg = stderr.trim().to_string();
        if stderr.contains("TooManyDevices") {
            Self::TooManyDevices(msg)
        } else if stderr.contains("InvalidDeviceSpec") {
            Self::InvalidDeviceSpec(msg)
        } else if stderr.contains("FileAlreadyExists") || stderr.contains("FileLocked") {
            Self::FileConflict(msg)
        } else {
            Self::Provider(msg)
        }
    }
}

/// Errors from the sizing-change client
#[derive(Debug, Error)]
pub enum ResizeError {
    /// Requested sizing exceeds a process-wide ceiling; refused before
    /// any connection is opened
    #[error("requested {what} {requested} exceeds the limit of {limit}")]
    LimitExceeded {
        what: &'static str,
        requested: u64,
        limit: u64,
    },

    /// No VM matched the name
    #[error("no virtual machine named '{name}' was found")]
    NotFound { name: String },

    /// More than one VM matched the name; matches carried for diagnosis
    #[error("{} virtual machines match '{name}' - refusing to guess", matches.len())]
    Ambiguous { name: String, matches: Vec<String> },

    /// The matched VM is powered on; sizing changes require power-off
    #[error("virtual machine '{name}' is powered on - power it off first")]
    PoweredOn { name: String },

    /// The configuration change was submitted and the provider faulted
    #[error(transparent)]
    Fault(#[from] ReconfigureFault),

    /// Connection or lookup plumbing failed
    #[error("control plane error: {0}")]
    Transport(anyhow::Error),
}

impl ResizeError {
    /// Process exit code for the standalone client.
    ///
    /// 2 = powered on, 3 = not found, 4 = ambiguous, 1 = everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PoweredOn { .. } => 2,
            Self::NotFound { .. } => 3,
            Self::Ambiguous { .. } => 4,
            _ => 1,
        }
    }
}

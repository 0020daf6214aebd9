//! # Controlplane
//!
//! Narrow ports onto the external control planes a VM provisioning run
//! touches, plus the sizing-change client built on top of them.
//!
//! ## Core Concepts
//!
//! - **VirtPort**: the virtualization control plane (clone, power, resize, lookup)
//! - **RemoteShell**: a command channel onto a guest or management host
//! - **CertAuthority**: the configuration-management certificate authority
//! - **resize**: the sizing-change client - uniqueness, power and limit
//!   preconditions enforced before any configuration change is submitted
//!
//! Production implementations shell out to `govc`, `ssh` and `puppet`;
//! every trait can be replaced by a test double, so the whole provisioning
//! state machine is exercisable without a hypervisor.

pub mod error;
pub mod ports;
pub mod resize;
pub mod shell;
pub mod types;

pub use error::{ReconfigureFault, ResizeError};
pub use ports::{CertAuthority, Connection, RemoteShell, VirtPort};
pub use resize::{AppliedSizing, resize};
pub use types::{CommandOutput, PowerState, SizingLimits, VmHandle};

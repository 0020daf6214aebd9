//! Elevated-privilege gate.
//!
//! Provisioning runs push network and host configuration and must run as
//! root; the check happens once, before anything else.

/// Whether the process runs with an effective uid of 0
#[allow(unsafe_code)]
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

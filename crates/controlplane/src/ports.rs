//! Port traits for the external control planes.
//!
//! These traits let provisioning logic run against test doubles: one
//! method per externally-visible operation, structured results, no
//! terminal I/O.

use crate::error::ReconfigureFault;
use crate::types::{CommandOutput, PowerState, VmHandle};
use anyhow::Result;

/// The virtualization control plane.
///
/// `connect`/`disconnect` bracket every session explicitly so callers can
/// guarantee (and tests can observe) that no connection is opened before
/// preconditions pass and that every exit path releases it.
pub trait VirtPort {
    /// Open a session to the control plane
    fn connect(&self) -> Result<()>;

    /// Release the session; must be safe to call exactly once per connect
    fn disconnect(&self);

    /// Resolve VM entities by exact name match
    fn find_vms(&self, name: &str) -> Result<Vec<VmHandle>>;

    /// Clone a template into a new VM and power it on
    fn clone_template(&self, template: &str, vm_name: &str) -> Result<CommandOutput>;

    /// Ask the guest tools for the VM's current address, if reported yet
    fn guest_ip(&self, vm_name: &str) -> Result<Option<String>>;

    /// Current reported power state
    fn power_state(&self, vm_name: &str) -> Result<PowerState>;

    /// Issue a start command
    fn power_on(&self, vm_name: &str) -> Result<CommandOutput>;

    /// Issue a stop command
    fn power_off(&self, vm_name: &str) -> Result<CommandOutput>;

    /// Submit a CPU/memory configuration change
    fn reconfigure(
        &self,
        vm_name: &str,
        cpus: u32,
        memory_mib: u64,
    ) -> std::result::Result<(), ReconfigureFault>;
}

/// Scoped control-plane session - disconnects on drop, so every exit
/// path (success or failure) releases the connection.
pub struct Connection<'a> {
    port: &'a dyn VirtPort,
}

impl<'a> Connection<'a> {
    /// Open a session on the given port
    pub fn open(port: &'a dyn VirtPort) -> Result<Self> {
        port.connect()?;
        Ok(Self { port })
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        self.port.disconnect();
    }
}

/// A remote command channel onto a guest or management host
pub trait RemoteShell {
    /// Run a command on `host`, capturing output
    fn run(&self, host: &str, command: &str) -> Result<CommandOutput>;

    /// Run a command on `host` with stdio attached to the terminal
    /// (used for interactive conveniences like tailing a guest log)
    fn run_interactive(&self, host: &str, command: &str) -> Result<bool>;
}

/// The configuration-management certificate authority
pub trait CertAuthority {
    /// Whether an unsigned certificate request is pending for `host`
    fn has_pending(&self, host: &str) -> Result<bool>;

    /// Sign the pending request for `host`
    fn sign(&self, host: &str) -> Result<CommandOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingPort {
        connects: Cell<usize>,
        disconnects: Cell<usize>,
    }

    impl VirtPort for CountingPort {
        fn connect(&self) -> Result<()> {
            self.connects.set(self.connects.get() + 1);
            Ok(())
        }

        fn disconnect(&self) {
            self.disconnects.set(self.disconnects.get() + 1);
        }

        fn find_vms(&self, _name: &str) -> Result<Vec<VmHandle>> {
            Ok(Vec::new())
        }

        fn clone_template(&self, _template: &str, _vm_name: &str) -> Result<CommandOutput> {
            Ok(CommandOutput::ok(""))
        }

        fn guest_ip(&self, _vm_name: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn power_state(&self, _vm_name: &str) -> Result<PowerState> {
            Ok(PowerState::Off)
        }

        fn power_on(&self, _vm_name: &str) -> Result<CommandOutput> {
            Ok(CommandOutput::ok(""))
        }

        fn power_off(&self, _vm_name: &str) -> Result<CommandOutput> {
            Ok(CommandOutput::ok(""))
        }

        fn reconfigure(
            &self,
            _vm_name: &str,
            _cpus: u32,
            _memory_mib: u64,
        ) -> std::result::Result<(), ReconfigureFault> {
            Ok(())
        }
    }

    #[test]
    fn test_connection_released_on_drop() {
        let port = CountingPort {
            connects: Cell::new(0),
            disconnects: Cell::new(0),
        };

        {
            let _conn = Connection::open(&port).unwrap();
            assert_eq!(port.connects.get(), 1);
            assert_eq!(port.disconnects.get(), 0);
        }

        assert_eq!(port.disconnects.get(), 1);
    }
}

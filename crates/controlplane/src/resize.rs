//! The sizing-change client.
//!
//! Applies a CPU/memory change to exactly one powered-off VM. Preconditions
//! run in a fixed order: resource ceilings before any connection is opened,
//! then uniqueness-by-name, then the power-off requirement. The control
//! plane is only contacted once the ceilings pass, and the session is
//! released on every exit path.

use crate::error::ResizeError;
use crate::ports::{Connection, VirtPort};
use crate::types::{PowerState, SizingLimits};

/// Sizing values as applied, reported back on success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedSizing {
    pub cpus: u32,
    pub memory_mib: u64,
}

/// Look up `vm_name`, enforce preconditions and apply the sizing change.
pub fn resize(
    virt: &dyn VirtPort,
    limits: &SizingLimits,
    vm_name: &str,
    cpus: u32,
    memory_mib: u64,
) -> Result<AppliedSizing, ResizeError> {
    // Ceilings first: refused without contacting the control plane
    if cpus > limits.max_cpus {
        return Err(ResizeError::LimitExceeded {
            what: "CPU count",
            requested: u64::from(cpus),
            limit: u64::from(limits.max_cpus),
        });
    }
    if memory_mib > limits.max_memory_mib {
        return Err(ResizeError::LimitExceeded {
            what: "memory (MiB)",
            requested: memory_mib,
            limit: limits.max_memory_mib,
        });
    }

    let _conn = Connection::open(virt).map_err(ResizeError::Transport)?;

    let matches = virt.find_vms(vm_name).map_err(ResizeError::Transport)?;
    let vm = match matches.len() {
        0 => {
            return Err(ResizeError::NotFound {
                name: vm_name.to_string(),
            });
        }
        1 => &matches[0],
        _ => {
            return Err(ResizeError::Ambiguous {
                name: vm_name.to_string(),
                matches: matches.iter().map(|m| m.path.clone()).collect(),
            });
        }
    };

    let state = virt.power_state(&vm.name).map_err(ResizeError::Transport)?;
    if !matches!(state, PowerState::Off) {
        return Err(ResizeError::PoweredOn {
            name: vm.name.clone(),
        });
    }

    virt.reconfigure(&vm.name, cpus, memory_mib)?;

    Ok(AppliedSizing { cpus, memory_mib })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconfigureFault;
    use crate::types::{CommandOutput, VmHandle};
    use anyhow::Result;
    use std::cell::{Cell, RefCell};

    /// Scripted virtualization port that counts connections
    struct FakeVirt {
        vms: Vec<VmHandle>,
        state: PowerState,
        fault: RefCell<Option<ReconfigureFault>>,
        connects: Cell<usize>,
        disconnects: Cell<usize>,
        reconfigures: Cell<usize>,
    }

    impl FakeVirt {
        fn with_vms(vms: Vec<VmHandle>, state: PowerState) -> Self {
            Self {
                vms,
                state,
                fault: RefCell::new(None),
                connects: Cell::new(0),
                disconnects: Cell::new(0),
                reconfigures: Cell::new(0),
            }
        }

        fn one_off_vm() -> Self {
            Self::with_vms(vec![VmHandle::new("web1", "/dc/vm/web1")], PowerState::Off)
        }
    }

    impl VirtPort for FakeVirt {
        fn connect(&self) -> Result<()> {
            self.connects.set(self.connects.get() + 1);
            Ok(())
        }

        fn disconnect(&self) {
            self.disconnects.set(self.disconnects.get() + 1);
        }

        fn find_vms(&self, name: &str) -> Result<Vec<VmHandle>> {
            Ok(self.vms.iter().filter(|v| v.name == name).cloned().collect())
        }

        fn clone_template(&self, _template: &str, _vm_name: &str) -> Result<CommandOutput> {
            Ok(CommandOutput::ok(""))
        }

        fn guest_ip(&self, _vm_name: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn power_state(&self, _vm_name: &str) -> Result<PowerState> {
            Ok(self.state)
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
            self.reconfigures.set(self.reconfigures.get() + 1);
            match self.fault.borrow_mut().take() {
                Some(f) => Err(f),
                None => Ok(()),
            }
        }
    }

    fn limits() -> SizingLimits {
        SizingLimits {
            max_cpus: 16,
            max_memory_mib: 65536,
        }
    }

    #[test]
    fn test_cpu_over_limit_refused_without_connection() {
        let virt = FakeVirt::one_off_vm();
        let err = resize(&virt, &limits(), "web1", 20, 2048).unwrap_err();

        assert!(matches!(err, ResizeError::LimitExceeded { .. }));
        assert_eq!(virt.connects.get(), 0, "no connection may be opened");
        assert_eq!(virt.reconfigures.get(), 0);
    }

    #[test]
    fn test_memory_over_limit_refused_without_connection() {
        let virt = FakeVirt::one_off_vm();
        let err = resize(&virt, &limits(), "web1", 2, 131072).unwrap_err();

        assert!(matches!(err, ResizeError::LimitExceeded { .. }));
        assert_eq!(virt.connects.get(), 0);
    }

    #[test]
    fn test_zero_matches_is_not_found() {
        let virt = FakeVirt::with_vms(Vec::new(), PowerState::Off);
        let err = resize(&virt, &limits(), "web1", 2, 2048).unwrap_err();

        assert!(matches!(err, ResizeError::NotFound { .. }));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(virt.disconnects.get(), 1, "session released on failure");
    }

    #[test]
    fn test_multiple_matches_is_ambiguous_with_list() {
        let virt = FakeVirt::with_vms(
            vec![
                VmHandle::new("web1", "/dc1/vm/web1"),
                VmHandle::new("web1", "/dc2/vm/web1"),
            ],
            PowerState::Off,
        );
        let err = resize(&virt, &limits(), "web1", 2, 2048).unwrap_err();

        match &err {
            ResizeError::Ambiguous { matches, .. } => {
                assert_eq!(matches.len(), 2);
                assert!(matches.contains(&"/dc1/vm/web1".to_string()));
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
        assert_eq!(err.exit_code(), 4);
        assert_eq!(virt.reconfigures.get(), 0);
    }

    #[test]
    fn test_powered_on_vm_refused_before_change() {
        let virt = FakeVirt::with_vms(vec![VmHandle::new("web1", "/dc/vm/web1")], PowerState::On);
        let err = resize(&virt, &limits(), "web1", 2, 2048).unwrap_err();

        assert!(matches!(err, ResizeError::PoweredOn { .. }));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(virt.reconfigures.get(), 0, "no change request may be sent");
        assert_eq!(virt.disconnects.get(), 1);
    }

    #[test]
    fn test_exactly_one_match_applies_change() {
        let virt = FakeVirt::one_off_vm();
        let applied = resize(&virt, &limits(), "web1", 4, 4096).unwrap();

        assert_eq!(applied, AppliedSizing { cpus: 4, memory_mib: 4096 });
        assert_eq!(virt.connects.get(), 1);
        assert_eq!(virt.reconfigures.get(), 1);
        assert_eq!(virt.disconnects.get(), 1, "session released on success");
    }

    #[test]
    fn test_provider_fault_is_classified_and_releases_session() {
        let virt = FakeVirt::one_off_vm();
        *virt.fault.borrow_mut() = Some(ReconfigureFault::classify("fault: TooManyDevices"));

        let err = resize(&virt, &limits(), "web1", 2, 2048).unwrap_err();
        assert!(matches!(
            err,
            ResizeError::Fault(ReconfigureFault::TooManyDevices(_))
        ));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(virt.disconnects.get(), 1);
    }
}

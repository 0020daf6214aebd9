//! Shell-backed production implementations of the port traits.
//!
//! `GovcVirt` drives the virtualization control plane through the `govc`
//! CLI, `SshShell` runs guest commands over `ssh`, and `PuppetCa` manages
//! certificate requests by running `puppet cert` on the master. All of
//! them read credentials from the environment the way the underlying
//! tools expect.

use crate::error::ReconfigureFault;
use crate::ports::{CertAuthority, RemoteShell, VirtPort};
use crate::types::{CommandOutput, PowerState, VmHandle};
use anyhow::{Context, Result};
use std::process::{Command, Stdio};

/// Virtualization port backed by the `govc` CLI
pub struct GovcVirt {
    /// Path to the govc executable
    govc_path: String,
}

impl GovcVirt {
    pub fn new() -> Self {
        Self {
            govc_path: "govc".to_string(),
        }
    }

    pub fn with_path(govc_path: impl Into<String>) -> Self {
        Self {
            govc_path: govc_path.into(),
        }
    }

    fn run_govc(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(&self.govc_path)
            .args(args)
            .output()
            .with_context(|| format!("failed to execute {} {}", self.govc_path, args.join(" ")))?;
        Ok(output.into())
    }

    fn run_govc_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run_govc(args)?;
        if !output.success {
            anyhow::bail!(
                "{} {} failed: {}",
                self.govc_path,
                args.join(" "),
                output.stderr_str().trim()
            );
        }
        Ok(output)
    }
}

impl Default for GovcVirt {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtPort for GovcVirt {
    fn connect(&self) -> Result<()> {
        // govc sessions are per-invocation; verify credentials up front
        self.run_govc_checked(&["about"]).map(|_| ())
    }

    fn disconnect(&self) {
        // Nothing persistent to tear down, but keep the logout explicit
        // so cached session tickets are not left behind.
        let _ = self.run_govc(&["session.logout"]);
    }

    fn find_vms(&self, name: &str) -> Result<Vec<VmHandle>> {
        let output = self.run_govc_checked(&["find", "vm", "-name", name])?;
        Ok(output
            .stdout_str()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|path| VmHandle::new(name, path))
            .collect())
    }

    fn clone_template(&self, template: &str, vm_name: &str) -> Result<CommandOutput> {
        self.run_govc(&["vm.clone", "-vm", template, "-on=true", vm_name])
    }

    fn guest_ip(&self, vm_name: &str) -> Result<Option<String>> {
        let output = self.run_govc(&["vm.ip", "-wait", "5s", vm_name])?;
        if !output.success {
            return Ok(None);
        }
        let ip = output.stdout_str().trim().to_string();
        Ok(if ip.is_empty() { None } else { Some(ip) })
    }

    fn power_state(&self, vm_name: &str) -> Result<PowerState> {
        let output = self.run_govc_checked(&[
            "object.collect",
            "-s",
            &format!("vm/{vm_name}"),
            "runtime.powerState",
        ])?;
        Ok(PowerState::parse(&output.stdout_str()))
    }

    fn power_on(&self, vm_name: &str) -> Result<CommandOutput> {
        self.run_govc(&["vm.power", "-on", vm_name])
    }

    fn power_off(&self, vm_name: &str) -> Result<CommandOutput> {
        self.run_govc(&["vm.power", "-off", vm_name])
    }

    fn reconfigure(
        &self,
        vm_name: &str,
        cpus: u32,
        memory_mib: u64,
    ) -> std::result::Result<(), ReconfigureFault> {
        let cpus_arg = cpus.to_string();
        let mem_arg = memory_mib.to_string();
        let output = self
            .run_govc(&["vm.change", "-vm", vm_name, "-c", &cpus_arg, "-m", &mem_arg])
            .map_err(|e| ReconfigureFault::Provider(e.to_string()))?;

        if output.success {
            Ok(())
        } else {
            Err(ReconfigureFault::classify(&output.stderr_str()))
        }
    }
}

/// Remote command channel over `ssh`
pub struct SshShell {
    user: String,
}

impl SshShell {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    fn target(&self, host: &str) -> String {
        format!("{}@{}", self.user, host)
    }
}

impl RemoteShell for SshShell {
    fn run(&self, host: &str, command: &str) -> Result<CommandOutput> {
        let output = Command::new("ssh")
            .args([
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=no",
                &self.target(host),
                command,
            ])
            .output()
            .with_context(|| format!("failed to execute ssh to {host}"))?;
        Ok(output.into())
    }

    fn run_interactive(&self, host: &str, command: &str) -> Result<bool> {
        let status = Command::new("ssh")
            .args(["-t", &self.target(host), command])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("failed to execute ssh to {host}"))?;
        Ok(status.success())
    }
}

/// Certificate authority reached by running `puppet cert` on the master
pub struct PuppetCa<S: RemoteShell> {
    master: String,
    shell: S,
}

impl<S: RemoteShell> PuppetCa<S> {
    pub fn new(master: impl Into<String>, shell: S) -> Self {
        Self {
            master: master.into(),
            shell,
        }
    }
}

impl<S: RemoteShell> CertAuthority for PuppetCa<S> {
    fn has_pending(&self, host: &str) -> Result<bool> {
        // `puppet cert list` shows only unsigned requests; exact-match the
        // quoted hostname so web1 does not shadow web10
        let output = self.shell.run(&self.master, "puppet cert list")?;
        if !output.success {
            anyhow::bail!(
                "puppet cert list failed on {}: {}",
                self.master,
                output.stderr_str().trim()
            );
        }
        let needle = format!("\"{host}\"");
        Ok(output.stdout_str().lines().any(|l| l.contains(&needle)))
    }

    fn sign(&self, host: &str) -> Result<CommandOutput> {
        self.shell
            .run(&self.master, &format!("puppet cert sign {host}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::cell::RefCell;

    struct ScriptedShell {
        responses: RefCell<Vec<CommandOutput>>,
        commands: RefCell<Vec<String>>,
    }

    impl RemoteShell for ScriptedShell {
        fn run(&self, _host: &str, command: &str) -> Result<CommandOutput> {
            self.commands.borrow_mut().push(command.to_string());
            Ok(self.responses.borrow_mut().remove(0))
        }

        fn run_interactive(&self, _host: &str, _command: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_pending_request_exact_hostname() {
        let shell = ScriptedShell {
            responses: RefCell::new(vec![CommandOutput::ok(
                "  \"web10.example.net\" (SHA256) AA:BB\n",
            )]),
            commands: RefCell::new(Vec::new()),
        };
        let ca = PuppetCa::new("puppet.example.net", shell);

        // web1 must not match the pending request for web10
        assert!(!ca.has_pending("web1.example.net").unwrap());
    }

    #[test]
    fn test_pending_request_found() {
        let shell = ScriptedShell {
            responses: RefCell::new(vec![CommandOutput::ok(
                "  \"web1.example.net\" (SHA256) AA:BB\n",
            )]),
            commands: RefCell::new(Vec::new()),
        };
        let ca = PuppetCa::new("puppet.example.net", shell);

        assert!(ca.has_pending("web1.example.net").unwrap());
    }

    #[test]
    fn test_sign_runs_on_master() {
        let shell = ScriptedShell {
            responses: RefCell::new(vec![CommandOutput::ok("signed\n")]),
            commands: RefCell::new(Vec::new()),
        };
        let ca = PuppetCa::new("puppet.example.net", shell);

        let output = ca.sign("web1.example.net").unwrap();
        assert!(output.success);
    }
}

//! Core types shared by the control-plane ports

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Output;

/// Control-plane-reported power state of a virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    /// Guest is running
    On,
    /// Guest is halted
    Off,
    /// The control plane reported something else (suspended, unknown)
    Other,
}

impl PowerState {
    /// Parse the power state strings the control plane emits
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "poweredOn" | "on" => Self::On,
            "poweredOff" | "off" => Self::Off,
            _ => Self::Other,
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, Self::Off)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "powered on"),
            Self::Off => write!(f, "powered off"),
            Self::Other => write!(f, "unknown power state"),
        }
    }
}

/// A virtual machine entity as resolved by name lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmHandle {
    /// VM name (short hostname)
    pub name: String,
    /// Control-plane inventory path or identifier
    pub path: String,
}

impl VmHandle {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Structured result of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl CommandOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// A successful output carrying the given stdout (handy for doubles)
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            success: true,
        }
    }

    /// A failed output carrying the given stderr (handy for doubles)
    pub fn failed(stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

/// Process-wide resource ceilings, enforced before any connection is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingLimits {
    /// Maximum virtual CPU count
    #[serde(default = "default_max_cpus")]
    pub max_cpus: u32,
    /// Maximum memory size in MiB
    #[serde(default = "default_max_memory_mib")]
    pub max_memory_mib: u64,
}

fn default_max_cpus() -> u32 {
    16
}

fn default_max_memory_mib() -> u64 {
    65536
}

impl Default for SizingLimits {
    fn default() -> Self {
        Self {
            max_cpus: default_max_cpus(),
            max_memory_mib: default_max_memory_mib(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state_parse() {
        assert_eq!(PowerState::parse("poweredOn"), PowerState::On);
        assert_eq!(PowerState::parse("poweredOff\n"), PowerState::Off);
        assert_eq!(PowerState::parse("on"), PowerState::On);
        assert_eq!(PowerState::parse("suspended"), PowerState::Other);
    }

    #[test]
    fn test_limits_defaults() {
        let limits = SizingLimits::default();
        assert_eq!(limits.max_cpus, 16);
        assert_eq!(limits.max_memory_mib, 65536);
    }

    #[test]
    fn test_command_output_helpers() {
        let ok = CommandOutput::ok("10.1.2.3\n");
        assert!(ok.success);
        assert_eq!(ok.stdout_str().trim(), "10.1.2.3");

        let failed = CommandOutput::failed("no such vm");
        assert!(!failed.success);
        assert_eq!(failed.stderr_str(), "no such vm");
    }
}

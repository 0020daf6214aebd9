use anyhow::{Context, Result};
use controlplane::SizingLimits;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Process defaults applied when neither flags nor node records say otherwise
pub const DEFAULT_CPUS: u32 = 2;
pub const DEFAULT_MEMORY_MIB: u64 = 2048;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("provm"))
}

/// Platform-wide configuration for provisioning runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvmConfig {
    /// User for remote command channels onto guests and the puppet master
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,

    /// Host running the configuration-management certificate authority
    #[serde(default = "default_puppet_master")]
    pub puppet_master: String,

    /// Puppet environment assigned when none is requested
    #[serde(default = "default_environment")]
    pub default_environment: String,

    /// Hiera environment tag assigned when none is requested
    #[serde(default = "default_environment")]
    pub default_hiera_environment: String,

    /// Template cloned when none is requested
    #[serde(default = "default_template")]
    pub default_template: String,

    /// Fixed bootstrap address new clones come up on. When unset, the
    /// address is fetched from the clone via guest tools instead.
    #[serde(default)]
    pub bootstrap_address: Option<String>,

    /// Reachability polling parameters
    #[serde(default)]
    pub reachability: ReachabilityConfig,

    /// Resource ceilings for sizing changes
    #[serde(default)]
    pub limits: SizingLimits,

    /// Directory batch logs are written to (defaults to ~/.local/state/provm)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_puppet_master() -> String {
    "puppet".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_template() -> String {
    "base-template".to_string()
}

impl Default for ProvmConfig {
    fn default() -> Self {
        Self {
            ssh_user: default_ssh_user(),
            puppet_master: default_puppet_master(),
            default_environment: default_environment(),
            default_hiera_environment: default_environment(),
            default_template: default_template(),
            bootstrap_address: None,
            reachability: ReachabilityConfig::default(),
            limits: SizingLimits::default(),
            log_dir: None,
        }
    }
}

/// Bounded-poll parameters for the TCP reachability wait
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReachabilityConfig {
    #[serde(default = "default_attempts")]
    pub attempts: usize,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_attempts() -> usize {
    5
}

fn default_interval_secs() -> u64 {
    2
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl ProvmConfig {
    /// Load config.toml from the config directory, falling back to
    /// compiled-in defaults when no file exists
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join("config.toml");
        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Directory batch logs go to
    pub fn log_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.log_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".local").join("state").join("provm"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProvmConfig::default();
        assert_eq!(config.ssh_user, "root");
        assert_eq!(config.default_environment, "production");
        assert_eq!(config.reachability.attempts, 5);
        assert_eq!(config.reachability.interval_secs, 2);
        assert!(config.bootstrap_address.is_none());
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
puppet_master = "puppet.example.net"
bootstrap_address = "10.0.0.50"

[reachability]
attempts = 8

[limits]
max_cpus = 8
"#,
        )
        .unwrap();

        let config = ProvmConfig::load_from(&path).unwrap();
        assert_eq!(config.puppet_master, "puppet.example.net");
        assert_eq!(config.bootstrap_address.as_deref(), Some("10.0.0.50"));
        assert_eq!(config.reachability.attempts, 8);
        // unset keys fall back to defaults
        assert_eq!(config.reachability.interval_secs, 2);
        assert_eq!(config.limits.max_cpus, 8);
        assert_eq!(config.limits.max_memory_mib, 65536);
        assert_eq!(config.ssh_user, "root");
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "limits = 3").unwrap();
        assert!(ProvmConfig::load_from(&path).is_err());
    }
}

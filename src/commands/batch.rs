//! Batch command - provision every node in a declarative node list.
//!
//! Nodes run strictly one after another in sorted hostname order; the
//! first fatal run stops the batch, leaving later nodes untouched.

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::Context as AppContext;
use crate::cli::BatchArgs;
use crate::config::{DEFAULT_CPUS, DEFAULT_MEMORY_MIB, ProvmConfig};
use crate::request::ProvisioningRequest;
use crate::ui;
use super::deploy;

// ============================================================================
// Descriptor format
// ============================================================================

/// Platform-wide defaults shared by every node in the list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    /// Platform name, used for the log file
    pub name: String,
    /// Primary (puppet) environment
    pub environment: String,
    /// Secondary (hiera) environment tag
    pub hiera_environment: String,
}

/// One node's record as written by the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub role: String,
    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default)]
    pub memory_mib: Option<u64>,
}

/// The whole node list document
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchFile {
    pub platform: PlatformDescriptor,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeEntry>,
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid node list: {}", path.display()))
    }
}

/// A node with its effective sizing resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub hostname: String,
    pub role: String,
    pub cpus: u32,
    pub memory_mib: u64,
}

/// Validate every node and substitute process defaults for absent
/// overrides. The effective values are written back into each node's
/// record so anything consuming the parsed file sees them.
pub fn resolve_nodes(file: &mut BatchFile) -> Result<Vec<NodeDescriptor>> {
    let mut nodes = Vec::with_capacity(file.nodes.len());
    for (hostname, entry) in &mut file.nodes {
        if !hostname.contains('.') {
            anyhow::bail!("node '{hostname}' is not a fully-qualified hostname");
        }
        if entry.role.is_empty() {
            anyhow::bail!("node '{hostname}' has no role");
        }

        let cpus = entry.cpus.unwrap_or(DEFAULT_CPUS);
        let memory_mib = entry.memory_mib.unwrap_or(DEFAULT_MEMORY_MIB);
        entry.cpus = Some(cpus);
        entry.memory_mib = Some(memory_mib);

        nodes.push(NodeDescriptor {
            hostname: hostname.clone(),
            role: entry.role.clone(),
            cpus,
            memory_mib,
        });
    }
    // BTreeMap iteration is already sorted; keep the invariant explicit
    nodes.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    Ok(nodes)
}

// ============================================================================
// Batch log
// ============================================================================

/// Timestamped per-platform log, mirrored to the console
pub struct BatchLog {
    file: File,
}

impl BatchLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Could not open {}", path.display()))?;
        Ok(Self { file })
    }

    /// Append one timestamped line and mirror it to stdout
    pub fn line(&mut self, msg: &str) {
        let stamped = format!("{} {msg}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        println!("{stamped}");
        if let Err(e) = writeln!(self.file, "{stamped}") {
            log::warn!("could not append to batch log: {e}");
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

pub fn run(_ctx: &AppContext, args: BatchArgs) -> Result<()> {
    let config = ProvmConfig::load()?;
    let mut file = BatchFile::load(&args.file)?;
    let nodes = resolve_nodes(&mut file)?;

    if nodes.is_empty() {
        ui::warn("node list is empty - nothing to do");
        return Ok(());
    }

    ui::header(&format!("provm batch - platform '{}'", file.platform.name));
    for node in &nodes {
        ui::kv(
            &node.hostname,
            &format!("{} ({} vCPU / {} MiB)", node.role, node.cpus, node.memory_mib),
        );
    }
    println!();

    if !args.yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Provision {} node(s)?", nodes.len()))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            ui::warn("batch declined");
            return Ok(());
        }
    }

    let log_path = config.log_dir()?.join(format!("{}.log", file.platform.name));
    let mut log = BatchLog::open(&log_path)?;
    log.line(&format!(
        "batch start: platform '{}', {} node(s)",
        file.platform.name,
        nodes.len()
    ));

    let platform = file.platform.clone();
    let config_ref = &config;
    let result = run_nodes(&nodes, &mut log, |node| {
        let req = node_request(config_ref, &platform, node);
        deploy::provision(config_ref, &req)
    });

    match &result {
        Ok(()) => log.line("batch complete"),
        Err(e) => log.line(&format!("batch aborted: {e}")),
    }
    result
}

/// Run nodes sequentially, stopping at the first failure so later nodes
/// are never started
fn run_nodes(
    nodes: &[NodeDescriptor],
    log: &mut BatchLog,
    mut runner: impl FnMut(&NodeDescriptor) -> Result<()>,
) -> Result<()> {
    for node in nodes {
        log.line(&format!("provisioning {}", node.hostname));
        runner(node).with_context(|| format!("provisioning failed for {}", node.hostname))?;
        log.line(&format!("{} done", node.hostname));
    }
    Ok(())
}

/// Build the per-node request; batch runs are always unattended
fn node_request(
    config: &ProvmConfig,
    platform: &PlatformDescriptor,
    node: &NodeDescriptor,
) -> ProvisioningRequest {
    ProvisioningRequest {
        vm_name: ProvisioningRequest::vm_name_for(&node.hostname),
        hostname: node.hostname.clone(),
        role: node.role.clone(),
        environment: platform.environment.clone(),
        hiera_environment: platform.hiera_environment.clone(),
        template: config.default_template.clone(),
        cpus: node.cpus,
        memory_mib: node.memory_mib,
        unattended: true,
    }
}

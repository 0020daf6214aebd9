//! Deploy command - provision one machine end-to-end.

use anyhow::Result;

use crate::Context as AppContext;
use crate::cli::DeployArgs;
use crate::config::{DEFAULT_CPUS, DEFAULT_MEMORY_MIB, ProvmConfig};
use crate::orchestrator::{
    AlwaysYes, ConfirmStrategy, Interactive, Orchestrator, RunSettings, Timing,
};
use crate::privilege;
use crate::probe::TcpProbe;
use crate::request::ProvisioningRequest;
use crate::runner;
use crate::ui;
use crate::validate::DnsResolver;
use controlplane::shell::{GovcVirt, PuppetCa, SshShell};
use std::time::Duration;

pub fn run(ctx: &AppContext, args: DeployArgs) -> Result<()> {
    if !ctx.quiet {
        ui::header("provm - machine provisioning");
    }

    let config = ProvmConfig::load()?;
    preflight()?;

    let req = build_request(&config, &args);
    if ctx.verbose > 0 {
        ui::kv("host", &req.hostname);
        ui::kv("role", &req.role);
        ui::kv("environment", &req.environment);
        ui::kv("template", &req.template);
        ui::kv("sizing", &format!("{} vCPU / {} MiB", req.cpus, req.memory_mib));
    }

    provision(&config, &req)?;
    Ok(())
}

/// Wire the production ports and run the orchestrator for one request.
/// Shared with the batch driver.
pub(crate) fn provision(config: &ProvmConfig, req: &ProvisioningRequest) -> Result<()> {
    let virt = GovcVirt::new();
    let shell = SshShell::new(config.ssh_user.clone());
    let ca = PuppetCa::new(
        config.puppet_master.clone(),
        SshShell::new(config.ssh_user.clone()),
    );
    let probe = TcpProbe::default();
    let resolver = DnsResolver;

    let mut confirm: Box<dyn ConfirmStrategy> = if req.unattended {
        Box::new(AlwaysYes)
    } else {
        Box::new(Interactive)
    };

    let settings = RunSettings {
        bootstrap_address: config.bootstrap_address.clone(),
        default_environment: config.default_environment.clone(),
        limits: config.limits,
        timing: Timing {
            reach_attempts: config.reachability.attempts,
            reach_interval: Duration::from_secs(config.reachability.interval_secs),
            ..Timing::default()
        },
        privileged: privilege::is_root(),
    };

    let mut orch = Orchestrator::new(
        &virt,
        &shell,
        &ca,
        &probe,
        &resolver,
        confirm.as_mut(),
        config.puppet_master.clone(),
        settings,
    );

    match orch.run(req) {
        Ok(()) => Ok(()),
        Err(e) => {
            let run = orch.context();
            log::warn!(
                "aborted in phase {} (desired {:?}, bootstrap {:?}, last command ok: {:?})",
                run.phase().name(),
                run.desired_ip,
                run.bootstrap_ip,
                run.last_status
            );
            Err(e.into())
        }
    }
}

/// Resolve flags against config and process defaults
fn build_request(config: &ProvmConfig, args: &DeployArgs) -> ProvisioningRequest {
    ProvisioningRequest {
        vm_name: ProvisioningRequest::vm_name_for(&args.host),
        hostname: args.host.clone(),
        role: args.role.clone(),
        environment: args
            .environment
            .clone()
            .unwrap_or_else(|| config.default_environment.clone()),
        hiera_environment: args
            .hiera_environment
            .clone()
            .unwrap_or_else(|| config.default_hiera_environment.clone()),
        template: args
            .template
            .clone()
            .unwrap_or_else(|| config.default_template.clone()),
        cpus: args.cpus.unwrap_or(DEFAULT_CPUS),
        memory_mib: args.memory.unwrap_or(DEFAULT_MEMORY_MIB),
        unattended: args.unattended,
    }
}

/// The production ports shell out; fail early when the tools are absent
fn preflight() -> Result<()> {
    for tool in ["govc", "ssh"] {
        if !runner::command_exists(tool) {
            anyhow::bail!("required tool '{tool}' is not on $PATH");
        }
    }
    Ok(())
}

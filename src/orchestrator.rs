//! The provisioning state machine.
//!
//! One run takes a validated request through a fixed, forward-only
//! sequence of externally-visible transitions:
//!
//! `VALIDATED → CLONED → NETWORK_CONFIGURED → AGENT_INSTALLED →
//! IDENTITY_SIGNED → POWERED_OFF → RESIZED → POWERED_ON → COMPLETE`
//!
//! Nothing is ever rolled back: a fatal abort leaves the machine exactly
//! as far along as it got, and the operator re-runs or remediates by
//! hand. Every transition is fatal on failure except the sizing change,
//! which warns and continues - that asymmetry is a declared policy, not
//! an accident.

use crate::poller::{PollOutcome, poll_bounded, poll_unbounded};
use crate::probe::{ReachabilityProbe, SSH_PORT};
use crate::request::ProvisioningRequest;
use crate::ui;
use crate::validate::{self, Preconditions, Resolver, ValidationError, is_dotted_quad};
use anyhow::Result;
use controlplane::{CertAuthority, RemoteShell, ResizeError, SizingLimits, VirtPort, resize};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use thiserror::Error;

// ============================================================================
// Phases
// ============================================================================

/// Lifecycle phase of one provisioning run, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Validated,
    Cloned,
    NetworkConfigured,
    AgentInstalled,
    IdentitySigned,
    PoweredOff,
    Resized,
    PoweredOn,
    Complete,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validated => "VALIDATED",
            Self::Cloned => "CLONED",
            Self::NetworkConfigured => "NETWORK_CONFIGURED",
            Self::AgentInstalled => "AGENT_INSTALLED",
            Self::IdentitySigned => "IDENTITY_SIGNED",
            Self::PoweredOff => "POWERED_OFF",
            Self::Resized => "RESIZED",
            Self::PoweredOn => "POWERED_ON",
            Self::Complete => "COMPLETE",
        }
    }
}

/// How a transition's failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Abort the run
    Fatal,
    /// Log a warning and keep going
    WarnContinue,
}

impl Phase {
    /// Failure policy for the transition INTO this phase. The sizing
    /// change is the sole warn-and-continue step in the pipeline.
    pub fn entry_policy(&self) -> StepPolicy {
        match self {
            Self::Resized => StepPolicy::WarnContinue,
            _ => StepPolicy::Fatal,
        }
    }
}

// ============================================================================
// Run state
// ============================================================================

/// Mutable per-run state, owned by one orchestrator for one run
#[derive(Debug)]
pub struct RuntimeContext {
    /// Address the machine will answer on once provisioned
    pub desired_ip: Option<Ipv4Addr>,
    /// Temporary address the fresh clone answers on
    pub bootstrap_ip: Option<String>,
    phase: Phase,
    started: Instant,
    /// Exit status of the most recent external command
    pub last_status: Option<bool>,
}

impl RuntimeContext {
    fn new() -> Self {
        Self {
            desired_ip: None,
            bootstrap_ip: None,
            phase: Phase::Validated,
            started: Instant::now(),
            last_status: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Advance the phase. The phase only ever moves forward; a skipped
    /// phase (resize failure) is never revisited.
    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "phase must advance forward");
        if next > self.phase {
            log::debug!("phase {} -> {}", self.phase.name(), next.name());
            self.phase = next;
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Fatal conditions that abort a provisioning run
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("template clone failed: {0}")]
    CloneFailed(String),

    #[error("could not determine bootstrap address: {0}")]
    BootstrapAddress(String),

    #[error("{host} did not answer on port {SSH_PORT} after {attempts} attempts")]
    Unreachable { host: String, attempts: usize },

    #[error("network configuration failed on {host}: {detail}")]
    NetworkConfig { host: String, detail: String },

    #[error("agent installation failed: {0}")]
    AgentInstall(String),

    #[error("environment override failed: {0}")]
    EnvironmentOverride(String),

    #[error("no certificate request appeared for {host} after {attempts} attempts")]
    RequestNeverAppeared { host: String, attempts: usize },

    #[error("certificate signing failed: {0}")]
    SignFailed(String),

    #[error("power-off failed: {0}")]
    StopFailed(String),

    #[error("final power-on failed: {0}")]
    StartFailed(String),

    #[error(transparent)]
    ControlPlane(#[from] anyhow::Error),
}

impl ProvisionError {
    /// Process exit code: 2 only for the final power-on failure,
    /// 1 for every other fatal condition.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StartFailed(_) => 2,
            _ => 1,
        }
    }
}

// ============================================================================
// Confirmation strategy
// ============================================================================

/// Injectable confirmation so batch and single-node runs share the same
/// orchestration code
pub trait ConfirmStrategy {
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Unattended mode: every prompt answers yes
pub struct AlwaysYes;

impl ConfirmStrategy for AlwaysYes {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Attended mode: ask on the terminal
pub struct Interactive;

impl ConfirmStrategy for Interactive {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use anyhow::Context;
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read confirmation")
    }
}

// ============================================================================
// Timing
// ============================================================================

/// Wait parameters for the three polls in a run. Reachability is
/// operator-configurable; the certificate wait is fixed by design.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub reach_attempts: usize,
    pub reach_interval: Duration,
    pub cert_attempts: usize,
    pub cert_interval: Duration,
    pub power_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reach_attempts: 5,
            reach_interval: Duration::from_secs(2),
            cert_attempts: 10,
            cert_interval: Duration::from_secs(2),
            power_interval: Duration::from_secs(1),
        }
    }
}

/// Per-run settings resolved from config and environment
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Fixed bootstrap address; when unset the clone result supplies it
    pub bootstrap_address: Option<String>,
    /// Platform-default puppet environment; an override is pushed only
    /// when the request differs
    pub default_environment: String,
    pub limits: SizingLimits,
    pub timing: Timing,
    /// Whether the process holds elevated privilege
    pub privileged: bool,
}

// ============================================================================
// Guest command composition
// ============================================================================

const FACTS_DIR: &str = "/etc/facter/facts.d";
const GUEST_LOG: &str = "/var/log/messages";

fn network_setup_command(req: &ProvisioningRequest, desired_ip: Ipv4Addr) -> String {
    format!(
        "echo {host} > /etc/hostname && hostname {host} && \
         sed -i 's/^IPADDR=.*/IPADDR={ip}/' /etc/sysconfig/network-scripts/ifcfg-eth0",
        host = req.hostname,
        ip = desired_ip
    )
}

fn fact_files_command(req: &ProvisioningRequest) -> String {
    format!(
        "mkdir -p {dir} && \
         printf 'role={role}\\n' > {dir}/role.txt && \
         printf 'hiera_environment={hiera}\\n' > {dir}/hiera_environment.txt",
        dir = FACTS_DIR,
        role = req.role,
        hiera = req.hiera_environment
    )
}

fn agent_install_command(puppet_master: &str) -> String {
    format!("curl -sk https://{puppet_master}:8140/packages/current/install.bash | bash")
}

fn environment_override_command(environment: &str) -> String {
    format!("puppet config set environment {environment} --section agent")
}

// ============================================================================
// Orchestrator
// ============================================================================

const TOTAL_STEPS: usize = 8;

/// Sequences one provisioning run over the injected ports
pub struct Orchestrator<'a> {
    virt: &'a dyn VirtPort,
    shell: &'a dyn RemoteShell,
    ca: &'a dyn CertAuthority,
    probe: &'a dyn ReachabilityProbe,
    resolver: &'a dyn Resolver,
    confirm: &'a mut dyn ConfirmStrategy,
    puppet_master: String,
    settings: RunSettings,
    ctx: RuntimeContext,
}

impl<'a> Orchestrator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        virt: &'a dyn VirtPort,
        shell: &'a dyn RemoteShell,
        ca: &'a dyn CertAuthority,
        probe: &'a dyn ReachabilityProbe,
        resolver: &'a dyn Resolver,
        confirm: &'a mut dyn ConfirmStrategy,
        puppet_master: impl Into<String>,
        settings: RunSettings,
    ) -> Self {
        Self {
            virt,
            shell,
            ca,
            probe,
            resolver,
            confirm,
            puppet_master: puppet_master.into(),
            settings,
            ctx: RuntimeContext::new(),
        }
    }

    /// Recorded run state; after an abort the phase stays wherever the
    /// run got to
    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    /// Run the full provisioning sequence for one machine
    pub fn run(&mut self, req: &ProvisioningRequest) -> Result<(), ProvisionError> {
        let desired_ip = validate::validate(
            req,
            self.settings.bootstrap_address.as_deref(),
            &Preconditions {
                privileged: self.settings.privileged,
                resolver: self.resolver,
                probe: self.probe,
                ca: self.ca,
            },
        )?;
        self.ctx.desired_ip = Some(desired_ip);
        ui::step(1, TOTAL_STEPS, &format!("preconditions passed, {} → {desired_ip}", req.hostname));

        self.clone_template(req)?;
        let bootstrap = self.bootstrap_address(req)?;
        self.configure_network(req, &bootstrap, desired_ip)?;
        self.install_agent(req, &bootstrap)?;
        self.sign_identity(req)?;
        self.power_off(req)?;
        self.apply_sizing(req)?;
        self.power_on(req)?;

        let elapsed = self.ctx.elapsed();
        ui::success(&format!(
            "{} provisioned in {}",
            req.hostname,
            ui::format_elapsed(elapsed.as_secs())
        ));

        if !req.unattended {
            self.offer_log_tail(&bootstrap);
        }

        self.ctx.advance(Phase::Complete);
        Ok(())
    }

    fn clone_template(&mut self, req: &ProvisioningRequest) -> Result<(), ProvisionError> {
        ui::step(2, TOTAL_STEPS, &format!("cloning {} → {}", req.template, req.vm_name));
        let output = self.virt.clone_template(&req.template, &req.vm_name)?;
        self.ctx.last_status = Some(output.success);
        if !output.success {
            return Err(ProvisionError::CloneFailed(output.stderr_str().trim().to_string()));
        }
        self.ctx.advance(Phase::Cloned);
        Ok(())
    }

    /// Fixed bootstrap address from config, or the one the clone reports
    fn bootstrap_address(&mut self, req: &ProvisioningRequest) -> Result<String, ProvisionError> {
        let addr = match &self.settings.bootstrap_address {
            Some(fixed) => fixed.clone(),
            None => self
                .virt
                .guest_ip(&req.vm_name)?
                .ok_or_else(|| {
                    ProvisionError::BootstrapAddress("clone reported no address".to_string())
                })?,
        };
        if !is_dotted_quad(&addr) {
            return Err(ProvisionError::BootstrapAddress(format!(
                "'{addr}' is not a dotted-quad address"
            )));
        }
        self.ctx.bootstrap_ip = Some(addr.clone());
        Ok(addr)
    }

    fn configure_network(
        &mut self,
        req: &ProvisioningRequest,
        bootstrap: &str,
        desired_ip: Ipv4Addr,
    ) -> Result<(), ProvisionError> {
        ui::step(3, TOTAL_STEPS, &format!("waiting for {bootstrap} to answer on port {SSH_PORT}"));
        let timing = self.settings.timing;
        let probe = self.probe;
        let outcome = poll_bounded(timing.reach_attempts, timing.reach_interval, || {
            probe.reachable(bootstrap, SSH_PORT)
        });
        if let PollOutcome::TimedOut { attempts } = outcome {
            return Err(ProvisionError::Unreachable {
                host: bootstrap.to_string(),
                attempts,
            });
        }

        for command in [
            network_setup_command(req, desired_ip),
            fact_files_command(req),
        ] {
            let output = self.shell.run(bootstrap, &command)?;
            self.ctx.last_status = Some(output.success);
            if !output.success {
                return Err(ProvisionError::NetworkConfig {
                    host: bootstrap.to_string(),
                    detail: output.stderr_str().trim().to_string(),
                });
            }
        }
        self.ctx.advance(Phase::NetworkConfigured);
        Ok(())
    }

    fn install_agent(
        &mut self,
        req: &ProvisioningRequest,
        bootstrap: &str,
    ) -> Result<(), ProvisionError> {
        ui::step(4, TOTAL_STEPS, "installing configuration-management agent");
        let output = self
            .shell
            .run(bootstrap, &agent_install_command(&self.puppet_master))?;
        self.ctx.last_status = Some(output.success);
        if !output.success {
            return Err(ProvisionError::AgentInstall(output.stderr_str().trim().to_string()));
        }

        if req.environment != self.settings.default_environment {
            log::info!(
                "environment '{}' differs from platform default '{}', pushing override",
                req.environment,
                self.settings.default_environment
            );
            let output = self
                .shell
                .run(bootstrap, &environment_override_command(&req.environment))?;
            self.ctx.last_status = Some(output.success);
            if !output.success {
                return Err(ProvisionError::EnvironmentOverride(
                    output.stderr_str().trim().to_string(),
                ));
            }
        }

        self.ctx.advance(Phase::AgentInstalled);
        Ok(())
    }

    fn sign_identity(&mut self, req: &ProvisioningRequest) -> Result<(), ProvisionError> {
        ui::step(5, TOTAL_STEPS, "waiting for certificate request");
        let timing = self.settings.timing;
        let ca = self.ca;
        let host = req.hostname.clone();
        let outcome = poll_bounded(timing.cert_attempts, timing.cert_interval, || {
            ca.has_pending(&host).unwrap_or(false)
        });
        if let PollOutcome::TimedOut { attempts } = outcome {
            return Err(ProvisionError::RequestNeverAppeared {
                host: req.hostname.clone(),
                attempts,
            });
        }

        let output = self.ca.sign(&req.hostname)?;
        self.ctx.last_status = Some(output.success);
        if !output.success {
            return Err(ProvisionError::SignFailed(output.stderr_str().trim().to_string()));
        }
        self.ctx.advance(Phase::IdentitySigned);
        Ok(())
    }

    fn power_off(&mut self, req: &ProvisioningRequest) -> Result<(), ProvisionError> {
        ui::step(6, TOTAL_STEPS, "stopping machine for sizing");
        let output = self.virt.power_off(&req.vm_name)?;
        self.ctx.last_status = Some(output.success);
        if !output.success {
            return Err(ProvisionError::StopFailed(output.stderr_str().trim().to_string()));
        }

        // Unlike every other wait this one has no attempt ceiling; the
        // stop is expected to land and the run blocks until it does.
        let virt = self.virt;
        let vm_name = req.vm_name.clone();
        poll_unbounded(self.settings.timing.power_interval, || {
            virt.power_state(&vm_name).map(|s| s.is_off()).unwrap_or(false)
        });

        self.ctx.advance(Phase::PoweredOff);
        Ok(())
    }

    /// The one warn-and-continue transition: a failed sizing change is
    /// reported and the run proceeds to power-on regardless.
    fn apply_sizing(&mut self, req: &ProvisioningRequest) -> Result<(), ProvisionError> {
        ui::step(
            7,
            TOTAL_STEPS,
            &format!("applying sizing: {} vCPU, {} MiB", req.cpus, req.memory_mib),
        );

        match resize(
            self.virt,
            &self.settings.limits,
            &req.vm_name,
            req.cpus,
            req.memory_mib,
        ) {
            Ok(applied) => {
                self.ctx.last_status = Some(true);
                log::info!("applied {} vCPU / {} MiB", applied.cpus, applied.memory_mib);
                self.ctx.advance(Phase::Resized);
                Ok(())
            }
            Err(e) => {
                self.ctx.last_status = Some(false);
                match Phase::Resized.entry_policy() {
                    StepPolicy::WarnContinue => {
                        warn_resize_failure(&e);
                        Ok(())
                    }
                    StepPolicy::Fatal => Err(ProvisionError::ControlPlane(anyhow::Error::new(e))),
                }
            }
        }
    }

    fn power_on(&mut self, req: &ProvisioningRequest) -> Result<(), ProvisionError> {
        ui::step(8, TOTAL_STEPS, "powering on");
        let output = self.virt.power_on(&req.vm_name)?;
        self.ctx.last_status = Some(output.success);
        if !output.success {
            return Err(ProvisionError::StartFailed(output.stderr_str().trim().to_string()));
        }
        self.ctx.advance(Phase::PoweredOn);
        Ok(())
    }

    /// Attended-mode convenience; never gates completion
    fn offer_log_tail(&mut self, bootstrap: &str) {
        let wants_tail = self
            .confirm
            .confirm(&format!("Tail {GUEST_LOG} on the new machine?"))
            .unwrap_or(false);
        if wants_tail
            && let Err(e) = self
                .shell
                .run_interactive(bootstrap, &format!("tail -f {GUEST_LOG}"))
        {
            log::warn!("log tail failed: {e}");
        }
    }
}

fn warn_resize_failure(e: &ResizeError) {
    ui::warn(&format!("sizing change failed: {e} - continuing to power-on"));
    if let ResizeError::Ambiguous { matches, .. } = e {
        for m in matches {
            ui::dim(m);
        }
    }
    log::warn!("sizing change failed: {e}");
}

// ============================================================================
// Tests
// ============================================================================

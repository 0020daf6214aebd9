//! Resize command - the standalone sizing-change client.
//!
//! Exit codes are its contract: 0 applied, 2 VM powered on, 3 no
//! matching VM, 4 multiple matching VMs, 1 anything else. The mapping
//! lives on `ResizeError`; main reads it off the error.

use anyhow::Result;

use crate::Context as AppContext;
use crate::cli::ResizeArgs;
use crate::config::ProvmConfig;
use crate::ui;
use controlplane::shell::GovcVirt;
use controlplane::{ResizeError, resize};

pub fn run(_ctx: &AppContext, args: ResizeArgs) -> Result<()> {
    let config = ProvmConfig::load()?;
    let virt = GovcVirt::new();

    match resize(&virt, &config.limits, &args.name, args.cpus, args.memory) {
        Ok(applied) => {
            ui::success(&format!(
                "{}: applied {} vCPU / {} MiB",
                args.name, applied.cpus, applied.memory_mib
            ));
            Ok(())
        }
        Err(e) => {
            if let ResizeError::Ambiguous { matches, .. } = &e {
                ui::error("matched more than one VM:");
                for m in matches {
                    ui::dim(m);
                }
            }
            Err(e.into())
        }
    }
}

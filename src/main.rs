mod cli;
mod commands;
mod config;
mod orchestrator;
mod poller;
mod privilege;
mod probe;
mod request;
mod runner;
mod ui;
mod validate;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use controlplane::ResizeError;
use orchestrator::ProvisionError;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match dispatch(&ctx, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            ExitCode::from(exit_code_for(&err) as u8)
        }
    }
}

fn dispatch(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Deploy(args) => commands::deploy::run(ctx, args),
        Command::Batch(args) => commands::batch::run(ctx, args),
        Command::Resize(args) => commands::resize::run(ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "provm", &mut io::stdout());
            Ok(())
        }
    }
}

/// Map typed failures to the documented exit taxonomies; anything
/// untyped is a generic failure
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<ResizeError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<ProvisionError>() {
        e.exit_code()
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let not_found: anyhow::Error = ResizeError::NotFound { name: "x".into() }.into();
        assert_eq!(exit_code_for(&not_found), 3);

        let start: anyhow::Error = ProvisionError::StartFailed("fault".into()).into();
        assert_eq!(exit_code_for(&start), 2);

        let plain = anyhow::anyhow!("anything else");
        assert_eq!(exit_code_for(&plain), 1);
    }

    #[test]
    fn test_exit_code_survives_context_wrapping() {
        use anyhow::Context as _;
        let err: anyhow::Error = ResizeError::PoweredOn { name: "x".into() }.into();
        let wrapped = Err::<(), _>(err).context("while resizing").unwrap_err();
        assert_eq!(exit_code_for(&wrapped), 2);
    }
}

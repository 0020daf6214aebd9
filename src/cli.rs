use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "provm")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision managed VMs end-to-end", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision a single machine: clone, configure, enroll, resize, power on
    Deploy(DeployArgs),

    /// Provision every node in a declarative node list, one after another
    Batch(BatchArgs),

    /// Apply a CPU/memory sizing change to an existing, powered-off VM
    Resize(ResizeArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Deploy
// ============================================================================

#[derive(Parser)]
pub struct DeployArgs {
    /// Fully-qualified hostname of the machine to provision
    #[arg(short = 'H', long)]
    pub host: String,

    /// Server role assigned to the machine
    #[arg(short, long)]
    pub role: String,

    /// Puppet environment (defaults to the platform default)
    #[arg(short, long)]
    pub environment: Option<String>,

    /// Hiera environment tag (defaults to the platform default)
    #[arg(long)]
    pub hiera_environment: Option<String>,

    /// Template to clone (defaults to the configured template)
    #[arg(short, long)]
    pub template: Option<String>,

    /// Virtual CPU count
    #[arg(short, long)]
    pub cpus: Option<u32>,

    /// Memory size in MiB
    #[arg(short, long)]
    pub memory: Option<u64>,

    /// Suppress interactive prompts
    #[arg(short, long)]
    pub unattended: bool,
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Parser)]
pub struct BatchArgs {
    /// Path to the node list (TOML)
    pub file: PathBuf,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Resize
// ============================================================================

#[derive(Parser)]
pub struct ResizeArgs {
    /// VM name (short hostname) to resize
    #[arg(short, long)]
    pub name: String,

    /// Virtual CPU count to apply
    #[arg(short, long)]
    pub cpus: u32,

    /// Memory size in MiB to apply
    #[arg(short, long)]
    pub memory: u64,
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// psmodget - a fallback-driven module installer
#[derive(Parser)]
#[command(name = "psmodget")]
#[command(about = "Installs PowerShell-style modules, falling back across package clients")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: probe the environment and report the plan without
    /// installing.
    ///
    /// Preconditions are evaluated for real; no install action runs and
    /// nothing is written.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve and execute an installation
    Install {
        /// Module name to install (e.g. VMware.PowerCLI)
        #[arg(short, long)]
        module: Option<String>,

        /// Exact version to install (latest when omitted)
        #[arg(long)]
        version: Option<String>,

        /// Install scope (currentuser, allusers)
        #[arg(long)]
        scope: Option<String>,

        /// Repository name registered with the package clients
        #[arg(long)]
        repository: Option<String>,

        /// Explicit destination modules directory
        #[arg(long)]
        destination: Option<PathBuf>,

        /// Mark the repository trusted so clients skip the interactive prompt
        #[arg(long)]
        trust_repository: bool,

        /// Opt client processes out of telemetry
        #[arg(long)]
        disable_telemetry: bool,

        /// Reinstall even when the requested version is already present
        #[arg(short, long)]
        force: bool,

        /// Request file to start from; explicit flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the aggregate result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe the environment and report what was detected
    Probe {
        /// Print the probe as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a request file
    Validate {
        /// Path to the request file to validate
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod cmd;

#[derive(Parser)]
#[command(name = "crucible")]
#[command(version, about = "Phase-driven build orchestrator with review and sign-off gates")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Approve sign-off gates without prompting
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the current pipeline position
    Status,
    /// Print the resume context for an interrupted run
    Resume,
    /// Move to the next phase
    Advance,
    /// Move to a specific phase
    Transition {
        /// Target phase, e.g. BUILDING or sign-off
        phase: String,
    },
    /// Begin a new epic (from IDLE or COMPLETE)
    StartEpic { epic: u32 },
    /// Mark scaffolding as complete
    ScaffoldingDone,
    /// Run the sign-off gate over the persisted review result
    SignOff {
        /// Epic to sign off (defaults to the current epic)
        #[arg(long)]
        epic: Option<u32>,
    },
    /// Reset the pipeline to IDLE, epic 0
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default crucible.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let file_logging = !matches!(cli.command, Commands::Config { .. });
    let _log_guard = init_logging(&project_dir, cli.verbose, file_logging)?;

    match &cli.command {
        Commands::Status => cmd::cmd_status(&project_dir, &cli)?,
        Commands::Resume => cmd::cmd_resume(&project_dir, &cli)?,
        Commands::Advance => cmd::cmd_advance(&project_dir, &cli)?,
        Commands::Transition { phase } => cmd::cmd_transition(&project_dir, &cli, phase)?,
        Commands::StartEpic { epic } => cmd::cmd_start_epic(&project_dir, &cli, *epic)?,
        Commands::ScaffoldingDone => cmd::cmd_scaffolding_done(&project_dir, &cli)?,
        Commands::SignOff { epic } => cmd::cmd_sign_off(&project_dir, &cli, *epic).await?,
        Commands::Reset { force } => cmd::cmd_reset(&project_dir, &cli, *force)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}

/// File logging is best effort: an unwritable project directory falls back to stderr only.
fn init_logging(
    project_dir: &Path,
    verbose: bool,
    file_logging: bool,
) -> Result<crucible::logging::LogGuard> {
    if file_logging && project_dir.is_dir() {
        let log_dir = crucible::store::ProjectStore::new(project_dir).log_dir();
        if let Ok(guard) = crucible::logging::init(Some(&log_dir), verbose) {
            return Ok(guard);
        }
    }
    crucible::logging::init(None, verbose)
}

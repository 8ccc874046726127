//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled                                              |
//! |-------------|---------------------------------------------------------------|
//! | `pipeline`  | `Status`, `Resume`, `Advance`, `Transition`, `StartEpic`,     |
//! |             | `ScaffoldingDone`, `Reset`                                    |
//! | `sign_off`  | `SignOff`                                                     |
//! | `config`    | `Config`                                                      |

pub mod config;
pub mod pipeline;
pub mod sign_off;

pub use config::cmd_config;
pub use pipeline::{
    cmd_advance, cmd_reset, cmd_resume, cmd_scaffolding_done, cmd_start_epic, cmd_status,
    cmd_transition,
};
pub use sign_off::cmd_sign_off;

use anyhow::Result;
use crucible::config::CrucibleConfig;
use crucible::orchestrator::PipelineOrchestrator;
use std::path::Path;

use super::Cli;

/// Load the effective config and an orchestrator bound to its profile.
fn load(project_dir: &Path, cli: &Cli) -> Result<(CrucibleConfig, PipelineOrchestrator)> {
    let config = CrucibleConfig::with_cli_args(project_dir.to_path_buf(), cli.verbose, cli.yes)?;
    let orch = PipelineOrchestrator::load(&config.project_dir, config.profile().cloned())?;
    Ok((config, orch))
}

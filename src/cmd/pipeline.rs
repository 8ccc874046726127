//! Phase state machine commands.

use anyhow::Result;
use console::style;
use crucible::convergence::ConvergenceStore;
use crucible::phase::Phase;
use crucible::review::ReviewPhaseResult;
use crucible::ui::icons::{BLOCKER, CHECK, PHASE, SPARKLE, WARN};
use std::path::Path;

use super::super::Cli;
use super::load;

pub fn cmd_status(project_dir: &Path, cli: &Cli) -> Result<()> {
    let (config, orch) = load(project_dir, cli)?;
    let store = config.store();

    println!();
    print!("{}", orch.format_status());

    let epic = orch.state().epic_number;
    if let Some(review) = store.read_json::<ReviewPhaseResult>(&store.review_result_file(epic))? {
        println!();
        if review.can_advance() {
            println!("{}Epic {} review: ready for sign-off", CHECK, epic);
        } else {
            println!(
                "{}Epic {} review: {} blocking issue(s)",
                BLOCKER,
                epic,
                review.blocking_issues().len()
            );
            for issue in review.blocking_issues() {
                println!("    - {}", issue);
            }
        }
    }

    if let Some(mut history) = ConvergenceStore::new(store).load()? {
        let limits = config.convergence_state();
        history.max_depth = limits.max_depth;
        history.threshold = limits.threshold;
        if let Some(latest) = history.latest() {
            let decision = history.should_stop();
            println!();
            println!(
                "Improvement cycles: {} (latest remaining: {}, {})",
                history.cycles().len(),
                latest.remaining,
                decision.reason
            );
        }
    }
    println!();

    for warning in config.validate() {
        println!("{}{}", WARN, style(warning).yellow());
    }
    Ok(())
}

pub fn cmd_resume(project_dir: &Path, cli: &Cli) -> Result<()> {
    let (_, orch) = load(project_dir, cli)?;
    print!("{}", orch.format_resume_context());
    Ok(())
}

pub fn cmd_advance(project_dir: &Path, cli: &Cli) -> Result<()> {
    let (_, mut orch) = load(project_dir, cli)?;
    let from = orch.phase();
    let to = orch.advance()?;
    print_transition(from, to);
    Ok(())
}

pub fn cmd_transition(project_dir: &Path, cli: &Cli, phase: &str) -> Result<()> {
    let to: Phase = phase.parse()?;
    let (_, mut orch) = load(project_dir, cli)?;
    let from = orch.phase();
    orch.transition(to)?;
    print_transition(from, to);
    Ok(())
}

pub fn cmd_start_epic(project_dir: &Path, cli: &Cli, epic: u32) -> Result<()> {
    let (_, mut orch) = load(project_dir, cli)?;
    orch.start_epic(epic)?;
    println!("{}Started epic {}", SPARKLE, style(epic).bold());
    Ok(())
}

pub fn cmd_scaffolding_done(project_dir: &Path, cli: &Cli) -> Result<()> {
    let (_, mut orch) = load(project_dir, cli)?;
    orch.complete_scaffolding()?;
    println!("{}Scaffolding marked complete", CHECK);
    Ok(())
}

pub fn cmd_reset(project_dir: &Path, cli: &Cli, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will reset the pipeline to IDLE, epic 0. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let (_, mut orch) = load(project_dir, cli)?;
    orch.reset()?;
    println!("Reset complete");
    Ok(())
}

fn print_transition(from: Phase, to: Phase) {
    println!(
        "{}{} → {}",
        PHASE,
        style(from).dim(),
        style(to).bold().cyan()
    );
}

//! `crucible sign-off`: the human approval gate between REVIEWING and DEPLOYING.

use anyhow::{Result, bail};
use console::style;
use crucible::gates::{SignOffGate, TerminalSignOff};
use crucible::phase::Phase;
use crucible::review::ReviewPhaseResult;
use crucible::ui::icons::{CHECK, CROSS};
use std::path::Path;
use std::sync::Arc;

use super::super::Cli;
use super::load;

pub async fn cmd_sign_off(project_dir: &Path, cli: &Cli, epic: Option<u32>) -> Result<()> {
    let (config, mut orch) = load(project_dir, cli)?;
    let store = config.store();
    let epic = epic.unwrap_or(orch.state().epic_number);

    if orch.phase() != Phase::SignOff {
        bail!(
            "Sign-off requires phase {} (current: {})",
            Phase::SignOff,
            orch.phase()
        );
    }

    let result_path = store.review_result_file(epic);
    let Some(review) = store.read_json::<ReviewPhaseResult>(&result_path)? else {
        bail!(
            "No review result for epic {} at {}; run the review panel first",
            epic,
            result_path.display()
        );
    };

    let outcome = SignOffGate::new()
        .with_prompt(Arc::new(TerminalSignOff))
        .with_max_rejection_cycles(config.max_rejection_cycles())
        .autonomous(config.autonomous())
        .run(&config.project_dir, epic, review)
        .await?;

    store.write_json(&store.review_dir(epic).join("sign-off.json"), &outcome)?;

    println!();
    if outcome.approved {
        orch.transition(Phase::Deploying)?;
        println!(
            "{}Epic {} approved{}",
            CHECK,
            epic,
            if config.autonomous() {
                style(" (autonomous)").dim().to_string()
            } else {
                String::new()
            }
        );
    } else {
        orch.transition(Phase::Building)?;
        println!(
            "{}Epic {} rejected after {} fix cycle(s); back to {}",
            CROSS,
            epic,
            outcome.rejection_cycles,
            Phase::Building
        );
    }
    Ok(())
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use console::style;
use dialoguer::{Input, Select, theme::ColorfulTheme};

use super::{SignOffDecision, SignOffPrompt};
use crate::review::EpicSummary;
use crate::ui::icons::{BLOCKER, CHECK, REVIEW};

const OPTIONS: &[&str] = &["Approve epic", "Reject and request fixes"];

/// Interactive sign-off on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalSignOff;

#[async_trait]
impl SignOffPrompt for TerminalSignOff {
    async fn prompt(&self, summary: &EpicSummary) -> Result<SignOffDecision> {
        let summary = summary.clone();
        tokio::task::spawn_blocking(move || interact(&summary))
            .await
            .context("Sign-off prompt task panicked")?
    }
}

fn interact(summary: &EpicSummary) -> Result<SignOffDecision> {
    println!();
    println!(
        "{}{}",
        REVIEW,
        style(format!("Epic {} sign-off", summary.epic_number)).bold()
    );
    println!("{}", style(summary.summary_path.display()).dim());
    println!();
    println!("{}", summary.markdown);

    if summary.can_advance {
        println!("{}{}", CHECK, style("No blocking issues").green());
    } else {
        println!(
            "{}{}",
            BLOCKER,
            style(format!("{} blocking issue(s)", summary.blocking_issues.len())).yellow()
        );
    }

    let theme = ColorfulTheme::default();
    let selection = Select::with_theme(&theme)
        .with_prompt("Sign off on this epic?")
        .items(OPTIONS)
        .default(0)
        .interact()?;

    let feedback = if selection == 1 {
        Input::<String>::with_theme(&theme)
            .with_prompt("What needs to change?")
            .allow_empty(true)
            .interact_text()?
    } else {
        String::new()
    };

    Ok(decision_from_selection(selection, feedback))
}

/// Map a menu index (and any typed feedback) to a decision.
pub fn decision_from_selection(selection: usize, feedback: String) -> SignOffDecision {
    match selection {
        0 => SignOffDecision::Approve,
        _ => SignOffDecision::Reject {
            feedback: feedback.trim().to_string(),
        },
    }
}

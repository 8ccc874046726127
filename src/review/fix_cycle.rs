//! Sequential remediation run after a sign-off rejection.
//!
//! Same steps as the second half of the review panel, seeded with the
//! findings the reviewer already saw plus the human feedback. Only critical
//! security findings block here: the high ones were already on the table
//! when the reviewer rejected.

use tracing::info;

use super::agents::AgentContext;
use super::findings::{Finding, Severity};
use super::pipeline::{FixCycleAgents, ReviewPhaseResult, run_remediation};
use crate::errors::ReviewError;
use crate::store::ProjectStore;

pub const USER_FEEDBACK_TITLE: &str = "User feedback during sign-off";

/// Run one fix cycle. Reports land in `ctx.review_dir`.
pub async fn run_fix_cycle(
    ctx: &AgentContext,
    feedback: &str,
    previous_findings: &[Finding],
    agents: &FixCycleAgents,
) -> Result<ReviewPhaseResult, ReviewError> {
    let findings = seed_findings(feedback, previous_findings);
    info!(
        epic = ctx.epic_number,
        findings = findings.len(),
        dir = %ctx.review_dir.display(),
        "Starting fix cycle"
    );

    let mut result = ReviewPhaseResult::new(ctx.epic_number);
    run_remediation(ctx, &findings, agents, Severity::Critical, None, &mut result).await?;

    ProjectStore::new(&ctx.project_dir)
        .write_json(&ctx.review_dir.join("fix-cycle-result.json"), &result)
        .map_err(ReviewError::Persist)?;

    info!(
        epic = ctx.epic_number,
        can_advance = result.can_advance(),
        "Fix cycle finished"
    );
    Ok(result)
}

fn seed_findings(feedback: &str, previous_findings: &[Finding]) -> Vec<Finding> {
    let mut findings = previous_findings.to_vec();
    let feedback = feedback.trim();
    if !feedback.is_empty() {
        findings.push(Finding::new(Severity::High, USER_FEEDBACK_TITLE, feedback));
    }
    findings
}

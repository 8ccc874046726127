//! Human sign-off gate with bounded fix-cycle remediation.
//!
//! The gate writes the epic summary and asks a [`SignOffPrompt`] for a
//! verdict. A rejection runs a fix cycle (when fix agents are available),
//! regenerates the summary and asks again, at most `max_rejection_cycles`
//! times.

pub mod terminal;

pub use terminal::TerminalSignOff;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::ReviewError;
use crate::review::{
    AgentContext, EpicSummary, Finding, FixCycleAgents, ReviewPhaseResult, run_fix_cycle,
    write_epic_summary,
};
use crate::store::ProjectStore;

pub const DEFAULT_MAX_REJECTION_CYCLES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOffDecision {
    Approve,
    Reject { feedback: String },
}

/// Asks a human (or a stand-in) to approve an epic.
#[async_trait]
pub trait SignOffPrompt: Send + Sync {
    async fn prompt(&self, summary: &EpicSummary) -> Result<SignOffDecision>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignOffResult {
    pub approved: bool,
    pub rejection_cycles: u32,
    /// The most recent review: the original one, or the last fix cycle's.
    pub review_result: ReviewPhaseResult,
    pub summary: Option<EpicSummary>,
}

/// Builder-style front end over [`run_epic_sign_off`].
pub struct SignOffGate {
    prompt: Option<Arc<dyn SignOffPrompt>>,
    fix_agents: Option<FixCycleAgents>,
    max_rejection_cycles: u32,
    autonomous: bool,
}

impl Default for SignOffGate {
    fn default() -> Self {
        Self {
            prompt: None,
            fix_agents: None,
            max_rejection_cycles: DEFAULT_MAX_REJECTION_CYCLES,
            autonomous: false,
        }
    }
}

impl SignOffGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn SignOffPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_fix_agents(mut self, agents: FixCycleAgents) -> Self {
        self.fix_agents = Some(agents);
        self
    }

    pub fn with_max_rejection_cycles(mut self, max: u32) -> Self {
        self.max_rejection_cycles = max;
        self
    }

    pub fn autonomous(mut self, autonomous: bool) -> Self {
        self.autonomous = autonomous;
        self
    }

    pub async fn run(
        &self,
        project_dir: &Path,
        epic_number: u32,
        review_result: ReviewPhaseResult,
    ) -> Result<SignOffResult, ReviewError> {
        run_epic_sign_off(
            project_dir,
            epic_number,
            review_result,
            self.prompt.as_deref(),
            self.fix_agents.as_ref(),
            self.max_rejection_cycles,
            self.autonomous,
        )
        .await
    }
}

/// Run the sign-off loop for one epic.
///
/// With `autonomous` set, or without a prompt, the epic is approved outright.
/// A prompt that keeps rejecting is asked exactly `max_rejection_cycles` times
/// (once when the cap is 0).
pub async fn run_epic_sign_off(
    project_dir: &Path,
    epic_number: u32,
    review_result: ReviewPhaseResult,
    prompt: Option<&dyn SignOffPrompt>,
    fix_agents: Option<&FixCycleAgents>,
    max_rejection_cycles: u32,
    autonomous: bool,
) -> Result<SignOffResult, ReviewError> {
    let prompt = match prompt {
        Some(prompt) if !autonomous => prompt,
        _ => {
            info!(epic = epic_number, autonomous, "Sign-off auto-approved");
            return Ok(SignOffResult {
                approved: true,
                rejection_cycles: 0,
                review_result,
                summary: None,
            });
        }
    };

    let store = ProjectStore::new(project_dir);
    let original_findings = review_result.review_findings();
    let mut latest = review_result;
    let mut cycles = 0;
    let mut summary = write_epic_summary(&store, &latest, cycles, &original_findings)?;

    loop {
        let decision = prompt
            .prompt(&summary)
            .await
            .map_err(|source| ReviewError::PromptFailed {
                epic: epic_number,
                source,
            })?;

        let feedback = match decision {
            SignOffDecision::Approve => {
                info!(epic = epic_number, rejection_cycles = cycles, "Epic approved");
                return Ok(SignOffResult {
                    approved: true,
                    rejection_cycles: cycles,
                    review_result: latest,
                    summary: Some(summary),
                });
            }
            SignOffDecision::Reject { feedback } => feedback,
        };

        let Some(agents) = fix_agents else {
            warn!(epic = epic_number, "Epic rejected and no fix agents are configured");
            return Ok(SignOffResult {
                approved: false,
                rejection_cycles: 0,
                review_result: latest,
                summary: Some(summary),
            });
        };

        if cycles >= max_rejection_cycles {
            return Ok(rejected(max_rejection_cycles, latest, summary));
        }

        cycles += 1;
        info!(epic = epic_number, cycle = cycles, "Epic rejected; running fix cycle");
        let prior = prior_findings(&original_findings, &latest);
        let ctx = AgentContext::for_epic(&store, epic_number)
            .with_review_dir(store.fix_cycle_dir(epic_number, cycles));
        latest = run_fix_cycle(&ctx, &feedback, &prior, agents).await?;
        summary = write_epic_summary(&store, &latest, cycles, &original_findings)?;

        if cycles >= max_rejection_cycles {
            return Ok(rejected(cycles, latest, summary));
        }
    }
}

fn rejected(cycles: u32, review_result: ReviewPhaseResult, summary: EpicSummary) -> SignOffResult {
    warn!(
        epic = review_result.epic_number,
        rejection_cycles = cycles,
        "Rejection cap reached"
    );
    SignOffResult {
        approved: false,
        rejection_cycles: cycles,
        review_result,
        summary: Some(summary),
    }
}

/// Original review findings plus the latest security findings, first occurrence wins.
fn prior_findings(original: &[Finding], latest: &ReviewPhaseResult) -> Vec<Finding> {
    let mut seen = HashSet::new();
    original
        .iter()
        .cloned()
        .chain(latest.security_findings())
        .filter(|f| seen.insert(f.key()))
        .collect()
}

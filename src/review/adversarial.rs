//! Iterate-verify-fix convergence loop.
//!
//! Each iteration runs the analysis agents in parallel, filters their
//! findings through a [`FindingVerifier`], and hands the survivors to a
//! [`Fixer`]. The loop exits when no verified finding remains, when the fixer
//! leaves the test suite red, when the same verified findings come back
//! twice in a row, or when the iteration cap is hit. The stuck check runs
//! every iteration before the cap check, so a finding the fixer claims to
//! have fixed but that keeps reappearing ends the loop as stuck.
//!
//! Every iteration's raw agent output is persisted as
//! `adversarial/iteration-<k>.json`; the final [`LoopResult`] as
//! `adversarial/loop-result.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::agents::{AgentContext, AnalysisAgent, Fixer, TestSuiteRunner};
use super::findings::{AgentResult, Finding, FindingKey, FixAttempt, flatten_findings};
use super::pipeline::analyze_all;
use super::verifier::{FindingVerifier, FsVerifier};
use crate::errors::ReviewError;
use crate::store::ProjectStore;

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopExitReason {
    Converged,
    Stuck,
    MaxIterations,
    TestFailure,
}

impl fmt::Display for LoopExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Converged => "converged",
            Self::Stuck => "stuck",
            Self::MaxIterations => "max-iterations",
            Self::TestFailure => "test-failure",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStage {
    Review,
    Verify,
    Fix,
    Done,
}

/// Called with the 1-based iteration number and the stage being entered.
pub type LoopProgressFn = Arc<dyn Fn(u32, LoopStage) + Send + Sync>;

/// Cumulative outcome of a loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    pub exit_reason: LoopExitReason,
    pub iterations: u32,
    pub total_findings: usize,
    pub total_fixed: usize,
    pub total_discarded: usize,
    pub unresolved_findings: Vec<Finding>,
    pub fix_attempts: Vec<FixAttempt>,
}

/// Raw agent output of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationArtifact {
    pub iteration: u32,
    pub recorded_at: DateTime<Utc>,
    pub agent_results: Vec<AgentResult>,
}

/// Builder-style front end over [`run_adversarial_loop`].
pub struct AdversarialLoop {
    agents: Vec<Arc<dyn AnalysisAgent>>,
    verifier: Arc<dyn FindingVerifier>,
    fixer: Arc<dyn Fixer>,
    test_runner: Option<Arc<dyn TestSuiteRunner>>,
    max_iterations: u32,
    progress: Option<LoopProgressFn>,
}

impl AdversarialLoop {
    pub fn new(agents: Vec<Arc<dyn AnalysisAgent>>, fixer: Arc<dyn Fixer>) -> Self {
        Self {
            agents,
            verifier: Arc::new(FsVerifier),
            fixer,
            test_runner: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            progress: None,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn FindingVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_test_runner(mut self, runner: Arc<dyn TestSuiteRunner>) -> Self {
        self.test_runner = Some(runner);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_progress(mut self, progress: LoopProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn run(&self, project_dir: &Path, epic_number: u32) -> Result<LoopResult, ReviewError> {
        execute(
            project_dir,
            epic_number,
            &self.agents,
            self.verifier.as_ref(),
            self.fixer.as_ref(),
            self.max_iterations,
            self.test_runner.as_deref(),
            self.progress.as_ref(),
        )
        .await
    }
}

/// Run the loop without progress reporting.
///
/// A `max_iterations` of 0 is treated as 1: the agents always run at least once.
pub async fn run_adversarial_loop(
    project_dir: &Path,
    epic_number: u32,
    agents: &[Arc<dyn AnalysisAgent>],
    verifier: &dyn FindingVerifier,
    fixer: &dyn Fixer,
    max_iterations: u32,
    test_runner: Option<&dyn TestSuiteRunner>,
) -> Result<LoopResult, ReviewError> {
    execute(
        project_dir,
        epic_number,
        agents,
        verifier,
        fixer,
        max_iterations,
        test_runner,
        None,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn execute(
    project_dir: &Path,
    epic_number: u32,
    agents: &[Arc<dyn AnalysisAgent>],
    verifier: &dyn FindingVerifier,
    fixer: &dyn Fixer,
    max_iterations: u32,
    test_runner: Option<&dyn TestSuiteRunner>,
    progress: Option<&LoopProgressFn>,
) -> Result<LoopResult, ReviewError> {
    let store = ProjectStore::new(project_dir);
    let dir = store.adversarial_dir(epic_number);
    let ctx = AgentContext::for_epic(&store, epic_number).with_review_dir(&dir);
    let cap = max_iterations.max(1);
    let emit = |iteration: u32, stage: LoopStage| {
        if let Some(progress) = progress {
            progress(iteration, stage);
        }
    };

    let mut total_findings = 0;
    let mut total_fixed = 0;
    let mut total_discarded = 0;
    let mut fix_attempts = Vec::new();
    let mut unresolved: Vec<Finding> = Vec::new();
    let mut previous: Option<BTreeSet<FindingKey>> = None;
    let mut iteration = 0;

    info!(epic = epic_number, max_iterations = cap, "Starting adversarial loop");

    let exit_reason = loop {
        iteration += 1;

        emit(iteration, LoopStage::Review);
        let agent_results = analyze_all(agents, &ctx, "adversarial-review").await?;
        let artifact = IterationArtifact {
            iteration,
            recorded_at: Utc::now(),
            agent_results,
        };
        store
            .write_json(&dir.join(format!("iteration-{}.json", iteration)), &artifact)
            .map_err(ReviewError::Persist)?;
        let findings = flatten_findings(&artifact.agent_results);

        emit(iteration, LoopStage::Verify);
        let verification = verifier.verify(project_dir, &findings);
        total_findings += verification.stats.verified;
        total_discarded += verification.stats.discarded;
        debug!(
            epic = epic_number,
            iteration,
            verified = verification.stats.verified,
            discarded = verification.stats.discarded,
            "Findings verified"
        );

        if verification.verified.is_empty() {
            unresolved.clear();
            emit(iteration, LoopStage::Fix);
            emit(iteration, LoopStage::Done);
            break LoopExitReason::Converged;
        }

        emit(iteration, LoopStage::Fix);
        let outcome = fixer
            .fix(&ctx, &verification.verified, test_runner)
            .await
            .map_err(|e| ReviewError::agent("fix", "fixer", e))?;
        total_fixed += outcome.fixed.len();
        fix_attempts.extend(outcome.results);
        unresolved = outcome.unfixed;
        emit(iteration, LoopStage::Done);

        if !outcome.final_test_result.passed {
            warn!(epic = epic_number, iteration, "Tests failing after fixes");
            break LoopExitReason::TestFailure;
        }

        // compared on what the agents reported, not on what the fixer claims
        let keys: BTreeSet<FindingKey> = verification.verified.iter().map(Finding::key).collect();
        if previous.as_ref() == Some(&keys) {
            warn!(epic = epic_number, iteration, recurring = keys.len(), "Loop is stuck");
            unresolved = verification.verified;
            break LoopExitReason::Stuck;
        }
        previous = Some(keys);

        if iteration >= cap {
            break LoopExitReason::MaxIterations;
        }
    };

    let result = LoopResult {
        exit_reason,
        iterations: iteration,
        total_findings,
        total_fixed,
        total_discarded,
        unresolved_findings: unresolved,
        fix_attempts,
    };
    store
        .write_json(&dir.join("loop-result.json"), &result)
        .map_err(ReviewError::Persist)?;

    info!(
        epic = epic_number,
        iterations = result.iterations,
        exit = %result.exit_reason,
        fixed = result.total_fixed,
        "Adversarial loop finished"
    );
    Ok(result)
}

//! Review panel coordinator.
//!
//! Runs the parallel analysis agents, then the sequential hardening
//! pipeline (refactoring, test hardening, test suite, security, QA), and
//! aggregates blocking issues into a [`ReviewPhaseResult`].
//!
//! Quality-gate failures are data on the result. Agent and tooling failures
//! are fatal [`ReviewError`]s tagged with the step that raised them; the one
//! exception is a QA crash, which is recorded as a failed QA result.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::agents::{AgentContext, AnalysisAgent, RefactoringAgent, TestSuiteRunner};
use super::findings::{AgentResult, Finding, Severity, TestSuiteResult, flatten_findings};
use crate::errors::ReviewError;
use crate::store::ProjectStore;

/// Named step of a review or fix-cycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewStep {
    Parallel,
    Refactoring,
    TestHardening,
    TestSuite,
    Security,
    Qa,
}

impl ReviewStep {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Refactoring => "refactoring",
            Self::TestHardening => "test-hardening",
            Self::TestSuite => "test-suite",
            Self::Security => "security",
            Self::Qa => "qa",
        }
    }
}

impl fmt::Display for ReviewStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Starting,
    Completed,
    Failed,
}

/// Progress observer, called synchronously around every step.
pub type ProgressFn = Arc<dyn Fn(ReviewStep, StepStatus) + Send + Sync>;

/// The sequential agents shared by the review pipeline and the fix cycle.
#[derive(Clone)]
pub struct FixCycleAgents {
    pub refactoring: Arc<dyn RefactoringAgent>,
    pub test_hardening: Arc<dyn AnalysisAgent>,
    pub test_suite: Arc<dyn TestSuiteRunner>,
    pub security: Arc<dyn AnalysisAgent>,
    pub qa: Arc<dyn AnalysisAgent>,
}

/// Everything the review panel runs.
#[derive(Clone)]
pub struct ReviewAgents {
    pub parallel: Vec<Arc<dyn AnalysisAgent>>,
    pub remediation: FixCycleAgents,
}

/// Aggregated outcome of one review (or fix-cycle) run.
///
/// `can_advance()` is derived from `blocking_issues`, so the two can never
/// disagree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewPhaseResult {
    pub epic_number: u32,
    #[serde(default)]
    pub parallel_results: Vec<AgentResult>,
    #[serde(default)]
    pub refactoring_result: Option<AgentResult>,
    #[serde(default)]
    pub test_hardening_result: Option<AgentResult>,
    #[serde(default)]
    pub test_suite_result: Option<TestSuiteResult>,
    #[serde(default)]
    pub security_result: Option<AgentResult>,
    #[serde(default)]
    pub qa_result: Option<AgentResult>,
    #[serde(default)]
    blocking_issues: Vec<String>,
    #[serde(default)]
    pub last_completed_phase: Option<ReviewStep>,
}

impl ReviewPhaseResult {
    pub fn new(epic_number: u32) -> Self {
        Self {
            epic_number,
            ..Default::default()
        }
    }

    pub fn can_advance(&self) -> bool {
        self.blocking_issues.is_empty()
    }

    pub fn blocking_issues(&self) -> &[String] {
        &self.blocking_issues
    }

    pub fn add_blocking_issue(&mut self, issue: impl Into<String>) {
        self.blocking_issues.push(issue.into());
    }

    /// True when the test suite ran and failed.
    pub fn tests_failed(&self) -> bool {
        self.test_suite_result.as_ref().is_some_and(|t| !t.passed)
    }

    /// Findings from the parallel agents followed by the security agent.
    pub fn review_findings(&self) -> Vec<Finding> {
        flatten_findings(self.parallel_results.iter().chain(self.security_result.iter()))
    }

    pub fn security_findings(&self) -> Vec<Finding> {
        flatten_findings(self.security_result.iter())
    }
}

/// Runs the full review for one epic.
pub struct ReviewPanel {
    agents: ReviewAgents,
    progress: Option<ProgressFn>,
}

impl ReviewPanel {
    pub fn new(agents: ReviewAgents) -> Self {
        Self {
            agents,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn run(
        &self,
        project_dir: &Path,
        epic_number: u32,
    ) -> Result<ReviewPhaseResult, ReviewError> {
        execute(project_dir, epic_number, &self.agents, self.progress.as_ref()).await
    }
}

/// Run the review pipeline without progress reporting.
pub async fn run_review_pipeline(
    project_dir: &Path,
    epic_number: u32,
    agents: &ReviewAgents,
) -> Result<ReviewPhaseResult, ReviewError> {
    execute(project_dir, epic_number, agents, None).await
}

async fn execute(
    project_dir: &Path,
    epic_number: u32,
    agents: &ReviewAgents,
    progress: Option<&ProgressFn>,
) -> Result<ReviewPhaseResult, ReviewError> {
    let store = ProjectStore::new(project_dir);
    let ctx = AgentContext::for_epic(&store, epic_number);
    let mut result = ReviewPhaseResult::new(epic_number);

    info!(
        epic = epic_number,
        agents = agents.parallel.len(),
        "Starting review panel"
    );

    emit(progress, ReviewStep::Parallel, StepStatus::Starting);
    let parallel = match analyze_all(&agents.parallel, &ctx, ReviewStep::Parallel.label()).await {
        Ok(results) => results,
        Err(e) => {
            emit(progress, ReviewStep::Parallel, StepStatus::Failed);
            return Err(e);
        }
    };
    for agent_result in &parallel {
        write_agent_report(&ctx, ReviewStep::Parallel, agent_result)?;
    }
    result.parallel_results = parallel;
    result.last_completed_phase = Some(ReviewStep::Parallel);
    emit(progress, ReviewStep::Parallel, StepStatus::Completed);

    let findings = flatten_findings(&result.parallel_results);
    run_remediation(
        &ctx,
        &findings,
        &agents.remediation,
        Severity::High,
        progress,
        &mut result,
    )
    .await?;

    persist_result(&store, &result)?;
    info!(
        epic = epic_number,
        can_advance = result.can_advance(),
        blocking = result.blocking_issues.len(),
        "Review panel finished"
    );
    Ok(result)
}

/// Run every agent concurrently. The first failure aborts the whole join.
pub(crate) async fn analyze_all(
    agents: &[Arc<dyn AnalysisAgent>],
    ctx: &AgentContext,
    step: &str,
) -> Result<Vec<AgentResult>, ReviewError> {
    try_join_all(agents.iter().map(|agent| async move {
        agent
            .analyze(ctx)
            .await
            .map_err(|e| ReviewError::agent(step, agent.id(), e))
    }))
    .await
}

/// The sequential half shared by the review pipeline and the fix cycle.
///
/// Security findings at or above `security_floor` become blocking issues.
/// A failing test suite stops the run before security and QA.
pub(crate) async fn run_remediation(
    ctx: &AgentContext,
    findings: &[Finding],
    agents: &FixCycleAgents,
    security_floor: Severity,
    progress: Option<&ProgressFn>,
    result: &mut ReviewPhaseResult,
) -> Result<(), ReviewError> {
    // refactoring
    let step = ReviewStep::Refactoring;
    emit(progress, step, StepStatus::Starting);
    let refactoring = agents
        .refactoring
        .refactor(ctx, findings)
        .await
        .map_err(|e| fail(progress, step, agents.refactoring.id(), e))?;
    write_agent_report(ctx, step, &refactoring)?;
    result.refactoring_result = Some(refactoring);
    complete(progress, step, result);

    // test hardening
    let step = ReviewStep::TestHardening;
    emit(progress, step, StepStatus::Starting);
    let hardening = agents
        .test_hardening
        .analyze(ctx)
        .await
        .map_err(|e| fail(progress, step, agents.test_hardening.id(), e))?;
    write_agent_report(ctx, step, &hardening)?;
    result.test_hardening_result = Some(hardening);
    complete(progress, step, result);

    // test suite
    let step = ReviewStep::TestSuite;
    emit(progress, step, StepStatus::Starting);
    let suite = agents
        .test_suite
        .run(&ctx.project_dir)
        .await
        .map_err(|e| fail(progress, step, "test-suite", e))?;
    write_report(ctx, &format!("{}.md", step.label()), &render_test_report(&suite))?;
    let passed = suite.passed;
    result.test_suite_result = Some(suite);
    if !passed {
        warn!(epic = ctx.epic_number, "Test suite failed; skipping security and QA");
        result.add_blocking_issue("Test suite failed");
        emit(progress, step, StepStatus::Failed);
        return Ok(());
    }
    complete(progress, step, result);

    // security
    let step = ReviewStep::Security;
    emit(progress, step, StepStatus::Starting);
    let security = agents
        .security
        .analyze(ctx)
        .await
        .map_err(|e| fail(progress, step, agents.security.id(), e))?;
    write_agent_report(ctx, step, &security)?;
    for finding in security.findings.iter().filter(|f| f.severity() >= security_floor) {
        result.add_blocking_issue(finding.blocking_label());
    }
    result.security_result = Some(security);
    complete(progress, step, result);

    // qa
    let step = ReviewStep::Qa;
    emit(progress, step, StepStatus::Starting);
    let qa = match agents.qa.analyze(ctx).await {
        Ok(qa) => qa,
        Err(e) => {
            warn!(epic = ctx.epic_number, agent = agents.qa.id(), error = %e, "QA agent crashed");
            AgentResult::failed(agents.qa.id(), format!("QA agent crashed: {:#}", e))
        }
    };
    write_agent_report(ctx, step, &qa)?;
    if !qa.success {
        result.add_blocking_issue(format!("QA agent '{}' reported failure", qa.agent_id));
    }
    for issue in &qa.blocking_issues {
        result.add_blocking_issue(issue.clone());
    }
    let qa_passed = qa.success;
    result.qa_result = Some(qa);
    if qa_passed {
        complete(progress, step, result);
    } else {
        emit(progress, step, StepStatus::Failed);
    }

    Ok(())
}

pub(crate) fn persist_result(store: &ProjectStore, result: &ReviewPhaseResult) -> Result<(), ReviewError> {
    store
        .write_json(&store.review_result_file(result.epic_number), result)
        .map_err(ReviewError::Persist)
}

fn emit(progress: Option<&ProgressFn>, step: ReviewStep, status: StepStatus) {
    if let Some(progress) = progress {
        progress(step, status);
    }
}

fn complete(progress: Option<&ProgressFn>, step: ReviewStep, result: &mut ReviewPhaseResult) {
    result.last_completed_phase = Some(step);
    emit(progress, step, StepStatus::Completed);
}

fn fail(
    progress: Option<&ProgressFn>,
    step: ReviewStep,
    agent: &str,
    source: anyhow::Error,
) -> ReviewError {
    emit(progress, step, StepStatus::Failed);
    ReviewError::agent(step.label(), agent, source)
}

fn write_agent_report(ctx: &AgentContext, step: ReviewStep, result: &AgentResult) -> Result<(), ReviewError> {
    let name = format!("{}-{}.md", step.label(), sanitize(&result.agent_id));
    write_report(ctx, &name, &render_agent_report(result))
}

fn write_report(ctx: &AgentContext, name: &str, content: &str) -> Result<(), ReviewError> {
    ProjectStore::new(&ctx.project_dir)
        .write_text(&ctx.review_dir.join(name), content)
        .map_err(ReviewError::Persist)
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

fn render_agent_report(result: &AgentResult) -> String {
    let mut out = format!(
        "# {}\n\nStatus: {}\n\n",
        result.agent_id,
        if result.success { "passed" } else { "failed" }
    );
    if !result.report.trim().is_empty() {
        out.push_str(result.report.trim_end());
        out.push_str("\n\n");
    }
    if !result.findings.is_empty() {
        out.push_str("## Findings\n\n");
        for finding in &result.findings {
            out.push_str(&format!("- {}\n", finding));
            if !finding.description().is_empty() {
                out.push_str(&format!("  {}\n", finding.description()));
            }
        }
        out.push('\n');
    }
    if !result.blocking_issues.is_empty() {
        out.push_str("## Blocking issues\n\n");
        for issue in &result.blocking_issues {
            out.push_str(&format!("- {}\n", issue));
        }
    }
    out
}

fn render_test_report(result: &TestSuiteResult) -> String {
    format!(
        "# test-suite\n\nStatus: {}\n\n```\n{}\n```\n",
        if result.passed { "passed" } else { "failed" },
        result.output.trim_end()
    )
}

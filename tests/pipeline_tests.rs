//! End-to-end library scenarios: orchestrator, review panel, convergence
//! loop and sign-off gate working against one project directory.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use crucible::convergence::{
    ConvergenceState, ConvergenceStore, CycleOutcome, ImprovementCycle, ImprovementDriver,
    StopReason,
};
use crucible::gates::{SignOffDecision, SignOffGate, SignOffPrompt};
use crucible::orchestrator::{DeveloperProfile, PipelineOrchestrator};
use crucible::phase::Phase;
use crucible::review::{
    AdversarialLoop, AgentContext, AgentResult, AnalysisAgent, EpicSummary, Finding,
    FixAttempt, FixCycleAgents, FixOutcome, Fixer, LoopExitReason, RefactoringAgent,
    ReviewAgents, ReviewPanel, ReviewPhaseResult, Severity, TestSuiteResult, TestSuiteRunner,
};
use crucible::store::ProjectStore;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

// =============================================================================
// Test doubles
// =============================================================================

struct Analyst {
    id: &'static str,
    findings: Vec<Finding>,
    calls: AtomicUsize,
}

impl Analyst {
    fn new(id: &'static str, findings: Vec<Finding>) -> Arc<Self> {
        Arc::new(Self {
            id,
            findings,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AnalysisAgent for Analyst {
    fn id(&self) -> &str {
        self.id
    }

    async fn analyze(&self, _ctx: &AgentContext) -> Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AgentResult::passed(self.id, "analysis done").add_findings(self.findings.clone()))
    }
}

struct Refactorer {
    calls: AtomicUsize,
}

#[async_trait]
impl RefactoringAgent for Refactorer {
    fn id(&self) -> &str {
        "refactorer"
    }

    async fn refactor(&self, _ctx: &AgentContext, findings: &[Finding]) -> Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AgentResult::passed("refactorer", format!("touched {} findings", findings.len())))
    }
}

/// Passes or fails according to `pass`; `Err` when `broken`.
struct Suite {
    pass: bool,
    broken: bool,
}

#[async_trait]
impl TestSuiteRunner for Suite {
    async fn run(&self, _project_dir: &Path) -> Result<TestSuiteResult> {
        if self.broken {
            return Err(anyhow!("runner missing"));
        }
        Ok(if self.pass {
            TestSuiteResult::passed("42 passed")
        } else {
            TestSuiteResult::failed("1 failed")
        })
    }
}

struct AlwaysReject {
    calls: AtomicUsize,
}

#[async_trait]
impl SignOffPrompt for AlwaysReject {
    async fn prompt(&self, summary: &EpicSummary) -> Result<SignOffDecision> {
        assert!(summary.summary_path.exists());
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SignOffDecision::Reject {
            feedback: "not good enough".to_string(),
        })
    }
}

/// Fixes every finding it is given.
struct FixEverything;

#[async_trait]
impl Fixer for FixEverything {
    async fn fix(
        &self,
        _ctx: &AgentContext,
        findings: &[Finding],
        test_runner: Option<&dyn TestSuiteRunner>,
    ) -> Result<FixOutcome> {
        let final_test_result = match test_runner {
            Some(runner) => runner.run(Path::new(".")).await?,
            None => TestSuiteResult::passed(""),
        };
        Ok(FixOutcome {
            results: findings
                .iter()
                .map(|f| FixAttempt {
                    finding: f.clone(),
                    fixed: true,
                    notes: "patched".to_string(),
                })
                .collect(),
            fixed: findings.to_vec(),
            unfixed: Vec::new(),
            final_test_result,
        })
    }
}

struct Panel {
    security: Arc<Analyst>,
    qa: Arc<Analyst>,
    hardening: Arc<Analyst>,
    refactorer: Arc<Refactorer>,
}

impl Panel {
    fn new(security_findings: Vec<Finding>) -> Self {
        Self {
            security: Analyst::new("security", security_findings),
            qa: Analyst::new("qa", Vec::new()),
            hardening: Analyst::new("test-hardening", Vec::new()),
            refactorer: Arc::new(Refactorer {
                calls: AtomicUsize::new(0),
            }),
        }
    }

    fn fix_agents(&self, suite: Suite) -> FixCycleAgents {
        FixCycleAgents {
            refactoring: self.refactorer.clone(),
            test_hardening: self.hardening.clone(),
            test_suite: Arc::new(suite),
            security: self.security.clone(),
            qa: self.qa.clone(),
        }
    }

    fn agents(&self, suite: Suite) -> ReviewAgents {
        ReviewAgents {
            parallel: vec![
                Analyst::new(
                    "architecture",
                    vec![Finding::new(Severity::Low, "God object", "`Engine` does too much")],
                ),
                Analyst::new("performance", Vec::new()),
            ],
            remediation: self.fix_agents(suite),
        }
    }
}

fn green() -> Suite {
    Suite {
        pass: true,
        broken: false,
    }
}

fn project() -> TempDir {
    TempDir::new().unwrap()
}

fn orchestrator_at(dir: &TempDir, path: &[Phase]) -> PipelineOrchestrator {
    let mut orch =
        PipelineOrchestrator::load(dir.path(), Some(DeveloperProfile::new("Ada"))).unwrap();
    orch.start_epic(1).unwrap();
    for phase in path {
        orch.transition(*phase).unwrap();
    }
    orch
}

const TO_REVIEWING: &[Phase] = &[
    Phase::Planning,
    Phase::Bridging,
    Phase::Scaffolding,
    Phase::Building,
    Phase::Reviewing,
];

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn clean_epic_runs_from_review_to_deploying() {
    let dir = project();
    let mut orch = orchestrator_at(&dir, TO_REVIEWING);

    let panel = Panel::new(Vec::new());
    let review = ReviewPanel::new(panel.agents(green()))
        .run(dir.path(), 1)
        .await
        .unwrap();
    assert!(review.can_advance());
    orch.complete_step("review-panel").unwrap();

    orch.transition(Phase::SignOff).unwrap();
    let outcome = SignOffGate::new()
        .autonomous(true)
        .run(dir.path(), 1, review)
        .await
        .unwrap();
    assert!(outcome.approved);
    orch.transition(Phase::Deploying).unwrap();

    let reloaded = PipelineOrchestrator::load(dir.path(), None).unwrap();
    assert_eq!(reloaded.phase(), Phase::Deploying);
    assert_eq!(reloaded.state().epic_number, 1);
}

#[tokio::test]
async fn failing_suite_blocks_and_skips_security() {
    let dir = project();
    let panel = Panel::new(vec![Finding::new(Severity::Critical, "RCE", "")]);
    let review = ReviewPanel::new(panel.agents(Suite {
        pass: false,
        broken: false,
    }))
    .run(dir.path(), 1)
    .await
    .unwrap();

    assert!(!review.can_advance());
    assert_eq!(review.blocking_issues().len(), 1);
    assert_eq!(panel.security.calls.load(Ordering::SeqCst), 0);
    assert_eq!(panel.qa.calls.load(Ordering::SeqCst), 0);

    let store = ProjectStore::new(dir.path());
    let saved: ReviewPhaseResult = store
        .read_json(&store.review_result_file(1))
        .unwrap()
        .unwrap();
    assert_eq!(saved, review);
}

#[tokio::test]
async fn broken_runner_is_a_tagged_error() {
    let dir = project();
    let panel = Panel::new(Vec::new());
    let err = ReviewPanel::new(panel.agents(Suite {
        pass: true,
        broken: true,
    }))
    .run(dir.path(), 1)
    .await
    .unwrap_err();
    assert!(err.to_string().contains("test-suite"));
    assert!(err.to_string().contains("runner missing"));
}

#[tokio::test]
async fn rejecting_reviewer_exhausts_fix_cycles() {
    let dir = project();
    let panel = Panel::new(vec![Finding::new(Severity::High, "Weak hash", "")]);
    let review = ReviewPanel::new(panel.agents(green()))
        .run(dir.path(), 1)
        .await
        .unwrap();
    assert_eq!(review.blocking_issues(), ["[high] Weak hash"]);
    let refactor_calls_after_review = panel.refactorer.calls.load(Ordering::SeqCst);

    let prompt = Arc::new(AlwaysReject {
        calls: AtomicUsize::new(0),
    });
    let outcome = SignOffGate::new()
        .with_prompt(prompt.clone())
        .with_fix_agents(panel.fix_agents(green()))
        .with_max_rejection_cycles(2)
        .run(dir.path(), 1, review)
        .await
        .unwrap();

    assert!(!outcome.approved);
    assert_eq!(outcome.rejection_cycles, 2);
    assert_eq!(prompt.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        panel.refactorer.calls.load(Ordering::SeqCst) - refactor_calls_after_review,
        2
    );
    assert_eq!(panel.hardening.calls.load(Ordering::SeqCst), 3);
    // high security findings no longer block inside fix cycles
    assert!(outcome.review_result.can_advance());

    let store = ProjectStore::new(dir.path());
    assert!(store.fix_cycle_dir(1, 1).exists());
    assert!(store.fix_cycle_dir(1, 2).exists());
    let summary = std::fs::read_to_string(store.summary_file(1)).unwrap();
    assert!(summary.contains("**Fix cycles run:** 2"));
    // the original panel's findings stay visible after the fix cycles
    assert!(summary.contains("God object"));
}

#[tokio::test]
async fn convergence_loop_discards_hallucinations_and_fixes_the_rest() {
    let dir = project();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/cache.rs"),
        "pub fn evict(&mut self) { self.map.clear() }\n",
    )
    .unwrap();

    let agents: Vec<Arc<dyn AnalysisAgent>> = vec![Analyst::new(
        "adversary",
        vec![
            Finding::new(Severity::High, "`evict` drops dirty entries", "").with_file("src/cache.rs"),
            Finding::new(Severity::High, "`flush` races", "").with_file("src/cache.rs"),
            Finding::new(Severity::Medium, "Missing module", "").with_file("src/ghost.rs"),
        ],
    )];

    let result = AdversarialLoop::new(agents, Arc::new(FixEverything))
        .with_test_runner(Arc::new(green()))
        .with_max_iterations(3)
        .run(dir.path(), 1)
        .await
        .unwrap();

    // the fixed findings come back unchanged on the second pass
    assert_eq!(result.exit_reason, LoopExitReason::Stuck);
    assert_eq!(result.iterations, 2);
    // `flush` never appears in cache.rs and ghost.rs does not exist
    assert_eq!(result.total_findings, 2);
    assert_eq!(result.total_discarded, 4);
    assert_eq!(result.total_fixed, 2);
    assert_eq!(result.unresolved_findings.len(), 1);
    assert_eq!(
        result.unresolved_findings[0].title(),
        "`evict` drops dirty entries"
    );
}

/// Treats one adversarial loop run as one improvement cycle.
struct LoopCycle {
    dir: std::path::PathBuf,
    remaining: Vec<usize>,
}

#[async_trait]
impl ImprovementCycle for LoopCycle {
    async fn run_cycle(&self, cycle: u32) -> Result<CycleOutcome> {
        let agents: Vec<Arc<dyn AnalysisAgent>> = vec![Analyst::new("quiet", Vec::new())];
        let result = AdversarialLoop::new(agents, Arc::new(FixEverything))
            .run(&self.dir, cycle)
            .await?;
        assert_eq!(result.exit_reason, LoopExitReason::Converged);
        let remaining = self.remaining[cycle as usize - 1];
        Ok(CycleOutcome {
            total_findings: result.total_findings + remaining,
            fixed: result.total_fixed,
            remaining,
        })
    }
}

#[tokio::test]
async fn improvement_driver_stops_on_diminishing_returns() {
    let dir = project();
    let store = ConvergenceStore::new(ProjectStore::new(dir.path()));
    let driver = ImprovementDriver::persistent(store.clone());
    let cycle = LoopCycle {
        dir: dir.path().to_path_buf(),
        remaining: vec![6, 3, 3, 1],
    };

    let (state, decision) = driver
        .run(&cycle, ConvergenceState::new(10, 0))
        .await
        .unwrap();

    assert!(decision.stop);
    assert_eq!(decision.reason, StopReason::DiminishingReturns);
    assert_eq!(state.cycles().len(), 3);
    assert_eq!(store.load().unwrap().unwrap(), state);
}

#[test]
fn orchestrator_reload_is_idempotent() {
    let dir = project();
    let mut orch = orchestrator_at(&dir, &[Phase::Planning, Phase::Bridging]);
    orch.set_current_story(Some("1.2".to_string())).unwrap();

    let first = PipelineOrchestrator::load(dir.path(), None).unwrap();
    let second = PipelineOrchestrator::load(dir.path(), None).unwrap();
    assert_eq!(first.state(), second.state());
    assert_eq!(first.state(), orch.state());
    assert_eq!(first.format_status(), second.format_status());
}

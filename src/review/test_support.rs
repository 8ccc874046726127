//! Counting test doubles for the review collaborators.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::agents::{AgentContext, AnalysisAgent, RefactoringAgent, TestSuiteRunner};
use super::findings::{AgentResult, Finding, TestSuiteResult};
use super::pipeline::{FixCycleAgents, ReviewAgents};

#[derive(Clone)]
pub(crate) struct StubAnalysis {
    id: String,
    findings: Vec<Finding>,
    success: bool,
    blocking: Vec<String>,
    error: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl StubAnalysis {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            findings: Vec::new(),
            success: true,
            blocking: Vec::new(),
            error: None,
            calls: Arc::default(),
        }
    }

    pub(crate) fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings = findings;
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.success = false;
        self
    }

    pub(crate) fn with_blocking_issue(mut self, issue: &str) -> Self {
        self.blocking.push(issue.to_string());
        self
    }

    pub(crate) fn erroring(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn arc(&self) -> Arc<dyn AnalysisAgent> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl AnalysisAgent for StubAnalysis {
    fn id(&self) -> &str {
        &self.id
    }

    async fn analyze(&self, _ctx: &AgentContext) -> Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.error {
            return Err(anyhow!("{}", message));
        }
        let mut result = if self.success {
            AgentResult::passed(&self.id, "stub report")
        } else {
            AgentResult::failed(&self.id, "stub report")
        };
        result = result.add_findings(self.findings.clone());
        for issue in &self.blocking {
            result = result.add_blocking_issue(issue.clone());
        }
        Ok(result)
    }
}

#[derive(Clone)]
pub(crate) struct StubRefactor {
    id: String,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Vec<Finding>>>>,
}

impl StubRefactor {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            calls: Arc::default(),
            seen: Arc::default(),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<Vec<Finding>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RefactoringAgent for StubRefactor {
    fn id(&self) -> &str {
        &self.id
    }

    async fn refactor(&self, _ctx: &AgentContext, findings: &[Finding]) -> Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(findings.to_vec());
        Ok(AgentResult::passed(&self.id, format!("{} findings addressed", findings.len())))
    }
}

#[derive(Clone)]
pub(crate) struct StubSuite {
    passed: bool,
    output: String,
    error: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl StubSuite {
    pub(crate) fn passing() -> Self {
        Self {
            passed: true,
            output: "ok".to_string(),
            error: None,
            calls: Arc::default(),
        }
    }

    pub(crate) fn failing(output: &str) -> Self {
        Self {
            passed: false,
            output: output.to_string(),
            ..Self::passing()
        }
    }

    pub(crate) fn erroring(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::passing()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestSuiteRunner for StubSuite {
    async fn run(&self, _project_dir: &Path) -> Result<TestSuiteResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.error {
            return Err(anyhow!("{}", message));
        }
        Ok(TestSuiteResult {
            passed: self.passed,
            output: self.output.clone(),
        })
    }
}

/// A full set of review collaborators whose counters stay observable.
pub(crate) struct Kit {
    pub(crate) parallel: Vec<StubAnalysis>,
    pub(crate) refactoring: StubRefactor,
    pub(crate) hardening: StubAnalysis,
    pub(crate) suite: StubSuite,
    pub(crate) security: StubAnalysis,
    pub(crate) qa: StubAnalysis,
}

impl Kit {
    pub(crate) fn passing() -> Self {
        Self {
            parallel: vec![StubAnalysis::new("code-review")],
            refactoring: StubRefactor::new("refactoring"),
            hardening: StubAnalysis::new("test-hardening"),
            suite: StubSuite::passing(),
            security: StubAnalysis::new("security"),
            qa: StubAnalysis::new("qa"),
        }
    }

    pub(crate) fn fix_agents(&self) -> FixCycleAgents {
        FixCycleAgents {
            refactoring: Arc::new(self.refactoring.clone()),
            test_hardening: self.hardening.arc(),
            test_suite: Arc::new(self.suite.clone()),
            security: self.security.arc(),
            qa: self.qa.arc(),
        }
    }

    pub(crate) fn agents(&self) -> ReviewAgents {
        ReviewAgents {
            parallel: self.parallel.iter().map(StubAnalysis::arc).collect(),
            remediation: self.fix_agents(),
        }
    }
}

//! Collaborator seams consumed by the review components.
//!
//! Analysis, refactoring and fixing are delegated to external agents; the
//! crate only defines the traits. Real implementations live outside the
//! core, test doubles implement the same traits. `CommandTestRunner` is the
//! one concrete collaborator shipped here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::findings::{AgentResult, Finding, FixOutcome, TestSuiteResult};
use crate::store::ProjectStore;

/// Where an agent is working and where it should leave its report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentContext {
    pub project_dir: PathBuf,
    pub epic_number: u32,
    pub review_dir: PathBuf,
}

impl AgentContext {
    pub fn new(project_dir: impl Into<PathBuf>, epic_number: u32, review_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            epic_number,
            review_dir: review_dir.into(),
        }
    }

    /// Context for the main review directory of `epic`.
    pub fn for_epic(store: &ProjectStore, epic_number: u32) -> Self {
        Self::new(store.project_dir(), epic_number, store.review_dir(epic_number))
    }

    /// Same project and epic, reports redirected to `review_dir`.
    pub fn with_review_dir(&self, review_dir: impl Into<PathBuf>) -> Self {
        Self {
            review_dir: review_dir.into(),
            ..self.clone()
        }
    }
}

/// Produces findings about the project. Used by the parallel review step,
/// the security and QA steps, and the convergence loop.
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    /// Stable identifier, also used as the report file stem.
    fn id(&self) -> &str;

    async fn analyze(&self, ctx: &AgentContext) -> Result<AgentResult>;
}

/// Acts on a set of findings (refactoring).
#[async_trait]
pub trait RefactoringAgent: Send + Sync {
    fn id(&self) -> &str;

    async fn refactor(&self, ctx: &AgentContext, findings: &[Finding]) -> Result<AgentResult>;
}

/// Runs the project's test suite. A failing suite is `Ok` with `passed == false`;
/// `Err` means the suite could not be run at all.
#[async_trait]
pub trait TestSuiteRunner: Send + Sync {
    async fn run(&self, project_dir: &Path) -> Result<TestSuiteResult>;
}

/// Applies fixes for verified findings and reports what changed.
#[async_trait]
pub trait Fixer: Send + Sync {
    async fn fix(
        &self,
        ctx: &AgentContext,
        findings: &[Finding],
        test_runner: Option<&dyn TestSuiteRunner>,
    ) -> Result<FixOutcome>;
}

/// Default timeout for a test-suite command.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 900;

/// Runs a shell command as the test suite. Exit code 0 passes.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    command: String,
    timeout: Duration,
}

impl CommandTestRunner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: Duration::from_secs(DEFAULT_TEST_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl TestSuiteRunner for CommandTestRunner {
    async fn run(&self, project_dir: &Path) -> Result<TestSuiteResult> {
        debug!(command = %self.command, dir = %project_dir.display(), "Running test suite");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn test command: {}", self.command))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.context("Failed to wait for test command")?,
            Err(_) => {
                warn!(command = %self.command, secs = self.timeout.as_secs(), "Test suite timed out");
                return Ok(TestSuiteResult::failed(format!(
                    "Test command timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        if output.status.success() {
            Ok(TestSuiteResult::passed(combined))
        } else {
            let code = output.status.code().unwrap_or(-1);
            debug!(code, "Test suite failed");
            Ok(TestSuiteResult::failed(combined))
        }
    }
}

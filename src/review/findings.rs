//! Finding and agent-result types shared by every review component.
//!
//! ## Types
//!
//! - [`Severity`]: totally ordered severity, `Critical` highest
//! - [`Finding`]: one immutable claim produced by an analysis agent
//! - [`FindingKey`]: identity used to compare findings across iterations
//! - [`AgentResult`]: the output of one agent invocation
//! - [`TestSuiteResult`]: the output of one test-suite run
//! - [`FixAttempt`] / [`FixOutcome`]: what an external fixer reports back
//!
//! ## Example
//!
//! ```
//! use crucible::review::findings::{AgentResult, Finding, Severity};
//!
//! let finding = Finding::new(
//!     Severity::High,
//!     "Unchecked `unwrap` in handler",
//!     "`parse_body` panics on malformed input",
//! )
//! .with_file("src/handler.rs");
//!
//! let result = AgentResult::passed("code-review", "One issue found.").add_finding(finding);
//!
//! assert_eq!(result.findings.len(), 1);
//! assert!(result.findings[0].severity().is_blocking_security());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a finding, ordered `Info < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Security findings at this severity block a review from advancing.
    ///
    /// # Examples
    ///
    /// ```
    /// use crucible::review::findings::Severity;
    ///
    /// assert!(Severity::Critical.is_blocking_security());
    /// assert!(Severity::High.is_blocking_security());
    /// assert!(!Severity::Medium.is_blocking_security());
    /// ```
    pub fn is_blocking_security(&self) -> bool {
        *self >= Severity::High
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single claim about a defect. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    title: String,
    severity: Severity,
    /// Path relative to the project root, when the finding targets a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(default)]
    description: String,
}

impl Finding {
    pub fn new(
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            severity,
            file: None,
            description: description.into(),
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Identity used by the convergence loop to detect repeat findings.
    pub fn key(&self) -> FindingKey {
        FindingKey {
            severity: self.severity,
            file: self.file.clone(),
            title: self.title.clone(),
        }
    }

    /// `[severity] title`, the format used for blocking issues.
    pub fn blocking_label(&self) -> String {
        format!("[{}] {}", self.severity, self.title)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.title)?;
        if let Some(file) = &self.file {
            write!(f, " ({})", file)?;
        }
        Ok(())
    }
}

/// Identity of a finding across iterations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FindingKey {
    pub severity: Severity,
    pub file: Option<String>,
    pub title: String,
}

/// Output of one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub success: bool,
    #[serde(default)]
    pub report: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub blocking_issues: Vec<String>,
}

impl AgentResult {
    pub fn passed(agent_id: impl Into<String>, report: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            success: true,
            report: report.into(),
            findings: Vec::new(),
            blocking_issues: Vec::new(),
        }
    }

    pub fn failed(agent_id: impl Into<String>, report: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::passed(agent_id, report)
        }
    }

    pub fn add_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    pub fn add_findings(mut self, findings: impl IntoIterator<Item = Finding>) -> Self {
        self.findings.extend(findings);
        self
    }

    pub fn add_blocking_issue(mut self, issue: impl Into<String>) -> Self {
        self.blocking_issues.push(issue.into());
        self
    }
}

/// Outcome of one test-suite run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub passed: bool,
    #[serde(default)]
    pub output: String,
}

impl TestSuiteResult {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: output.into(),
        }
    }
}

/// One per-finding fix attempt reported by a fixer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub finding: Finding,
    pub fixed: bool,
    #[serde(default)]
    pub notes: String,
}

/// Everything a fixer reports for one batch of findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    #[serde(default)]
    pub results: Vec<FixAttempt>,
    #[serde(default)]
    pub fixed: Vec<Finding>,
    #[serde(default)]
    pub unfixed: Vec<Finding>,
    pub final_test_result: TestSuiteResult,
}

/// Flatten the findings of several agent results, preserving agent order.
pub fn flatten_findings<'a>(results: impl IntoIterator<Item = &'a AgentResult>) -> Vec<Finding> {
    results
        .into_iter()
        .flat_map(|r| r.findings.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_total_order() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_severity_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        let s: Severity = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(s, Severity::Low);
    }

    #[test]
    fn test_blocking_label_format() {
        let f = Finding::new(Severity::Critical, "SQL injection", "raw query");
        assert_eq!(f.blocking_label(), "[critical] SQL injection");
    }

    #[test]
    fn test_key_ignores_description() {
        let a = Finding::new(Severity::High, "Leak", "first wording").with_file("a.rs");
        let b = Finding::new(Severity::High, "Leak", "second wording").with_file("a.rs");
        let c = Finding::new(Severity::High, "Leak", "first wording").with_file("b.rs");
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_finding_without_file_omits_field() {
        let f = Finding::new(Severity::Info, "Note", "");
        let json = serde_json::to_string(&f).unwrap();
        assert!(!json.contains("\"file\""));
    }

    #[test]
    fn test_agent_result_builders() {
        let r = AgentResult::failed("qa", "crashed").add_blocking_issue("QA smoke test failed");
        assert!(!r.success);
        assert_eq!(r.blocking_issues, vec!["QA smoke test failed"]);
    }

    #[test]
    fn test_flatten_preserves_order() {
        let a = AgentResult::passed("a", "")
            .add_finding(Finding::new(Severity::Low, "one", ""))
            .add_finding(Finding::new(Severity::Low, "two", ""));
        let b = AgentResult::passed("b", "").add_finding(Finding::new(Severity::Low, "three", ""));
        let titles: Vec<_> = flatten_findings([&a, &b])
            .iter()
            .map(|f| f.title().to_string())
            .collect();
        assert_eq!(titles, vec!["one", "two", "three"]);
    }
}

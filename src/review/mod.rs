//! Review system: the quality gates between BUILDING and SIGN_OFF.
//!
//! ## Components
//!
//! - [`findings`]: finding, severity and agent-result types
//! - [`verifier`]: discards findings that do not match the real files
//! - [`agents`]: collaborator traits and the shell-command test runner
//! - [`pipeline`]: the review panel (parallel agents, then sequential hardening)
//! - [`fix_cycle`]: remediation run after a sign-off rejection
//! - [`adversarial`]: iterate-verify-fix convergence loop
//! - [`summary`]: markdown summary presented at sign-off
//!
//! ## Example
//!
//! ```
//! use crucible::review::{Finding, Severity, verify};
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(dir.path().join("lib.rs"), "fn parse_header() {}").unwrap();
//!
//! let findings = vec![
//!     Finding::new(Severity::High, "`parse_header` overflows", "").with_file("lib.rs"),
//!     Finding::new(Severity::High, "`parse_footer` overflows", "").with_file("lib.rs"),
//! ];
//!
//! let result = verify(dir.path(), &findings);
//! assert_eq!(result.stats.verified, 1);
//! assert_eq!(result.stats.discarded, 1);
//! ```

pub mod adversarial;
pub mod agents;
pub mod findings;
pub mod fix_cycle;
pub mod pipeline;
pub mod summary;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use adversarial::{
    AdversarialLoop, IterationArtifact, LoopExitReason, LoopProgressFn, LoopResult, LoopStage,
    run_adversarial_loop,
};
pub use agents::{
    AgentContext, AnalysisAgent, CommandTestRunner, Fixer, RefactoringAgent, TestSuiteRunner,
};
pub use findings::{
    AgentResult, Finding, FindingKey, FixAttempt, FixOutcome, Severity, TestSuiteResult,
};
pub use fix_cycle::{USER_FEEDBACK_TITLE, run_fix_cycle};
pub use pipeline::{
    FixCycleAgents, ProgressFn, ReviewAgents, ReviewPanel, ReviewPhaseResult, ReviewStep,
    StepStatus, run_review_pipeline,
};
pub use summary::{EpicSummary, write_epic_summary};
pub use verifier::{
    DiscardReason, DiscardedFinding, FindingVerifier, FsVerifier, VerificationResult,
    VerificationStats, verify,
};

//! Plausibility check for agent findings against the project's files.
//!
//! A finding survives when it names no file, or when the file exists and at
//! least one of its key terms (text quoted with backticks or double quotes
//! in the title or description) appears verbatim in that file. Findings
//! naming a missing file, or citing identifiers the file does not contain,
//! are discarded with a recorded reason.
//!
//! A finding with no key terms is kept: there is nothing to check it against.
//! File paths are resolved relative to the project root only; absolute paths
//! and paths climbing out through `..` count as missing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::findings::Finding;

static BACKTICK_TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("backtick pattern is a valid static regex"));
static QUOTED_TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("quote pattern is a valid static regex"));

/// Why a finding was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscardReason {
    FileMissing { file: String },
    KeyTermsAbsent { file: String, terms: Vec<String> },
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileMissing { file } => write!(f, "file does not exist: {}", file),
            Self::KeyTermsAbsent { file, terms } => write!(
                f,
                "none of the key terms appear in {}: {}",
                file,
                terms
                    .iter()
                    .map(|t| format!("`{}`", t))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardedFinding {
    pub finding: Finding,
    pub reason: DiscardReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStats {
    pub total: usize,
    pub verified: usize,
    pub discarded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: Vec<Finding>,
    pub discarded: Vec<DiscardedFinding>,
    pub stats: VerificationStats,
}

/// Seam for the convergence loop; `FsVerifier` is the production implementation.
pub trait FindingVerifier: Send + Sync {
    fn verify(&self, project_root: &Path, findings: &[Finding]) -> VerificationResult;
}

/// Verifies findings against the real file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsVerifier;

impl FindingVerifier for FsVerifier {
    fn verify(&self, project_root: &Path, findings: &[Finding]) -> VerificationResult {
        verify(project_root, findings)
    }
}

/// Split `findings` into verified and discarded sets.
pub fn verify(project_root: &Path, findings: &[Finding]) -> VerificationResult {
    let mut result = VerificationResult::default();

    for finding in findings {
        match check(project_root, finding) {
            None => result.verified.push(finding.clone()),
            Some(reason) => {
                debug!(title = finding.title(), %reason, "Discarding finding");
                result.discarded.push(DiscardedFinding {
                    finding: finding.clone(),
                    reason,
                });
            }
        }
    }

    result.stats = VerificationStats {
        total: findings.len(),
        verified: result.verified.len(),
        discarded: result.discarded.len(),
    };
    result
}

fn check(project_root: &Path, finding: &Finding) -> Option<DiscardReason> {
    let file = finding.file()?;
    let Some(path) = resolve_in_project(project_root, file).filter(|p| p.exists()) else {
        return Some(DiscardReason::FileMissing {
            file: file.to_string(),
        });
    };

    let terms = extract_key_terms(&format!("{}\n{}", finding.title(), finding.description()));
    if terms.is_empty() {
        return None;
    }

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            warn!(file, error = %e, "Cannot read finding target; keeping finding");
            return None;
        }
    };

    if terms.iter().any(|term| content.contains(term.as_str())) {
        None
    } else {
        Some(DiscardReason::KeyTermsAbsent {
            file: file.to_string(),
            terms,
        })
    }
}

fn resolve_in_project(project_root: &Path, file: &str) -> Option<PathBuf> {
    let relative = Path::new(file);
    let contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    contained.then(|| project_root.join(relative))
}

/// Backtick-quoted terms first, then double-quoted ones, without duplicates.
pub fn extract_key_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for re in [&*BACKTICK_TERM, &*QUOTED_TERM] {
        for cap in re.captures_iter(text) {
            let term = &cap[1];
            if !term.trim().is_empty() && !terms.iter().any(|t| t == term) {
                terms.push(term.to_string());
            }
        }
    }
    terms
}

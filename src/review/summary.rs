use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use super::findings::{AgentResult, Finding, Severity};
use super::pipeline::ReviewPhaseResult;
use crate::errors::ReviewError;
use crate::store::ProjectStore;

/// Human-readable review summary shown at sign-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicSummary {
    pub epic_number: u32,
    pub markdown: String,
    pub can_advance: bool,
    pub blocking_issues: Vec<String>,
    pub summary_path: PathBuf,
}

/// Render the summary for `result` and persist it as `summary.md`.
///
/// `carried` lists findings from earlier runs that stay on the record, such
/// as the original review's findings once a fix cycle has replaced the
/// result. They are listed ahead of the result's own, without duplicates.
pub fn write_epic_summary(
    store: &ProjectStore,
    result: &ReviewPhaseResult,
    fix_cycles: u32,
    carried: &[Finding],
) -> Result<EpicSummary, ReviewError> {
    let summary_path = store.summary_file(result.epic_number);
    let markdown = render(result, fix_cycles, carried);
    store
        .write_text(&summary_path, &markdown)
        .map_err(ReviewError::Persist)?;
    Ok(EpicSummary {
        epic_number: result.epic_number,
        markdown,
        can_advance: result.can_advance(),
        blocking_issues: result.blocking_issues().to_vec(),
        summary_path,
    })
}

fn render(result: &ReviewPhaseResult, fix_cycles: u32, carried: &[Finding]) -> String {
    let mut md = format!("# Epic {} Review Summary\n\n", result.epic_number);
    md.push_str(&format!(
        "**Status:** {}\n",
        if result.can_advance() {
            "ready for sign-off"
        } else {
            "blocked"
        }
    ));
    if fix_cycles > 0 {
        md.push_str(&format!("**Fix cycles run:** {}\n", fix_cycles));
    }
    md.push('\n');

    md.push_str("## Steps\n\n| Step | Result |\n|------|--------|\n");
    for agent in &result.parallel_results {
        md.push_str(&step_row(&format!("parallel: {}", agent.agent_id), Some(agent)));
    }
    md.push_str(&step_row("refactoring", result.refactoring_result.as_ref()));
    md.push_str(&step_row("test-hardening", result.test_hardening_result.as_ref()));
    md.push_str(&format!(
        "| test-suite | {} |\n",
        match &result.test_suite_result {
            Some(t) if t.passed => "passed",
            Some(_) => "FAILED",
            None => "not run",
        }
    ));
    md.push_str(&step_row("security", result.security_result.as_ref()));
    md.push_str(&step_row("qa", result.qa_result.as_ref()));
    md.push('\n');

    let mut seen = HashSet::new();
    let findings: Vec<Finding> = carried
        .iter()
        .cloned()
        .chain(result.review_findings())
        .filter(|f| seen.insert(f.key()))
        .collect();
    md.push_str(&format!("## Findings ({})\n\n", findings.len()));
    if findings.is_empty() {
        md.push_str("None.\n\n");
    } else {
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ] {
            for finding in findings.iter().filter(|f| f.severity() == severity) {
                md.push_str(&format!("- {}\n", finding));
            }
        }
        md.push('\n');
    }

    md.push_str("## Blocking Issues\n\n");
    if result.blocking_issues().is_empty() {
        md.push_str("None.\n");
    } else {
        for issue in result.blocking_issues() {
            md.push_str(&format!("- {}\n", issue));
        }
    }
    md
}

fn step_row(label: &str, result: Option<&AgentResult>) -> String {
    let outcome = match result {
        None => "not run".to_string(),
        Some(r) if r.success => format!("passed ({} findings)", r.findings.len()),
        Some(r) => format!("FAILED ({} findings)", r.findings.len()),
    };
    format!("| {} | {} |\n", label, outcome)
}

//! File-system persistence for pipeline state and review artifacts.
//!
//! Everything the orchestrator persists lives under `<project>/.crucible/`:
//!
//! ```text
//! .crucible/
//!   crucible.toml                 configuration
//!   state.json                    PipelineState
//!   convergence.json              improvement-cycle history
//!   logs/                         JSON log files
//!   reviews/epic-<n>/             per-agent reports, review-result.json, summary.md
//!   reviews/epic-<n>/fix-cycle-<k>/
//!   reviews/epic-<n>/adversarial/iteration-<k>.json
//! ```

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".crucible";

/// Durable key→blob store rooted at a project's `.crucible` directory.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    project_dir: PathBuf,
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let root = project_dir.join(STATE_DIR);
        Self { project_dir, root }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("crucible.toml")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn convergence_file(&self) -> PathBuf {
        self.root.join("convergence.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Directory holding every review artifact for one epic.
    pub fn review_dir(&self, epic: u32) -> PathBuf {
        self.root.join("reviews").join(format!("epic-{}", epic))
    }

    pub fn fix_cycle_dir(&self, epic: u32, cycle: u32) -> PathBuf {
        self.review_dir(epic).join(format!("fix-cycle-{}", cycle))
    }

    pub fn adversarial_dir(&self, epic: u32) -> PathBuf {
        self.review_dir(epic).join("adversarial")
    }

    pub fn review_result_file(&self, epic: u32) -> PathBuf {
        self.review_dir(epic).join("review-result.json")
    }

    pub fn summary_file(&self, epic: u32) -> PathBuf {
        self.review_dir(epic).join("summary.md")
    }

    /// Write text atomically: a temp sibling is written, then renamed over `path`.
    pub fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        write_atomic(path, content.as_bytes())
    }

    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {}", path.display()))?;
        write_atomic(path, json.as_bytes())
    }

    /// Read and parse a JSON file. A missing file is `Ok(None)`; a corrupt one is an error.
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

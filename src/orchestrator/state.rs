use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::phase::Phase;
use crate::store::ProjectStore;

/// Resolved developer/project profile handed to the orchestrator.
///
/// Loading it is the caller's concern; the orchestrator only requires that
/// one is present before the pipeline leaves IDLE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperProfile {
    pub name: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl DeveloperProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            languages: Vec::new(),
            notes: None,
        }
    }
}

/// Persisted pipeline position. Owned exclusively by `PipelineOrchestrator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub phase: Phase,
    pub epic_number: u32,
    #[serde(default)]
    pub current_story: Option<String>,
    #[serde(default)]
    pub last_completed_step: Option<String>,
    #[serde(default)]
    pub scaffolding_complete: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            epic_number: 0,
            current_story: None,
            last_completed_step: None,
            scaffolding_complete: false,
            updated_at: Utc::now(),
        }
    }
}

/// Loads and saves `PipelineState` as `.crucible/state.json`.
pub struct StateManager {
    store: ProjectStore,
}

impl StateManager {
    pub fn new(store: ProjectStore) -> Self {
        Self { store }
    }

    /// Load the persisted state, or the default state when none has been written yet.
    pub fn load(&self) -> Result<PipelineState, OrchestratorError> {
        let path = self.store.state_file();
        self.store
            .read_json::<PipelineState>(&path)
            .map(Option::unwrap_or_default)
            .map_err(|source| OrchestratorError::StateReadFailed { path, source })
    }

    pub fn save(&self, state: &PipelineState) -> Result<(), OrchestratorError> {
        let path = self.store.state_file();
        self.store
            .write_json(&path, state)
            .context("Failed to persist pipeline state")
            .map_err(|source| OrchestratorError::StateWriteFailed { path, source })
    }

    pub fn exists(&self) -> bool {
        self.store.state_file().exists()
    }
}

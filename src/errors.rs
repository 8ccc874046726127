//! Typed error hierarchy for the crucible orchestrator.
//!
//! Two top-level enums cover the two fatal failure families:
//! - `OrchestratorError`: precondition failures in the phase state machine
//! - `ReviewError`: agent and tooling failures inside review runs
//!
//! Quality-gate outcomes (failing tests, blocking findings) are never errors;
//! they travel as data on `ReviewPhaseResult`.

use crate::phase::Phase;
use thiserror::Error;

/// Errors from the phase state machine.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid transition: {from} → {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("SCAFFOLDING already complete")]
    ScaffoldingAlreadyComplete,

    #[error("Cannot leave {from}: no developer profile loaded")]
    MissingProfile { from: Phase },

    #[error("Cannot advance past COMPLETE; start a new epic instead")]
    AdvanceFromComplete,

    #[error("COMPLETE returns to IDLE only by starting a new epic")]
    NewEpicRequired,

    #[error("Cannot start epic {epic} while in {phase}")]
    EpicInProgress { epic: u32, phase: Phase },

    #[error("Failed to read pipeline state at {path}: {source}")]
    StateReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to write pipeline state at {path}: {source}")]
    StateWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors from a review, fix-cycle, or convergence-loop run.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Review step '{step}' failed in agent '{agent}': {source}")]
    AgentFailed {
        step: String,
        agent: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Sign-off prompt failed for epic {epic}: {source}")]
    PromptFailed {
        epic: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to persist review artifact: {0}")]
    Persist(#[source] anyhow::Error),
}

impl ReviewError {
    pub(crate) fn agent(step: impl Into<String>, agent: impl Into<String>, source: anyhow::Error) -> Self {
        Self::AgentFailed {
            step: step.into(),
            agent: agent.into(),
            source,
        }
    }
}

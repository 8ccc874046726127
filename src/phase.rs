//! Pipeline phases and the legal transition graph between them.
//!
//! This module provides:
//! - `Phase`, the fixed, totally ordered pipeline stages
//! - `Phase::next`, the canonical successor used by `advance()`
//! - `Phase::allowed_targets`, the explicit adjacency map enforced by the orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the build pipeline.
///
/// Declaration order is the canonical order: `Idle < Planning < ... < Complete`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Idle,
    Planning,
    Analyzing,
    Bridging,
    Scaffolding,
    Building,
    Reviewing,
    SignOff,
    Deploying,
    Retrospective,
    Complete,
}

impl Phase {
    /// All phases in canonical order.
    pub const ALL: [Phase; 11] = [
        Phase::Idle,
        Phase::Planning,
        Phase::Analyzing,
        Phase::Bridging,
        Phase::Scaffolding,
        Phase::Building,
        Phase::Reviewing,
        Phase::SignOff,
        Phase::Deploying,
        Phase::Retrospective,
        Phase::Complete,
    ];

    /// Upper-case wire name, e.g. `SIGN_OFF`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Planning => "PLANNING",
            Phase::Analyzing => "ANALYZING",
            Phase::Bridging => "BRIDGING",
            Phase::Scaffolding => "SCAFFOLDING",
            Phase::Building => "BUILDING",
            Phase::Reviewing => "REVIEWING",
            Phase::SignOff => "SIGN_OFF",
            Phase::Deploying => "DEPLOYING",
            Phase::Retrospective => "RETROSPECTIVE",
            Phase::Complete => "COMPLETE",
        }
    }

    /// Canonical successor in the total order, ignoring scaffolding state.
    ///
    /// # Examples
    ///
    /// ```
    /// use crucible::phase::Phase;
    ///
    /// assert_eq!(Phase::Idle.next(), Some(Phase::Planning));
    /// assert_eq!(Phase::Complete.next(), None);
    /// ```
    pub fn next(&self) -> Option<Phase> {
        let idx = Self::ALL.iter().position(|p| p == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Phases reachable from `self` in one step.
    ///
    /// `Bridging → Building` is listed here but only legal once scaffolding
    /// is complete, and `Complete → Idle` happens only by starting a new
    /// epic. The orchestrator enforces both.
    pub fn allowed_targets(&self) -> &'static [Phase] {
        match self {
            Phase::Idle => &[Phase::Planning],
            Phase::Planning => &[Phase::Analyzing, Phase::Bridging],
            Phase::Analyzing => &[Phase::Bridging, Phase::Planning],
            Phase::Bridging => &[Phase::Scaffolding, Phase::Building],
            Phase::Scaffolding => &[Phase::Building],
            Phase::Building => &[Phase::Reviewing],
            Phase::Reviewing => &[Phase::SignOff],
            Phase::SignOff => &[Phase::Deploying, Phase::Building],
            Phase::Deploying => &[Phase::Retrospective],
            Phase::Retrospective => &[Phase::Complete],
            Phase::Complete => &[Phase::Idle],
        }
    }

    /// Check whether `to` appears in the adjacency list of `self`.
    pub fn can_reach(&self, to: Phase) -> bool {
        self.allowed_targets().contains(&to)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        Phase::ALL
            .iter()
            .find(|p| p.as_str() == normalized)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown phase '{}'. Valid values: {}",
                    s,
                    Phase::ALL
                        .iter()
                        .map(Phase::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

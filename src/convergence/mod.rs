//! Generic convergence tracking for repeated improvement cycles.
//!
//! A [`ConvergenceState`] is an append-only history of [`CycleResult`]s plus
//! two limits. [`should_stop`] turns it into a stop/continue decision in a
//! fixed priority order:
//!
//! 1. `cycles >= max_depth` stops with `MaxDepth`
//! 2. no cycles yet continues with `NoCycles`
//! 3. latest `remaining <= threshold` stops with `Converged`
//! 4. the last two `remaining` counts are equal stops with `DiminishingReturns`
//! 5. otherwise continue
//!
//! [`ImprovementDriver`] runs an [`ImprovementCycle`] until the tracker says
//! stop, persisting the history after every cycle so a run can resume.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::store::ProjectStore;

pub const DEFAULT_MAX_DEPTH: u32 = 5;
pub const DEFAULT_THRESHOLD: usize = 0;

/// One completed improvement cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleResult {
    /// 1-based.
    pub cycle: u32,
    pub total_findings: usize,
    pub fixed: usize,
    pub remaining: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceState {
    cycles: Vec<CycleResult>,
    pub max_depth: u32,
    pub threshold: usize,
}

impl Default for ConvergenceState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, DEFAULT_THRESHOLD)
    }
}

impl ConvergenceState {
    pub fn new(max_depth: u32, threshold: usize) -> Self {
        Self {
            cycles: Vec::new(),
            max_depth,
            threshold,
        }
    }

    pub fn cycles(&self) -> &[CycleResult] {
        &self.cycles
    }

    pub fn latest(&self) -> Option<&CycleResult> {
        self.cycles.last()
    }

    /// Append a cycle numbered after the last recorded one.
    pub fn record_cycle(&mut self, total_findings: usize, fixed: usize, remaining: usize) -> &CycleResult {
        let cycle = self.cycles.last().map_or(1, |c| c.cycle + 1);
        self.cycles.push(CycleResult {
            cycle,
            total_findings,
            fixed,
            remaining,
            timestamp: Utc::now(),
        });
        debug!(cycle, total_findings, fixed, remaining, "Recorded improvement cycle");
        &self.cycles[self.cycles.len() - 1]
    }

    pub fn should_stop(&self) -> StopDecision {
        should_stop(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    MaxDepth,
    NoCycles,
    Converged,
    DiminishingReturns,
    Continue,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MaxDepth => "max-depth",
            Self::NoCycles => "no-cycles",
            Self::Converged => "converged",
            Self::DiminishingReturns => "diminishing-returns",
            Self::Continue => "continue",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopDecision {
    pub stop: bool,
    pub reason: StopReason,
}

impl StopDecision {
    fn stop(reason: StopReason) -> Self {
        Self { stop: true, reason }
    }

    fn proceed(reason: StopReason) -> Self {
        Self { stop: false, reason }
    }
}

pub fn should_stop(state: &ConvergenceState) -> StopDecision {
    let cycles = &state.cycles;
    if cycles.len() >= state.max_depth as usize {
        return StopDecision::stop(StopReason::MaxDepth);
    }
    let Some(latest) = cycles.last() else {
        return StopDecision::proceed(StopReason::NoCycles);
    };
    if latest.remaining <= state.threshold {
        return StopDecision::stop(StopReason::Converged);
    }
    if let [.., previous, _] = cycles.as_slice()
        && previous.remaining == latest.remaining
    {
        return StopDecision::stop(StopReason::DiminishingReturns);
    }
    StopDecision::proceed(StopReason::Continue)
}

/// Persists a `ConvergenceState` as `.crucible/convergence.json`.
#[derive(Debug, Clone)]
pub struct ConvergenceStore {
    store: ProjectStore,
}

impl ConvergenceStore {
    pub fn new(store: ProjectStore) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<Option<ConvergenceState>> {
        self.store.read_json(&self.store.convergence_file())
    }

    pub fn save(&self, state: &ConvergenceState) -> Result<()> {
        self.store.write_json(&self.store.convergence_file(), state)
    }
}

/// What one improvement cycle reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub total_findings: usize,
    pub fixed: usize,
    pub remaining: usize,
}

/// One coarse self-improvement pass (e.g. a full review plus fix run).
#[async_trait]
pub trait ImprovementCycle: Send + Sync {
    async fn run_cycle(&self, cycle: u32) -> Result<CycleOutcome>;
}

/// Drives an [`ImprovementCycle`] until [`should_stop`] says stop.
pub struct ImprovementDriver {
    store: Option<ConvergenceStore>,
}

impl ImprovementDriver {
    /// A driver that keeps its history in memory only.
    pub fn in_memory() -> Self {
        Self { store: None }
    }

    pub fn persistent(store: ConvergenceStore) -> Self {
        Self { store: Some(store) }
    }

    /// Resume the persisted history, or start a fresh one with the given limits.
    /// Limits always come from the caller, not from the saved file.
    pub fn initial_state(&self, max_depth: u32, threshold: usize) -> Result<ConvergenceState> {
        let mut state = match &self.store {
            Some(store) => store.load()?.unwrap_or_default(),
            None => ConvergenceState::default(),
        };
        state.max_depth = max_depth;
        state.threshold = threshold;
        Ok(state)
    }

    pub async fn run(
        &self,
        cycle: &dyn ImprovementCycle,
        mut state: ConvergenceState,
    ) -> Result<(ConvergenceState, StopDecision)> {
        loop {
            let decision = state.should_stop();
            if decision.stop {
                info!(
                    cycles = state.cycles.len(),
                    reason = %decision.reason,
                    "Improvement cycles stopped"
                );
                return Ok((state, decision));
            }

            let number = state.cycles.last().map_or(1, |c| c.cycle + 1);
            let outcome = cycle.run_cycle(number).await?;
            state.record_cycle(outcome.total_findings, outcome.fixed, outcome.remaining);
            if let Some(store) = &self.store {
                store.save(&state)?;
            }
        }
    }
}

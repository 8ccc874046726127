//! The phase state machine.
//!
//! `PipelineOrchestrator` is the single owner of `PipelineState`. Every
//! mutation is written to disk before it becomes visible in memory, so a
//! fresh orchestrator loaded from the same project directory always sees
//! the last committed phase.
//!
//! ## Usage
//!
//! ```no_run
//! use crucible::orchestrator::{DeveloperProfile, PipelineOrchestrator};
//! use crucible::phase::Phase;
//!
//! # fn example() -> Result<(), crucible::errors::OrchestratorError> {
//! let mut orch = PipelineOrchestrator::load(
//!     std::path::Path::new("."),
//!     Some(DeveloperProfile::new("Ada")),
//! )?;
//! orch.start_epic(1)?;
//! orch.advance()?; // IDLE → PLANNING
//! orch.transition(Phase::Bridging)?;
//! println!("{}", orch.format_status());
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use std::path::Path;
use tracing::{debug, info};

use super::state::{DeveloperProfile, PipelineState, StateManager};
use crate::errors::OrchestratorError;
use crate::phase::Phase;
use crate::store::ProjectStore;

pub struct PipelineOrchestrator {
    state: PipelineState,
    states: StateManager,
    profile: Option<DeveloperProfile>,
}

impl PipelineOrchestrator {
    /// Load (or initialize) the orchestrator for a project directory.
    pub fn load(
        project_dir: &Path,
        profile: Option<DeveloperProfile>,
    ) -> Result<Self, OrchestratorError> {
        let states = StateManager::new(ProjectStore::new(project_dir));
        let state = states.load()?;
        debug!(phase = %state.phase, epic = state.epic_number, "Loaded pipeline state");
        Ok(Self {
            state,
            states,
            profile,
        })
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn profile(&self) -> Option<&DeveloperProfile> {
        self.profile.as_ref()
    }

    /// Move to `to`, enforcing the adjacency map and phase preconditions.
    pub fn transition(&mut self, to: Phase) -> Result<&PipelineState, OrchestratorError> {
        let from = self.state.phase;
        self.check_transition(from, to)?;

        let mut next = self.state.clone();
        next.phase = to;
        if to != from {
            next.last_completed_step = None;
        }
        self.commit(next)?;

        info!(epic = self.state.epic_number, %from, %to, "Phase transition");
        Ok(&self.state)
    }

    /// Move to the canonical next phase, skipping SCAFFOLDING once it is complete.
    pub fn advance(&mut self) -> Result<Phase, OrchestratorError> {
        let current = self.state.phase;
        let next = current
            .next()
            .ok_or(OrchestratorError::AdvanceFromComplete)?;
        let next = if next == Phase::Scaffolding && self.state.scaffolding_complete {
            Phase::Building
        } else {
            next
        };
        self.transition(next)?;
        Ok(next)
    }

    /// Begin epic `epic`: back to IDLE with story and step cleared.
    ///
    /// Allowed from IDLE (first epic) or COMPLETE. Scaffolding state carries over.
    pub fn start_epic(&mut self, epic: u32) -> Result<(), OrchestratorError> {
        let from = self.state.phase;
        if from != Phase::Idle && from != Phase::Complete {
            return Err(OrchestratorError::EpicInProgress { epic, phase: from });
        }

        let next = PipelineState {
            phase: Phase::Idle,
            epic_number: epic,
            current_story: None,
            last_completed_step: None,
            scaffolding_complete: self.state.scaffolding_complete,
            updated_at: self.state.updated_at,
        };
        self.commit(next)?;

        info!(epic, %from, "Started epic");
        Ok(())
    }

    /// Destructive reinitialize: phase IDLE, epic 0, scaffolding not done.
    pub fn reset(&mut self) -> Result<(), OrchestratorError> {
        self.commit(PipelineState::default())?;
        info!("Pipeline state reset");
        Ok(())
    }

    pub fn complete_scaffolding(&mut self) -> Result<(), OrchestratorError> {
        let mut next = self.state.clone();
        next.scaffolding_complete = true;
        self.commit(next)
    }

    pub fn set_current_story(&mut self, story: Option<String>) -> Result<(), OrchestratorError> {
        let mut next = self.state.clone();
        next.current_story = story;
        self.commit(next)
    }

    /// Record a finished step inside the current phase.
    pub fn complete_step(&mut self, step: impl Into<String>) -> Result<(), OrchestratorError> {
        let step = step.into();
        debug!(phase = %self.state.phase, step = %step, "Step completed");
        let mut next = self.state.clone();
        next.last_completed_step = Some(step);
        self.commit(next)
    }

    /// Human-readable status block.
    pub fn format_status(&self) -> String {
        let s = &self.state;
        let position = Phase::ALL
            .iter()
            .position(|p| *p == s.phase)
            .map_or(0, |i| i + 1);

        let mut out = String::new();
        out.push_str("Pipeline Status\n");
        out.push_str(&format!(
            "  Phase:        {} ({}/{})\n",
            s.phase,
            position,
            Phase::ALL.len()
        ));
        out.push_str(&format!("  Epic:         {}\n", s.epic_number));
        out.push_str(&format!(
            "  Story:        {}\n",
            s.current_story.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!(
            "  Last step:    {}\n",
            s.last_completed_step.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!(
            "  Scaffolding:  {}\n",
            if s.scaffolding_complete { "complete" } else { "pending" }
        ));
        out.push_str(&format!(
            "  Profile:      {}\n",
            self.profile.as_ref().map_or("none", |p| p.name.as_str())
        ));
        out.push_str(&format!("  Updated:      {}\n", s.updated_at.to_rfc3339()));
        out.push_str(&format!("  Next:         {}\n", self.describe_next()));
        out
    }

    /// Markdown block telling an agent where the interrupted run left off.
    pub fn format_resume_context(&self) -> String {
        let s = &self.state;
        if s.phase == Phase::Idle && s.epic_number == 0 {
            return "## Resume Context\n\nNo pipeline run in progress.\n".to_string();
        }

        let mut out = String::from("## Resume Context\n\n");
        out.push_str("You are resuming an interrupted pipeline run.\n\n");
        out.push_str(&format!("- Epic: {}\n", s.epic_number));
        out.push_str(&format!("- Phase: {}\n", s.phase));
        if let Some(story) = &s.current_story {
            out.push_str(&format!("- Current story: {}\n", story));
        }
        if let Some(step) = &s.last_completed_step {
            out.push_str(&format!("- Last completed step: {}\n", step));
        }
        if s.scaffolding_complete {
            out.push_str("- Scaffolding: already complete, do not scaffold again\n");
        }
        out.push('\n');
        match &s.last_completed_step {
            Some(step) => out.push_str(&format!(
                "Continue with the step after \"{}\". Do not repeat completed work.\n",
                step
            )),
            None => out.push_str(&format!(
                "Start {} from its first step.\n",
                s.phase
            )),
        }
        out
    }

    fn describe_next(&self) -> String {
        match self.state.phase.next() {
            None => "start a new epic".to_string(),
            Some(Phase::Scaffolding) if self.state.scaffolding_complete => {
                Phase::Building.to_string()
            }
            Some(next) => next.to_string(),
        }
    }

    fn check_transition(&self, from: Phase, to: Phase) -> Result<(), OrchestratorError> {
        if to == Phase::Scaffolding && self.state.scaffolding_complete {
            return Err(OrchestratorError::ScaffoldingAlreadyComplete);
        }
        if !from.can_reach(to) {
            return Err(OrchestratorError::InvalidTransition { from, to });
        }
        if from == Phase::Complete {
            return Err(OrchestratorError::NewEpicRequired);
        }
        if from == Phase::Bridging && to == Phase::Building && !self.state.scaffolding_complete {
            return Err(OrchestratorError::InvalidTransition { from, to });
        }
        if from == Phase::Idle && self.profile.is_none() {
            return Err(OrchestratorError::MissingProfile { from });
        }
        Ok(())
    }

    /// Persist first, then publish: memory never runs ahead of disk.
    fn commit(&mut self, mut next: PipelineState) -> Result<(), OrchestratorError> {
        next.updated_at = Utc::now();
        self.states.save(&next)?;
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    fn orchestrator() -> (PipelineOrchestrator, TempDir) {
        let dir = tempdir().unwrap();
        let orch =
            PipelineOrchestrator::load(dir.path(), Some(DeveloperProfile::new("Ada"))).unwrap();
        (orch, dir)
    }

    fn drive_to(orch: &mut PipelineOrchestrator, path: &[Phase]) {
        for phase in path {
            orch.transition(*phase).unwrap();
        }
    }

    #[test]
    fn test_idle_to_building_is_invalid() {
        let (mut orch, _dir) = orchestrator();
        let err = orch.transition(Phase::Building).unwrap_err();
        assert_eq!(err.to_string(), "Invalid transition: IDLE → BUILDING");
        assert_eq!(orch.phase(), Phase::Idle);
    }

    #[test]
    fn test_idle_to_building_is_invalid_even_without_profile() {
        let dir = tempdir().unwrap();
        let mut orch = PipelineOrchestrator::load(dir.path(), None).unwrap();
        let err = orch.transition(Phase::Building).unwrap_err();
        assert_eq!(err.to_string(), "Invalid transition: IDLE → BUILDING");
    }

    #[test]
    fn test_leaving_idle_requires_profile() {
        let dir = tempdir().unwrap();
        let mut orch = PipelineOrchestrator::load(dir.path(), None).unwrap();
        let err = orch.transition(Phase::Planning).unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingProfile { from: Phase::Idle }));
        assert!(matches!(
            orch.advance().unwrap_err(),
            OrchestratorError::MissingProfile { .. }
        ));
    }

    #[test]
    fn test_scaffolding_scenario() {
        let (mut orch, _dir) = orchestrator();
        orch.start_epic(1).unwrap();
        drive_to(&mut orch, &[Phase::Planning, Phase::Bridging]);
        orch.complete_scaffolding().unwrap();

        let err = orch.transition(Phase::Scaffolding).unwrap_err();
        assert_eq!(err.to_string(), "SCAFFOLDING already complete");

        orch.transition(Phase::Building).unwrap();
        assert_eq!(orch.phase(), Phase::Building);
    }

    #[test]
    fn test_bridging_to_building_requires_scaffolding() {
        let (mut orch, _dir) = orchestrator();
        drive_to(&mut orch, &[Phase::Planning, Phase::Bridging]);
        let err = orch.transition(Phase::Building).unwrap_err();
        assert_eq!(err.to_string(), "Invalid transition: BRIDGING → BUILDING");
        orch.transition(Phase::Scaffolding).unwrap();
        orch.transition(Phase::Building).unwrap();
    }

    #[test]
    fn test_reviewing_only_reaches_sign_off() {
        let (mut orch, _dir) = orchestrator();
        orch.complete_scaffolding().unwrap();
        drive_to(
            &mut orch,
            &[Phase::Planning, Phase::Bridging, Phase::Building, Phase::Reviewing],
        );
        for target in [Phase::Building, Phase::Deploying, Phase::Complete, Phase::Idle] {
            assert!(matches!(
                orch.transition(target),
                Err(OrchestratorError::InvalidTransition { .. })
            ));
        }
        orch.transition(Phase::SignOff).unwrap();
    }

    #[test]
    fn test_advance_walks_pipeline_and_skips_completed_scaffolding() {
        let (mut orch, _dir) = orchestrator();
        orch.complete_scaffolding().unwrap();
        let mut visited = Vec::new();
        while orch.phase() != Phase::Complete {
            visited.push(orch.advance().unwrap());
        }
        assert!(!visited.contains(&Phase::Scaffolding));
        assert_eq!(visited.first(), Some(&Phase::Planning));
        assert_eq!(visited.last(), Some(&Phase::Complete));
        assert!(matches!(
            orch.advance().unwrap_err(),
            OrchestratorError::AdvanceFromComplete
        ));
    }

    #[test]
    fn test_advance_enters_scaffolding_when_pending() {
        let (mut orch, _dir) = orchestrator();
        drive_to(&mut orch, &[Phase::Planning, Phase::Analyzing, Phase::Bridging]);
        assert_eq!(orch.advance().unwrap(), Phase::Scaffolding);
    }

    #[test]
    fn test_start_epic_preserves_scaffolding_and_clears_story() {
        let (mut orch, _dir) = orchestrator();
        orch.start_epic(1).unwrap();
        orch.complete_scaffolding().unwrap();
        while orch.phase() != Phase::Complete {
            orch.advance().unwrap();
            orch.set_current_story(Some("1.1".into())).unwrap();
            orch.complete_step("did-something").unwrap();
        }
        orch.start_epic(2).unwrap();
        let state = orch.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.epic_number, 2);
        assert!(state.current_story.is_none());
        assert!(state.last_completed_step.is_none());
        assert!(state.scaffolding_complete);
    }

    #[test]
    fn test_complete_reaches_idle_only_through_start_epic() {
        let (mut orch, dir) = orchestrator();
        orch.start_epic(1).unwrap();
        while orch.phase() != Phase::Complete {
            orch.advance().unwrap();
        }
        orch.set_current_story(Some("1.3".into())).unwrap();

        assert!(matches!(
            orch.transition(Phase::Idle),
            Err(OrchestratorError::NewEpicRequired)
        ));
        let reloaded = PipelineOrchestrator::load(dir.path(), None).unwrap();
        assert_eq!(reloaded.phase(), Phase::Complete);
        assert_eq!(reloaded.state().current_story.as_deref(), Some("1.3"));

        orch.start_epic(2).unwrap();
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(orch.state().current_story.is_none());
    }

    #[test]
    fn test_start_epic_rejected_mid_pipeline() {
        let (mut orch, _dir) = orchestrator();
        orch.advance().unwrap();
        assert!(matches!(
            orch.start_epic(2),
            Err(OrchestratorError::EpicInProgress { epic: 2, phase: Phase::Planning })
        ));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (mut orch, _dir) = orchestrator();
        orch.start_epic(4).unwrap();
        orch.complete_scaffolding().unwrap();
        orch.advance().unwrap();
        orch.set_current_story(Some("4.1".into())).unwrap();
        orch.reset().unwrap();
        let state = orch.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.epic_number, 0);
        assert!(state.current_story.is_none());
        assert!(!state.scaffolding_complete);
    }

    #[test]
    fn test_reload_after_transition_is_identical() {
        let (mut orch, dir) = orchestrator();
        orch.start_epic(2).unwrap();
        orch.advance().unwrap();
        orch.set_current_story(Some("2.1".into())).unwrap();
        let before = orch.state().clone();

        let reloaded =
            PipelineOrchestrator::load(dir.path(), Some(DeveloperProfile::new("Ada"))).unwrap();
        assert_eq!(reloaded.state(), &before);
        assert_eq!(reloaded.phase(), Phase::Planning);
        assert_eq!(reloaded.state().epic_number, 2);
        assert_eq!(reloaded.state().current_story.as_deref(), Some("2.1"));
    }

    #[test]
    fn test_failed_transition_does_not_touch_disk() {
        let (mut orch, dir) = orchestrator();
        orch.advance().unwrap();
        let _ = orch.transition(Phase::Complete);
        let reloaded = PipelineOrchestrator::load(dir.path(), None).unwrap();
        assert_eq!(reloaded.phase(), Phase::Planning);
    }

    #[test]
    fn test_transition_clears_last_step() {
        let (mut orch, _dir) = orchestrator();
        orch.advance().unwrap();
        orch.complete_step("plan-drafted").unwrap();
        orch.advance().unwrap();
        assert!(orch.state().last_completed_step.is_none());
    }

    #[test]
    fn test_format_status_shows_position() {
        let (mut orch, _dir) = orchestrator();
        orch.start_epic(3).unwrap();
        orch.advance().unwrap();
        let status = orch.format_status();
        assert!(status.contains("PLANNING (2/11)"));
        assert!(status.contains("Epic:         3"));
        assert!(status.contains("Profile:      Ada"));
        assert!(status.contains("Next:         ANALYZING"));
    }

    #[test]
    fn test_format_resume_context() {
        let (mut orch, _dir) = orchestrator();
        assert!(orch.format_resume_context().contains("No pipeline run in progress"));

        orch.start_epic(1).unwrap();
        orch.complete_scaffolding().unwrap();
        drive_to(&mut orch, &[Phase::Planning, Phase::Bridging, Phase::Building]);
        orch.set_current_story(Some("1.2".into())).unwrap();
        orch.complete_step("tests-written").unwrap();

        let ctx = orch.format_resume_context();
        assert!(ctx.contains("- Epic: 1"));
        assert!(ctx.contains("- Phase: BUILDING"));
        assert!(ctx.contains("- Current story: 1.2"));
        assert!(ctx.contains("- Last completed step: tests-written"));
        assert!(ctx.contains("do not scaffold again"));
        assert!(ctx.contains("after \"tests-written\""));
    }
}

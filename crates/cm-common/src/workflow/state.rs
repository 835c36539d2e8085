use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::criteria::{CriteriaRefinement, EffectiveCriteria, ScoringCriteria};

/// Hard ceiling on generation rounds per job. Design constant, not
/// configuration; behavioral compatibility depends on it.
pub const MAX_ITERATIONS: u32 = 5;

/// Candidates generated per normal iteration.
pub const CANDIDATES_PER_ITERATION: usize = 5;

/// Wider net on the last permitted pass.
pub const FINAL_ITERATION_CANDIDATES: usize = 10;

/// Whether `iteration` (zero-indexed) is the last permitted one.
pub fn is_final_iteration(iteration: u32) -> bool {
    iteration == MAX_ITERATIONS - 1
}

pub fn candidate_count_for_iteration(iteration: u32) -> usize {
    if is_final_iteration(iteration) {
        FINAL_ITERATION_CANDIDATES
    } else {
        CANDIDATES_PER_ITERATION
    }
}

/// Phase within the workflow lifecycle. Monotonic within one iteration;
/// resets toward generation at the start of the next unless `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowPhase {
    Initial,
    Generating,
    Evaluating,
    WaitingFeedback,
    Refining,
    Complete,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Initial => "INITIAL",
            WorkflowPhase::Generating => "GENERATING",
            WorkflowPhase::Evaluating => "EVALUATING",
            WorkflowPhase::WaitingFeedback => "WAITING_FEEDBACK",
            WorkflowPhase::Refining => "REFINING",
            WorkflowPhase::Complete => "COMPLETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INITIAL" => Some(WorkflowPhase::Initial),
            "GENERATING" => Some(WorkflowPhase::Generating),
            "EVALUATING" => Some(WorkflowPhase::Evaluating),
            "WAITING_FEEDBACK" => Some(WorkflowPhase::WaitingFeedback),
            "REFINING" => Some(WorkflowPhase::Refining),
            "COMPLETE" => Some(WorkflowPhase::Complete),
            _ => None,
        }
    }
}

/// Current pointer state of one job's matching workflow. Iteration history
/// lives in append-only refinement/candidate records; only this record is
/// updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub job_description_id: Uuid,
    /// Completed generation rounds; `0..=MAX_ITERATIONS`.
    pub iteration_count: u32,
    pub current_phase: WorkflowPhase,
    pub should_terminate: bool,
    pub scoring_criteria: ScoringCriteria,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refined_criteria: Option<CriteriaRefinement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowState {
    pub fn new(job_description_id: Uuid) -> Self {
        Self {
            job_description_id,
            iteration_count: 0,
            current_phase: WorkflowPhase::Initial,
            should_terminate: false,
            scoring_criteria: ScoringCriteria::default(),
            refined_criteria: None,
            error: None,
        }
    }

    /// Base criteria merged with the latest refinement, if any.
    pub fn effective_criteria(&self) -> EffectiveCriteria {
        EffectiveCriteria::merge(&self.scoring_criteria, self.refined_criteria.as_ref())
    }

    pub fn exhausted(&self) -> bool {
        self.should_terminate || self.iteration_count >= MAX_ITERATIONS
    }
}

/// Partial update applied to a workflow state record.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub iteration_count: Option<u32>,
    pub current_phase: Option<WorkflowPhase>,
    pub should_terminate: Option<bool>,
    pub refined_criteria: Option<CriteriaRefinement>,
    /// `Some(None)` clears a previously recorded error.
    pub error: Option<Option<String>>,
}

impl StateUpdate {
    pub fn phase(mut self, phase: WorkflowPhase) -> Self {
        self.current_phase = Some(phase);
        self
    }

    pub fn iteration(mut self, iteration: u32) -> Self {
        self.iteration_count = Some(iteration);
        self
    }

    pub fn terminate(mut self, should_terminate: bool) -> Self {
        self.should_terminate = Some(should_terminate);
        self
    }

    pub fn refined(mut self, refinement: CriteriaRefinement) -> Self {
        self.refined_criteria = Some(refinement);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn apply(self, state: &mut WorkflowState) {
        if let Some(iteration_count) = self.iteration_count {
            state.iteration_count = iteration_count;
        }
        if let Some(phase) = self.current_phase {
            state.current_phase = phase;
        }
        if let Some(should_terminate) = self.should_terminate {
            state.should_terminate = should_terminate;
        }
        if let Some(refinement) = self.refined_criteria {
            state.refined_criteria = Some(refinement);
        }
        if let Some(error) = self.error {
            state.error = error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_policy_widens_the_final_pass() {
        assert_eq!(candidate_count_for_iteration(0), 5);
        assert_eq!(candidate_count_for_iteration(3), 5);
        assert_eq!(candidate_count_for_iteration(MAX_ITERATIONS - 1), 10);
    }

    #[test]
    fn phase_round_trips_through_wire_form() {
        for phase in [
            WorkflowPhase::Initial,
            WorkflowPhase::Generating,
            WorkflowPhase::Evaluating,
            WorkflowPhase::WaitingFeedback,
            WorkflowPhase::Refining,
            WorkflowPhase::Complete,
        ] {
            assert_eq!(WorkflowPhase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(WorkflowPhase::parse("UNKNOWN"), None);
    }

    #[test]
    fn update_applies_only_the_set_fields() {
        let mut state = WorkflowState::new(Uuid::new_v4());
        state.error = Some("previous failure".into());

        StateUpdate::default()
            .iteration(2)
            .phase(WorkflowPhase::Evaluating)
            .clear_error()
            .apply(&mut state);

        assert_eq!(state.iteration_count, 2);
        assert_eq!(state.current_phase, WorkflowPhase::Evaluating);
        assert!(!state.should_terminate);
        assert!(state.error.is_none());
    }
}

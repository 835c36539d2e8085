use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::candidates::{CandidateFeedback, GeneratedCandidate};
use crate::engine::{
    analyze_feedback, generate_candidates, refine_criteria, seed_initial_criteria, should_refine,
    AnalysisError, GenerationError, RefinementError,
};
use crate::jobs::JobDescription;
use crate::llm::LlmClient;
use crate::workflow::state::{
    candidate_count_for_iteration, is_final_iteration, StateUpdate, WorkflowPhase, WorkflowState,
};
use crate::workflow::store::{IterationSummary, StoreError, WorkflowStore};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("job description {0} not found")]
    JobNotFound(Uuid),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Refinement(#[from] RefinementError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Whether re-driving the same iteration can reasonably succeed. The
    /// iteration counter is not advanced on failure, so a retry replays the
    /// same round.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Generation(GenerationError::Llm { source, .. }) => source.is_retryable(),
            WorkflowError::Analysis(AnalysisError::Llm(source)) => source.is_retryable(),
            WorkflowError::Refinement(RefinementError::Llm(source)) => source.is_retryable(),
            _ => false,
        }
    }
}

/// Result of driving one workflow iteration.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    /// Newly generated candidates, ranked best-first. Empty when the
    /// workflow had already terminated.
    pub candidates: Vec<GeneratedCandidate>,
    pub state: WorkflowState,
    /// The accumulated feedback the iteration conditioned on.
    pub feedback: Vec<CandidateFeedback>,
}

/// Drive one generation iteration for a job.
///
/// Each call performs at most one generation round: load (or create) the
/// workflow state, analyze the accumulated feedback, refine criteria when
/// the decision gates pass, generate candidates with the effective criteria
/// and advance the iteration counter. A terminated workflow short-circuits
/// to `COMPLETE` without generating.
///
/// Failures are recorded on the state without advancing the counter, so the
/// caller may re-drive the same iteration.
#[instrument(skip(store, llm), fields(job_id = %job_id))]
pub async fn run_iteration(
    store: &dyn WorkflowStore,
    llm: &dyn LlmClient,
    job_id: Uuid,
) -> Result<IterationOutcome, WorkflowError> {
    let job = store
        .get_job_description(job_id)
        .await?
        .ok_or(WorkflowError::JobNotFound(job_id))?;

    let mut state = match store.load_workflow_state(job_id).await? {
        Some(state) => state,
        None => init_workflow(store, llm, &job).await?,
    };

    if state.exhausted() {
        if state.current_phase != WorkflowPhase::Complete {
            state = store
                .update_workflow_state(
                    job_id,
                    StateUpdate::default()
                        .phase(WorkflowPhase::Complete)
                        .terminate(true),
                )
                .await?;
        }
        let feedback = store.load_feedback(job_id).await?;
        return Ok(IterationOutcome {
            candidates: Vec::new(),
            state,
            feedback,
        });
    }

    let iteration = state.iteration_count;

    state = store
        .update_workflow_state(
            job_id,
            StateUpdate::default().phase(WorkflowPhase::Generating),
        )
        .await?;

    let feedback = store.load_feedback(job_id).await?;

    let analysis = match analyze_feedback(llm, &feedback).await {
        Ok(analysis) => analysis,
        Err(err) => return fail_iteration(store, job_id, err.into()).await,
    };

    if should_refine(&feedback, &analysis) {
        state = store
            .update_workflow_state(
                job_id,
                StateUpdate::default().phase(WorkflowPhase::Refining),
            )
            .await?;

        let refinement = match refine_criteria(llm, &state.effective_criteria(), &analysis).await {
            Ok(refinement) => refinement,
            Err(err) => return fail_iteration(store, job_id, err.into()).await,
        };

        store
            .store_criteria_refinement(job_id, iteration, &refinement)
            .await?;
        state = store
            .update_workflow_state(job_id, StateUpdate::default().refined(refinement))
            .await?;

        info!(job_id = %job_id, iteration, "criteria refined from feedback");
    }

    let count = candidate_count_for_iteration(iteration);
    let candidates =
        match generate_candidates(llm, &job, &state.effective_criteria(), &feedback, count).await {
            Ok(candidates) => candidates,
            Err(err) => return fail_iteration(store, job_id, err.into()).await,
        };

    let final_round = is_final_iteration(iteration);
    store
        .store_generated_candidates(job_id, &candidates, iteration, final_round)
        .await?;
    store
        .store_iteration_summary(job_id, iteration, &IterationSummary::from_feedback(&feedback))
        .await?;

    let mut advance = StateUpdate::default()
        .iteration(iteration + 1)
        .clear_error();
    advance = if final_round {
        advance.phase(WorkflowPhase::Complete).terminate(true)
    } else {
        advance.phase(WorkflowPhase::Evaluating)
    };

    // Last writer on a stale counter loses; concurrent drivers of the same
    // job collapse into one advanced iteration.
    let state = store.advance_iteration(job_id, iteration, advance).await?;

    info!(
        job_id = %job_id,
        iteration,
        generated = candidates.len(),
        phase = state.current_phase.as_str(),
        "iteration completed"
    );

    Ok(IterationOutcome {
        candidates,
        state,
        feedback,
    })
}

/// First entry for a job: create the state record and seed initial criteria
/// from the job description when the base criteria are still empty.
async fn init_workflow(
    store: &dyn WorkflowStore,
    llm: &dyn LlmClient,
    job: &JobDescription,
) -> Result<WorkflowState, WorkflowError> {
    let mut state = WorkflowState::new(job.id);

    if state.scoring_criteria.required_skills.is_empty() {
        if let Some(seeded) = seed_initial_criteria(llm, job).await {
            store.store_criteria_refinement(job.id, 0, &seeded).await?;
            state.refined_criteria = Some(seeded);
        }
    }

    store.save_workflow_state(&state).await?;
    Ok(state)
}

/// Record the failure on the state without advancing the iteration counter,
/// then surface the original error.
async fn fail_iteration(
    store: &dyn WorkflowStore,
    job_id: Uuid,
    err: WorkflowError,
) -> Result<IterationOutcome, WorkflowError> {
    if let Err(store_err) = store
        .update_workflow_state(job_id, StateUpdate::default().error(err.to_string()))
        .await
    {
        warn!(job_id = %job_id, error = %store_err, "failed to record iteration error");
    }
    Err(err)
}

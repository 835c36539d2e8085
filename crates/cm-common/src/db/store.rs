use async_trait::async_trait;
use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::types::Json;
use tokio_postgres::{Error as PgError, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::candidates::{CandidateFeedback, CandidateStatus, FeedbackCriterion, GeneratedCandidate};
use crate::criteria::{CriteriaRefinement, ScoringCriteria};
use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::jobs::JobDescription;
use crate::workflow::{
    IterationSummary, StateUpdate, StoreError, WorkflowPhase, WorkflowState, WorkflowStore,
};

#[derive(Debug, Error)]
#[error("unknown workflow phase {0:?} in storage")]
struct InvalidPhase(String);

fn pool_err(err: PoolError) -> StoreError {
    StoreError::backend(err)
}

fn pg_err(err: PgError) -> StoreError {
    StoreError::backend(err)
}

fn state_from_row(row: &Row) -> Result<WorkflowState, StoreError> {
    let phase_raw: String = row.get("current_phase");
    let current_phase = WorkflowPhase::parse(&phase_raw)
        .ok_or_else(|| StoreError::backend(InvalidPhase(phase_raw.clone())))?;

    let Json(scoring_criteria): Json<ScoringCriteria> = row.get("scoring_criteria");
    let refined_criteria: Option<Json<CriteriaRefinement>> = row.get("refined_criteria");

    Ok(WorkflowState {
        job_description_id: row.get("job_description_id"),
        iteration_count: row.get::<_, i32>("iteration_count") as u32,
        current_phase,
        should_terminate: row.get("should_terminate"),
        scoring_criteria,
        refined_criteria: refined_criteria.map(|Json(r)| r),
        error: row.get("error"),
    })
}

/// Postgres-backed workflow store. All writes that touch the state record go
/// through a row lock so partial updates and the iteration CAS are atomic.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn locked_state(
        tx: &deadpool_postgres::Transaction<'_>,
        job_id: Uuid,
    ) -> Result<WorkflowState, StoreError> {
        let row = tx
            .query_opt(
                "SELECT job_description_id, iteration_count, current_phase,
                        should_terminate, scoring_criteria, refined_criteria, error
                 FROM cm.workflow_states
                 WHERE job_description_id = $1
                 FOR UPDATE",
                &[&job_id],
            )
            .await
            .map_err(pg_err)?
            .ok_or(StoreError::NotFound(job_id))?;
        state_from_row(&row)
    }

    async fn write_state(
        tx: &deadpool_postgres::Transaction<'_>,
        state: &WorkflowState,
    ) -> Result<(), StoreError> {
        tx.execute(
            "UPDATE cm.workflow_states
             SET iteration_count = $2,
                 current_phase = $3,
                 should_terminate = $4,
                 scoring_criteria = $5,
                 refined_criteria = $6,
                 error = $7,
                 updated_at = NOW()
             WHERE job_description_id = $1",
            &[
                &state.job_description_id,
                &(state.iteration_count as i32),
                &state.current_phase.as_str(),
                &state.should_terminate,
                &Json(&state.scoring_criteria),
                &state.refined_criteria.as_ref().map(Json),
                &state.error,
            ],
        )
        .await
        .map_err(pg_err)?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for PgStore {
    #[instrument(skip(self))]
    async fn get_job_description(
        &self,
        job_id: Uuid,
    ) -> Result<Option<JobDescription>, StoreError> {
        let client = self.pool.get().await.map_err(pool_err)?;
        let row = client
            .timed_query_opt_cached(
                "SELECT id, title, description, requirements, parsed_content
                 FROM cm.job_descriptions
                 WHERE id = $1",
                &[&job_id],
                "job_descriptions.get",
            )
            .await
            .map_err(pg_err)?;

        Ok(row.map(|row| {
            let Json(requirements): Json<Vec<String>> = row.get("requirements");
            JobDescription {
                id: row.get("id"),
                title: row.get("title"),
                description: row.get("description"),
                requirements,
                parsed_content: row.get("parsed_content"),
            }
        }))
    }

    #[instrument(skip(self))]
    async fn load_workflow_state(
        &self,
        job_id: Uuid,
    ) -> Result<Option<WorkflowState>, StoreError> {
        let client = self.pool.get().await.map_err(pool_err)?;
        let row = client
            .timed_query_opt_cached(
                "SELECT job_description_id, iteration_count, current_phase,
                        should_terminate, scoring_criteria, refined_criteria, error
                 FROM cm.workflow_states
                 WHERE job_description_id = $1",
                &[&job_id],
                "workflow_states.load",
            )
            .await
            .map_err(pg_err)?;

        row.map(|row| state_from_row(&row)).transpose()
    }

    #[instrument(skip(self, state), fields(job_id = %state.job_description_id))]
    async fn save_workflow_state(&self, state: &WorkflowState) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(pool_err)?;
        client
            .timed_execute_cached(
                "INSERT INTO cm.workflow_states (
                    job_description_id, iteration_count, current_phase,
                    should_terminate, scoring_criteria, refined_criteria, error
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (job_description_id) DO UPDATE SET
                    iteration_count = EXCLUDED.iteration_count,
                    current_phase = EXCLUDED.current_phase,
                    should_terminate = EXCLUDED.should_terminate,
                    scoring_criteria = EXCLUDED.scoring_criteria,
                    refined_criteria = EXCLUDED.refined_criteria,
                    error = EXCLUDED.error,
                    updated_at = NOW()",
                &[
                    &state.job_description_id,
                    &(state.iteration_count as i32),
                    &state.current_phase.as_str(),
                    &state.should_terminate,
                    &Json(&state.scoring_criteria),
                    &state.refined_criteria.as_ref().map(Json),
                    &state.error,
                ],
                "workflow_states.save",
            )
            .await
            .map_err(pg_err)?;
        Ok(())
    }

    #[instrument(skip(self, update))]
    async fn update_workflow_state(
        &self,
        job_id: Uuid,
        update: StateUpdate,
    ) -> Result<WorkflowState, StoreError> {
        let mut client = self.pool.get().await.map_err(pool_err)?;
        let tx = client.transaction().await.map_err(pg_err)?;

        let mut state = Self::locked_state(&tx, job_id).await?;
        update.apply(&mut state);
        Self::write_state(&tx, &state).await?;

        tx.commit().await.map_err(pg_err)?;
        Ok(state)
    }

    #[instrument(skip(self, update))]
    async fn advance_iteration(
        &self,
        job_id: Uuid,
        expected_iteration: u32,
        update: StateUpdate,
    ) -> Result<WorkflowState, StoreError> {
        let mut client = self.pool.get().await.map_err(pool_err)?;
        let tx = client.transaction().await.map_err(pg_err)?;

        let mut state = Self::locked_state(&tx, job_id).await?;
        if state.iteration_count != expected_iteration {
            return Err(StoreError::Conflict {
                job_id,
                expected: expected_iteration,
                actual: state.iteration_count,
            });
        }

        update.apply(&mut state);
        Self::write_state(&tx, &state).await?;

        tx.commit().await.map_err(pg_err)?;
        Ok(state)
    }

    #[instrument(skip(self, feedback), fields(candidate_id = %feedback.candidate_id))]
    async fn store_feedback(
        &self,
        job_id: Uuid,
        feedback: &CandidateFeedback,
    ) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(pool_err)?;
        client
            .timed_execute_cached(
                "INSERT INTO cm.candidate_feedback (
                    job_description_id, candidate_id, is_positive, reason, criteria
                 ) VALUES ($1, $2, $3, $4, $5)",
                &[
                    &job_id,
                    &feedback.candidate_id,
                    &feedback.is_positive,
                    &feedback.reason,
                    &feedback.criteria.as_ref().map(Json),
                ],
                "candidate_feedback.insert",
            )
            .await
            .map_err(pg_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_feedback(&self, job_id: Uuid) -> Result<Vec<CandidateFeedback>, StoreError> {
        let client = self.pool.get().await.map_err(pool_err)?;
        let rows = client
            .timed_query_cached(
                "SELECT candidate_id, is_positive, reason, criteria
                 FROM cm.candidate_feedback
                 WHERE job_description_id = $1
                 ORDER BY created_at, id",
                &[&job_id],
                "candidate_feedback.list",
            )
            .await
            .map_err(pg_err)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let criteria: Option<Json<Vec<FeedbackCriterion>>> = row.get("criteria");
                CandidateFeedback {
                    candidate_id: row.get("candidate_id"),
                    is_positive: row.get("is_positive"),
                    reason: row.get("reason"),
                    criteria: criteria.map(|Json(c)| c),
                }
            })
            .collect())
    }

    #[instrument(skip(self, refinement))]
    async fn store_criteria_refinement(
        &self,
        job_id: Uuid,
        iteration: u32,
        refinement: &CriteriaRefinement,
    ) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(pool_err)?;
        client
            .timed_execute_cached(
                "INSERT INTO cm.workflow_refinements (
                    job_description_id, iteration, refinement
                 ) VALUES ($1, $2, $3)
                 ON CONFLICT (job_description_id, iteration) DO UPDATE SET
                    refinement = EXCLUDED.refinement,
                    created_at = NOW()",
                &[&job_id, &(iteration as i32), &Json(refinement)],
                "workflow_refinements.upsert",
            )
            .await
            .map_err(pg_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_latest_refinement(
        &self,
        job_id: Uuid,
    ) -> Result<Option<CriteriaRefinement>, StoreError> {
        let client = self.pool.get().await.map_err(pool_err)?;
        let row = client
            .timed_query_opt_cached(
                "SELECT refinement
                 FROM cm.workflow_refinements
                 WHERE job_description_id = $1
                 ORDER BY iteration DESC
                 LIMIT 1",
                &[&job_id],
                "workflow_refinements.latest",
            )
            .await
            .map_err(pg_err)?;

        Ok(row.map(|row| {
            let Json(refinement): Json<CriteriaRefinement> = row.get("refinement");
            refinement
        }))
    }

    #[instrument(skip(self, candidates), fields(count = candidates.len()))]
    async fn store_generated_candidates(
        &self,
        job_id: Uuid,
        candidates: &[GeneratedCandidate],
        iteration: u32,
        is_final: bool,
    ) -> Result<(), StoreError> {
        let mut client = self.pool.get().await.map_err(pool_err)?;
        let tx = client.transaction().await.map_err(pg_err)?;

        let stmt = tx
            .prepare_cached(
                "INSERT INTO cm.candidate_profiles (
                    id, job_description_id, iteration, status, match_score, profile
                 ) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .await
            .map_err(pg_err)?;

        let status = CandidateStatus::for_iteration(is_final);
        for candidate in candidates {
            tx.execute(
                &stmt,
                &[
                    &candidate.id,
                    &job_id,
                    &(iteration as i32),
                    &status.as_str(),
                    &candidate.match_score,
                    &Json(candidate),
                ],
            )
            .await
            .map_err(pg_err)?;
        }

        tx.commit().await.map_err(pg_err)?;
        Ok(())
    }

    #[instrument(skip(self, summary))]
    async fn store_iteration_summary(
        &self,
        job_id: Uuid,
        iteration: u32,
        summary: &IterationSummary,
    ) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(pool_err)?;
        client
            .timed_execute_cached(
                "INSERT INTO cm.matching_iterations (
                    job_description_id, iteration, total_feedback,
                    positive_feedback, upvote_percentage
                 ) VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (job_description_id, iteration) DO UPDATE SET
                    total_feedback = EXCLUDED.total_feedback,
                    positive_feedback = EXCLUDED.positive_feedback,
                    upvote_percentage = EXCLUDED.upvote_percentage,
                    created_at = NOW()",
                &[
                    &job_id,
                    &(iteration as i32),
                    &(summary.total_feedback as i32),
                    &(summary.positive_feedback as i32),
                    &summary.upvote_percentage,
                ],
                "matching_iterations.upsert",
            )
            .await
            .map_err(pg_err)?;
        Ok(())
    }
}

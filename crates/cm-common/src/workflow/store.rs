use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::candidates::{CandidateFeedback, GeneratedCandidate};
use crate::criteria::CriteriaRefinement;
use crate::jobs::JobDescription;
use crate::workflow::state::{StateUpdate, WorkflowState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no workflow state for job {0}")]
    NotFound(Uuid),
    #[error("iteration conflict for job {job_id}: expected {expected}, found {actual}")]
    Conflict {
        job_id: Uuid,
        expected: u32,
        actual: u32,
    },
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Aggregate recorded after each completed iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationSummary {
    pub total_feedback: u32,
    pub positive_feedback: u32,
    pub upvote_percentage: f32,
}

impl IterationSummary {
    pub fn from_feedback(feedback: &[CandidateFeedback]) -> Self {
        let total = feedback.len() as u32;
        let positive = feedback.iter().filter(|f| f.is_positive).count() as u32;
        let upvote_percentage = if total == 0 {
            0.0
        } else {
            positive as f32 / total as f32 * 100.0
        };
        Self {
            total_feedback: total,
            positive_feedback: positive,
            upvote_percentage,
        }
    }
}

/// Persistence seam for the matching workflow. One implementation is backed
/// by Postgres, one by process memory for tests and the API's offline mode.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get_job_description(&self, job_id: Uuid)
        -> Result<Option<JobDescription>, StoreError>;

    async fn load_workflow_state(&self, job_id: Uuid)
        -> Result<Option<WorkflowState>, StoreError>;

    /// Upsert the full state record.
    async fn save_workflow_state(&self, state: &WorkflowState) -> Result<(), StoreError>;

    /// Apply a partial update without touching the iteration counter.
    async fn update_workflow_state(
        &self,
        job_id: Uuid,
        update: StateUpdate,
    ) -> Result<WorkflowState, StoreError>;

    /// Apply a partial update only if the stored iteration counter still
    /// equals `expected_iteration`. Two drivers stepping the same job
    /// concurrently collapse into one winner; the loser gets `Conflict`.
    async fn advance_iteration(
        &self,
        job_id: Uuid,
        expected_iteration: u32,
        update: StateUpdate,
    ) -> Result<WorkflowState, StoreError>;

    async fn store_feedback(
        &self,
        job_id: Uuid,
        feedback: &CandidateFeedback,
    ) -> Result<(), StoreError>;

    /// All feedback accumulated for a job, oldest first.
    async fn load_feedback(&self, job_id: Uuid) -> Result<Vec<CandidateFeedback>, StoreError>;

    /// Record the refinement produced for one iteration. The history holds
    /// at most one record per (job, iteration); a replayed iteration
    /// overwrites its own record rather than appending a duplicate.
    async fn store_criteria_refinement(
        &self,
        job_id: Uuid,
        iteration: u32,
        refinement: &CriteriaRefinement,
    ) -> Result<(), StoreError>;

    async fn load_latest_refinement(
        &self,
        job_id: Uuid,
    ) -> Result<Option<CriteriaRefinement>, StoreError>;

    async fn store_generated_candidates(
        &self,
        job_id: Uuid,
        candidates: &[GeneratedCandidate],
        iteration: u32,
        is_final: bool,
    ) -> Result<(), StoreError>;

    async fn store_iteration_summary(
        &self,
        job_id: Uuid,
        iteration: u32,
        summary: &IterationSummary,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct StoredCandidateBatch {
    pub iteration: u32,
    pub is_final: bool,
    pub candidates: Vec<GeneratedCandidate>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    jobs: HashMap<Uuid, JobDescription>,
    states: HashMap<Uuid, WorkflowState>,
    feedback: HashMap<Uuid, Vec<CandidateFeedback>>,
    refinements: HashMap<Uuid, Vec<(u32, CriteriaRefinement)>>,
    candidates: HashMap<Uuid, Vec<StoredCandidateBatch>>,
    summaries: HashMap<Uuid, Vec<(u32, IterationSummary)>>,
}

/// In-memory store. The mutex is never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_job(&self, job: JobDescription) {
        self.inner.lock().unwrap().jobs.insert(job.id, job);
    }

    pub fn stored_candidates(&self, job_id: Uuid) -> Vec<StoredCandidateBatch> {
        self.inner
            .lock()
            .unwrap()
            .candidates
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored_refinements(&self, job_id: Uuid) -> Vec<(u32, CriteriaRefinement)> {
        self.inner
            .lock()
            .unwrap()
            .refinements
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored_summaries(&self, job_id: Uuid) -> Vec<(u32, IterationSummary)> {
        self.inner
            .lock()
            .unwrap()
            .summaries
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn get_job_description(
        &self,
        job_id: Uuid,
    ) -> Result<Option<JobDescription>, StoreError> {
        Ok(self.inner.lock().unwrap().jobs.get(&job_id).cloned())
    }

    async fn load_workflow_state(
        &self,
        job_id: Uuid,
    ) -> Result<Option<WorkflowState>, StoreError> {
        Ok(self.inner.lock().unwrap().states.get(&job_id).cloned())
    }

    async fn save_workflow_state(&self, state: &WorkflowState) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .states
            .insert(state.job_description_id, state.clone());
        Ok(())
    }

    async fn update_workflow_state(
        &self,
        job_id: Uuid,
        update: StateUpdate,
    ) -> Result<WorkflowState, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .states
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound(job_id))?;
        update.apply(state);
        Ok(state.clone())
    }

    async fn advance_iteration(
        &self,
        job_id: Uuid,
        expected_iteration: u32,
        update: StateUpdate,
    ) -> Result<WorkflowState, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .states
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound(job_id))?;
        if state.iteration_count != expected_iteration {
            return Err(StoreError::Conflict {
                job_id,
                expected: expected_iteration,
                actual: state.iteration_count,
            });
        }
        update.apply(state);
        Ok(state.clone())
    }

    async fn store_feedback(
        &self,
        job_id: Uuid,
        feedback: &CandidateFeedback,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .feedback
            .entry(job_id)
            .or_default()
            .push(feedback.clone());
        Ok(())
    }

    async fn load_feedback(&self, job_id: Uuid) -> Result<Vec<CandidateFeedback>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .feedback
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn store_criteria_refinement(
        &self,
        job_id: Uuid,
        iteration: u32,
        refinement: &CriteriaRefinement,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let records = inner.refinements.entry(job_id).or_default();
        match records.iter_mut().find(|(it, _)| *it == iteration) {
            Some(record) => record.1 = refinement.clone(),
            None => records.push((iteration, refinement.clone())),
        }
        Ok(())
    }

    async fn load_latest_refinement(
        &self,
        job_id: Uuid,
    ) -> Result<Option<CriteriaRefinement>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .refinements
            .get(&job_id)
            .and_then(|r| r.iter().max_by_key(|(iteration, _)| *iteration))
            .map(|(_, refinement)| refinement.clone()))
    }

    async fn store_generated_candidates(
        &self,
        job_id: Uuid,
        candidates: &[GeneratedCandidate],
        iteration: u32,
        is_final: bool,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .candidates
            .entry(job_id)
            .or_default()
            .push(StoredCandidateBatch {
                iteration,
                is_final,
                candidates: candidates.to_vec(),
            });
        Ok(())
    }

    async fn store_iteration_summary(
        &self,
        job_id: Uuid,
        iteration: u32,
        summary: &IterationSummary,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .summaries
            .entry(job_id)
            .or_default()
            .push((iteration, *summary));
        Ok(())
    }
}

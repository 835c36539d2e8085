use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use cm_common::workflow::{StateUpdate, WorkflowPhase, WorkflowState, WorkflowStore};

use crate::error::ApiError;
use crate::SharedState;

/// Read the current workflow state for a job without driving an iteration.
pub async fn get_workflow_state(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<WorkflowState>, ApiError> {
    let workflow = state
        .store
        .load_workflow_state(job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no workflow for job {job_id}")))?;

    Ok(Json(workflow))
}

/// Terminate a workflow on caller request. Subsequent generate calls
/// short-circuit to `COMPLETE` without producing candidates.
pub async fn complete_workflow(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<WorkflowState>, ApiError> {
    let workflow = state
        .store
        .update_workflow_state(
            job_id,
            StateUpdate::default()
                .phase(WorkflowPhase::Complete)
                .terminate(true),
        )
        .await?;

    Ok(Json(workflow))
}

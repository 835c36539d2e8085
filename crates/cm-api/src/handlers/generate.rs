use axum::extract::rejection::JsonRejection;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cm_common::candidates::GeneratedCandidate;
use cm_common::workflow::{run_iteration, WorkflowState};

use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub job_description_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub candidates: Vec<GeneratedCandidate>,
    pub state: WorkflowState,
}

/// Drive one workflow iteration: analyze accumulated feedback, refine
/// criteria when warranted, generate the next candidate batch.
pub async fn generate(
    State(state): State<SharedState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::InvalidRequestFormat)?;

    let outcome = run_iteration(
        state.store.as_ref(),
        state.llm.as_ref(),
        request.job_description_id,
    )
    .await?;

    Ok(Json(GenerateResponse {
        candidates: outcome.candidates,
        state: outcome.state,
    }))
}

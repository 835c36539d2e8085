use axum::extract::rejection::JsonRejection;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cm_common::candidates::CandidateFeedback;
use cm_common::workflow::WorkflowStore;

use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub job_description_id: Uuid,
    pub feedback: Vec<CandidateFeedback>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub status: &'static str,
    pub total_feedback: usize,
}

/// Record a batch of judgments on generated candidates. Feedback is
/// append-only and conditions every subsequent iteration for the job.
pub async fn submit_feedback(
    State(state): State<SharedState>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::InvalidRequestFormat)?;

    // The whole batch is rejected before anything is stored.
    for entry in &request.feedback {
        if let Some(criteria) = &entry.criteria {
            if criteria.iter().any(|c| !(1..=5).contains(&c.score)) {
                return Err(ApiError::BadRequest(
                    "feedback criteria scores must be between 1 and 5".into(),
                ));
            }
        }
    }

    for entry in &request.feedback {
        state
            .store
            .store_feedback(request.job_description_id, entry)
            .await?;
    }

    let total = state
        .store
        .load_feedback(request.job_description_id)
        .await?
        .len();

    Ok(Json(FeedbackResponse {
        status: "recorded",
        total_feedback: total,
    }))
}

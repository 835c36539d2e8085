use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;
use std::{borrow::Cow, future::Future};
use thiserror::Error;
use tracing::error;

use cm_common::engine::GenerationError;
use cm_common::workflow::{StoreError, WorkflowError};

tokio::task_local! {
    static REQUEST_ID: String;
}

fn sanitize_message(message: &str) -> String {
    const MAX_LEN: usize = 240;

    let mut cleaned = message
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .replace(['\n', '\r'], " ");

    cleaned = cleaned
        .split_whitespace()
        .map(|token| {
            if token.contains("://") {
                "[redacted-url]".to_string()
            } else if let Some((base, _)) = token.split_once('?') {
                if base.is_empty() {
                    "[redacted-query]".to_string()
                } else {
                    format!("{base}?[redacted]")
                }
            } else if token.starts_with('/') || token.contains('\\') {
                "[redacted-path]".to_string()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.len() > MAX_LEN {
        cleaned.truncate(MAX_LEN);
        cleaned.push('…');
    }

    if cleaned.trim().is_empty() {
        "unexpected error".to_string()
    } else {
        cleaned
    }
}

pub async fn with_request_id<Fut, T>(request_id: Option<String>, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    if let Some(request_id) = request_id {
        REQUEST_ID.scope(request_id, fut).await
    } else {
        fut.await
    }
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|value| value.clone()).ok()
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Body did not parse as the expected JSON shape. Kept as a dedicated
    /// variant because clients match on its fixed body.
    #[error("invalid request format")]
    InvalidRequestFormat,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unprocessable: {0}")]
    Unprocessable(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
    request_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let code = self.code();
        let request_id = current_request_id();

        error!(
            code,
            status = %status,
            request_id = request_id.as_deref().unwrap_or(""),
            error = %self,
            "api_error"
        );

        // Malformed-body rejections keep the fixed shape clients expect.
        if matches!(self, ApiError::InvalidRequestFormat) {
            return (status, Json(json!({ "error": "Invalid request format" }))).into_response();
        }

        let body = Json(ErrorResponse {
            code,
            message: self.public_message().into_owned(),
            request_id,
        });

        (status, body).into_response()
    }
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequestFormat => "invalid_request_format",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unprocessable(_) => "unprocessable",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::Database(_) => "database_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn public_message(&self) -> Cow<'static, str> {
        match self {
            ApiError::InvalidRequestFormat => Cow::Borrowed("Invalid request format"),
            ApiError::BadRequest(msg) => Cow::Owned(sanitize_message(msg)),
            ApiError::NotFound(msg) => Cow::Owned(sanitize_message(msg)),
            ApiError::Conflict(msg) => Cow::Owned(sanitize_message(msg)),
            ApiError::Unprocessable(msg) => Cow::Owned(sanitize_message(msg)),
            ApiError::ServiceUnavailable(_) => Cow::Borrowed("service unavailable"),
            ApiError::Upstream(_) => Cow::Borrowed("upstream model call failed"),
            ApiError::Database(_) | ApiError::Internal(_) => Cow::Borrowed("internal server error"),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequestFormat | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => ApiError::NotFound(format!("workflow not found: {id}")),
            StoreError::Conflict { expected, .. } => ApiError::Conflict(format!(
                "workflow iteration {expected} was already advanced by another request"
            )),
            other => ApiError::Database(other.to_string()),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::JobNotFound(id) => {
                ApiError::NotFound(format!("job description not found: {id}"))
            }
            WorkflowError::Generation(GenerationError::InvalidCount(count)) => {
                ApiError::BadRequest(format!("invalid candidate count: {count}"))
            }
            WorkflowError::Generation(GenerationError::EmptyJobDescription(id)) => {
                ApiError::Unprocessable(format!(
                    "job description {id} has no parsed content to generate from"
                ))
            }
            WorkflowError::Store(store) => ApiError::from(store),
            other if other.is_retryable() => ApiError::ServiceUnavailable(other.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::Value;
    use uuid::Uuid;

    use super::*;
    use cm_common::engine::AnalysisError;
    use cm_common::llm::LlmError;

    #[tokio::test]
    async fn includes_request_id_in_response_body_when_present() {
        let err = ApiError::Internal("boom".into());
        let response = with_request_id(Some("req-123".into()), async { err.into_response() }).await;

        let (parts, body) = response.into_parts();
        assert_eq!(parts.status, StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = body.collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["request_id"], "req-123");
    }

    #[tokio::test]
    async fn invalid_format_keeps_its_fixed_body() {
        let response = ApiError::InvalidRequestFormat.into_response();
        let (parts, body) = response.into_parts();
        assert_eq!(parts.status, StatusCode::BAD_REQUEST);

        let bytes = body.collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Invalid request format" }));
    }

    #[test]
    fn workflow_errors_map_to_expected_statuses() {
        let timeout = WorkflowError::Analysis(AnalysisError::Llm(LlmError::Timeout));
        assert_eq!(
            ApiError::from(timeout).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let schema = WorkflowError::Analysis(AnalysisError::Llm(LlmError::Schema {
            raw: String::new(),
            diagnostics: "missing field".into(),
        }));
        assert_eq!(ApiError::from(schema).status_code(), StatusCode::BAD_GATEWAY);

        let conflict = WorkflowError::Store(StoreError::Conflict {
            job_id: Uuid::nil(),
            expected: 1,
            actual: 2,
        });
        assert_eq!(ApiError::from(conflict).status_code(), StatusCode::CONFLICT);

        let missing = WorkflowError::JobNotFound(Uuid::nil());
        assert_eq!(ApiError::from(missing).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn sanitizer_redacts_paths_and_urls() {
        let cleaned = sanitize_message("failed at /var/lib/secret with https://internal/x?token=1");
        assert!(!cleaned.contains("/var/lib"));
        assert!(!cleaned.contains("token=1"));
    }
}

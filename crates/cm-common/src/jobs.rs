use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The requisition candidates are matched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescription {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub requirements: Vec<String>,
    /// Structured content extracted from the raw posting; generation refuses
    /// to run without it.
    pub parsed_content: Option<String>,
}

impl JobDescription {
    /// Content the generator is allowed to prompt with. `None` when the job
    /// was never parsed, which is a precondition failure upstream.
    pub fn generation_content(&self) -> Option<&str> {
        self.parsed_content
            .as_deref()
            .map(str::trim)
            .filter(|content| !content.is_empty())
    }
}

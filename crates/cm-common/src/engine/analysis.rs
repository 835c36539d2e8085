use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::candidates::CandidateFeedback;
use crate::llm::{parse_structured, LlmClient, LlmError};

const ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert AI recruiter analyzing \
candidate feedback. Identify patterns across judgments and produce actionable \
recommendations. Respond with a single JSON object containing `patterns` \
(positivePatterns, negativePatterns, skillGaps, culturalInsights as string \
arrays), `recommendations` (skillsToEmphasize, skillsToDeemphasize, \
experienceAdjustments, culturalFitAdjustments as string arrays) and a \
`confidence` number between 0 and 1.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackPatterns {
    pub positive_patterns: Vec<String>,
    pub negative_patterns: Vec<String>,
    pub skill_gaps: Vec<String>,
    pub cultural_insights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecommendations {
    pub skills_to_emphasize: Vec<String>,
    pub skills_to_deemphasize: Vec<String>,
    pub experience_adjustments: Vec<String>,
    pub cultural_fit_adjustments: Vec<String>,
}

/// Output of one analysis pass over the full accumulated feedback set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackAnalysis {
    pub patterns: FeedbackPatterns,
    pub recommendations: FeedbackRecommendations,
    /// Confidence 0-1.
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("feedback analysis call failed: {0}")]
    Llm(#[from] LlmError),
}

fn analysis_prompt(feedback: &[CandidateFeedback]) -> String {
    let lines = feedback
        .iter()
        .map(|f| format!("- {}", f.verdict_line()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze the following candidate feedback and identify patterns and \
insights. Return your analysis as a JSON object.\n\n{lines}"
    )
}

/// Analyze the accumulated feedback for a job. Operates on the full set, not
/// just the latest batch. Degrades gracefully on empty input: no call is
/// made and an empty analysis with confidence 0 is returned.
#[instrument(skip(llm, feedback), fields(feedback_count = feedback.len()))]
pub async fn analyze_feedback(
    llm: &dyn LlmClient,
    feedback: &[CandidateFeedback],
) -> Result<FeedbackAnalysis, AnalysisError> {
    if feedback.is_empty() {
        return Ok(FeedbackAnalysis::default());
    }

    let value = llm
        .complete_json(ANALYSIS_SYSTEM_PROMPT, &analysis_prompt(feedback))
        .await?;

    let mut analysis: FeedbackAnalysis = parse_structured(value)?;
    analysis.confidence = analysis.confidence.clamp(0.0, 1.0);

    debug!(
        confidence = analysis.confidence,
        skill_gaps = analysis.patterns.skill_gaps.len(),
        "feedback analyzed"
    );

    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use uuid::Uuid;

    struct StaticLlm(Value);

    #[async_trait]
    impl LlmClient for StaticLlm {
        async fn complete_json(&self, _system: &str, _user: &str) -> Result<Value, LlmError> {
            Ok(self.0.clone())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete_json(&self, _system: &str, _user: &str) -> Result<Value, LlmError> {
            Err(LlmError::Timeout)
        }
    }

    fn feedback(is_positive: bool) -> CandidateFeedback {
        CandidateFeedback {
            candidate_id: Uuid::new_v4(),
            is_positive,
            reason: None,
            criteria: None,
        }
    }

    #[tokio::test]
    async fn empty_feedback_returns_empty_analysis_without_calling_llm() {
        let analysis = analyze_feedback(&FailingLlm, &[]).await.unwrap();
        assert_eq!(analysis, FeedbackAnalysis::default());
        assert_eq!(analysis.confidence, 0.0);
    }

    #[tokio::test]
    async fn parses_and_clamps_model_output() {
        let llm = StaticLlm(json!({
            "patterns": {
                "positivePatterns": ["strong systems background"],
                "negativePatterns": [],
                "skillGaps": ["distributed systems"],
                "culturalInsights": []
            },
            "recommendations": {
                "skillsToEmphasize": ["Rust"],
                "skillsToDeemphasize": [],
                "experienceAdjustments": [],
                "culturalFitAdjustments": []
            },
            "confidence": 1.4
        }));

        let analysis = analyze_feedback(&llm, &[feedback(true)]).await.unwrap();
        assert_eq!(analysis.patterns.skill_gaps, vec!["distributed systems"]);
        assert_eq!(analysis.confidence, 1.0);
    }

    #[tokio::test]
    async fn malformed_output_is_a_schema_error() {
        let llm = StaticLlm(json!({ "patterns": "not-an-object" }));
        let err = analyze_feedback(&llm, &[feedback(false)]).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Llm(LlmError::Schema { .. })));
    }
}

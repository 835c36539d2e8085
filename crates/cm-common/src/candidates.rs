use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Candidate persistence status. Exactly the candidates of the last allowed
/// iteration are tagged `final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    Generated,
    Final,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Generated => "generated",
            CandidateStatus::Final => "final",
        }
    }

    pub fn for_iteration(is_final: bool) -> Self {
        if is_final {
            CandidateStatus::Final
        } else {
            CandidateStatus::Generated
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringDetails {
    pub skills_score: f32,
    pub experience_score: f32,
    pub achievements_score: f32,
    pub cultural_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leadership_score: Option<f32>,
    pub score_breakdown: String,
}

/// One synthetic candidate profile produced by the generator.
///
/// Ids are assigned server-side with a fresh v4 UUID on every iteration and
/// are never reused, even when a profile happens to repeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCandidate {
    pub id: Uuid,
    pub name: String,
    pub background: String,
    pub skills: Vec<String>,
    pub years_of_experience: f32,
    pub achievements: Vec<String>,
    /// Match score, 0-100.
    pub match_score: f32,
    pub reason_for_match: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_details: Option<ScoringDetails>,
}

/// Structured per-category judgment attached to a piece of feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackCriterion {
    pub category: String,
    /// Score 1-5.
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One human judgment on a generated candidate. Immutable once stored;
/// accumulates across iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFeedback {
    pub candidate_id: Uuid,
    pub is_positive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Vec<FeedbackCriterion>>,
}

impl CandidateFeedback {
    pub fn has_structured_criteria(&self) -> bool {
        self.criteria.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Single-line rendering used when feedback history is embedded into
    /// prompts.
    pub fn verdict_line(&self) -> String {
        let mut line = format!(
            "Candidate {}: {}",
            self.candidate_id,
            if self.is_positive {
                "Positive"
            } else {
                "Negative"
            }
        );

        if let Some(reason) = &self.reason {
            line.push_str(&format!(" ({reason})"));
        }

        if let Some(criteria) = &self.criteria {
            let scores = criteria
                .iter()
                .map(|c| format!("{}: {}/5", c.category, c.score))
                .collect::<Vec<_>>()
                .join(", ");
            if !scores.is_empty() {
                line.push_str(&format!(" [{scores}]"));
            }
        }

        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_line_includes_reason_and_scores() {
        let feedback = CandidateFeedback {
            candidate_id: Uuid::nil(),
            is_positive: false,
            reason: Some("too junior".into()),
            criteria: Some(vec![FeedbackCriterion {
                category: "experience".into(),
                score: 2,
                comment: None,
            }]),
        };

        let line = feedback.verdict_line();
        assert!(line.contains("Negative"));
        assert!(line.contains("too junior"));
        assert!(line.contains("experience: 2/5"));
    }

    #[test]
    fn status_tag_follows_final_flag() {
        assert_eq!(CandidateStatus::for_iteration(false).as_str(), "generated");
        assert_eq!(CandidateStatus::for_iteration(true).as_str(), "final");
    }
}

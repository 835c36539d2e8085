use serde::Deserialize;
use thiserror::Error;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::candidates::{CandidateFeedback, GeneratedCandidate, ScoringDetails};
use crate::criteria::EffectiveCriteria;
use crate::jobs::JobDescription;
use crate::llm::{parse_structured, LlmClient, LlmError};

pub const MIN_CANDIDATES: usize = 1;
pub const MAX_CANDIDATES: usize = 10;

const GENERATOR_SYSTEM_PROMPT: &str = "You are an expert AI recruiter. Generate \
realistic candidate profiles that match the job requirements. Each candidate \
should have unique characteristics while matching the core requirements. \
Respond with a JSON object of the form {\"candidates\": [...]} where each \
candidate has name, background, skills (string array), yearsOfExperience \
(number), achievements (string array), matchScore (0-100), reasonForMatch and \
optionally scoringDetails (skillsScore, experienceScore, achievementsScore, \
culturalScore, optional leadershipScore, scoreBreakdown).";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("candidate count {0} outside allowed range {MIN_CANDIDATES}-{MAX_CANDIDATES}")]
    InvalidCount(usize),
    #[error("job description {0} has no parsed content to generate from")]
    EmptyJobDescription(Uuid),
    #[error("candidate generation failed for job {job_id} (attempted {attempted} candidates): {source}")]
    Llm {
        job_id: Uuid,
        attempted: usize,
        #[source]
        source: LlmError,
    },
}

/// Candidate shape as produced by the model, before a server-side id is
/// assigned.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateDraft {
    name: String,
    background: String,
    skills: Vec<String>,
    years_of_experience: f32,
    achievements: Vec<String>,
    match_score: f32,
    reason_for_match: String,
    #[serde(default)]
    scoring_details: Option<ScoringDetails>,
}

#[derive(Debug, Deserialize)]
struct CandidateBatch {
    candidates: Vec<CandidateDraft>,
}

fn generation_prompt(
    job_content: &str,
    criteria: &EffectiveCriteria,
    feedback: &[CandidateFeedback],
    count: usize,
) -> String {
    let mut prompt = format!(
        "Generate exactly {count} candidate profiles for the following job:\n\n\
Job Description:\n{job_content}\n\n\
Selection Criteria:\n{}\n",
        criteria.selection_lines().join("\n")
    );

    if !feedback.is_empty() {
        let verdicts = feedback
            .iter()
            .map(|f| format!("- {}", f.verdict_line()))
            .collect::<Vec<_>>()
            .join("\n");

        prompt.push_str(&format!(
            "\nFeedback on previously generated candidates:\n{verdicts}\n\n\
Bias new profiles toward the traits of positively rated candidates and away \
from the traits of negatively rated ones. Do not duplicate any previous \
candidate.\n"
        ));
    }

    prompt.push_str(
        "\nImportant:\n\
- Each candidate must have a detailed background summary\n\
- Include specific achievements that demonstrate their expertise\n\
- Provide accurate years of experience\n\
- Give detailed reasoning for match scores\n\
- Include scoring details with a breakdown for each category\n",
    );

    prompt
}

/// Generate `count` candidate profiles for a job with the effective
/// (merged) criteria, conditioning on all accumulated feedback.
///
/// A failed or malformed generation call is a hard error carrying the job id
/// and attempted count; it never degrades to an empty result. Results are
/// ranked by match score descending and each candidate receives a fresh v4
/// UUID, so ids are never reused across iterations.
#[instrument(skip(llm, job, criteria, feedback), fields(job_id = %job.id, count))]
pub async fn generate_candidates(
    llm: &dyn LlmClient,
    job: &JobDescription,
    criteria: &EffectiveCriteria,
    feedback: &[CandidateFeedback],
    count: usize,
) -> Result<Vec<GeneratedCandidate>, GenerationError> {
    if !(MIN_CANDIDATES..=MAX_CANDIDATES).contains(&count) {
        return Err(GenerationError::InvalidCount(count));
    }

    let job_content = job
        .generation_content()
        .ok_or(GenerationError::EmptyJobDescription(job.id))?;

    let prompt = generation_prompt(job_content, criteria, feedback, count);

    let wrap = |source: LlmError| GenerationError::Llm {
        job_id: job.id,
        attempted: count,
        source,
    };

    let value = llm
        .complete_json(GENERATOR_SYSTEM_PROMPT, &prompt)
        .await
        .map_err(wrap)?;

    let batch: CandidateBatch = parse_structured(value).map_err(wrap)?;

    if batch.candidates.len() != count {
        warn!(
            job_id = %job.id,
            requested = count,
            received = batch.candidates.len(),
            "model returned a different candidate count than requested"
        );
    }

    let mut candidates: Vec<GeneratedCandidate> = batch
        .candidates
        .into_iter()
        .map(|draft| GeneratedCandidate {
            id: Uuid::new_v4(),
            name: draft.name,
            background: draft.background,
            skills: draft.skills,
            years_of_experience: draft.years_of_experience,
            achievements: draft.achievements,
            match_score: draft.match_score,
            reason_for_match: draft.reason_for_match,
            scoring_details: draft.scoring_details,
        })
        .collect();

    // Rank best-first before the caller persists or returns them.
    candidates.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::ScoringCriteria;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct RecordingLlm {
        response: Value,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingLlm {
        fn new(response: Value) -> Self {
            Self {
                response,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete_json(&self, _system: &str, user: &str) -> Result<Value, LlmError> {
            self.prompts.lock().unwrap().push(user.to_string());
            Ok(self.response.clone())
        }
    }

    fn job() -> JobDescription {
        JobDescription {
            id: Uuid::new_v4(),
            title: "Backend Engineer".into(),
            description: "raw posting".into(),
            requirements: vec!["Rust".into()],
            parsed_content: Some("Senior backend engineer, Rust and Postgres".into()),
        }
    }

    fn draft(name: &str, score: f32) -> Value {
        json!({
            "name": name,
            "background": "ten years of systems work",
            "skills": ["Rust"],
            "yearsOfExperience": 8.0,
            "achievements": ["shipped a database"],
            "matchScore": score,
            "reasonForMatch": "strong overlap"
        })
    }

    fn effective() -> EffectiveCriteria {
        EffectiveCriteria::merge(&ScoringCriteria::default(), None)
    }

    #[tokio::test]
    async fn assigns_fresh_ids_and_ranks_by_score() {
        let llm = RecordingLlm::new(json!({
            "candidates": [draft("Low", 40.0), draft("High", 90.0)]
        }));

        let first = generate_candidates(&llm, &job(), &effective(), &[], 2)
            .await
            .unwrap();
        let second = generate_candidates(&llm, &job(), &effective(), &[], 2)
            .await
            .unwrap();

        assert_eq!(first[0].name, "High");
        assert_eq!(first[1].name, "Low");

        // Same drafts, but ids must never repeat across iterations.
        let mut ids: Vec<Uuid> = first.iter().chain(second.iter()).map(|c| c.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn prompt_lists_prior_verdicts() {
        let llm = RecordingLlm::new(json!({ "candidates": [draft("A", 50.0)] }));
        let judged = Uuid::new_v4();
        let feedback = vec![CandidateFeedback {
            candidate_id: judged,
            is_positive: false,
            reason: Some("wrong stack".into()),
            criteria: None,
        }];

        generate_candidates(&llm, &job(), &effective(), &feedback, 1)
            .await
            .unwrap();

        let prompt = llm.last_prompt();
        assert!(prompt.contains(&judged.to_string()));
        assert!(prompt.contains("Negative"));
        assert!(prompt.contains("wrong stack"));
        assert!(prompt.contains("Do not duplicate"));
    }

    #[tokio::test]
    async fn count_outside_range_is_rejected_before_any_call() {
        let llm = RecordingLlm::new(json!({ "candidates": [] }));
        let err = generate_candidates(&llm, &job(), &effective(), &[], 11)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidCount(11)));
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_parsed_content_is_a_precondition_error() {
        let llm = RecordingLlm::new(json!({ "candidates": [] }));
        let mut unparsed = job();
        unparsed.parsed_content = None;

        let err = generate_candidates(&llm, &unparsed, &effective(), &[], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyJobDescription(_)));
    }

    #[tokio::test]
    async fn malformed_batch_carries_job_context() {
        let llm = RecordingLlm::new(json!({ "profiles": [] }));
        let the_job = job();

        let err = generate_candidates(&llm, &the_job, &effective(), &[], 5)
            .await
            .unwrap_err();
        match err {
            GenerationError::Llm {
                job_id, attempted, ..
            } => {
                assert_eq!(job_id, the_job.id);
                assert_eq!(attempted, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

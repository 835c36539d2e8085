use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::criteria::{CriteriaRefinement, EffectiveCriteria};
use crate::engine::analysis::FeedbackAnalysis;
use crate::jobs::JobDescription;
use crate::llm::{parse_structured, LlmClient, LlmError};

const REFINER_SYSTEM_PROMPT: &str = "You are an expert AI recruiter refining job \
criteria based on candidate feedback patterns. Respond with a single JSON \
object containing requiredSkills and preferredSkills (arrays of {skill, \
importance (1-5), reason}), experienceLevel ({minYears, maxYears, reason}), \
culturalAttributes (array of {attribute, importance, reason}), adjustments \
(array of {aspect, change: \"increased\"|\"decreased\"|\"unchanged\", \
reason}), an overall explanation string and a confidence number between 0 \
and 1. Every change must carry a reason and classify its direction relative \
to the current criteria.";

const SEED_SYSTEM_PROMPT: &str = "You are an expert AI recruiter. Derive initial \
selection criteria from a job description. Respond with a single JSON object \
containing requiredSkills and preferredSkills (arrays of {skill, importance \
(1-5), reason}), experienceLevel ({minYears, maxYears, reason}), \
culturalAttributes (array of {attribute, importance, reason}), adjustments \
(empty array), an explanation string and a confidence number between 0 and 1.";

#[derive(Debug, Error)]
pub enum RefinementError {
    #[error("criteria refinement call failed: {0}")]
    Llm(#[from] LlmError),
}

fn refinement_prompt(criteria: &EffectiveCriteria, analysis: &FeedbackAnalysis) -> String {
    // Both serialize losslessly; rendering them as JSON keeps the prompt
    // aligned with the schema the model must answer in.
    let criteria_json =
        serde_json::to_string_pretty(criteria).unwrap_or_else(|_| "{}".to_string());
    let analysis_json =
        serde_json::to_string_pretty(analysis).unwrap_or_else(|_| "{}".to_string());

    format!(
        "Based on the feedback analysis, refine the job criteria and return \
the refinements as a JSON object.\n\n\
Current Criteria:\n{criteria_json}\n\n\
Feedback Analysis:\n{analysis_json}\n\n\
Instructions:\n\
1. Analyze patterns in what made candidates good or poor fits\n\
2. Adjust skill requirements based on successful matches\n\
3. Refine experience levels based on feedback\n\
4. Update cultural attributes based on fit\n\
5. Document each change, its direction, and why it was made"
    )
}

/// Produce a refined criteria set from the current effective criteria and the
/// latest feedback analysis.
///
/// Malformed output fails the whole refinement step; the orchestrator treats
/// that as the iteration's error state rather than silently generating with
/// unrefined criteria.
#[instrument(skip(llm, criteria, analysis))]
pub async fn refine_criteria(
    llm: &dyn LlmClient,
    criteria: &EffectiveCriteria,
    analysis: &FeedbackAnalysis,
) -> Result<CriteriaRefinement, RefinementError> {
    let value = llm
        .complete_json(REFINER_SYSTEM_PROMPT, &refinement_prompt(criteria, analysis))
        .await?;

    let mut refinement: CriteriaRefinement = parse_structured(value)?;
    refinement.confidence = refinement.confidence.clamp(0.0, 1.0);

    for adjustment in &refinement.adjustments {
        debug!(
            aspect = %adjustment.aspect,
            change = adjustment.change.as_ref(),
            reason = %adjustment.reason,
            "criteria adjustment"
        );
    }

    Ok(refinement)
}

/// Derive initial selection criteria from the parsed job description when the
/// base criteria carry no required skills yet.
///
/// Unlike `refine_criteria` this is best-effort: a failed or malformed call
/// logs a warning and leaves the workflow on its base criteria.
#[instrument(skip(llm, job), fields(job_id = %job.id))]
pub async fn seed_initial_criteria(
    llm: &dyn LlmClient,
    job: &JobDescription,
) -> Option<CriteriaRefinement> {
    let content = job.generation_content()?;

    let prompt = format!(
        "Based on the following job description, generate initial selection \
criteria as a JSON object.\n\nJob Description:\n{content}"
    );

    let result = llm.complete_json(SEED_SYSTEM_PROMPT, &prompt).await;
    match result.map(parse_structured::<CriteriaRefinement>) {
        Ok(Ok(mut refinement)) => {
            refinement.confidence = refinement.confidence.clamp(0.0, 1.0);
            Some(refinement)
        }
        Ok(Err(err)) | Err(err) => {
            warn!(job_id = %job.id, error = %err, "initial criteria seeding failed; using base criteria");
            None
        }
    }
}

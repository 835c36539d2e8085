use crate::candidates::CandidateFeedback;
use crate::engine::analysis::FeedbackAnalysis;

/// Minimum accumulated feedback before refinement is considered at all.
pub const MIN_FEEDBACK_FOR_REFINEMENT: usize = 3;

const IMPACT_THRESHOLD: f32 = 0.3;
const CONFIDENCE_THRESHOLD: f32 = 0.7;

const SKILLS_IMPACT_FACTOR: f32 = 0.2;
const EXPERIENCE_IMPACT_FACTOR: f32 = 0.3;
const CULTURAL_IMPACT_FACTOR: f32 = 0.25;

/// Impact scores derived from feedback volume and analysis output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackImpact {
    pub skills: f32,
    pub experience: f32,
    pub cultural: f32,
    pub confidence: f32,
}

impl FeedbackImpact {
    pub fn any_significant(&self) -> bool {
        self.skills > IMPACT_THRESHOLD
            || self.experience > IMPACT_THRESHOLD
            || self.cultural > IMPACT_THRESHOLD
    }
}

pub fn calculate_feedback_impact(
    feedback: &[CandidateFeedback],
    analysis: &FeedbackAnalysis,
) -> FeedbackImpact {
    let total = feedback.len();
    let with_criteria = feedback
        .iter()
        .filter(|f| f.has_structured_criteria())
        .count();

    let experience = if total == 0 {
        0.0
    } else {
        (with_criteria as f32 / total as f32) * EXPERIENCE_IMPACT_FACTOR
    };

    FeedbackImpact {
        skills: analysis.recommendations.skills_to_emphasize.len() as f32 * SKILLS_IMPACT_FACTOR,
        experience,
        cultural: analysis.patterns.cultural_insights.len() as f32 * CULTURAL_IMPACT_FACTOR,
        confidence: analysis.confidence,
    }
}

/// Decide whether criteria should be refined this iteration.
///
/// Conjunctive triple gate: at least one impact score above 0.3, at least 3
/// accumulated feedback entries, and analysis confidence above 0.7. A
/// borderline case failing any single gate does not refine; the design
/// favors criteria stability over responsiveness. Deterministic and
/// side-effect free.
pub fn should_refine(feedback: &[CandidateFeedback], analysis: &FeedbackAnalysis) -> bool {
    if feedback.len() < MIN_FEEDBACK_FOR_REFINEMENT {
        return false;
    }

    if analysis.confidence <= CONFIDENCE_THRESHOLD {
        return false;
    }

    calculate_feedback_impact(feedback, analysis).any_significant()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::analysis::{FeedbackPatterns, FeedbackRecommendations};
    use uuid::Uuid;

    fn feedback_entries(count: usize) -> Vec<CandidateFeedback> {
        (0..count)
            .map(|i| CandidateFeedback {
                candidate_id: Uuid::new_v4(),
                is_positive: i % 2 == 0,
                reason: None,
                criteria: None,
            })
            .collect()
    }

    fn analysis(confidence: f32, skills_to_emphasize: usize, cultural: usize) -> FeedbackAnalysis {
        FeedbackAnalysis {
            patterns: FeedbackPatterns {
                cultural_insights: (0..cultural).map(|i| format!("insight-{i}")).collect(),
                ..FeedbackPatterns::default()
            },
            recommendations: FeedbackRecommendations {
                skills_to_emphasize: (0..skills_to_emphasize)
                    .map(|i| format!("skill-{i}"))
                    .collect(),
                ..FeedbackRecommendations::default()
            },
            confidence,
        }
    }

    #[test]
    fn refines_when_all_three_gates_hold() {
        // Two emphasized skills: skills impact 0.4 > 0.3.
        assert!(should_refine(&feedback_entries(3), &analysis(0.85, 2, 0)));
    }

    #[test]
    fn volume_gate_blocks_regardless_of_confidence() {
        assert!(!should_refine(&feedback_entries(2), &analysis(0.99, 5, 5)));
        assert!(!should_refine(&[], &analysis(0.99, 5, 5)));
    }

    #[test]
    fn confidence_gate_blocks_even_with_high_impact() {
        assert!(!should_refine(&feedback_entries(5), &analysis(0.7, 5, 5)));
        assert!(!should_refine(&feedback_entries(5), &analysis(0.3, 5, 5)));
    }

    #[test]
    fn impact_gate_blocks_when_no_score_clears_threshold() {
        // One emphasized skill: 0.2; one cultural insight: 0.25; no
        // structured criteria: experience 0. Nothing exceeds 0.3.
        assert!(!should_refine(&feedback_entries(4), &analysis(0.9, 1, 1)));
    }

    #[test]
    fn impact_threshold_is_strict() {
        // Cultural impact lands exactly on 0.3 with no way to construct it
        // from 0.25 steps, so pin the boundary via the skills factor
        // composed with a hand-built impact.
        let impact = FeedbackImpact {
            skills: 0.3,
            experience: 0.3,
            cultural: 0.3,
            confidence: 0.9,
        };
        assert!(!impact.any_significant());
    }

    #[test]
    fn experience_impact_tracks_structured_criteria_ratio() {
        let mut entries = feedback_entries(4);
        entries[0].criteria = Some(vec![crate::candidates::FeedbackCriterion {
            category: "skills".into(),
            score: 4,
            comment: None,
        }]);
        entries[1].criteria = Some(vec![crate::candidates::FeedbackCriterion {
            category: "culture".into(),
            score: 2,
            comment: None,
        }]);

        let impact = calculate_feedback_impact(&entries, &analysis(0.9, 0, 0));
        // 2 of 4 entries carry structured criteria: 0.5 * 0.3 = 0.15.
        assert!((impact.experience - 0.15).abs() < f32::EPSILON);
    }

    #[test]
    fn cultural_insights_alone_can_trigger_refinement() {
        // Two insights: 0.5 > 0.3.
        assert!(should_refine(&feedback_entries(3), &analysis(0.75, 0, 2)));
    }
}

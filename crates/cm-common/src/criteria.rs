use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use crate::skills::union_skills;

/// Base weighted scoring criteria for a job. The category weights
/// conventionally sum to roughly 1.0 but that is not enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringCriteria {
    pub skills_weight: f32,
    pub experience_weight: f32,
    pub achievements_weight: f32,
    pub cultural_weight: f32,
    pub leadership_weight: f32,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    pub experience_levels: ExperienceLevels,
    pub cultural_criteria: Vec<String>,
    pub leadership_criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceLevels {
    pub minimum: f32,
    pub preferred: f32,
    pub maximum: f32,
    pub years_weight: f32,
}

impl Default for ScoringCriteria {
    fn default() -> Self {
        Self {
            skills_weight: 0.3,
            experience_weight: 0.2,
            achievements_weight: 0.2,
            cultural_weight: 0.2,
            leadership_weight: 0.1,
            required_skills: Vec::new(),
            preferred_skills: Vec::new(),
            experience_levels: ExperienceLevels {
                minimum: 0.0,
                preferred: 0.0,
                maximum: 0.0,
                years_weight: 0.5,
            },
            cultural_criteria: Vec::new(),
            leadership_criteria: Vec::new(),
        }
    }
}

/// One refinement round produced from analyzed feedback. Append-only history
/// keyed by (job, iteration); the orchestrator merges only the latest into
/// the base criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaRefinement {
    pub required_skills: Vec<SkillImportance>,
    pub preferred_skills: Vec<SkillImportance>,
    pub experience_level: ExperienceBounds,
    pub cultural_attributes: Vec<AttributeImportance>,
    pub adjustments: Vec<CriteriaAdjustment>,
    pub explanation: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillImportance {
    pub skill: String,
    /// Importance 1-5.
    pub importance: u8,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceBounds {
    pub min_years: f32,
    pub max_years: f32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeImportance {
    pub attribute: String,
    /// Importance 1-5.
    pub importance: u8,
    pub reason: String,
}

/// Audit-trail entry: every aspect the refiner touched must classify the
/// direction of the change and explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaAdjustment {
    pub aspect: String,
    pub change: AdjustmentDirection,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdjustmentDirection {
    Increased,
    Decreased,
    Unchanged,
}

/// Criteria actually used for generation in one iteration: the base merged
/// with the latest refinement.
///
/// Merge semantics are additive for skill and attribute lists (union,
/// de-duplicated on the normalized skill form) while experience bounds from
/// the refinement override the base when a refinement exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveCriteria {
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    pub min_years: f32,
    pub preferred_years: f32,
    pub max_years: f32,
    pub cultural_attributes: Vec<String>,
    pub leadership_criteria: Vec<String>,
}

impl EffectiveCriteria {
    pub fn merge(base: &ScoringCriteria, refinement: Option<&CriteriaRefinement>) -> Self {
        let refined_required: Vec<String> = refinement
            .map(|r| r.required_skills.iter().map(|s| s.skill.clone()).collect())
            .unwrap_or_default();
        let refined_preferred: Vec<String> = refinement
            .map(|r| r.preferred_skills.iter().map(|s| s.skill.clone()).collect())
            .unwrap_or_default();
        let refined_cultural: Vec<String> = refinement
            .map(|r| {
                r.cultural_attributes
                    .iter()
                    .map(|a| a.attribute.clone())
                    .collect()
            })
            .unwrap_or_default();

        let (min_years, preferred_years, max_years) = match refinement {
            Some(r) => (
                r.experience_level.min_years,
                r.experience_level.min_years,
                r.experience_level.max_years,
            ),
            None => (
                base.experience_levels.minimum,
                base.experience_levels.preferred,
                base.experience_levels.maximum,
            ),
        };

        Self {
            required_skills: union_skills(&base.required_skills, &refined_required),
            preferred_skills: union_skills(&base.preferred_skills, &refined_preferred),
            min_years,
            preferred_years,
            max_years,
            cultural_attributes: union_skills(&base.cultural_criteria, &refined_cultural),
            leadership_criteria: base.leadership_criteria.clone(),
        }
    }

    /// Render the criteria as the selection lines embedded in generation
    /// prompts.
    pub fn selection_lines(&self) -> Vec<String> {
        fn list_or_none(items: &[String]) -> String {
            if items.is_empty() {
                "None specified".to_string()
            } else {
                items.join(", ")
            }
        }

        vec![
            format!("Required Skills: {}", list_or_none(&self.required_skills)),
            format!("Preferred Skills: {}", list_or_none(&self.preferred_skills)),
            format!(
                "Experience Level: {}-{} years",
                self.min_years, self.max_years
            ),
            format!(
                "Cultural Attributes: {}",
                list_or_none(&self.cultural_attributes)
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refinement_with(
        required: &[&str],
        preferred: &[&str],
        min_years: f32,
        max_years: f32,
    ) -> CriteriaRefinement {
        CriteriaRefinement {
            required_skills: required
                .iter()
                .map(|s| SkillImportance {
                    skill: s.to_string(),
                    importance: 4,
                    reason: "from feedback".into(),
                })
                .collect(),
            preferred_skills: preferred
                .iter()
                .map(|s| SkillImportance {
                    skill: s.to_string(),
                    importance: 3,
                    reason: "from feedback".into(),
                })
                .collect(),
            experience_level: ExperienceBounds {
                min_years,
                max_years,
                reason: "tightened".into(),
            },
            cultural_attributes: Vec::new(),
            adjustments: Vec::new(),
            explanation: "test".into(),
            confidence: 0.8,
        }
    }

    #[test]
    fn merge_without_refinement_uses_base_as_is() {
        let mut base = ScoringCriteria::default();
        base.required_skills = vec!["Rust".into()];
        base.experience_levels.minimum = 2.0;
        base.experience_levels.maximum = 8.0;

        let effective = EffectiveCriteria::merge(&base, None);
        assert_eq!(effective.required_skills, vec!["Rust"]);
        assert_eq!(effective.min_years, 2.0);
        assert_eq!(effective.max_years, 8.0);
    }

    #[test]
    fn merge_unions_skills_and_overrides_experience() {
        let mut base = ScoringCriteria::default();
        base.required_skills = vec!["Rust".into(), "SQL".into()];
        base.experience_levels.minimum = 1.0;
        base.experience_levels.maximum = 10.0;

        let refinement = refinement_with(&["rust", "Kubernetes"], &["gRPC"], 3.0, 7.0);
        let effective = EffectiveCriteria::merge(&base, Some(&refinement));

        // Union, de-duplicated on normalized form, base order first.
        assert_eq!(effective.required_skills, vec!["Rust", "SQL", "Kubernetes"]);
        assert_eq!(effective.preferred_skills, vec!["gRPC"]);
        assert_eq!(effective.min_years, 3.0);
        assert_eq!(effective.max_years, 7.0);
    }

    #[test]
    fn adjustment_directions_render_in_wire_form() {
        assert_eq!(AdjustmentDirection::Increased.as_ref(), "increased");
        assert_eq!(AdjustmentDirection::Decreased.as_ref(), "decreased");
        assert_eq!(AdjustmentDirection::Unchanged.as_ref(), "unchanged");
    }

    #[test]
    fn selection_lines_name_every_category() {
        let base = ScoringCriteria::default();
        let lines = EffectiveCriteria::merge(&base, None).selection_lines();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Required Skills: None specified"));
        assert!(lines[2].contains("0-0 years"));
    }
}

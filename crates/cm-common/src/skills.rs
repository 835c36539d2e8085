use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Canonical form used when comparing skills from different sources
/// (base criteria, LLM refinements, free-text feedback).
///
/// NFKC-fold first so full-width variants compare equal, then lowercase and
/// collapse internal whitespace.
pub fn normalize_skill(raw: &str) -> String {
    let folded: String = raw.nfkc().collect();
    folded
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merge two skill lists, preserving first-seen order and original casing.
/// Duplicates are detected on the normalized form.
pub fn union_skills(base: &[String], overlay: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(base.len() + overlay.len());

    for skill in base.iter().chain(overlay.iter()) {
        let key = normalize_skill(skill);
        if key.is_empty() {
            continue;
        }
        if seen.insert(key) {
            merged.push(skill.clone());
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_case_and_width_insensitive() {
        assert_eq!(normalize_skill("  Rust "), "rust");
        assert_eq!(normalize_skill("TypeScript"), normalize_skill("typescript"));
        assert_eq!(normalize_skill("Ｒｕｓｔ"), "rust");
        assert_eq!(normalize_skill("machine   learning"), "machine learning");
    }

    #[test]
    fn union_preserves_order_and_dedupes() {
        let base = vec!["Rust".to_string(), "SQL".to_string()];
        let overlay = vec![
            "rust".to_string(),
            "Kubernetes".to_string(),
            "sql".to_string(),
        ];

        let merged = union_skills(&base, &overlay);
        assert_eq!(merged, vec!["Rust", "SQL", "Kubernetes"]);
    }

    #[test]
    fn union_skips_blank_entries() {
        let base = vec!["".to_string(), "Go".to_string()];
        let merged = union_skills(&base, &["   ".to_string()]);
        assert_eq!(merged, vec!["Go"]);
    }
}

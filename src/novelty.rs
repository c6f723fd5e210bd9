//! Duplicate-suggestion suppression.
//!
//! A cheap, explainable heuristic that runs on every candidate suggestion
//! before any LLM cost is spent: same type, overlapping affected files, then
//! title comparison. No embedding comparison by design.

use anyhow::Result;
use std::collections::BTreeSet;

use crate::models::{CandidateSuggestion, PriorSuggestion};
use crate::store::SuggestionStore;

/// Title token overlap strictly above this is a duplicate. Exactly at the
/// threshold is novel.
pub const TITLE_OVERLAP_THRESHOLD: f64 = 0.70;

/// Outcome of a novelty check.
#[derive(Debug, Clone)]
pub struct NoveltyResult {
    pub is_novel: bool,
    /// The prior suggestion the candidate duplicates, when not novel.
    pub conflict: Option<PriorSuggestion>,
}

/// Check a candidate suggestion against prior suggestions of the same type
/// with overlapping affected files. Outdated priors never conflict.
pub async fn check_novelty(
    store: &dyn SuggestionStore,
    repository: &str,
    candidate: &CandidateSuggestion,
) -> Result<NoveltyResult> {
    let priors = store
        .find_prior(
            repository,
            &candidate.suggestion_type,
            &candidate.affected_files,
        )
        .await?;

    for prior in priors {
        if titles_match(&candidate.title, &prior.title) {
            return Ok(NoveltyResult {
                is_novel: false,
                conflict: Some(prior),
            });
        }
    }

    Ok(NoveltyResult {
        is_novel: true,
        conflict: None,
    })
}

fn titles_match(a: &str, b: &str) -> bool {
    let a_trimmed = a.trim().to_lowercase();
    let b_trimmed = b.trim().to_lowercase();
    if a_trimmed == b_trimmed {
        return true;
    }
    token_overlap(&a_trimmed, &b_trimmed) > TITLE_OVERLAP_THRESHOLD
}

/// Token-set overlap between two titles: `|intersection| / max(|A|, |B|)`.
/// Tokens are whitespace-split and case-folded; empty titles overlap at 0.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    let larger = tokens_a.len().max(tokens_b.len());
    if larger == 0 {
        return 0.0;
    }
    let shared = tokens_a.intersection(&tokens_b).count();
    shared as f64 / larger as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SuggestionOutcome;
    use crate::store::memory::InMemorySuggestionStore;

    fn candidate(title: &str) -> CandidateSuggestion {
        CandidateSuggestion {
            suggestion_type: "refactor".to_string(),
            title: title.to_string(),
            affected_files: vec!["src/auth.ts".to_string()],
        }
    }

    fn prior(title: &str, outcome: SuggestionOutcome) -> PriorSuggestion {
        PriorSuggestion {
            suggestion_type: "refactor".to_string(),
            title: title.to_string(),
            affected_files: vec!["src/auth.ts".to_string()],
            outcome,
        }
    }

    #[tokio::test]
    async fn no_priors_is_novel() {
        let store = InMemorySuggestionStore::new();
        let result = check_novelty(&store, "owner/repo", &candidate("Split the auth module"))
            .await
            .unwrap();
        assert!(result.is_novel);
        assert!(result.conflict.is_none());
    }

    #[tokio::test]
    async fn exact_title_is_duplicate_case_insensitive() {
        let store = InMemorySuggestionStore::new();
        store.insert(
            "owner/repo",
            prior("Split the Auth Module", SuggestionOutcome::Pending),
        );

        let result = check_novelty(&store, "owner/repo", &candidate("  split the auth module "))
            .await
            .unwrap();
        assert!(!result.is_novel);
        assert_eq!(result.conflict.unwrap().title, "Split the Auth Module");
    }

    #[tokio::test]
    async fn outdated_priors_never_conflict() {
        let store = InMemorySuggestionStore::new();
        store.insert(
            "owner/repo",
            prior("Split the auth module", SuggestionOutcome::Outdated),
        );

        let result = check_novelty(&store, "owner/repo", &candidate("Split the auth module"))
            .await
            .unwrap();
        assert!(result.is_novel);
    }

    #[tokio::test]
    async fn overlap_exactly_at_threshold_is_novel() {
        // 10 tokens each, 7 shared: overlap is exactly 0.70.
        let store = InMemorySuggestionStore::new();
        store.insert(
            "owner/repo",
            prior("a b c d e f g h i j", SuggestionOutcome::Pending),
        );

        let result = check_novelty(&store, "owner/repo", &candidate("a b c d e f g x y z"))
            .await
            .unwrap();
        assert!(result.is_novel);
    }

    #[tokio::test]
    async fn overlap_above_threshold_is_duplicate() {
        // 10 tokens each, 8 shared: overlap is 0.80.
        let store = InMemorySuggestionStore::new();
        store.insert(
            "owner/repo",
            prior("a b c d e f g h i j", SuggestionOutcome::Pending),
        );

        let result = check_novelty(&store, "owner/repo", &candidate("a b c d e f g h y z"))
            .await
            .unwrap();
        assert!(!result.is_novel);
    }

    #[test]
    fn token_overlap_boundary_values() {
        assert_eq!(token_overlap("", ""), 0.0);
        assert_eq!(token_overlap("a b", "a b"), 1.0);
        let overlap = token_overlap("a b c d e f g h i j", "a b c d e f g x y z");
        assert!((overlap - 0.70).abs() < 1e-9);
    }

    #[tokio::test]
    async fn disjoint_files_do_not_conflict() {
        let store = InMemorySuggestionStore::new();
        store.insert(
            "owner/repo",
            PriorSuggestion {
                suggestion_type: "refactor".to_string(),
                title: "Split the auth module".to_string(),
                affected_files: vec!["src/other.ts".to_string()],
                outcome: SuggestionOutcome::Pending,
            },
        );

        let result = check_novelty(&store, "owner/repo", &candidate("Split the auth module"))
            .await
            .unwrap();
        assert!(result.is_novel);
    }
}

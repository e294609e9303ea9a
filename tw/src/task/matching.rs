//! Similarity ranking and associative-match parsing
//!
//! Ranking uses a lowercase word-set Jaccard over whitespace/punctuation
//! tokens - deliberately simple, documented behaviour.

use std::collections::HashSet;

use serde_json::Value;

use crate::domain::{FailureReason, FileMatch, TaskError};

/// Minimum score for a template to appear in ranked results
pub const MATCH_THRESHOLD: f64 = 0.1;

/// Lowercase word set of a text, split on non-alphanumeric characters
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the word sets of two texts
pub fn score_similarity(a: &str, b: &str) -> f64 {
    let set_a = tokenize(a);
    let set_b = tokenize(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Parse the associative-matching reply: a JSON array of
/// `{path, relevance, score}` objects
///
/// Structural deviation inside the array is a `context_parsing_failure`;
/// non-array payloads are caught earlier by output-format validation.
pub fn parse_match_array(value: &Value) -> Result<Vec<FileMatch>, TaskError> {
    let items = value.as_array().ok_or_else(|| {
        TaskError::failure(
            FailureReason::ContextParsingFailure,
            "associative matching reply is not an array",
        )
    })?;

    let mut matches = Vec::with_capacity(items.len());
    for item in items {
        let path = item["path"].as_str().ok_or_else(|| {
            TaskError::failure(
                FailureReason::ContextParsingFailure,
                format!("match entry has no path: {}", item),
            )
        })?;
        let relevance = item["relevance"].as_str().map(str::to_string);
        let score = item["score"].as_f64().unwrap_or(0.0);

        matches.push(FileMatch {
            path: path.into(),
            relevance,
            score,
        });
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_texts_score_one() {
        assert!((score_similarity("auth login flow", "auth login flow") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disjoint_texts_score_zero() {
        assert_eq!(score_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn test_empty_text_scores_zero() {
        assert_eq!(score_similarity("", "anything"), 0.0);
        assert_eq!(score_similarity("anything", ""), 0.0);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let score = score_similarity("Edit the FILE.", "edit the file");
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_overlap() {
        // {edit, a, file} vs {edit, a, directory}: 2 shared of 4 total
        let score = score_similarity("edit a file", "edit a directory");
        assert!((score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_match_array_basic() {
        let value = serde_json::json!([
            {"path": "auth.py", "relevance": "login flow", "score": 0.9},
            {"path": "db.py", "score": 0.4}
        ]);

        let matches = parse_match_array(&value).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].path.to_str(), Some("auth.py"));
        assert_eq!(matches[0].relevance.as_deref(), Some("login flow"));
        assert!((matches[0].score - 0.9).abs() < f64::EPSILON);
        assert!(matches[1].relevance.is_none());
    }

    #[test]
    fn test_parse_match_array_missing_path() {
        let value = serde_json::json!([{"relevance": "no path", "score": 0.1}]);
        let err = parse_match_array(&value).unwrap_err();
        assert_eq!(err.reason(), Some(FailureReason::ContextParsingFailure));
    }

    #[test]
    fn test_parse_match_array_not_an_array() {
        let err = parse_match_array(&serde_json::json!({"path": "x"})).unwrap_err();
        assert_eq!(err.reason(), Some(FailureReason::ContextParsingFailure));
    }

    proptest! {
        #[test]
        fn prop_score_is_bounded(a in ".{0,80}", b in ".{0,80}") {
            let score = score_similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_score_is_symmetric(a in ".{0,80}", b in ".{0,80}") {
            let forward = score_similarity(&a, &b);
            let backward = score_similarity(&b, &a);
            prop_assert!((forward - backward).abs() < f64::EPSILON);
        }

        #[test]
        fn prop_self_similarity_is_one_for_wordy_text(text in "[a-z]{1,8}( [a-z]{1,8}){0,6}") {
            let score = score_similarity(&text, &text);
            prop_assert!((score - 1.0).abs() < f64::EPSILON);
        }
    }
}

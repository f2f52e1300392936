//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoreError, LoreResult, ValidationError};
use crate::extraction::DEFAULT_MAX_WORDS;
use crate::grouping::{LIKELY_DUPLICATE_THRESHOLD, WEAK_MATCH_THRESHOLD};
use crate::unlinked::UnlinkedNameDetector;

/// Tunable thresholds and limits for [`LoreEngine`](crate::LoreEngine).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use lorekeeper::LoreConfig;
///
/// let config = LoreConfig::from_json_str(r#"{"chunk_max_words": 800}"#)?;
/// assert_eq!(config.chunk_max_words, 800);
/// assert_eq!(config.unlinked_min_occurrences, 2);
/// # Ok::<(), lorekeeper::LoreError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoreConfig {
    /// Similarity at which two names are suggested as duplicates.
    pub likely_duplicate_threshold: f64,
    /// Similarity at which a name is offered as a possible match.
    pub weak_match_threshold: f64,
    /// Upper bound on words per extraction chunk.
    pub chunk_max_words: usize,
    /// Pause between consecutive chunk submissions, in milliseconds.
    pub extraction_pause_ms: u64,
    /// Occurrences needed before an unlinked name is reported.
    pub unlinked_min_occurrences: usize,
    /// Context snippets kept per unlinked name.
    pub snippet_count: usize,
    /// Characters of context on each side of an unlinked-name occurrence.
    pub snippet_radius: usize,
    /// Maximum fuzzy suggestions per unlinked name.
    pub suggestion_limit: usize,
}

impl Default for LoreConfig {
    fn default() -> Self {
        Self {
            likely_duplicate_threshold: LIKELY_DUPLICATE_THRESHOLD,
            weak_match_threshold: WEAK_MATCH_THRESHOLD,
            chunk_max_words: DEFAULT_MAX_WORDS,
            extraction_pause_ms: 1000,
            unlinked_min_occurrences: 2,
            snippet_count: 3,
            snippet_radius: 40,
            suggestion_limit: 3,
        }
    }
}

impl LoreConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    /// Returns a validation error if the JSON is malformed or a value is out of range.
    pub fn from_json_str(json: &str) -> LoreResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            LoreError::Validation(ValidationError::InvalidField {
                field: "config".to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(config.validate()?)
    }

    /// Checks value ranges, returning the config unchanged if they hold.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidField`] naming the first bad field.
    pub fn validate(self) -> Result<Self, ValidationError> {
        for (field, value) in [
            ("likely_duplicate_threshold", self.likely_duplicate_threshold),
            ("weak_match_threshold", self.weak_match_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("must be between 0 and 1 (got {value})")));
            }
        }

        for (field, value) in [
            ("chunk_max_words", self.chunk_max_words),
            ("unlinked_min_occurrences", self.unlinked_min_occurrences),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be at least 1".to_string()));
            }
        }

        Ok(self)
    }

    /// The pause between chunk submissions.
    #[must_use]
    pub fn extraction_pause(&self) -> Duration {
        Duration::from_millis(self.extraction_pause_ms)
    }

    /// A detector using this configuration's limits.
    #[must_use]
    pub fn unlinked_detector(&self) -> UnlinkedNameDetector {
        UnlinkedNameDetector {
            min_occurrences: self.unlinked_min_occurrences,
            max_snippets: self.snippet_count,
            snippet_radius: self.snippet_radius,
            suggestion_threshold: self.weak_match_threshold,
            max_suggestions: self.suggestion_limit,
        }
    }
}

fn invalid(field: &str, reason: String) -> ValidationError {
    ValidationError::InvalidField {
        field: field.to_string(),
        reason,
    }
}

//! Detection of proper nouns that are not linked to any known entity.
//!
//! The heuristic is deliberately simple: a capitalized token that is neither
//! a canonical name nor an alias, and that recurs. Results are a recall aid
//! for the author, not a classifier.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::entity::{Alias, NamedEntity};
use crate::error::{LoreError, LoreResult};
use crate::grouping::{best_matches, NameMatch, WEAK_MATCH_THRESHOLD};
use crate::similarity::name_key;

/// Leading characters stripped from a token before it is considered.
const LEADING_MARKS: &[char] = &['"', '\'', '(', '[', '{', '<', '“', '‘', '«', '‹'];

/// A recurring proper noun with no matching entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnlinkedName {
    /// The name as written.
    pub name: String,
    /// Occurrences across the whole corpus.
    pub count: usize,
    /// Context around the first few occurrences.
    pub snippets: Vec<String>,
    /// Existing entities the name may refer to, best first.
    pub suggestions: Vec<NameMatch>,
}

/// Scans text for unlinked proper nouns.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlinkedNameDetector {
    /// Minimum occurrences for a name to be reported.
    pub min_occurrences: usize,
    /// Snippets kept per name.
    pub max_snippets: usize,
    /// Characters of context kept on each side of an occurrence.
    pub snippet_radius: usize,
    /// Minimum similarity for a suggestion.
    pub suggestion_threshold: f64,
    /// Suggestions kept per name.
    pub max_suggestions: usize,
}

impl Default for UnlinkedNameDetector {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            max_snippets: 3,
            snippet_radius: 40,
            suggestion_threshold: WEAK_MATCH_THRESHOLD,
            max_suggestions: 3,
        }
    }
}

struct Patterns {
    token: Regex,
    proper_noun: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> LoreResult<&'static Patterns> {
    if let Some(p) = PATTERNS.get() {
        return Ok(p);
    }
    let compile = |pattern: &str| {
        Regex::new(pattern).map_err(|e| LoreError::internal(format!("invalid pattern '{pattern}': {e}")))
    };
    let compiled = Patterns {
        token: compile(r"\S+")?,
        proper_noun: compile(r"^\p{Lu}\p{Ll}")?,
    };
    Ok(PATTERNS.get_or_init(|| compiled))
}

#[derive(Default)]
struct Tally {
    count: usize,
    snippets: Vec<String>,
}

impl UnlinkedNameDetector {
    /// A detector with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds proper nouns in `texts` that match no entity name or alias.
    ///
    /// Results are ordered by descending count, then name.
    ///
    /// # Errors
    /// Only if the built-in token patterns fail to compile.
    pub fn detect(&self, entities: &[NamedEntity], aliases: &[Alias], texts: &[&str]) -> LoreResult<Vec<UnlinkedName>> {
        let patterns = patterns()?;

        let known: HashSet<String> = entities
            .iter()
            .map(|e| name_key(&e.name))
            .chain(aliases.iter().map(|a| name_key(&a.alias)))
            .collect();

        let mut tallies: HashMap<&str, Tally> = HashMap::new();
        for text in texts {
            for m in patterns.token.find_iter(text) {
                let Some((start, token)) = strip_token(m.as_str()) else {
                    continue;
                };
                if !patterns.proper_noun.is_match(token) || known.contains(&name_key(token)) {
                    continue;
                }

                let tally = tallies.entry(token).or_default();
                tally.count += 1;
                if tally.snippets.len() < self.max_snippets {
                    let from = m.start() + start;
                    tally
                        .snippets
                        .push(snippet(text, from, from + token.len(), self.snippet_radius));
                }
            }
        }

        let mut found: Vec<UnlinkedName> = tallies
            .into_iter()
            .filter(|(_, t)| t.count >= self.min_occurrences)
            .map(|(name, t)| UnlinkedName {
                name: name.to_string(),
                count: t.count,
                snippets: t.snippets,
                suggestions: best_matches(name, entities, self.suggestion_threshold, self.max_suggestions),
            })
            .collect();

        found.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        Ok(found)
    }
}

/// Strips leading quotes or brackets and trailing punctuation. Returns the
/// byte offset of what remains within `raw`.
fn strip_token(raw: &str) -> Option<(usize, &str)> {
    let lead = raw.trim_start_matches(LEADING_MARKS);
    let start = raw.len() - lead.len();
    let token = lead.trim_end_matches(|c: char| !c.is_alphanumeric());
    (!token.is_empty()).then_some((start, token))
}

/// Up to `radius` characters on each side of `text[from..to]`, whitespace
/// collapsed, with an ellipsis where the text was cut.
fn snippet(text: &str, from: usize, to: usize, radius: usize) -> String {
    let start = text[..from]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(from, |(i, _)| i);
    let end = text[to..].char_indices().nth(radius).map_or(text.len(), |(i, _)| to + i);

    let body = text[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(body.len() + 6);
    if start > 0 {
        out.push('…');
    }
    out.push_str(&body);
    if end < text.len() {
        out.push('…');
    }
    out
}

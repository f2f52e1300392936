//! Duplicate grouping and merge suggestions.
//!
//! Grouping is seed-based: the first record not yet grouped becomes a seed,
//! and every later ungrouped record that scores at or above the threshold
//! against that seed joins its group. Records are compared to the seed only,
//! never to other members, so the result depends on input order and a record
//! always lands in exactly one group.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, NamedEntity};
use crate::similarity::similarity;

/// Score at or above which two names are treated as likely duplicates.
pub const LIKELY_DUPLICATE_THRESHOLD: f64 = 0.85;

/// Score at or above which a name is offered as a possible match.
pub const WEAK_MATCH_THRESHOLD: f64 = 0.6;

/// Partitions `records` into groups of similar names, preserving input order.
///
/// Singleton groups mean "no duplicate found" and are returned as well.
///
/// # Examples
///
/// ```
/// use lorekeeper::grouping::group_by_similarity;
///
/// let names = ["Jon", "Jonathan", "Marla"];
/// let groups = group_by_similarity(&names, |n| *n, 0.35);
/// assert_eq!(groups, vec![vec![&"Jon", &"Jonathan"], vec![&"Marla"]]);
/// ```
pub fn group_by_similarity<'a, T, F>(records: &'a [T], name_of: F, threshold: f64) -> Vec<Vec<&'a T>>
where
    F: Fn(&T) -> &str,
{
    let mut processed = vec![false; records.len()];
    let mut groups = Vec::new();

    for (i, seed) in records.iter().enumerate() {
        if processed[i] {
            continue;
        }
        processed[i] = true;

        let seed_name = name_of(seed);
        let mut group = vec![seed];
        for (j, candidate) in records.iter().enumerate().skip(i + 1) {
            if processed[j] {
                continue;
            }
            if similarity(seed_name, name_of(candidate)) >= threshold {
                processed[j] = true;
                group.push(candidate);
            }
        }
        groups.push(group);
    }

    groups
}

/// Mean similarity over all unordered pairs. Fewer than two names score 1.0.
#[must_use]
pub fn average_pairwise_similarity(names: &[&str]) -> f64 {
    if names.len() < 2 {
        return 1.0;
    }

    let mut total = 0.0;
    let mut pairs = 0u32;
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            total += similarity(a, b);
            pairs += 1;
        }
    }
    total / f64::from(pairs)
}

/// A group of entities that look like the same thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSuggestion {
    /// Members in input order; the first is the seed.
    pub members: Vec<NamedEntity>,
    /// Mean similarity over every pair of members.
    pub average_similarity: f64,
}

impl MergeSuggestion {
    /// Member names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|e| e.name.as_str()).collect()
    }

    /// Member identifiers, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.members.iter().map(|e| e.id).collect()
    }
}

/// Groups of size > 1 with their average similarity, best first.
///
/// Ties are broken by larger group first, then by first member name.
#[must_use]
pub fn suggest_merges(entities: &[NamedEntity], threshold: f64) -> Vec<MergeSuggestion> {
    let mut suggestions: Vec<MergeSuggestion> = group_by_similarity(entities, |e| e.name.as_str(), threshold)
        .into_iter()
        .filter(|group| group.len() > 1)
        .map(|group| {
            let names: Vec<&str> = group.iter().map(|e| e.name.as_str()).collect();
            MergeSuggestion {
                average_similarity: average_pairwise_similarity(&names),
                members: group.into_iter().cloned().collect(),
            }
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.average_similarity
            .total_cmp(&a.average_similarity)
            .then_with(|| b.members.len().cmp(&a.members.len()))
            .then_with(|| first_name(a).cmp(first_name(b)))
    });
    suggestions
}

fn first_name(s: &MergeSuggestion) -> &str {
    s.members.first().map_or("", |e| e.name.as_str())
}

/// A candidate canonical entity for a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameMatch {
    /// The matching entity.
    pub entity_id: EntityId,
    /// Its canonical name.
    pub name: String,
    /// Similarity to the queried name.
    pub score: f64,
}

/// Candidates scoring at least `threshold` against `name`, best first, at most `limit`.
#[must_use]
pub fn best_matches(name: &str, candidates: &[NamedEntity], threshold: f64, limit: usize) -> Vec<NameMatch> {
    let mut matches: Vec<NameMatch> = candidates
        .iter()
        .filter_map(|c| {
            let score = similarity(name, &c.name);
            (score >= threshold).then(|| NameMatch {
                entity_id: c.id,
                name: c.name.clone(),
                score,
            })
        })
        .collect();

    matches.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.name.cmp(&b.name),
        other => other,
    });
    matches.truncate(limit);
    matches
}

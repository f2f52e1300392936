//! Field reconciliation policies.

use serde::{Deserialize, Serialize};

use crate::entity::NamedEntity;

/// How a descriptive field is combined when a duplicate is absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPolicy {
    /// Keep whichever non-empty value is strictly longer, counted in characters.
    LongestWins,
    /// Both values are JSON string lists; keep the ordered set union.
    Union,
    /// Append the duplicate's text after the primary's, separated by a blank line.
    Concatenate,
}

const PARAGRAPH_BREAK: &str = "\n\n";

/// Returns the replacement for `current`, or `None` to keep it.
///
/// # Examples
///
/// ```
/// use lorekeeper::merge::{reconcile, FieldPolicy};
///
/// let merged = reconcile(FieldPolicy::Union, Some(r#"["brave"]"#), Some(r#"["brave","loyal"]"#));
/// assert_eq!(merged.as_deref(), Some(r#"["brave","loyal"]"#));
///
/// assert_eq!(reconcile(FieldPolicy::LongestWins, Some("short"), Some("tall")), None);
/// assert_eq!(reconcile(FieldPolicy::LongestWins, Some("tall"), Some("short")).as_deref(), Some("short"));
/// assert_eq!(reconcile(FieldPolicy::LongestWins, Some("tall"), Some("lean")), None);
/// ```
#[must_use]
pub fn reconcile(policy: FieldPolicy, current: Option<&str>, incoming: Option<&str>) -> Option<String> {
    let incoming = incoming.filter(|v| !v.trim().is_empty())?;
    let current = current.filter(|v| !v.trim().is_empty());

    match policy {
        FieldPolicy::LongestWins => {
            let current_len = current.map_or(0, |c| c.chars().count());
            (incoming.chars().count() > current_len).then(|| incoming.to_string())
        }
        FieldPolicy::Union => union_lists(current, incoming),
        FieldPolicy::Concatenate => Some(match current {
            Some(c) => format!("{c}{PARAGRAPH_BREAK}{incoming}"),
            None => incoming.to_string(),
        }),
    }
}

fn union_lists(current: Option<&str>, incoming: &str) -> Option<String> {
    let mut merged: Vec<String> = match current {
        Some(c) => serde_json::from_str(c).ok()?,
        None => Vec::new(),
    };
    let extra: Vec<String> = serde_json::from_str(incoming).ok()?;

    let before = merged.len();
    for item in extra {
        if !merged.contains(&item) {
            merged.push(item);
        }
    }

    if merged.len() == before && current.is_some() {
        return None;
    }
    serde_json::to_string(&merged).ok()
}

/// Folds `duplicate`'s fields into `primary` in place.
///
/// Returns the names of fields whose value changed. The primary's version is
/// not touched.
pub fn absorb_fields(primary: &mut NamedEntity, duplicate: &NamedEntity) -> Vec<String> {
    let mut changed = Vec::new();
    for (field, value) in &duplicate.fields {
        let policy = primary.kind.field_policy(field);
        if let Some(next) = reconcile(policy, primary.field(field), Some(value)) {
            primary.fields.insert(field.clone(), next);
            changed.push(field.clone());
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{fields, EntityKind};

    #[test]
    fn test_longest_wins_needs_strictly_longer() {
        let ten = "0123456789";
        let fifty = "x".repeat(50);
        assert_eq!(
            reconcile(FieldPolicy::LongestWins, Some(ten), Some(&fifty)),
            Some(fifty.clone())
        );
        assert_eq!(reconcile(FieldPolicy::LongestWins, Some(&fifty), Some(ten)), None);
        assert_eq!(reconcile(FieldPolicy::LongestWins, Some("abcd"), Some("wxyz")), None);
        assert_eq!(
            reconcile(FieldPolicy::LongestWins, None, Some("anything")),
            Some("anything".to_string())
        );
        assert_eq!(reconcile(FieldPolicy::LongestWins, Some("kept"), Some("  ")), None);
    }

    #[test]
    fn test_longest_wins_counts_characters() {
        // 4 characters, 8 bytes
        let accented = "éééé";
        assert_eq!(reconcile(FieldPolicy::LongestWins, Some(accented), Some("abcde")), Some("abcde".to_string()));
    }

    #[test]
    fn test_union_preserves_first_seen_order() {
        let merged = reconcile(
            FieldPolicy::Union,
            Some(r#"["brave","stubborn"]"#),
            Some(r#"["loyal","brave"]"#),
        );
        assert_eq!(merged.as_deref(), Some(r#"["brave","stubborn","loyal"]"#));
    }

    #[test]
    fn test_union_with_absent_primary() {
        let merged = reconcile(FieldPolicy::Union, None, Some(r#"["quiet"]"#));
        assert_eq!(merged.as_deref(), Some(r#"["quiet"]"#));
    }

    #[test]
    fn test_union_keeps_primary_on_parse_failure() {
        assert_eq!(reconcile(FieldPolicy::Union, Some("brave, loyal"), Some(r#"["kind"]"#)), None);
        assert_eq!(reconcile(FieldPolicy::Union, Some(r#"["kind"]"#), Some("not json")), None);
    }

    #[test]
    fn test_union_without_new_items_is_unchanged() {
        assert_eq!(reconcile(FieldPolicy::Union, Some(r#"["a","b"]"#), Some(r#"["b"]"#)), None);
    }

    #[test]
    fn test_concatenate_joins_with_blank_line() {
        assert_eq!(
            reconcile(FieldPolicy::Concatenate, Some("Born at sea."), Some("Raised in the capital.")),
            Some("Born at sea.\n\nRaised in the capital.".to_string())
        );
        assert_eq!(
            reconcile(FieldPolicy::Concatenate, None, Some("Raised in the capital.")),
            Some("Raised in the capital.".to_string())
        );
        assert_eq!(reconcile(FieldPolicy::Concatenate, Some("Born at sea."), None), None);
    }

    #[test]
    fn test_absorb_fields_applies_per_field_policy() {
        let mut primary = NamedEntity::new(EntityKind::Character, "Elena")
            .with_field(fields::DESCRIPTION, "A sailor")
            .with_field(fields::TRAITS, r#"["brave"]"#)
            .with_field(fields::BACKSTORY, "Born at sea.");
        let duplicate = NamedEntity::new(EntityKind::Character, "Elena Marsh")
            .with_field(fields::DESCRIPTION, "A weathered sailor who charts forbidden waters")
            .with_field(fields::TRAITS, r#"["brave","loyal"]"#)
            .with_field(fields::BACKSTORY, "Exiled after the mutiny.")
            .with_field(fields::GOALS, "Find the drowned city");

        let changed = absorb_fields(&mut primary, &duplicate);

        assert_eq!(changed.len(), 4);
        assert_eq!(
            primary.field(fields::DESCRIPTION),
            Some("A weathered sailor who charts forbidden waters")
        );
        assert_eq!(primary.field(fields::TRAITS), Some(r#"["brave","loyal"]"#));
        assert_eq!(
            primary.field(fields::BACKSTORY),
            Some("Born at sea.\n\nExiled after the mutiny.")
        );
        assert_eq!(primary.field(fields::GOALS), Some("Find the drowned city"));
        assert_eq!(primary.version, 1);
    }
}

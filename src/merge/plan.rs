//! Merge plans: everything a store needs to carry out a merge.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{ConsumedEntity, MergeRecord, MergeRecordId, RepointCounts};
use crate::entity::{Alias, EntityId, EntityKind, NamedEntity};
use crate::error::ValidationError;

use super::builder::check_duplicate_set;

/// The ordered steps of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStep {
    /// Write the reconciled primary.
    PersistPrimary,
    /// Move relationships, event locations and aliases onto the primary.
    RepointReferences,
    /// Append the merge record.
    AppendAudit,
    /// Remove the consumed duplicates.
    DeleteDuplicates,
}

impl MergeStep {
    /// All steps in execution order.
    pub const ALL: [Self; 4] = [
        Self::PersistPrimary,
        Self::RepointReferences,
        Self::AppendAudit,
        Self::DeleteDuplicates,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PersistPrimary => "persist_primary",
            Self::RepointReferences => "repoint_references",
            Self::AppendAudit => "append_audit",
            Self::DeleteDuplicates => "delete_duplicates",
        }
    }
}

impl fmt::Display for MergeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully reconciled merge, ready to be applied by a store.
///
/// Plans are plain data so a durable store can log one as a single record.
/// Applying the same plan twice is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePlan {
    /// Identifier the resulting audit record will carry.
    pub record_id: MergeRecordId,

    /// Kind shared by every entity in the plan.
    pub kind: EntityKind,

    /// The primary after reconciliation, with its version already advanced.
    pub primary: NamedEntity,

    /// The primary's stored version when the plan was built.
    pub expected_version: u64,

    /// Duplicates to consume, in request order.
    pub duplicates: Vec<ConsumedEntity>,

    /// Aliases to add so the consumed names keep resolving to the primary.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_aliases: Vec<Alias>,

    /// When the plan was built; copied into the audit record.
    pub merged_at: DateTime<Utc>,
}

impl MergePlan {
    /// Duplicate identifiers, in request order.
    #[must_use]
    pub fn duplicate_ids(&self) -> Vec<EntityId> {
        self.duplicates.iter().map(|d| d.id).collect()
    }

    /// Duplicate identifiers as a set.
    #[must_use]
    pub fn duplicate_set(&self) -> HashSet<EntityId> {
        self.duplicates.iter().map(|d| d.id).collect()
    }

    /// Checks the duplicate set before any step runs.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_duplicate_set(self.primary.id, self.duplicates.iter().map(|d| d.id))
    }

    /// Builds the audit record for this plan.
    pub fn record(&self, repointed: RepointCounts) -> Result<MergeRecord, ValidationError> {
        MergeRecord::new(
            self.record_id,
            self.kind,
            self.primary.id,
            self.primary.name.clone(),
            self.duplicates.clone(),
            self.merged_at,
            repointed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_display_is_snake_case() {
        let names: Vec<String> = MergeStep::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec!["persist_primary", "repoint_references", "append_audit", "delete_duplicates"]
        );
        assert_eq!(
            serde_json::to_string(&MergeStep::AppendAudit).unwrap(),
            "\"append_audit\""
        );
    }

    #[test]
    fn test_plan_builds_validated_record() {
        let primary = NamedEntity::new(EntityKind::Location, "Greywater");
        let plan = MergePlan {
            record_id: MergeRecordId::new(),
            kind: EntityKind::Location,
            expected_version: primary.version,
            duplicates: vec![ConsumedEntity {
                id: EntityId::new(),
                name: "Graywater".to_string(),
            }],
            primary,
            new_aliases: Vec::new(),
            merged_at: Utc::now(),
        };

        let record = plan.record(RepointCounts::default()).unwrap();
        assert_eq!(record.id, plan.record_id);
        assert_eq!(record.primary_name, "Greywater");
        assert!(record.consumed_id(plan.duplicates[0].id));
    }

    #[test]
    fn test_plan_rejects_primary_among_duplicates() {
        let primary = NamedEntity::new(EntityKind::Character, "Mara");
        let plan = MergePlan {
            record_id: MergeRecordId::new(),
            kind: EntityKind::Character,
            expected_version: primary.version,
            duplicates: vec![ConsumedEntity {
                id: primary.id,
                name: "Mara".to_string(),
            }],
            primary,
            new_aliases: Vec::new(),
            merged_at: Utc::now(),
        };
        assert!(matches!(plan.validate(), Err(ValidationError::PrimaryInDuplicates { .. })));
    }
}

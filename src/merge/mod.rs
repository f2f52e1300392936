//! Canonical merges of duplicate entities.
//!
//! A merge folds one or more duplicates into a surviving primary of the same
//! kind:
//!
//! 1. [`MergeBuilder`] validates the request shape.
//! 2. [`MergeCoordinator::plan`] loads the records, reconciles field values
//!    according to each field's [`FieldPolicy`], and produces a [`MergePlan`].
//! 3. [`MergeCoordinator::apply`] hands the plan to the store, which persists
//!    the primary, repoints references, appends an audit record and deletes
//!    the duplicates.

mod builder;
mod coordinator;
mod plan;
mod policy;

pub use builder::{parse_entity_id, MergeBuilder, MergeRequest};
pub(crate) use coordinator::storage_err;
pub use coordinator::{MergeCoordinator, MergeOutcome};
pub use plan::{MergePlan, MergeStep};
pub use policy::{absorb_fields, reconcile, FieldPolicy};

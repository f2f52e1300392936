//! Storage for story data.
//!
//! [`StoryStore`] is the abstract interface. Two backends ship with the crate:
//! [`InMemoryStoryStore`] and, behind the `persistent` feature, a durable
//! store backed by a write-ahead log.

mod backend;
mod memory;
mod state;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryStoryStore;
pub use traits::{RelationshipRepoint, StorageError, StoryStore};

// Versioned store collaborator for the Vela pipeline.
//
// The committed root is immutable and shared; every mutation during a block
// happens on a `CacheArena` layered over it and is either discarded or merged
// back through `CommitStore::commit`.

pub mod cache;
pub mod commit_store;
pub mod error;
pub mod keys;

use std::collections::BTreeMap;

/// Ordered key/value map backing one committed version.
pub type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

/// Pending writes for one commit. `None` marks a deletion.
pub type Changeset = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

pub use cache::{CacheArena, LayerId};
pub use commit_store::{CommitId, CommitStore, PruningOptions};
pub use error::StoreError;
pub use keys::{prefix_end, KeyBuilder, Namespace};

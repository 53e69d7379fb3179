// COMMITTED ROOT
// Versioned key/value store with atomic commit and chained commitment hashes.
//
// SAFETY INVARIANTS:
// 1. A committed tree is never mutated; readers hold an `Arc` snapshot
// 2. Versions advance by exactly one per commit
// 3. hash(v) = sha256(hash(v-1) || v || changeset), identical on every node
//    that applies the same changesets in the same order
// 4. Persistence is write-then-rename, so a crash never leaves a torn file

use crate::error::StoreError;
use crate::{Changeset, Tree};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Height and commitment produced by a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitId {
    pub version: u64,
    pub hash: [u8; 32],
}

impl CommitId {
    pub fn genesis() -> Self {
        CommitId { version: 0, hash: [0u8; 32] }
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// How many committed versions stay queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruningOptions {
    /// 0 keeps every version.
    pub keep_recent: u64,
}

impl Default for PruningOptions {
    fn default() -> Self {
        PruningOptions { keep_recent: 100 }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedRoot {
    commit: CommitId,
    tree: Tree,
}

pub struct CommitStore {
    latest: Arc<Tree>,
    last_commit: CommitId,
    history: BTreeMap<u64, Arc<Tree>>,
    pruning: PruningOptions,
    path: Option<PathBuf>,
}

impl CommitStore {
    pub fn in_memory(pruning: PruningOptions) -> Self {
        CommitStore {
            latest: Arc::new(Tree::new()),
            last_commit: CommitId::genesis(),
            history: BTreeMap::new(),
            pruning,
            path: None,
        }
    }

    /// Opens a file-backed store, loading the last committed root if the file exists.
    pub fn open(path: impl AsRef<Path>, pruning: PruningOptions) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut store = CommitStore::in_memory(pruning);

        if path.exists() {
            let raw = fs::read(&path).map_err(|e| StoreError::Persistence(e.to_string()))?;
            let persisted: PersistedRoot =
                bincode::deserialize(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            info!(
                "Loaded committed root at version {} ({})",
                persisted.commit.version,
                persisted.commit.hash_hex()
            );
            store.last_commit = persisted.commit;
            store.latest = Arc::new(persisted.tree);
            store.history.insert(store.last_commit.version, store.latest.clone());
        }

        store.path = Some(path);
        Ok(store)
    }

    pub fn last_commit_id(&self) -> CommitId {
        self.last_commit
    }

    /// Immutable snapshot of the latest committed root.
    pub fn latest(&self) -> Arc<Tree> {
        self.latest.clone()
    }

    pub fn at_version(&self, version: u64) -> Result<Arc<Tree>, StoreError> {
        if version == self.last_commit.version {
            return Ok(self.latest.clone());
        }
        self.history
            .get(&version)
            .cloned()
            .ok_or(StoreError::VersionNotRetained(version))
    }

    /// Applies `changeset` on top of the latest root and produces the next version.
    pub fn commit(&mut self, changeset: Changeset) -> Result<CommitId, StoreError> {
        let version = self.last_commit.version + 1;

        let mut hasher = Sha256::new();
        hasher.update(self.last_commit.hash);
        hasher.update(version.to_be_bytes());

        let mut next = (*self.latest).clone();
        for (key, value) in &changeset {
            hasher.update((key.len() as u32).to_be_bytes());
            hasher.update(key);
            match value {
                Some(value) => {
                    hasher.update([1u8]);
                    hasher.update((value.len() as u32).to_be_bytes());
                    hasher.update(value);
                    next.insert(key.clone(), value.clone());
                }
                None => {
                    hasher.update([0u8]);
                    next.remove(key);
                }
            }
        }

        let commit = CommitId { version, hash: hasher.finalize().into() };
        let next = Arc::new(next);

        if let Some(path) = &self.path {
            persist(path, &commit, &next)?;
        }

        self.latest = next.clone();
        self.last_commit = commit;
        self.history.insert(version, next);
        self.prune();

        debug!(
            "Committed version {} with {} writes ({})",
            version,
            changeset.len(),
            commit.hash_hex()
        );
        Ok(commit)
    }

    fn prune(&mut self) {
        if self.pruning.keep_recent == 0 {
            return;
        }
        let version = self.last_commit.version;
        if version < self.pruning.keep_recent {
            return;
        }
        let oldest_kept = version - self.pruning.keep_recent + 1;
        self.history = self.history.split_off(&oldest_kept);
    }
}

fn persist(path: &Path, commit: &CommitId, tree: &Tree) -> Result<(), StoreError> {
    let persisted = PersistedRoot { commit: *commit, tree: tree.clone() };
    let raw = bincode::serialize(&persisted).map_err(|e| StoreError::Persistence(e.to_string()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::Persistence(e.to_string()))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, raw).map_err(|e| StoreError::Persistence(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::Persistence(e.to_string()))?;
    Ok(())
}

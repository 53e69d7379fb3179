// SNAPSHOT ARENA
// Discardable cache layers over an immutable committed root.
//
// SAFETY INVARIANTS:
// 1. The committed root is never written; all writes land in a layer
// 2. Only leaf layers (no live children) accept writes, flushes or discards
// 3. flush merges a layer into its parent exactly once; discard drops it
// 4. Reads resolve child -> parent -> ... -> root layer -> committed tree
// 5. Two arenas never share a layer; isolation between execution modes
//    comes from each mode owning its own arena

use crate::error::StoreError;
use crate::{Changeset, Tree};
use std::sync::Arc;

/// Handle to a layer inside a `CacheArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(usize);

impl LayerId {
    /// The mode-level layer every arena starts with.
    pub const ROOT: LayerId = LayerId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Layer {
    parent: Option<LayerId>,
    writes: Changeset,
    children: usize,
}

#[derive(Debug, Clone)]
pub struct CacheArena {
    base: Arc<Tree>,
    layers: Vec<Option<Layer>>,
    free: Vec<usize>,
}

impl CacheArena {
    pub fn new(base: Arc<Tree>) -> Self {
        CacheArena {
            base,
            layers: vec![Some(Layer { parent: None, writes: Changeset::new(), children: 0 })],
            free: Vec::new(),
        }
    }

    /// Opens a child layer on top of `parent`.
    pub fn branch(&mut self, parent: LayerId) -> Result<LayerId, StoreError> {
        self.layer_mut(parent)?.children += 1;
        let layer = Layer { parent: Some(parent), writes: Changeset::new(), children: 0 };

        let id = match self.free.pop() {
            Some(slot) => {
                self.layers[slot] = Some(layer);
                slot
            }
            None => {
                self.layers.push(Some(layer));
                self.layers.len() - 1
            }
        };
        Ok(LayerId(id))
    }

    pub fn get(&self, layer: LayerId, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let mut cursor = Some(layer);
        while let Some(id) = cursor {
            let current = self.layer(id)?;
            if let Some(entry) = current.writes.get(key) {
                return Ok(entry.clone());
            }
            cursor = current.parent;
        }
        Ok(self.base.get(key).cloned())
    }

    pub fn has(&self, layer: LayerId, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(layer, key)?.is_some())
    }

    pub fn set(&mut self, layer: LayerId, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.leaf_mut(layer)?.writes.insert(key, Some(value));
        Ok(())
    }

    pub fn delete(&mut self, layer: LayerId, key: &[u8]) -> Result<(), StoreError> {
        self.leaf_mut(layer)?.writes.insert(key.to_vec(), None);
        Ok(())
    }

    /// Every live entry whose key starts with `prefix`, in key order, as seen from `layer`.
    pub fn iter_prefix(
        &self,
        layer: LayerId,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut chain = Vec::new();
        let mut cursor = Some(layer);
        while let Some(id) = cursor {
            let current = self.layer(id)?;
            chain.push(current);
            cursor = current.parent;
        }

        let mut merged: Changeset = self
            .base
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();

        // Oldest ancestor first so nearer layers win.
        for current in chain.iter().rev() {
            for (k, v) in current
                .writes
                .range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
            {
                merged.insert(k.clone(), v.clone());
            }
        }

        Ok(merged.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect())
    }

    /// Writes `layer` through into its parent and releases it.
    pub fn flush(&mut self, layer: LayerId) -> Result<(), StoreError> {
        let (parent, writes) = self.release(layer)?;
        let parent = self.layer_mut(parent)?;
        parent.writes.extend(writes);
        Ok(())
    }

    /// Drops `layer` and everything written to it.
    pub fn discard(&mut self, layer: LayerId) -> Result<(), StoreError> {
        self.release(layer).map(|_| ())
    }

    pub fn is_live(&self, layer: LayerId) -> bool {
        matches!(self.layers.get(layer.0), Some(Some(_)))
    }

    /// Number of pending writes in the root layer.
    pub fn pending_writes(&self) -> usize {
        self.layers[0].as_ref().map_or(0, |l| l.writes.len())
    }

    /// Consumes the arena, returning the root layer's writes for commit.
    pub fn into_changeset(mut self) -> Result<Changeset, StoreError> {
        let root = self.layers[0].take().ok_or(StoreError::UnknownLayer(0))?;
        if root.children > 0 {
            return Err(StoreError::LayerHasChildren(0));
        }
        Ok(root.writes)
    }

    fn release(&mut self, layer: LayerId) -> Result<(LayerId, Changeset), StoreError> {
        if layer == LayerId::ROOT {
            return Err(StoreError::RootLayer);
        }
        let current = self.layer(layer)?;
        if current.children > 0 {
            return Err(StoreError::LayerHasChildren(layer.0));
        }
        let released = self.layers[layer.0].take().ok_or(StoreError::UnknownLayer(layer.0))?;
        self.free.push(layer.0);

        let parent = released.parent.ok_or(StoreError::RootLayer)?;
        self.layer_mut(parent)?.children -= 1;
        Ok((parent, released.writes))
    }

    fn layer(&self, id: LayerId) -> Result<&Layer, StoreError> {
        self.layers
            .get(id.0)
            .and_then(|l| l.as_ref())
            .ok_or(StoreError::UnknownLayer(id.0))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer, StoreError> {
        self.layers
            .get_mut(id.0)
            .and_then(|l| l.as_mut())
            .ok_or(StoreError::UnknownLayer(id.0))
    }

    fn leaf_mut(&mut self, id: LayerId) -> Result<&mut Layer, StoreError> {
        let layer = self.layer_mut(id)?;
        if layer.children > 0 {
            return Err(StoreError::LayerHasChildren(id.0));
        }
        Ok(layer)
    }
}

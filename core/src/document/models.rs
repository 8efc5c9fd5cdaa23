//! The identity and name index of a document's attached models.

use std::collections::{HashMap, HashSet};

use crate::arena::{collect_closure, ModelArena};
use crate::id::ModelId;

/// Models newly attached to and detached from the index by one update.
#[derive(Debug, Default)]
pub(crate) struct IndexDelta {
    pub(crate) attached: Vec<ModelId>,
    pub(crate) detached: Vec<ModelId>,
}

/// Attached models with the number of roots reaching each, plus the
/// bookkeeping derived from attachment.
#[derive(Debug, Default)]
pub(crate) struct DocumentModels {
    refcounts: HashMap<ModelId, usize>,
    by_name: HashMap<String, Vec<ModelId>>,
    seen: HashSet<ModelId>,
    synced: HashSet<ModelId>,
    // Instantiated from received state: only the document holds them.
    adopted: HashSet<ModelId>,
    sweep_pending: bool,
    freeze_count: usize,
    invalidated: bool,
}

impl DocumentModels {
    pub(crate) fn contains(&self, id: &ModelId) -> bool {
        self.refcounts.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.refcounts.len()
    }

    pub(crate) fn refcount(&self, id: &ModelId) -> usize {
        self.refcounts.get(id).copied().unwrap_or(0)
    }

    pub(crate) fn named(&self, name: &str) -> &[ModelId] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn seen(&self, id: &ModelId) -> bool {
        self.seen.contains(id)
    }

    pub(crate) fn synced(&self) -> &HashSet<ModelId> {
        &self.synced
    }

    pub(crate) fn mark_synced(&mut self, ids: impl IntoIterator<Item = ModelId>) {
        self.synced
            .extend(ids.into_iter().filter(|id| self.refcounts.contains_key(id)));
    }

    pub(crate) fn flush_synced(&mut self) {
        self.synced = self.refcounts.keys().cloned().collect();
    }

    // ------------------------------------------------------------------
    // Ownership of received models

    pub(crate) fn adopt(&mut self, ids: impl IntoIterator<Item = ModelId>) {
        let before = self.adopted.len();
        self.adopted.extend(ids);
        self.sweep_pending |= self.adopted.len() > before;
    }

    pub(crate) fn is_adopted(&self, id: &ModelId) -> bool {
        self.adopted.contains(id)
    }

    pub(crate) fn adopted(&self) -> impl Iterator<Item = &ModelId> {
        self.adopted.iter()
    }

    pub(crate) fn release(&mut self, id: &ModelId) {
        self.adopted.remove(id);
    }

    /// Whether received models may have become unreachable since the last
    /// sweep. Always `false` inside a freeze bracket.
    pub(crate) fn take_sweep(&mut self) -> bool {
        self.freeze_count == 0 && std::mem::take(&mut self.sweep_pending)
    }

    // ------------------------------------------------------------------
    // Freeze bracket

    pub(crate) fn push_freeze(&mut self) {
        self.freeze_count += 1;
    }

    /// Closes one bracket. Returns `true` when the outermost bracket closed
    /// with a recompute pending.
    pub(crate) fn pop_freeze(&mut self) -> bool {
        self.freeze_count = self.freeze_count.saturating_sub(1);
        self.freeze_count == 0 && std::mem::take(&mut self.invalidated)
    }

    /// Requests a recompute. Returns `true` when it must happen now.
    pub(crate) fn invalidate(&mut self) -> bool {
        if self.freeze_count > 0 {
            self.invalidated = true;
            false
        } else {
            true
        }
    }

    // ------------------------------------------------------------------
    // Index maintenance

    /// Counts one more root reaching every model of `closure`.
    pub(crate) fn add_root_closure(&mut self, arena: &ModelArena, closure: &[ModelId]) -> IndexDelta {
        let mut delta = IndexDelta::default();
        for id in closure {
            let count = self.refcounts.entry(id.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                self.index_name(arena, id);
                delta.attached.push(id.clone());
            }
        }
        delta
    }

    /// Removes a root's closure. Models still reachable from `remaining`
    /// stay indexed with one reference fewer.
    pub(crate) fn remove_root_closure(
        &mut self,
        arena: &ModelArena,
        closure: &[ModelId],
        remaining: &HashSet<ModelId>,
    ) -> IndexDelta {
        let mut delta = IndexDelta::default();
        for id in closure {
            if remaining.contains(id) {
                if let Some(count) = self.refcounts.get_mut(id) {
                    *count = count.saturating_sub(1).max(1);
                }
            } else if self.refcounts.remove(id).is_some() {
                self.forget(arena, id);
                delta.detached.push(id.clone());
            }
        }
        delta
    }

    /// Rebuilds the index from scratch as the closure of `roots`.
    pub(crate) fn recompute(&mut self, arena: &ModelArena, roots: &[ModelId]) -> IndexDelta {
        let mut counts: HashMap<ModelId, usize> = HashMap::new();
        for root in roots {
            for id in collect_closure(arena, [root]) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        let mut delta = IndexDelta::default();
        let previous = std::mem::replace(&mut self.refcounts, counts);
        for id in previous.keys() {
            if !self.refcounts.contains_key(id) {
                self.forget(arena, id);
                delta.detached.push(id.clone());
            }
        }
        // Rebuild names wholesale: renames of detached models never reach us.
        self.by_name.clear();
        let mut attached: Vec<ModelId> = self.refcounts.keys().cloned().collect();
        attached.sort();
        for id in &attached {
            self.index_name(arena, id);
            if !previous.contains_key(id) {
                delta.attached.push(id.clone());
            }
        }
        tracing::trace!(
            attached = delta.attached.len(),
            detached = delta.detached.len(),
            total = self.refcounts.len(),
            "recomputed document models"
        );
        delta
    }

    /// Detaches everything, remembering every id as seen.
    pub(crate) fn clear(&mut self) -> Vec<ModelId> {
        let ids: Vec<ModelId> = self.refcounts.drain().map(|(id, _)| id).collect();
        self.seen.extend(ids.iter().cloned());
        self.by_name.clear();
        self.synced.clear();
        self.adopted.clear();
        self.sweep_pending = false;
        self.invalidated = false;
        ids
    }

    pub(crate) fn rename(&mut self, id: &ModelId, old: Option<&str>, new: Option<&str>) {
        if !self.contains(id) {
            return;
        }
        if let Some(old) = old {
            if let Some(ids) = self.by_name.get_mut(old) {
                ids.retain(|x| x != id);
                if ids.is_empty() {
                    self.by_name.remove(old);
                }
            }
        }
        if let Some(new) = new {
            let ids = self.by_name.entry(new.to_string()).or_default();
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
    }

    fn index_name(&mut self, arena: &ModelArena, id: &ModelId) {
        let name = arena.get(id).and_then(|model| model.name());
        self.rename(id, None, name.as_deref());
    }

    fn forget(&mut self, arena: &ModelArena, id: &ModelId) {
        if let Some(name) = arena.get(id).and_then(|model| model.name()) {
            if let Some(ids) = self.by_name.get_mut(&name) {
                ids.retain(|x| x != id);
                if ids.is_empty() {
                    self.by_name.remove(&name);
                }
            }
        }
        self.synced.remove(id);
        self.seen.insert(id.clone());
        self.sweep_pending |= self.adopted.contains(id);
    }
}

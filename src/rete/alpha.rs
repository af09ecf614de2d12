//! Alpha network: constant-test indexed WME filters.
//!
//! Every condition is reduced to an [`AlphaKey`] of optional constant id,
//! attribute and value plus the acceptable flag. A WME is routed by probing
//! the eight wildcard combinations of its own fields, so matching costs eight
//! hash lookups regardless of how many conditions exist.

use std::collections::HashMap;

use indexmap::IndexSet;
use petgraph::stable_graph::NodeIndex;

use crate::memory::{Timetag, Wme};
use crate::symbol::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlphaId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlphaKey {
    pub id: Option<SymbolId>,
    pub attr: Option<SymbolId>,
    pub value: Option<SymbolId>,
    pub acceptable: bool,
}

impl AlphaKey {
    pub fn matches(&self, w: &Wme) -> bool {
        self.acceptable == w.acceptable
            && self.id.is_none_or(|id| id == w.id)
            && self.attr.is_none_or(|a| a == w.attr)
            && self.value.is_none_or(|v| v == w.value)
    }

    /// The eight keys a WME can satisfy.
    fn candidates(w: &Wme) -> impl Iterator<Item = AlphaKey> + '_ {
        (0u8..8).map(move |mask| AlphaKey {
            id: (mask & 1 != 0).then_some(w.id),
            attr: (mask & 2 != 0).then_some(w.attr),
            value: (mask & 4 != 0).then_some(w.value),
            acceptable: w.acceptable,
        })
    }
}

#[derive(Debug)]
pub struct AlphaMemory {
    pub key: AlphaKey,
    pub wmes: IndexSet<Timetag>,
    /// Join and negative nodes fed by this memory, descendants before
    /// ancestors.
    pub successors: Vec<NodeIndex>,
}

#[derive(Debug, Default)]
pub struct AlphaNetwork {
    memories: HashMap<AlphaId, AlphaMemory>,
    by_key: HashMap<AlphaKey, AlphaId>,
    next: usize,
}

impl AlphaNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memories whose key `w` satisfies.
    pub fn memories_for(&self, w: &Wme) -> Vec<AlphaId> {
        AlphaKey::candidates(w)
            .filter_map(|key| self.by_key.get(&key).copied())
            .collect()
    }

    /// Existing memory for `key`, or `None`.
    pub fn find(&self, key: &AlphaKey) -> Option<AlphaId> {
        self.by_key.get(key).copied()
    }

    /// Create an empty memory for `key`. The caller fills it.
    pub fn create(&mut self, key: AlphaKey) -> AlphaId {
        let id = AlphaId(self.next);
        self.next += 1;
        self.memories.insert(
            id,
            AlphaMemory {
                key,
                wmes: IndexSet::new(),
                successors: Vec::new(),
            },
        );
        self.by_key.insert(key, id);
        id
    }

    pub fn get(&self, id: AlphaId) -> Option<&AlphaMemory> {
        self.memories.get(&id)
    }

    pub fn get_mut(&mut self, id: AlphaId) -> Option<&mut AlphaMemory> {
        self.memories.get_mut(&id)
    }

    /// Register a new beta successor. New nodes are never ancestors of
    /// existing ones, so they go first.
    pub fn add_successor(&mut self, id: AlphaId, node: NodeIndex) {
        if let Some(mem) = self.memories.get_mut(&id) {
            mem.successors.insert(0, node);
        }
    }

    /// Unregister a beta successor. Returns the memory if that left it unused,
    /// having removed it from the network.
    pub fn remove_successor(&mut self, id: AlphaId, node: NodeIndex) -> Option<AlphaMemory> {
        let mem = self.memories.get_mut(&id)?;
        mem.successors.retain(|n| *n != node);
        if !mem.successors.is_empty() {
            return None;
        }
        let mem = self.memories.remove(&id)?;
        self.by_key.remove(&mem.key);
        Some(mem)
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AlphaId, &AlphaMemory)> {
        self.memories.iter().map(|(id, mem)| (*id, mem))
    }
}

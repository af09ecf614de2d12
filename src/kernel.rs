//! Shared state of an agent and the primitive mutations on it.
//!
//! Every WME insertion and removal goes through [`Kernel`], which keeps
//! working memory, the match network and the goal dependency sets in step.
//! Preferences are added and withdrawn here as well, so slot membership,
//! link counts and the owning instantiation's bookkeeping never drift apart.

use indexmap::{IndexMap, IndexSet};

use crate::error::HekaResult;
use crate::gds::GoalDependencySets;
use crate::instantiation::{Instantiation, InstantiationId};
use crate::memory::{SlotKey, Support, Timetag, Wme, WmeRecord, WorkingMemory};
use crate::preference::{Preference, PreferenceId, PreferenceMemory};
use crate::rete::Rete;
use crate::symbol::{SymbolId, SymbolTable};

#[derive(Debug, Default)]
pub struct Kernel {
    pub symbols: SymbolTable,
    pub memory: WorkingMemory,
    pub rete: Rete,
    pub preferences: PreferenceMemory,
    pub instantiations: IndexMap<InstantiationId, Instantiation>,
    pub gds: GoalDependencySets,
    /// Goals whose dependency set lost a WME and must be removed.
    pub doomed_goals: IndexSet<SymbolId>,
    /// Slots whose preferences changed since the decider last looked.
    pub changed_slots: IndexSet<SlotKey>,
}

impl Kernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a WME unless the same triple is already present, in which case
    /// the existing WME is returned unchanged.
    pub fn add_wme(
        &mut self,
        id: SymbolId,
        attr: SymbolId,
        value: SymbolId,
        acceptable: bool,
        support: Support,
        preference: Option<PreferenceId>,
    ) -> HekaResult<Wme> {
        if let Some(existing) = self.memory.find(id, attr, value, acceptable) {
            return Ok(existing.wme);
        }
        let w = self
            .memory
            .insert(&mut self.symbols, id, attr, value, acceptable, support, preference)?;
        self.rete.add_wme(w, &self.symbols)?;
        tracing::debug!(wme = %w.display(&self.symbols), ?support, "wme added");
        Ok(w)
    }

    /// Remove a WME. Absent timetags are a no-op. A WME tracked by a goal
    /// dependency set dooms that goal.
    pub fn remove_wme(&mut self, timetag: Timetag) -> HekaResult<Option<WmeRecord>> {
        let Some(record) = self.memory.remove(&mut self.symbols, timetag) else {
            return Ok(None);
        };
        self.rete.remove_wme(timetag, &self.symbols)?;
        tracing::debug!(wme = %record.wme.display(&self.symbols), "wme removed");
        if let Some(goal) = self.gds.on_wme_removed(timetag) {
            tracing::debug!(goal = %self.symbols.display(goal), "goal dependency set invalidated");
            self.doomed_goals.insert(goal);
        }
        Ok(Some(record))
    }

    /// Store a preference. Its `id` field is assigned here.
    pub fn add_preference(&mut self, mut preference: Preference) -> PreferenceId {
        let id = self.preferences.next_id();
        preference.id = id;
        for s in preference.linked_symbols() {
            self.symbols.add_link(s);
        }
        let key = SlotKey::new(preference.ident, preference.attr);
        let slot = self.memory.slot_or_create(key, false);
        slot.preferences.insert(id);
        slot.changed = true;
        self.changed_slots.insert(key);
        if let Some(inst) = self.instantiations.get_mut(&preference.instantiation) {
            inst.preferences.push(id);
        }
        self.preferences.insert(preference);
        id
    }

    /// Withdraw a preference. A retracted instantiation whose last
    /// preference goes is forgotten.
    pub fn remove_preference(&mut self, id: PreferenceId) -> Option<Preference> {
        let preference = self.preferences.remove(id)?;
        let key = SlotKey::new(preference.ident, preference.attr);
        if let Some(slot) = self.memory.slot_mut(key) {
            slot.preferences.shift_remove(&id);
            slot.changed = true;
        }
        self.changed_slots.insert(key);
        for s in preference.linked_symbols() {
            self.symbols.remove_link(s);
        }
        let owner = preference.instantiation;
        let spent = match self.instantiations.get_mut(&owner) {
            Some(inst) => {
                inst.preferences.retain(|p| *p != id);
                inst.retracted && inst.preferences.is_empty()
            }
            None => false,
        };
        if spent {
            self.instantiations.shift_remove(&owner);
        }
        Some(preference)
    }

    /// Live preferences of a slot, in assertion order.
    pub fn slot_preferences(&self, key: SlotKey) -> Vec<&Preference> {
        self.memory
            .slot(key)
            .map(|slot| {
                slot.preferences
                    .iter()
                    .filter_map(|id| self.preferences.get(*id))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::PreferenceType;
    use crate::production::ProductionId;

    fn kernel_with_ids() -> (Kernel, SymbolId, SymbolId, SymbolId) {
        let mut k = Kernel::new();
        let s1 = k.symbols.new_identifier('S', 1).unwrap();
        let attr = k.symbols.intern_str("color").unwrap();
        let value = k.symbols.intern_str("red").unwrap();
        (k, s1, attr, value)
    }

    #[test]
    fn duplicate_triples_return_existing_wme() {
        let (mut k, s1, attr, value) = kernel_with_ids();
        let a = k.add_wme(s1, attr, value, false, Support::Architecture, None).unwrap();
        let b = k.add_wme(s1, attr, value, false, Support::Architecture, None).unwrap();
        assert_eq!(a.timetag, b.timetag);
        assert_eq!(k.memory.len(), 1);
        assert_eq!(k.rete.stats().wmes, 1);
    }

    #[test]
    fn removing_tracked_wme_dooms_goal() {
        let (mut k, s1, attr, value) = kernel_with_ids();
        let s2 = k.symbols.new_identifier('S', 2).unwrap();
        let w = k.add_wme(s1, attr, value, false, Support::Architecture, None).unwrap();
        k.gds.create(s2);
        k.gds.add(s2, w.timetag, &k.symbols);
        k.remove_wme(w.timetag).unwrap();
        assert!(k.doomed_goals.contains(&s2));
        assert!(k.remove_wme(w.timetag).unwrap().is_none());
    }

    #[test]
    fn spent_retracted_instantiation_is_forgotten() {
        let (mut k, s1, attr, value) = kernel_with_ids();
        let inst = InstantiationId(9);
        k.instantiations.insert(
            inst,
            Instantiation {
                id: inst,
                production: ProductionId(1),
                production_name: "p".into(),
                matched: Vec::new(),
                bindings: Default::default(),
                match_goal: None,
                match_goal_level: None,
                backtrace_number: 0,
                preferences: Vec::new(),
                fired: true,
                retracted: false,
            },
        );
        let id = k.add_preference(Preference {
            id: PreferenceId(0),
            kind: PreferenceType::Acceptable,
            ident: s1,
            attr,
            value,
            referent: None,
            numeric_value: None,
            o_supported: true,
            instantiation: inst,
            goal: Some(s1),
        });
        assert_eq!(k.slot_preferences(SlotKey::new(s1, attr)).len(), 1);
        assert_eq!(k.symbols.link_count(s1), Some(1));

        k.instantiations.get_mut(&inst).unwrap().retracted = true;
        k.remove_preference(id);
        assert!(k.instantiations.is_empty());
        assert_eq!(k.symbols.link_count(s1), Some(0));
        assert!(k.changed_slots.contains(&SlotKey::new(s1, attr)));
    }
}

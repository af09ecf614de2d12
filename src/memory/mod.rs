//! Working memory: the set of live WMEs and the slots that group them.
//!
//! Working memory is the only owner of WME existence. It hands out timetags,
//! enforces triple uniqueness, keeps slot membership in step with the WME set
//! and maintains identifier link counts and levels in the symbol table. The
//! agent forwards every insertion and removal to the match network.

mod slot;
mod wme;

pub use slot::{Slot, SlotKey};
pub use wme::{Support, Timetag, Wme, WmeRecord};

use std::collections::{HashMap, VecDeque};

use indexmap::{IndexMap, IndexSet};

use crate::error::{HekaResult, InvariantViolation};
use crate::preference::PreferenceId;
use crate::symbol::{SymbolId, SymbolTable};

type TripleKey = (SymbolId, SymbolId, SymbolId, bool);

#[derive(Debug, Default)]
pub struct WorkingMemory {
    wmes: IndexMap<Timetag, WmeRecord>,
    index: HashMap<TripleKey, Timetag>,
    by_id: HashMap<SymbolId, IndexSet<Timetag>>,
    slots: IndexMap<SlotKey, Slot>,
    last_timetag: u64,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The WME with exactly this triple, if any.
    pub fn find(
        &self,
        id: SymbolId,
        attr: SymbolId,
        value: SymbolId,
        acceptable: bool,
    ) -> Option<&WmeRecord> {
        self.index
            .get(&(id, attr, value, acceptable))
            .and_then(|tt| self.wmes.get(tt))
    }

    /// Create a new WME. The caller has checked that the triple is absent.
    ///
    /// Links the id and an identifier value, and promotes the value (and
    /// everything reachable from it) to the id's level when it sits deeper.
    pub fn insert(
        &mut self,
        symbols: &mut SymbolTable,
        id: SymbolId,
        attr: SymbolId,
        value: SymbolId,
        acceptable: bool,
        support: Support,
        preference: Option<PreferenceId>,
    ) -> HekaResult<Wme> {
        self.last_timetag += 1;
        let timetag = Timetag(self.last_timetag);
        let wme = Wme {
            timetag,
            id,
            attr,
            value,
            acceptable,
        };
        if self.wmes.contains_key(&timetag) {
            return Err(InvariantViolation::DuplicateTimetag {
                timetag: timetag.0,
            }
            .into());
        }
        self.wmes.insert(
            timetag,
            WmeRecord {
                wme,
                support,
                preference,
            },
        );
        self.index.insert((id, attr, value, acceptable), timetag);
        self.by_id.entry(id).or_default().insert(timetag);

        let key = SlotKey::new(id, attr);
        let slot = self
            .slots
            .entry(key)
            .or_insert_with(|| Slot::new(key, false));
        if acceptable {
            slot.acceptable_wmes.insert(timetag);
        } else {
            slot.wmes.insert(timetag);
        }

        symbols.add_link(id);
        if symbols.is_identifier(value) {
            symbols.add_link(value);
            if let (Some(id_level), Some(value_level)) = (symbols.level(id), symbols.level(value)) {
                if value_level > id_level {
                    self.promote(symbols, value, id_level)?;
                }
            }
        }
        Ok(wme)
    }

    /// Lower `root` and every identifier reachable from it to `level`.
    fn promote(&self, symbols: &mut SymbolTable, root: SymbolId, level: u32) -> HekaResult<()> {
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            match symbols.level(current) {
                Some(l) if l > level => symbols.set_level(current, level)?,
                _ => continue,
            }
            if let Some(tts) = self.by_id.get(&current) {
                queue.extend(
                    tts.iter()
                        .filter_map(|tt| self.wmes.get(tt))
                        .map(|rec| rec.wme.value)
                        .filter(|v| symbols.is_identifier(*v)),
                );
            }
        }
        Ok(())
    }

    /// Remove a WME. Returns `None` if it is not in working memory.
    ///
    /// Empty non-context slots are left for [`WorkingMemory::collect_slot`].
    pub fn remove(&mut self, symbols: &mut SymbolTable, timetag: Timetag) -> Option<WmeRecord> {
        let record = self.wmes.shift_remove(&timetag)?;
        let w = record.wme;
        self.index.remove(&(w.id, w.attr, w.value, w.acceptable));
        if let Some(set) = self.by_id.get_mut(&w.id) {
            set.shift_remove(&timetag);
            if set.is_empty() {
                self.by_id.remove(&w.id);
            }
        }
        if let Some(slot) = self.slots.get_mut(&SlotKey::new(w.id, w.attr)) {
            slot.wmes.shift_remove(&timetag);
            slot.acceptable_wmes.shift_remove(&timetag);
            if slot.generated_acceptables.get(&w.value) == Some(&timetag) {
                slot.generated_acceptables.shift_remove(&w.value);
            }
        }
        symbols.remove_link(w.id);
        symbols.remove_link(w.value);
        Some(record)
    }

    pub fn get(&self, timetag: Timetag) -> Option<&WmeRecord> {
        self.wmes.get(&timetag)
    }

    pub fn get_mut(&mut self, timetag: Timetag) -> Option<&mut WmeRecord> {
        self.wmes.get_mut(&timetag)
    }

    /// Look up a WME another structure refers to. A miss is a bookkeeping defect.
    pub fn expect(&self, timetag: Timetag) -> HekaResult<&WmeRecord> {
        self.wmes.get(&timetag).ok_or_else(|| {
            InvariantViolation::UnknownWme {
                timetag: timetag.0,
            }
            .into()
        })
    }

    pub fn contains(&self, timetag: Timetag) -> bool {
        self.wmes.contains_key(&timetag)
    }

    /// Live WMEs in timetag order.
    pub fn iter(&self) -> impl Iterator<Item = &WmeRecord> {
        self.wmes.values()
    }

    /// Live WMEs whose id is `id`, in timetag order.
    pub fn wmes_of(&self, id: SymbolId) -> Vec<Wme> {
        self.by_id
            .get(&id)
            .map(|tts| {
                tts.iter()
                    .filter_map(|tt| self.wmes.get(tt).map(|r| r.wme))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.wmes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wmes.is_empty()
    }

    pub fn slot(&self, key: SlotKey) -> Option<&Slot> {
        self.slots.get(&key)
    }

    pub fn slot_mut(&mut self, key: SlotKey) -> Option<&mut Slot> {
        self.slots.get_mut(&key)
    }

    /// The slot for `key`, created on first reference.
    pub fn slot_or_create(&mut self, key: SlotKey, is_context: bool) -> &mut Slot {
        let slot = self
            .slots
            .entry(key)
            .or_insert_with(|| Slot::new(key, is_context));
        slot.is_context |= is_context;
        slot
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    /// Drop a non-context slot with no WMEs and no preferences.
    pub fn collect_slot(&mut self, key: SlotKey) -> bool {
        match self.slots.get(&key) {
            Some(slot) if !slot.is_context && slot.is_empty() => {
                self.slots.shift_remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Forget a context slot outright. Used when its goal is removed.
    pub fn drop_slot(&mut self, key: SlotKey) -> Option<Slot> {
        self.slots.shift_remove(&key)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn last_timetag(&self) -> Timetag {
        Timetag(self.last_timetag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        symbols: SymbolTable,
        wm: WorkingMemory,
        s1: SymbolId,
        attr: SymbolId,
        yes: SymbolId,
    }

    fn fixture() -> Fixture {
        let mut symbols = SymbolTable::new();
        let s1 = symbols.new_identifier('S', 1).unwrap();
        let attr = symbols.intern_str("done").unwrap();
        let yes = symbols.intern_str("yes").unwrap();
        Fixture {
            symbols,
            wm: WorkingMemory::new(),
            s1,
            attr,
            yes,
        }
    }

    #[test]
    fn insert_and_find() {
        let mut f = fixture();
        let w = f
            .wm
            .insert(&mut f.symbols, f.s1, f.attr, f.yes, false, Support::Architecture, None)
            .unwrap();
        assert_eq!(f.wm.find(f.s1, f.attr, f.yes, false).map(|r| r.wme), Some(w));
        assert!(f.wm.find(f.s1, f.attr, f.yes, true).is_none());
        let slot = f.wm.slot(SlotKey::new(f.s1, f.attr)).unwrap();
        assert!(slot.wmes.contains(&w.timetag));
        assert_eq!(f.symbols.link_count(f.s1), Some(1));
    }

    #[test]
    fn timetags_increase_across_removals() {
        let mut f = fixture();
        let a = f
            .wm
            .insert(&mut f.symbols, f.s1, f.attr, f.yes, false, Support::Architecture, None)
            .unwrap();
        f.wm.remove(&mut f.symbols, a.timetag).unwrap();
        let b = f
            .wm
            .insert(&mut f.symbols, f.s1, f.attr, f.yes, false, Support::Architecture, None)
            .unwrap();
        assert!(b.timetag > a.timetag);
    }

    #[test]
    fn removal_unlinks_and_empties_slot() {
        let mut f = fixture();
        let w = f
            .wm
            .insert(&mut f.symbols, f.s1, f.attr, f.yes, true, Support::Architecture, None)
            .unwrap();
        assert!(f.wm.remove(&mut f.symbols, w.timetag).is_some());
        assert!(f.wm.remove(&mut f.symbols, w.timetag).is_none());
        assert_eq!(f.symbols.link_count(f.s1), Some(0));
        let key = SlotKey::new(f.s1, f.attr);
        assert!(f.wm.collect_slot(key));
        assert!(f.wm.slot(key).is_none());
    }

    #[test]
    fn context_slots_survive_collection() {
        let mut f = fixture();
        let key = SlotKey::new(f.s1, f.attr);
        f.wm.slot_or_create(key, true);
        assert!(!f.wm.collect_slot(key));
        assert!(f.wm.drop_slot(key).is_some());
    }

    #[test]
    fn linking_promotes_deeper_identifiers() {
        let mut f = fixture();
        let deep = f.symbols.new_identifier('X', 3).unwrap();
        let deeper = f.symbols.new_identifier('Y', 4).unwrap();
        f.wm
            .insert(&mut f.symbols, deep, f.attr, deeper, false, Support::ISupported, None)
            .unwrap();
        f.wm
            .insert(&mut f.symbols, f.s1, f.attr, deep, false, Support::ISupported, None)
            .unwrap();
        assert_eq!(f.symbols.level(deep), Some(1));
        assert_eq!(f.symbols.level(deeper), Some(1));
    }
}

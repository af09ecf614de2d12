use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::decide::ImpasseType;
use crate::preference::PreferenceId;
use crate::symbol::SymbolId;

use super::Timetag;

/// The (identifier, attribute) pair a slot aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub ident: SymbolId,
    pub attr: SymbolId,
}

impl SlotKey {
    pub fn new(ident: SymbolId, attr: SymbolId) -> Self {
        Self { ident, attr }
    }
}

/// All WMEs and preferences sharing one (identifier, attribute) pair.
#[derive(Debug, Clone)]
pub struct Slot {
    pub key: SlotKey,
    /// Operator slot of a goal. Context slots are single-valued and are owned
    /// by their goal rather than collected when empty.
    pub is_context: bool,
    /// Non-acceptable WMEs.
    pub wmes: IndexSet<Timetag>,
    /// Acceptable-preference WMEs, whatever their origin.
    pub acceptable_wmes: IndexSet<Timetag>,
    /// Acceptable-preference WMEs the architecture made for candidate values.
    pub generated_acceptables: IndexMap<SymbolId, Timetag>,
    pub preferences: IndexSet<PreferenceId>,
    /// Preferences changed since the slot was last decided.
    pub changed: bool,
    /// Outstanding impasse on a non-context slot.
    pub impasse: Option<ImpasseType>,
}

impl Slot {
    pub fn new(key: SlotKey, is_context: bool) -> Self {
        Self {
            key,
            is_context,
            wmes: IndexSet::new(),
            acceptable_wmes: IndexSet::new(),
            generated_acceptables: IndexMap::new(),
            preferences: IndexSet::new(),
            changed: false,
            impasse: None,
        }
    }

    /// Nothing refers to this slot any more.
    pub fn is_empty(&self) -> bool {
        self.wmes.is_empty() && self.acceptable_wmes.is_empty() && self.preferences.is_empty()
    }
}

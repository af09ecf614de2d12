//! Preferences: typed votes about the value a slot should take.
//!
//! Preferences are produced by firing instantiations and are the only input
//! the decider reads. They live in a [`PreferenceMemory`] keyed by
//! never-reused [`PreferenceId`]s; slots refer to them by id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{HekaResult, InvariantViolation};
use crate::instantiation::InstantiationId;
use crate::symbol::SymbolId;

/// Unique, never-reused preference handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PreferenceId(pub u64);

impl std::fmt::Display for PreferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pref:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferenceType {
    Acceptable,
    Require,
    Reject,
    Prohibit,
    Reconsider,
    Better,
    Worse,
    Best,
    Worst,
    UnaryIndifferent,
    BinaryIndifferent,
    NumericIndifferent,
}

impl PreferenceType {
    /// Better, worse and binary indifferent compare value against a referent.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            PreferenceType::Better | PreferenceType::Worse | PreferenceType::BinaryIndifferent
        )
    }

    /// Whether the preference carries a referent symbol at all.
    pub fn takes_referent(self) -> bool {
        self.is_binary() || self == PreferenceType::NumericIndifferent
    }

    /// Preferences that make their value a candidate.
    pub fn is_acceptable_kind(self) -> bool {
        matches!(self, PreferenceType::Acceptable | PreferenceType::Require)
    }

    /// Short printed form, as used in traces.
    pub fn symbol(self) -> &'static str {
        match self {
            PreferenceType::Acceptable => "+",
            PreferenceType::Require => "!",
            PreferenceType::Reject => "-",
            PreferenceType::Prohibit => "~",
            PreferenceType::Reconsider => "@",
            PreferenceType::Better => ">",
            PreferenceType::Worse => "<",
            PreferenceType::Best => ">",
            PreferenceType::Worst => "<",
            PreferenceType::UnaryIndifferent => "=",
            PreferenceType::BinaryIndifferent => "=",
            PreferenceType::NumericIndifferent => "=",
        }
    }
}

impl std::fmt::Display for PreferenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PreferenceType::Acceptable => "acceptable",
            PreferenceType::Require => "require",
            PreferenceType::Reject => "reject",
            PreferenceType::Prohibit => "prohibit",
            PreferenceType::Reconsider => "reconsider",
            PreferenceType::Better => "better",
            PreferenceType::Worse => "worse",
            PreferenceType::Best => "best",
            PreferenceType::Worst => "worst",
            PreferenceType::UnaryIndifferent => "unary indifferent",
            PreferenceType::BinaryIndifferent => "binary indifferent",
            PreferenceType::NumericIndifferent => "numeric indifferent",
        };
        f.write_str(name)
    }
}

/// A preference asserted by an instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub id: PreferenceId,
    pub kind: PreferenceType,
    /// Identifier of the slot this preference targets.
    pub ident: SymbolId,
    pub attr: SymbolId,
    pub value: SymbolId,
    pub referent: Option<SymbolId>,
    /// Numeric value of a numeric-indifferent preference.
    pub numeric_value: Option<f64>,
    pub o_supported: bool,
    pub instantiation: InstantiationId,
    /// Goal whose removal withdraws this preference.
    pub goal: Option<SymbolId>,
}

impl Preference {
    /// Symbols this preference keeps alive.
    pub fn linked_symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        [Some(self.ident), Some(self.value), self.referent]
            .into_iter()
            .flatten()
    }
}

/// Arena of live preferences.
#[derive(Debug, Default)]
pub struct PreferenceMemory {
    preferences: HashMap<PreferenceId, Preference>,
    next: u64,
}

impl PreferenceMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id. Ids are never reused.
    pub fn next_id(&mut self) -> PreferenceId {
        self.next += 1;
        PreferenceId(self.next)
    }

    pub fn insert(&mut self, preference: Preference) {
        self.preferences.insert(preference.id, preference);
    }

    pub fn remove(&mut self, id: PreferenceId) -> Option<Preference> {
        self.preferences.remove(&id)
    }

    pub fn get(&self, id: PreferenceId) -> Option<&Preference> {
        self.preferences.get(&id)
    }

    /// Look up a preference a slot refers to. A miss is a bookkeeping defect.
    pub fn expect(&self, id: PreferenceId) -> HekaResult<&Preference> {
        self.preferences.get(&id).ok_or_else(|| {
            InvariantViolation::UnknownPreference { preference: id.0 }.into()
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preference> {
        self.preferences.values()
    }

    pub fn len(&self) -> usize {
        self.preferences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty()
    }
}

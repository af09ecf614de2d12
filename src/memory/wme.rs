use serde::{Deserialize, Serialize};

use crate::preference::PreferenceId;
use crate::production::Field;
use crate::symbol::{SymbolId, SymbolTable};

/// Creation stamp of a WME. Strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timetag(pub u64);

impl std::fmt::Display for Timetag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A working memory element `(id ^attr value)`, optionally an acceptable
/// preference WME `(id ^attr value +)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wme {
    pub timetag: Timetag,
    pub id: SymbolId,
    pub attr: SymbolId,
    pub value: SymbolId,
    pub acceptable: bool,
}

impl Wme {
    pub fn field(&self, field: Field) -> SymbolId {
        match field {
            Field::Id => self.id,
            Field::Attr => self.attr,
            Field::Value => self.value,
        }
    }

    /// `(12: S1 ^operator O1 +)`
    pub fn display(&self, symbols: &SymbolTable) -> String {
        format!(
            "({}: {} ^{} {}{})",
            self.timetag,
            symbols.display(self.id),
            symbols.display(self.attr),
            symbols.display(self.value),
            if self.acceptable { " +" } else { "" }
        )
    }
}

/// Why a WME exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Support {
    /// Added from outside or built by the architecture (impasse structure).
    Architecture,
    /// Held up by preferences of instantiations that still match.
    ISupported,
    /// Persists until explicitly rejected or its goal goes away.
    OSupported,
}

/// A live WME together with its support bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmeRecord {
    pub wme: Wme,
    pub support: Support,
    /// Winning preference the decider installed this WME for.
    pub preference: Option<PreferenceId>,
}

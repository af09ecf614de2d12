//! Interned symbols and the per-agent symbol table.
//!
//! Every constant and identifier that appears in working memory, in a
//! production or in a preference is a [`SymbolId`]. Interning guarantees one
//! id per value, so symbol equality is id equality everywhere in the engine.
//! Identifiers additionally carry goal/impasse flags, a goal-stack level and a
//! link count that drives reclamation.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::{HekaResult, SymbolError};

/// Level of the top goal. Substates are one deeper than their supergoal.
pub const TOP_GOAL_LEVEL: u32 = 1;

/// Unique, niche-optimized handle for an interned symbol.
///
/// Uses `NonZeroU64` so that `Option<SymbolId>` is the same size as `SymbolId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SymbolId(NonZeroU64);

impl SymbolId {
    /// Create a `SymbolId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(SymbolId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sym:{}", self.0)
    }
}

/// The value a symbol stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymbolValue {
    /// A generated identifier such as `S1` or `O12`.
    Identifier { letter: char, number: u64 },
    Integer(i64),
    Float(f64),
    String(String),
    /// Reference to a host object owned outside the engine.
    Opaque(u64),
}

impl SymbolValue {
    fn type_rank(&self) -> u8 {
        match self {
            SymbolValue::Identifier { .. } => 0,
            SymbolValue::Integer(_) => 1,
            SymbolValue::Float(_) => 2,
            SymbolValue::String(_) => 3,
            SymbolValue::Opaque(_) => 4,
        }
    }

    /// Numeric view of integer and float constants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SymbolValue::Integer(i) => Some(*i as f64),
            SymbolValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl std::fmt::Display for SymbolValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolValue::Identifier { letter, number } => write!(f, "{letter}{number}"),
            SymbolValue::Integer(i) => write!(f, "{i}"),
            SymbolValue::Float(x) => write!(f, "{x:?}"),
            SymbolValue::String(s) => write!(f, "{s}"),
            SymbolValue::Opaque(handle) => write!(f, "@{handle}"),
        }
    }
}

/// Bookkeeping attached to identifier symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierInfo {
    /// Set while the identifier is a goal (state) on the goal stack.
    pub goal: bool,
    /// Set while the identifier names an impasse structure.
    pub impasse: bool,
    /// Goal-stack depth the identifier is connected at.
    pub level: u32,
    /// Number of WMEs, preferences and productions referring to it.
    pub link_count: u32,
}

#[derive(Debug, Clone)]
struct Entry {
    value: SymbolValue,
    ident: Option<IdentifierInfo>,
}

/// Monotonic symbol id allocator.
///
/// Produces increasing ids starting from 1. Ids are never handed out twice,
/// even after the symbol they named has been reclaimed.
#[derive(Debug)]
pub struct SymbolAllocator {
    next: u64,
}

impl SymbolAllocator {
    /// Create a new allocator that starts from id 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate the next symbol id.
    pub fn next_id(&mut self) -> Result<SymbolId, SymbolError> {
        let raw = self.next;
        self.next = raw.checked_add(1).ok_or(SymbolError::Exhausted)?;
        SymbolId::new(raw).ok_or(SymbolError::Exhausted)
    }

    /// Peek at what the next id would be without allocating it.
    pub fn peek_next(&self) -> u64 {
        self.next
    }
}

impl Default for SymbolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-agent interning table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    allocator: SymbolAllocator,
    entries: HashMap<SymbolId, Entry>,
    strings: HashMap<String, SymbolId>,
    integers: HashMap<i64, SymbolId>,
    floats: HashMap<u64, SymbolId>,
    opaques: HashMap<u64, SymbolId>,
    identifiers: HashMap<(char, u64), SymbolId>,
    id_counters: HashMap<char, u64>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, value: SymbolValue, ident: Option<IdentifierInfo>) -> HekaResult<SymbolId> {
        let id = self.allocator.next_id()?;
        self.entries.insert(id, Entry { value, ident });
        Ok(id)
    }

    /// Intern a string constant.
    pub fn intern_str(&mut self, s: &str) -> HekaResult<SymbolId> {
        if let Some(&id) = self.strings.get(s) {
            return Ok(id);
        }
        let id = self.insert(SymbolValue::String(s.to_string()), None)?;
        self.strings.insert(s.to_string(), id);
        Ok(id)
    }

    /// Intern an integer constant.
    pub fn intern_int(&mut self, value: i64) -> HekaResult<SymbolId> {
        if let Some(&id) = self.integers.get(&value) {
            return Ok(id);
        }
        let id = self.insert(SymbolValue::Integer(value), None)?;
        self.integers.insert(value, id);
        Ok(id)
    }

    /// Intern a float constant. `-0.0` and `0.0` intern to the same symbol.
    pub fn intern_float(&mut self, value: f64) -> HekaResult<SymbolId> {
        let value = if value == 0.0 { 0.0 } else { value };
        let bits = value.to_bits();
        if let Some(&id) = self.floats.get(&bits) {
            return Ok(id);
        }
        let id = self.insert(SymbolValue::Float(value), None)?;
        self.floats.insert(bits, id);
        Ok(id)
    }

    /// Intern an opaque host reference.
    pub fn intern_opaque(&mut self, handle: u64) -> HekaResult<SymbolId> {
        if let Some(&id) = self.opaques.get(&handle) {
            return Ok(id);
        }
        let id = self.insert(SymbolValue::Opaque(handle), None)?;
        self.opaques.insert(handle, id);
        Ok(id)
    }

    /// Intern an arbitrary value. Identifier values must already exist.
    pub fn intern(&mut self, value: &SymbolValue) -> HekaResult<SymbolId> {
        match value {
            SymbolValue::Identifier { letter, number } => self
                .find_identifier(*letter, *number)
                .ok_or_else(|| {
                    SymbolError::NotAnIdentifier {
                        symbol: value.to_string(),
                    }
                    .into()
                }),
            SymbolValue::Integer(i) => self.intern_int(*i),
            SymbolValue::Float(f) => self.intern_float(*f),
            SymbolValue::String(s) => self.intern_str(s),
            SymbolValue::Opaque(h) => self.intern_opaque(*h),
        }
    }

    /// Generate a fresh identifier. Numbering is per letter, starting at 1.
    pub fn new_identifier(&mut self, letter: char, level: u32) -> HekaResult<SymbolId> {
        let letter = if letter.is_ascii_alphabetic() {
            letter.to_ascii_uppercase()
        } else {
            'I'
        };
        let counter = self.id_counters.entry(letter).or_insert(0);
        *counter += 1;
        let number = *counter;
        let id = self.insert(
            SymbolValue::Identifier { letter, number },
            Some(IdentifierInfo {
                goal: false,
                impasse: false,
                level,
                link_count: 0,
            }),
        )?;
        self.identifiers.insert((letter, number), id);
        Ok(id)
    }

    /// Look up an existing identifier by its printed name parts.
    pub fn find_identifier(&self, letter: char, number: u64) -> Option<SymbolId> {
        self.identifiers
            .get(&(letter.to_ascii_uppercase(), number))
            .copied()
    }

    /// Look up an interned string without creating it.
    pub fn find_str(&self, s: &str) -> Option<SymbolId> {
        self.strings.get(s).copied()
    }

    /// Look up a symbol's value.
    pub fn get(&self, id: SymbolId) -> Option<&SymbolValue> {
        self.entries.get(&id).map(|e| &e.value)
    }

    /// Look up a symbol's value, failing for unknown ids.
    pub fn value(&self, id: SymbolId) -> HekaResult<&SymbolValue> {
        self.get(id)
            .ok_or_else(|| SymbolError::Unknown { symbol: id.get() }.into())
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn is_identifier(&self, id: SymbolId) -> bool {
        self.identifier(id).is_some()
    }

    /// Identifier bookkeeping, or `None` for constants and unknown ids.
    pub fn identifier(&self, id: SymbolId) -> Option<&IdentifierInfo> {
        self.entries.get(&id).and_then(|e| e.ident.as_ref())
    }

    fn identifier_mut(&mut self, id: SymbolId) -> HekaResult<&mut IdentifierInfo> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(SymbolError::Unknown { symbol: id.get() })?;
        let printed = entry.value.to_string();
        entry
            .ident
            .as_mut()
            .ok_or_else(|| SymbolError::NotAnIdentifier { symbol: printed }.into())
    }

    pub fn level(&self, id: SymbolId) -> Option<u32> {
        self.identifier(id).map(|i| i.level)
    }

    pub fn set_level(&mut self, id: SymbolId, level: u32) -> HekaResult<()> {
        self.identifier_mut(id)?.level = level;
        Ok(())
    }

    pub fn is_goal(&self, id: SymbolId) -> bool {
        self.identifier(id).is_some_and(|i| i.goal)
    }

    pub fn set_goal(&mut self, id: SymbolId, goal: bool) -> HekaResult<()> {
        self.identifier_mut(id)?.goal = goal;
        Ok(())
    }

    pub fn set_impasse(&mut self, id: SymbolId, impasse: bool) -> HekaResult<()> {
        self.identifier_mut(id)?.impasse = impasse;
        Ok(())
    }

    /// Record one more reference to `id`. Constants are not counted.
    pub fn add_link(&mut self, id: SymbolId) {
        if let Some(info) = self.entries.get_mut(&id).and_then(|e| e.ident.as_mut()) {
            info.link_count += 1;
        }
    }

    /// Drop one reference to `id`.
    pub fn remove_link(&mut self, id: SymbolId) {
        if let Some(info) = self.entries.get_mut(&id).and_then(|e| e.ident.as_mut()) {
            info.link_count = info.link_count.saturating_sub(1);
        }
    }

    pub fn link_count(&self, id: SymbolId) -> Option<u32> {
        self.identifier(id).map(|i| i.link_count)
    }

    /// Release every identifier that nothing links to and that is neither a
    /// goal nor an impasse. Returns the reclaimed ids.
    pub fn reclaim(&mut self) -> Vec<SymbolId> {
        let mut reclaimed: Vec<SymbolId> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                e.ident
                    .is_some_and(|i| i.link_count == 0 && !i.goal && !i.impasse)
            })
            .map(|(&id, _)| id)
            .collect();
        reclaimed.sort();
        for id in &reclaimed {
            if let Some(Entry {
                value: SymbolValue::Identifier { letter, number },
                ..
            }) = self.entries.remove(id)
            {
                self.identifiers.remove(&(letter, number));
            }
        }
        if !reclaimed.is_empty() {
            tracing::debug!(count = reclaimed.len(), "reclaimed identifiers");
        }
        reclaimed
    }

    /// Printable form of a symbol, `sym:N` for unknown ids.
    pub fn display(&self, id: SymbolId) -> String {
        match self.get(id) {
            Some(value) => value.to_string(),
            None => id.to_string(),
        }
    }

    pub fn as_f64(&self, id: SymbolId) -> Option<f64> {
        self.get(id).and_then(SymbolValue::as_f64)
    }

    pub fn as_i64(&self, id: SymbolId) -> Option<i64> {
        match self.get(id) {
            Some(SymbolValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Ordering used by relational tests: numbers compare numerically
    /// (integers against floats included), strings lexically and identifiers
    /// by letter then number. Anything else is incomparable.
    pub fn compare(&self, a: SymbolId, b: SymbolId) -> Option<Ordering> {
        let (va, vb) = (self.get(a)?, self.get(b)?);
        match (va, vb) {
            (SymbolValue::Integer(x), SymbolValue::Integer(y)) => Some(x.cmp(y)),
            (SymbolValue::String(x), SymbolValue::String(y)) => Some(x.cmp(y)),
            (
                SymbolValue::Identifier { letter: la, number: na },
                SymbolValue::Identifier { letter: lb, number: nb },
            ) => Some((la, na).cmp(&(lb, nb))),
            _ => match (va.as_f64(), vb.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Whether both symbols are of the same kind (identifier, integer, ...).
    pub fn same_type(&self, a: SymbolId, b: SymbolId) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(x), Some(y)) => x.type_rank() == y.type_rank(),
            _ => false,
        }
    }

    /// Total number of live symbols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Preference semantics: from the preferences of one slot to its winners.
//!
//! This is a pure function of the preferences. Choosing among mutually
//! indifferent candidates is left to the caller's selection policy.

use serde::{Deserialize, Serialize};

use crate::preference::{Preference, PreferenceType};
use crate::symbol::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpasseType {
    None,
    ConstraintFailure,
    Conflict,
    Tie,
    NoChange,
}

impl ImpasseType {
    /// Value of the `^impasse` attribute on a substate.
    pub fn name(self) -> &'static str {
        match self {
            ImpasseType::None => "none",
            ImpasseType::ConstraintFailure => "constraint-failure",
            ImpasseType::Conflict => "conflict",
            ImpasseType::Tie => "tie",
            ImpasseType::NoChange => "no-change",
        }
    }

    /// Value of the `^choices` attribute on a substate.
    pub fn choices(self) -> &'static str {
        match self {
            ImpasseType::Tie | ImpasseType::Conflict | ImpasseType::ConstraintFailure => "multiple",
            ImpasseType::None | ImpasseType::NoChange => "none",
        }
    }
}

impl std::fmt::Display for ImpasseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of running preference semantics on a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Semantics {
    pub impasse: ImpasseType,
    /// Winners when `impasse` is `None`, otherwise the impasse items.
    pub candidates: Vec<SymbolId>,
    /// The candidates are mutually indifferent and one must be selected.
    pub indifferent: bool,
}

impl Semantics {
    fn done(candidates: Vec<SymbolId>) -> Self {
        Self {
            impasse: ImpasseType::None,
            candidates,
            indifferent: false,
        }
    }

    fn impasse(impasse: ImpasseType, candidates: Vec<SymbolId>) -> Self {
        Self {
            impasse,
            candidates,
            indifferent: false,
        }
    }
}

fn of_kind<'a>(prefs: &'a [&'a Preference], kind: PreferenceType) -> impl Iterator<Item = &'a Preference> + 'a {
    prefs.iter().copied().filter(move |p| p.kind == kind)
}

fn push_unique(out: &mut Vec<SymbolId>, value: SymbolId) {
    if !out.contains(&value) {
        out.push(value);
    }
}

/// Decide a slot from its preferences.
///
/// Non-context slots stop after acceptables, prohibits and rejects: every
/// surviving value is a winner. Context slots go on through better/worse,
/// best, worst and indifference. With `consistency` set, a mutually
/// indifferent set is returned whole instead of being flagged for selection.
pub fn run_preference_semantics(prefs: &[&Preference], is_context: bool, consistency: bool) -> Semantics {
    if prefs.is_empty() {
        return Semantics::done(Vec::new());
    }

    let prohibited: Vec<SymbolId> = of_kind(prefs, PreferenceType::Prohibit).map(|p| p.value).collect();

    // Requires
    let mut required = Vec::new();
    for p in of_kind(prefs, PreferenceType::Require) {
        push_unique(&mut required, p.value);
    }
    if !required.is_empty() {
        if required.len() > 1 || prohibited.contains(&required[0]) {
            return Semantics::impasse(ImpasseType::ConstraintFailure, required);
        }
        return Semantics::done(required);
    }

    // Acceptables, prohibits, rejects
    let rejected: Vec<SymbolId> = of_kind(prefs, PreferenceType::Reject).map(|p| p.value).collect();
    let mut candidates = Vec::new();
    for p in of_kind(prefs, PreferenceType::Acceptable) {
        if !prohibited.contains(&p.value) && !rejected.contains(&p.value) {
            push_unique(&mut candidates, p.value);
        }
    }
    if !is_context || candidates.len() <= 1 {
        return Semantics::done(candidates);
    }

    // Better/worse
    let mut dominated: Vec<SymbolId> = Vec::new();
    for p in prefs {
        let (superior, inferior) = match (p.kind, p.referent) {
            (PreferenceType::Better, Some(r)) => (p.value, r),
            (PreferenceType::Worse, Some(r)) => (r, p.value),
            _ => continue,
        };
        if superior != inferior && candidates.contains(&superior) && candidates.contains(&inferior) {
            push_unique(&mut dominated, inferior);
        }
    }
    if !dominated.is_empty() {
        if candidates.iter().all(|c| dominated.contains(c)) {
            let conflicted = candidates.into_iter().filter(|c| dominated.contains(c)).collect();
            return Semantics::impasse(ImpasseType::Conflict, conflicted);
        }
        candidates.retain(|c| !dominated.contains(c));
    }
    if candidates.len() <= 1 {
        return Semantics::done(candidates);
    }

    // Bests
    let best: Vec<SymbolId> = of_kind(prefs, PreferenceType::Best).map(|p| p.value).collect();
    if candidates.iter().any(|c| best.contains(c)) {
        candidates.retain(|c| best.contains(c));
    }
    if candidates.len() <= 1 {
        return Semantics::done(candidates);
    }

    // Worsts
    let worst: Vec<SymbolId> = of_kind(prefs, PreferenceType::Worst).map(|p| p.value).collect();
    if candidates.iter().any(|c| !worst.contains(c)) {
        candidates.retain(|c| !worst.contains(c));
    }
    if candidates.len() <= 1 {
        return Semantics::done(candidates);
    }

    // Indifferents
    let unary: Vec<SymbolId> = prefs
        .iter()
        .filter(|p| {
            matches!(
                p.kind,
                PreferenceType::UnaryIndifferent | PreferenceType::NumericIndifferent
            )
        })
        .map(|p| p.value)
        .collect();
    let binary_between = |a: SymbolId, b: SymbolId| {
        of_kind(prefs, PreferenceType::BinaryIndifferent)
            .any(|p| (p.value == a && p.referent == Some(b)) || (p.value == b && p.referent == Some(a)))
    };
    let all_indifferent = candidates.iter().all(|&c| {
        unary.contains(&c) || candidates.iter().all(|&other| other == c || binary_between(c, other))
    });

    if all_indifferent {
        return Semantics {
            impasse: ImpasseType::None,
            candidates,
            indifferent: !consistency,
        };
    }
    Semantics::impasse(ImpasseType::Tie, candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instantiation::InstantiationId;
    use crate::preference::PreferenceId;

    fn sym(id: u64) -> SymbolId {
        SymbolId::new(id).unwrap()
    }

    const S: u64 = 1;
    const OP: u64 = 2;

    fn pref(kind: PreferenceType, value: u64, referent: Option<u64>) -> Preference {
        Preference {
            id: PreferenceId(0),
            kind,
            ident: sym(S),
            attr: sym(OP),
            value: sym(value),
            referent: referent.map(sym),
            numeric_value: None,
            o_supported: false,
            instantiation: InstantiationId(1),
            goal: None,
        }
    }

    fn run(prefs: &[Preference]) -> Semantics {
        let refs: Vec<&Preference> = prefs.iter().collect();
        run_preference_semantics(&refs, true, false)
    }

    use PreferenceType::*;

    #[test]
    fn single_acceptable_wins() {
        let out = run(&[pref(Acceptable, 10, None)]);
        assert_eq!(out, Semantics::done(vec![sym(10)]));
    }

    #[test]
    fn two_acceptables_tie() {
        let out = run(&[pref(Acceptable, 10, None), pref(Acceptable, 11, None)]);
        assert_eq!(out.impasse, ImpasseType::Tie);
        assert_eq!(out.candidates, vec![sym(10), sym(11)]);
    }

    #[test]
    fn better_resolves_tie() {
        let out = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(Better, 10, Some(11)),
        ]);
        assert_eq!(out, Semantics::done(vec![sym(10)]));
    }

    #[test]
    fn worse_is_mirror_of_better() {
        let out = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(Worse, 10, Some(11)),
        ]);
        assert_eq!(out, Semantics::done(vec![sym(11)]));
    }

    #[test]
    fn mutual_dominance_is_a_conflict() {
        let out = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(Better, 10, Some(11)),
            pref(Better, 11, Some(10)),
        ]);
        assert_eq!(out.impasse, ImpasseType::Conflict);
        assert_eq!(out.candidates, vec![sym(10), sym(11)]);
    }

    #[test]
    fn requires_and_prohibits() {
        let two = run(&[pref(Require, 10, None), pref(Require, 11, None)]);
        assert_eq!(two.impasse, ImpasseType::ConstraintFailure);
        let prohibited = run(&[pref(Require, 10, None), pref(Prohibit, 10, None)]);
        assert_eq!(prohibited.impasse, ImpasseType::ConstraintFailure);
        let one = run(&[pref(Require, 10, None), pref(Acceptable, 11, None)]);
        assert_eq!(one, Semantics::done(vec![sym(10)]));
    }

    #[test]
    fn reject_removes_candidate() {
        let out = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(Reject, 11, None),
        ]);
        assert_eq!(out, Semantics::done(vec![sym(10)]));
        let none = run(&[pref(Acceptable, 10, None), pref(Reject, 10, None)]);
        assert_eq!(none, Semantics::done(Vec::new()));
    }

    #[test]
    fn best_and_worst_narrow() {
        let best = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(Acceptable, 12, None),
            pref(Best, 12, None),
        ]);
        assert_eq!(best, Semantics::done(vec![sym(12)]));

        let worst = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(Worst, 10, None),
        ]);
        assert_eq!(worst, Semantics::done(vec![sym(11)]));

        let all_worst = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(Worst, 10, None),
            pref(Worst, 11, None),
        ]);
        assert_eq!(all_worst.impasse, ImpasseType::Tie);
    }

    #[test]
    fn indifference_needs_selection() {
        let unary = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(UnaryIndifferent, 10, None),
            pref(UnaryIndifferent, 11, None),
        ]);
        assert_eq!(unary.impasse, ImpasseType::None);
        assert!(unary.indifferent);
        assert_eq!(unary.candidates.len(), 2);

        let binary = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(BinaryIndifferent, 10, Some(11)),
        ]);
        assert!(binary.indifferent);

        let partial = run(&[
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(Acceptable, 12, None),
            pref(BinaryIndifferent, 10, Some(11)),
        ]);
        assert_eq!(partial.impasse, ImpasseType::Tie);
    }

    #[test]
    fn consistency_mode_returns_indifferent_set() {
        let prefs = [
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(UnaryIndifferent, 10, None),
            pref(UnaryIndifferent, 11, None),
        ];
        let refs: Vec<&Preference> = prefs.iter().collect();
        let out = run_preference_semantics(&refs, true, true);
        assert!(!out.indifferent);
        assert_eq!(out.candidates.len(), 2);
    }

    #[test]
    fn non_context_slots_keep_every_value() {
        let prefs = [
            pref(Acceptable, 10, None),
            pref(Acceptable, 11, None),
            pref(Better, 10, Some(11)),
        ];
        let refs: Vec<&Preference> = prefs.iter().collect();
        let out = run_preference_semantics(&refs, false, false);
        assert_eq!(out, Semantics::done(vec![sym(10), sym(11)]));
    }
}

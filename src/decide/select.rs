//! Indifferent selection: picking one of several equally acceptable operators.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{NumericCombination, SelectionPolicy};
use crate::preference::{Preference, PreferenceType};
use crate::symbol::SymbolId;

#[derive(Debug)]
pub struct Selector {
    policy: SelectionPolicy,
    combination: NumericCombination,
    rng: StdRng,
}

impl Selector {
    /// `seed` makes every random choice reproducible; without one the RNG is
    /// seeded from OS entropy.
    pub fn new(policy: SelectionPolicy, combination: NumericCombination, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            policy,
            combination,
            rng,
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Combined numeric-indifferent value of `candidate`, or `None` if no
    /// numeric preference names it.
    pub fn value_of(&self, candidate: SymbolId, prefs: &[&Preference]) -> Option<f64> {
        let values: Vec<f64> = prefs
            .iter()
            .filter(|p| p.kind == PreferenceType::NumericIndifferent && p.value == candidate)
            .filter_map(|p| p.numeric_value)
            .collect();
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().sum();
        Some(match self.combination {
            NumericCombination::Sum => sum,
            NumericCombination::Avg => sum / values.len() as f64,
        })
    }

    /// Pick one candidate. `None` only for an empty candidate list.
    pub fn choose(&mut self, candidates: &[SymbolId], prefs: &[&Preference]) -> Option<SymbolId> {
        if candidates.len() <= 1 {
            return candidates.first().copied();
        }
        let chosen = match self.policy {
            SelectionPolicy::First => candidates[0],
            SelectionPolicy::Uniform => self.uniform(candidates),
            SelectionPolicy::Weighted => {
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|c| self.value_of(*c, prefs).unwrap_or(0.0).max(0.0))
                    .collect();
                let total: f64 = weights.iter().sum();
                if total <= 0.0 || !total.is_finite() {
                    self.uniform(candidates)
                } else {
                    let mut pick = self.rng.gen_range(0.0..total);
                    let mut chosen = candidates[candidates.len() - 1];
                    for (c, w) in candidates.iter().zip(&weights) {
                        if pick < *w {
                            chosen = *c;
                            break;
                        }
                        pick -= w;
                    }
                    chosen
                }
            }
            SelectionPolicy::EpsilonGreedy { epsilon } => {
                if self.rng.gen_bool(epsilon.clamp(0.0, 1.0)) {
                    self.uniform(candidates)
                } else {
                    self.greedy(candidates, prefs)
                }
            }
        };
        tracing::debug!(policy = ?self.policy, candidates = candidates.len(), "indifferent selection");
        Some(chosen)
    }

    fn uniform(&mut self, candidates: &[SymbolId]) -> SymbolId {
        candidates[self.rng.gen_range(0..candidates.len())]
    }

    /// Highest value; earlier candidates win ties.
    fn greedy(&self, candidates: &[SymbolId], prefs: &[&Preference]) -> SymbolId {
        let mut best = candidates[0];
        let mut best_value = self.value_of(best, prefs).unwrap_or(0.0);
        for &c in &candidates[1..] {
            let v = self.value_of(c, prefs).unwrap_or(0.0);
            if v > best_value {
                best = c;
                best_value = v;
            }
        }
        best
    }
}

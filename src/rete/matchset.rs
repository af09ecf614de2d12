//! Pending changes to the set of complete matches.

use indexmap::IndexMap;

use crate::production::ProductionId;

use super::token::TokenId;

/// Assertions and retractions produced since the last drain.
///
/// A match that appears and disappears between two drains never surfaces.
#[derive(Debug, Default)]
pub struct MatchSet {
    assertions: IndexMap<TokenId, ProductionId>,
    retractions: IndexMap<TokenId, ProductionId>,
}

impl MatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert(&mut self, token: TokenId, production: ProductionId) {
        self.assertions.insert(token, production);
    }

    pub fn retract(&mut self, token: TokenId, production: ProductionId) {
        if self.assertions.shift_remove(&token).is_none() {
            self.retractions.insert(token, production);
        }
    }

    /// Take everything pending: retractions first, then assertions, each in
    /// the order they were posted.
    pub fn drain(&mut self) -> (Vec<(TokenId, ProductionId)>, Vec<(TokenId, ProductionId)>) {
        (
            self.retractions.drain(..).collect(),
            self.assertions.drain(..).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.assertions.len() + self.retractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty() && self.retractions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_match_cancels() {
        let mut ms = MatchSet::new();
        ms.assert(TokenId(1), ProductionId(1));
        ms.retract(TokenId(1), ProductionId(1));
        assert!(ms.is_empty());
    }

    #[test]
    fn drain_orders_retractions_first() {
        let mut ms = MatchSet::new();
        ms.assert(TokenId(2), ProductionId(1));
        ms.retract(TokenId(1), ProductionId(1));
        ms.assert(TokenId(3), ProductionId(2));
        let (retracted, asserted) = ms.drain();
        assert_eq!(retracted, vec![(TokenId(1), ProductionId(1))]);
        assert_eq!(asserted, vec![(TokenId(2), ProductionId(1)), (TokenId(3), ProductionId(2))]);
        assert!(ms.is_empty());
    }
}

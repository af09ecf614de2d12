//! Incremental matching must agree with matching from scratch.
//!
//! A random sequence of WME additions and removals, interleaved with
//! productions being added and excised, is applied to one network. The final
//! match set is compared against a fresh network that sees only the
//! surviving productions and WMEs.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use heka::memory::{Timetag, Wme};
use heka::production::{Condition, Operand, Production, ProductionId, Relation, Test};
use heka::rete::Rete;
use heka::symbol::{SymbolId, SymbolTable};

const PRODUCTIONS: usize = 8;

struct Universe {
    symbols: SymbolTable,
    ids: Vec<SymbolId>,
    attrs: Vec<SymbolId>,
    values: Vec<SymbolId>,
}

impl Universe {
    fn new() -> Self {
        let mut symbols = SymbolTable::new();
        let ids: Vec<SymbolId> = (0..3).map(|_| symbols.new_identifier('X', 1).unwrap()).collect();
        let attrs = ["a", "b"].map(|a| symbols.intern_str(a).unwrap()).to_vec();
        let mut values = ids.clone();
        values.push(symbols.intern_str("c1").unwrap());
        values.push(symbols.intern_int(1).unwrap());
        values.push(symbols.intern_int(5).unwrap());
        Self {
            symbols,
            ids,
            attrs,
            values,
        }
    }

    /// Most rules open with `(x ^a y)` so their prefixes are shared.
    fn productions(&mut self) -> Vec<Production> {
        let (a, b) = (self.attrs[0], self.attrs[1]);
        let c1 = self.symbols.intern_str("c1").unwrap();
        let three = self.symbols.intern_int(3).unwrap();
        let pos = |id: &str, attr, value| Condition::positive(Test::var(id), Test::constant(attr), value);
        let back_link = || {
            Condition::ncc(vec![
                pos("y", b, Test::var("z")),
                pos("z", a, Test::var("x")),
            ])
        };
        vec![
            Production::new("join")
                .when(pos("x", a, Test::var("y")))
                .when(pos("y", b, Test::constant(c1))),
            Production::new("join3")
                .when(pos("x", a, Test::var("y")))
                .when(pos("y", b, Test::var("z")))
                .when(pos("z", a, Test::Blank)),
            Production::new("negation")
                .when(pos("x", a, Test::var("y")))
                .when(Condition::negative(Test::var("y"), Test::constant(b), Test::Blank)),
            Production::new("conjunctive-negation")
                .when(pos("x", a, Test::var("y")))
                .when(back_link()),
            Production::new("negation-and-conjunctive-negation")
                .when(pos("x", a, Test::var("y")))
                .when(Condition::negative(Test::var("y"), Test::constant(b), Test::Blank))
                .when(back_link()),
            Production::new("relational").when(pos(
                "x",
                b,
                Test::Relational {
                    relation: Relation::Greater,
                    operand: Operand::Constant(three),
                },
            )),
            Production::new("self-loop").when(pos("x", a, Test::var("x"))),
            Production::new("acceptable")
                .when(pos("x", a, Test::var("y")).acceptable())
                .when(pos("y", b, Test::Blank)),
        ]
    }
}

#[derive(Debug, Clone)]
enum Op {
    Wme {
        add: bool,
        id: usize,
        attr: usize,
        value: usize,
        acceptable: bool,
    },
    /// Add the production if absent, excise it if present.
    Toggle(usize),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        4 => (any::<bool>(), 0..3usize, 0..2usize, 0..6usize, any::<bool>()).prop_map(
            |(add, id, attr, value, acceptable)| Op::Wme {
                add,
                id,
                attr,
                value,
                acceptable,
            }
        ),
        1 => (0..PRODUCTIONS).prop_map(Op::Toggle),
    ];
    prop::collection::vec(op, 0..60)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn incremental_matches_equal_batch_matches(
        initial in prop::collection::vec(any::<bool>(), PRODUCTIONS),
        ops in ops(),
    ) {
        let mut u = Universe::new();
        let productions = u.productions();

        let mut rete = Rete::new();
        let mut present = BTreeSet::new();
        for (i, p) in productions.iter().enumerate() {
            if initial[i] {
                rete.add_production(ProductionId(i as u64), p, &u.symbols).unwrap();
                present.insert(i);
            }
        }

        let mut live: BTreeMap<(usize, usize, usize, bool), Timetag> = BTreeMap::new();
        let mut next = 0u64;
        for op in ops {
            match op {
                Op::Wme { add, id, attr, value, acceptable } => {
                    let key = (id, attr, value, acceptable);
                    match (add, live.get(&key).copied()) {
                        (true, None) => {
                            next += 1;
                            let w = Wme {
                                timetag: Timetag(next),
                                id: u.ids[id],
                                attr: u.attrs[attr],
                                value: u.values[value],
                                acceptable,
                            };
                            rete.add_wme(w, &u.symbols).unwrap();
                            live.insert(key, w.timetag);
                        }
                        (false, Some(tt)) => {
                            rete.remove_wme(tt, &u.symbols).unwrap();
                            live.remove(&key);
                        }
                        _ => {}
                    }
                }
                Op::Toggle(i) => {
                    let pid = ProductionId(i as u64);
                    if present.remove(&i) {
                        prop_assert!(rete.remove_production(pid, &u.symbols).unwrap());
                    } else {
                        rete.add_production(pid, &productions[i], &u.symbols).unwrap();
                        present.insert(i);
                    }
                }
            }
            rete.drain().unwrap();
        }

        let mut batch = Rete::new();
        for &i in &present {
            batch.add_production(ProductionId(i as u64), &productions[i], &u.symbols).unwrap();
        }
        let mut survivors: Vec<_> = live.iter().map(|(k, tt)| (*tt, *k)).collect();
        survivors.sort();
        for (tt, (id, attr, value, acceptable)) in survivors {
            let w = Wme {
                timetag: tt,
                id: u.ids[id],
                attr: u.attrs[attr],
                value: u.values[value],
                acceptable,
            };
            batch.add_wme(w, &u.symbols).unwrap();
        }

        prop_assert_eq!(rete.matches(), batch.matches());
        prop_assert_eq!(rete.stats().beta_nodes, batch.stats().beta_nodes);

        // Excising every production collapses the network to its root.
        for &i in &present {
            rete.remove_production(ProductionId(i as u64), &u.symbols).unwrap();
        }
        rete.drain().unwrap();
        let stats = rete.stats();
        prop_assert_eq!(stats.beta_nodes, 1);
        prop_assert_eq!(stats.alpha_memories, 0);
        prop_assert_eq!(stats.productions, 0);
        prop_assert!(rete.matches().is_empty());
    }
}

use super::*;
use crate::production::{Condition, Operand, Production, Relation, Test, Variable};
use crate::symbol::SymbolId;

struct Fixture {
    symbols: SymbolTable,
    rete: Rete,
    next: u64,
}

impl Fixture {
    fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            rete: Rete::new(),
            next: 0,
        }
    }

    fn s(&mut self, name: &str) -> SymbolId {
        self.symbols.intern_str(name).unwrap()
    }

    fn int(&mut self, v: i64) -> SymbolId {
        self.symbols.intern_int(v).unwrap()
    }

    fn add(&mut self, id: SymbolId, attr: SymbolId, value: SymbolId) -> Timetag {
        self.next += 1;
        let w = Wme {
            timetag: Timetag(self.next),
            id,
            attr,
            value,
            acceptable: false,
        };
        self.rete.add_wme(w, &self.symbols).unwrap();
        w.timetag
    }

    fn remove(&mut self, tt: Timetag) {
        self.rete.remove_wme(tt, &self.symbols).unwrap();
    }

    fn produce(&mut self, id: u64, p: &Production) {
        self.rete.add_production(ProductionId(id), p, &self.symbols).unwrap();
    }

    fn drain(&mut self) -> (usize, usize) {
        let changes = self.rete.drain().unwrap();
        let asserted = changes.iter().filter(|c| matches!(c, MatchSetEvent::Assert(_))).count();
        (changes.len() - asserted, asserted)
    }
}

fn cond(id: &str, attr: SymbolId, value: Test) -> Condition {
    Condition::positive(Test::var(id), Test::constant(attr), value)
}

#[test]
fn two_condition_join_binds_variables() {
    let mut f = Fixture::new();
    let (color, size, red, big) = (f.s("color"), f.s("size"), f.s("red"), f.s("big"));
    let b1 = f.s("b1");
    let p = Production::new("red-and-big")
        .when(cond("b", color, Test::constant(red)))
        .when(cond("b", size, Test::var("z")));
    f.produce(1, &p);

    let t1 = f.add(b1, color, red);
    assert!(f.rete.matches().is_empty());
    let t2 = f.add(b1, size, big);

    let changes = f.rete.drain().unwrap();
    assert_eq!(changes.len(), 1);
    let MatchSetEvent::Assert(m) = &changes[0] else {
        panic!("expected assertion");
    };
    assert_eq!(m.production, ProductionId(1));
    assert_eq!(m.wmes.iter().map(|w| w.timetag).collect::<Vec<_>>(), vec![t1, t2]);
    assert_eq!(m.bindings.get(&Variable::new("b")), Some(&b1));
    assert_eq!(m.bindings.get(&Variable::new("z")), Some(&big));
}

#[test]
fn join_rejects_inconsistent_bindings() {
    let mut f = Fixture::new();
    let (color, size, red, big) = (f.s("color"), f.s("size"), f.s("red"), f.s("big"));
    let (b1, b2) = (f.s("b1"), f.s("b2"));
    let p = Production::new("same-block")
        .when(cond("b", color, Test::constant(red)))
        .when(cond("b", size, Test::constant(big)));
    f.produce(1, &p);
    f.add(b1, color, red);
    f.add(b2, size, big);
    assert!(f.rete.matches().is_empty());
}

#[test]
fn productions_added_late_see_existing_wmes() {
    let mut f = Fixture::new();
    let (on, a, b, c) = (f.s("on"), f.s("a"), f.s("b"), f.s("c"));
    f.add(a, on, b);
    f.add(b, on, c);
    let p = Production::new("stack")
        .when(cond("x", on, Test::var("y")))
        .when(cond("y", on, Test::var("z")));
    f.produce(1, &p);
    assert_eq!(f.rete.matches().len(), 1);
    assert_eq!(f.drain(), (0, 1));
}

#[test]
fn removing_a_wme_retracts_matches() {
    let mut f = Fixture::new();
    let (on, a, b) = (f.s("on"), f.s("a"), f.s("b"));
    let p = Production::new("on").when(cond("x", on, Test::var("y")));
    f.produce(1, &p);
    let t = f.add(a, on, b);
    assert_eq!(f.drain(), (0, 1));
    f.remove(t);
    assert_eq!(f.drain(), (1, 0));
    assert!(f.rete.matches().is_empty());
    assert_eq!(f.rete.stats().wmes, 0);
}

#[test]
fn transient_match_never_surfaces() {
    let mut f = Fixture::new();
    let (on, a, b) = (f.s("on"), f.s("a"), f.s("b"));
    let p = Production::new("on").when(cond("x", on, Test::var("y")));
    f.produce(1, &p);
    let t = f.add(a, on, b);
    f.remove(t);
    assert_eq!(f.drain(), (0, 0));
}

#[test]
fn negative_condition_blocks_and_releases() {
    let mut f = Fixture::new();
    let (block, clear_of, b1, b2) = (f.s("block"), f.s("under"), f.s("b1"), f.s("b2"));
    let yes = f.s("yes");
    let p = Production::new("clear")
        .when(cond("b", block, Test::constant(yes)))
        .when(Condition::negative(Test::Blank, Test::constant(clear_of), Test::var("b")));
    f.produce(1, &p);
    f.add(b1, block, yes);
    assert_eq!(f.drain(), (0, 1));

    let cover = f.add(b2, clear_of, b1);
    assert_eq!(f.drain(), (1, 0));
    let cover2 = f.add(b1, clear_of, b1);
    assert_eq!(f.drain(), (0, 0));

    f.remove(cover);
    assert_eq!(f.drain(), (0, 0));
    f.remove(cover2);
    assert_eq!(f.drain(), (0, 1));
}

fn ncc_production(f: &mut Fixture) -> Production {
    let (goal, item, color, red) = (f.s("goal"), f.s("item"), f.s("color"), f.s("red"));
    Production::new("no-red-item")
        .when(cond("s", goal, Test::var("g")))
        .when(Condition::ncc(vec![
            cond("s", item, Test::var("i")),
            cond("i", color, Test::constant(red)),
        ]))
}

#[test]
fn conjunctive_negation_tracks_subnetwork() {
    let mut f = Fixture::new();
    let p = ncc_production(&mut f);
    f.produce(1, &p);
    let (s1, goal, g, item, color, red, blue, i1) = (
        f.s("s1"),
        f.s("goal"),
        f.s("g"),
        f.s("item"),
        f.s("color"),
        f.s("red"),
        f.s("blue"),
        f.s("i1"),
    );
    f.add(s1, goal, g);
    assert_eq!(f.drain(), (0, 1));

    f.add(s1, item, i1);
    let blue_tt = f.add(i1, color, blue);
    assert_eq!(f.drain(), (0, 0));
    let red_tt = f.add(i1, color, red);
    assert_eq!(f.drain(), (1, 0));

    f.remove(blue_tt);
    assert_eq!(f.drain(), (0, 0));
    f.remove(red_tt);
    assert_eq!(f.drain(), (0, 1));
}

#[test]
fn conjunctive_negation_is_order_independent() {
    let build = |production_first: bool| {
        let mut f = Fixture::new();
        let p = ncc_production(&mut f);
        if production_first {
            f.produce(1, &p);
        }
        let (s1, s2, goal, g, item, color, red, i1) = (
            f.s("s1"),
            f.s("s2"),
            f.s("goal"),
            f.s("g"),
            f.s("item"),
            f.s("color"),
            f.s("red"),
            f.s("i1"),
        );
        f.add(s1, item, i1);
        f.add(i1, color, red);
        f.add(s1, goal, g);
        f.add(s2, goal, g);
        if !production_first {
            f.produce(1, &p);
        }
        f.rete.matches()
    };
    let early = build(true);
    let late = build(false);
    assert_eq!(early, late);
    assert_eq!(early.len(), 1);
}

#[test]
fn shared_prefixes_reuse_nodes() {
    let mut f = Fixture::new();
    let (a, b, c) = (f.s("a"), f.s("b"), f.s("c"));
    let p1 = Production::new("p1")
        .when(cond("x", a, Test::var("y")))
        .when(cond("y", b, Test::var("z")));
    let p2 = Production::new("p2")
        .when(cond("x", a, Test::var("y")))
        .when(cond("y", b, Test::var("z")))
        .when(cond("z", c, Test::Blank));
    f.produce(1, &p1);
    let after_one = f.rete.stats();
    f.produce(2, &p2);
    let after_two = f.rete.stats();
    // p2 adds a memory, a join and its production node.
    assert_eq!(after_two.beta_nodes - after_one.beta_nodes, 3);
    assert_eq!(after_two.alpha_memories, 3);
}

#[test]
fn identical_conjunctive_negations_share_nodes() {
    let mut f = Fixture::new();
    let p = ncc_production(&mut f);
    let (s1, goal, g, item, color, red, i1) = (
        f.s("s1"),
        f.s("goal"),
        f.s("g"),
        f.s("item"),
        f.s("color"),
        f.s("red"),
        f.s("i1"),
    );
    f.add(s1, goal, g);
    f.produce(1, &p);
    let after_one = f.rete.stats();
    f.produce(2, &p);
    let after_two = f.rete.stats();
    // Only the second production node is new.
    assert_eq!(after_two.beta_nodes - after_one.beta_nodes, 1);
    assert_eq!(f.drain(), (0, 2));

    f.add(s1, item, i1);
    let red_tt = f.add(i1, color, red);
    assert_eq!(f.drain(), (2, 0));

    f.rete.remove_production(ProductionId(1), &f.symbols).unwrap();
    assert_eq!(f.rete.stats().beta_nodes, after_one.beta_nodes);
    f.remove(red_tt);
    assert_eq!(f.drain(), (0, 1));
    assert_eq!(f.rete.matches().len(), 1);
}

#[test]
fn remove_production_prunes_and_retracts() {
    let mut f = Fixture::new();
    let (a, b, x, y) = (f.s("a"), f.s("b"), f.s("x"), f.s("y"));
    let p1 = Production::new("p1").when(cond("x", a, Test::var("y")));
    let p2 = Production::new("p2")
        .when(cond("x", a, Test::var("y")))
        .when(cond("y", b, Test::Blank));
    f.produce(1, &p1);
    let baseline = f.rete.stats();
    f.produce(2, &p2);
    f.add(x, a, y);
    f.add(y, b, x);
    assert_eq!(f.drain(), (0, 2));

    assert!(f.rete.remove_production(ProductionId(2), &f.symbols).unwrap());
    assert_eq!(f.drain(), (1, 0));
    let after = f.rete.stats();
    assert_eq!(after.beta_nodes, baseline.beta_nodes);
    assert_eq!(after.alpha_memories, baseline.alpha_memories);
    assert_eq!(f.rete.matches().len(), 1);
    assert!(!f.rete.remove_production(ProductionId(2), &f.symbols).unwrap());
}

#[test]
fn removing_everything_leaves_only_the_root() {
    let mut f = Fixture::new();
    let p = ncc_production(&mut f);
    f.produce(1, &p);
    let (s1, goal, g) = (f.s("s1"), f.s("goal"), f.s("g"));
    f.add(s1, goal, g);
    f.rete.remove_production(ProductionId(1), &f.symbols).unwrap();
    let stats = f.rete.stats();
    assert_eq!(stats.beta_nodes, 1);
    assert_eq!(stats.alpha_memories, 0);
    assert_eq!(stats.tokens, 1);
}

#[test]
fn relational_and_disjunction_tests() {
    let mut f = Fixture::new();
    let (count, kind, s1) = (f.s("count"), f.s("kind"), f.s("s1"));
    let (cat, dog, fish) = (f.s("cat"), f.s("dog"), f.s("fish"));
    let (three, seven) = (f.int(3), f.int(7));
    let p = Production::new("big-pet")
        .when(cond(
            "s",
            count,
            Test::Conjunctive(vec![
                Test::var("n"),
                Test::relation(Relation::Greater, Operand::Constant(three)),
            ]),
        ))
        .when(cond("s", kind, Test::Disjunction(vec![cat, dog])));
    f.produce(1, &p);
    f.add(s1, count, three);
    f.add(s1, kind, fish);
    assert!(f.rete.matches().is_empty());
    f.add(s1, count, seven);
    assert!(f.rete.matches().is_empty());
    f.add(s1, kind, dog);
    assert_eq!(f.rete.matches().len(), 1);
}

#[test]
fn relational_against_earlier_binding() {
    let mut f = Fixture::new();
    let (low, high, s1) = (f.s("low"), f.s("high"), f.s("s1"));
    let (two, five) = (f.int(2), f.int(5));
    let p = Production::new("ordered")
        .when(cond("s", low, Test::var("l")))
        .when(cond(
            "s",
            high,
            Test::relation(Relation::Greater, Operand::Variable(Variable::new("l"))),
        ));
    f.produce(1, &p);
    f.add(s1, low, five);
    f.add(s1, high, two);
    assert!(f.rete.matches().is_empty());
    f.add(s1, low, two);
    f.add(s1, high, five);
    assert_eq!(f.rete.matches().len(), 1);
}

#[test]
fn acceptable_wmes_match_only_acceptable_conditions() {
    let mut f = Fixture::new();
    let (operator, s1, o1) = (f.s("operator"), f.s("s1"), f.s("o1"));
    let p = Production::new("proposed").when(cond("s", operator, Test::var("o")).acceptable());
    f.produce(1, &p);
    f.add(s1, operator, o1);
    assert!(f.rete.matches().is_empty());
    f.next += 1;
    let w = Wme {
        timetag: Timetag(f.next),
        id: s1,
        attr: operator,
        value: o1,
        acceptable: true,
    };
    f.rete.add_wme(w, &f.symbols).unwrap();
    assert_eq!(f.rete.matches().len(), 1);
}

#[test]
fn failed_compile_leaves_network_untouched() {
    let mut f = Fixture::new();
    let a = f.s("a");
    let before = f.rete.stats();
    let p = Production::new("bad").when(cond(
        "x",
        a,
        Test::relation(Relation::Less, Operand::Variable(Variable::new("nowhere"))),
    ));
    assert!(f.rete.add_production(ProductionId(1), &p, &f.symbols).is_err());
    assert_eq!(f.rete.stats(), before);
}

#[test]
fn duplicate_timetag_is_rejected() {
    let mut f = Fixture::new();
    let (a, b) = (f.s("a"), f.s("b"));
    let t = f.add(a, a, b);
    let w = Wme {
        timetag: t,
        id: a,
        attr: a,
        value: b,
        acceptable: false,
    };
    assert!(f.rete.add_wme(w, &f.symbols).is_err());
}

#[test]
fn dot_output_names_productions() {
    let mut f = Fixture::new();
    let a = f.s("a");
    let p = Production::new("p").when(cond("x", a, Test::Blank));
    f.produce(4, &p);
    let dot = f.rete.to_dot(&f.symbols);
    assert!(dot.starts_with("digraph rete"));
    assert!(dot.contains("prod:4"));
    assert!(dot.contains("style=dashed"));
}

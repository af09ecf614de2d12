//! Left-hand side representation: tests and conditions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::symbol::SymbolId;

/// A production variable, written `<name>` when printed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable(pub String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// One of the three fields of a WME.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Id,
    Attr,
    Value,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Id, Field::Attr, Field::Value];
}

/// Relations usable in relational tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    SameType,
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Relation::Equal => "=",
            Relation::NotEqual => "<>",
            Relation::Less => "<",
            Relation::LessOrEqual => "<=",
            Relation::Greater => ">",
            Relation::GreaterOrEqual => ">=",
            Relation::SameType => "<=>",
        };
        f.write_str(s)
    }
}

/// Right-hand operand of an equality or relational test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Constant(SymbolId),
    Variable(Variable),
}

/// A test on a single WME field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Test {
    /// Matches any symbol.
    Blank,
    /// The field equals a constant, or binds/compares a variable.
    Equality(Operand),
    Relational { relation: Relation, operand: Operand },
    /// The field is one of the listed constants.
    Disjunction(Vec<SymbolId>),
    /// Every sub-test must hold.
    Conjunctive(Vec<Test>),
}

impl Test {
    pub fn var(name: &str) -> Self {
        Test::Equality(Operand::Variable(Variable::new(name)))
    }

    pub fn constant(symbol: SymbolId) -> Self {
        Test::Equality(Operand::Constant(symbol))
    }

    pub fn relation(relation: Relation, operand: Operand) -> Self {
        Test::Relational { relation, operand }
    }

    /// Variables this test binds through equality.
    pub fn bound_variables(&self, out: &mut BTreeSet<Variable>) {
        match self {
            Test::Equality(Operand::Variable(v)) => {
                out.insert(v.clone());
            }
            Test::Conjunctive(tests) => tests.iter().for_each(|t| t.bound_variables(out)),
            _ => {}
        }
    }

    /// Every variable mentioned by this test.
    pub fn variables(&self, out: &mut BTreeSet<Variable>) {
        match self {
            Test::Equality(Operand::Variable(v))
            | Test::Relational {
                operand: Operand::Variable(v),
                ..
            } => {
                out.insert(v.clone());
            }
            Test::Conjunctive(tests) => tests.iter().for_each(|t| t.variables(out)),
            _ => {}
        }
    }

    /// Constant symbols mentioned by this test.
    pub fn constants(&self, out: &mut Vec<SymbolId>) {
        match self {
            Test::Equality(Operand::Constant(c))
            | Test::Relational {
                operand: Operand::Constant(c),
                ..
            } => out.push(*c),
            Test::Disjunction(cs) => out.extend(cs.iter().copied()),
            Test::Conjunctive(tests) => tests.iter().for_each(|t| t.constants(out)),
            _ => {}
        }
    }
}

/// The three field tests of a single condition element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Test,
    pub attr: Test,
    pub value: Test,
    /// Match only acceptable-preference WMEs (`+`).
    pub acceptable: bool,
}

impl Pattern {
    pub fn new(id: Test, attr: Test, value: Test) -> Self {
        Self {
            id,
            attr,
            value,
            acceptable: false,
        }
    }

    pub fn test(&self, field: Field) -> &Test {
        match field {
            Field::Id => &self.id,
            Field::Attr => &self.attr,
            Field::Value => &self.value,
        }
    }
}

/// A left-hand side condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Positive(Pattern),
    Negative(Pattern),
    /// Matches when the conjunction of subconditions has no match.
    ConjunctiveNegation(Vec<Condition>),
}

impl Condition {
    /// Positive condition `(id ^attr value)`.
    pub fn positive(id: Test, attr: Test, value: Test) -> Self {
        Condition::Positive(Pattern::new(id, attr, value))
    }

    /// Negative condition `-(id ^attr value)`.
    pub fn negative(id: Test, attr: Test, value: Test) -> Self {
        Condition::Negative(Pattern::new(id, attr, value))
    }

    pub fn ncc(subconditions: Vec<Condition>) -> Self {
        Condition::ConjunctiveNegation(subconditions)
    }

    /// Turn a positive or negative condition into one that tests
    /// acceptable-preference WMEs.
    pub fn acceptable(mut self) -> Self {
        match &mut self {
            Condition::Positive(p) | Condition::Negative(p) => p.acceptable = true,
            Condition::ConjunctiveNegation(_) => {}
        }
        self
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Condition::Positive(_))
    }

    /// Every variable mentioned anywhere in the condition.
    pub fn variables(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<Variable>) {
        match self {
            Condition::Positive(p) | Condition::Negative(p) => {
                Field::ALL.iter().for_each(|f| p.test(*f).variables(out))
            }
            Condition::ConjunctiveNegation(subs) => {
                subs.iter().for_each(|c| c.collect_variables(out))
            }
        }
    }

    /// Variables a positive condition binds. Empty for negations.
    pub fn bound_variables(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        if let Condition::Positive(p) = self {
            Field::ALL
                .iter()
                .for_each(|f| p.test(*f).bound_variables(&mut out));
        }
        out
    }

    pub fn constants(&self, out: &mut Vec<SymbolId>) {
        match self {
            Condition::Positive(p) | Condition::Negative(p) => {
                Field::ALL.iter().for_each(|f| p.test(*f).constants(out))
            }
            Condition::ConjunctiveNegation(subs) => subs.iter().for_each(|c| c.constants(out)),
        }
    }
}

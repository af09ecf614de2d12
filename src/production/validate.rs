//! Compile-time checks and condition ordering.

use std::collections::BTreeSet;

use crate::error::CompileError;

use super::{Action, Condition, Field, Operand, Pattern, Production, Test, Variable};

/// Reject malformed productions before they reach the match network.
///
/// `is_function` answers whether an RHS function name is registered.
pub fn validate(production: &Production, is_function: impl Fn(&str) -> bool) -> Result<(), CompileError> {
    let name = production.name.as_str();
    if name.trim().is_empty() {
        return Err(CompileError::EmptyName);
    }
    if !production.conditions.iter().any(Condition::is_positive) {
        return Err(CompileError::NoPositiveConditions {
            production: name.to_string(),
        });
    }

    check_conditions(name, &production.conditions, &BTreeSet::new())?;

    for action in &production.actions {
        let (_, functions) = action.references();
        if let Some(unknown) = functions.iter().find(|f| !is_function(f)) {
            return Err(CompileError::UnknownFunction {
                production: name.to_string(),
                name: unknown.clone(),
            });
        }
        if let Action::Make(make) = action {
            let preference = make.preference;
            match (preference.takes_referent(), make.referent.is_some()) {
                (true, false) => {
                    return Err(CompileError::MissingReferent {
                        production: name.to_string(),
                        preference: preference.to_string(),
                    });
                }
                (false, true) => {
                    return Err(CompileError::UnexpectedReferent {
                        production: name.to_string(),
                        preference: preference.to_string(),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn check_conditions(
    production: &str,
    conditions: &[Condition],
    outer: &BTreeSet<Variable>,
) -> Result<(), CompileError> {
    let mut bound = outer.clone();
    for condition in reorder(conditions) {
        match condition {
            Condition::Positive(pattern) | Condition::Negative(pattern) => {
                check_pattern(production, pattern, &bound)?;
                bound.extend(condition.bound_variables());
            }
            Condition::ConjunctiveNegation(subs) => {
                if subs.is_empty() {
                    return Err(CompileError::EmptyConjunctiveNegation {
                        production: production.to_string(),
                    });
                }
                check_conditions(production, subs, &bound)?;
            }
        }
    }
    Ok(())
}

fn check_pattern(
    production: &str,
    pattern: &Pattern,
    bound: &BTreeSet<Variable>,
) -> Result<(), CompileError> {
    let mut local = bound.clone();
    for field in Field::ALL {
        pattern.test(field).bound_variables(&mut local);
    }
    for field in Field::ALL {
        check_test(production, pattern.test(field), &local)?;
    }
    Ok(())
}

fn check_test(production: &str, test: &Test, bound: &BTreeSet<Variable>) -> Result<(), CompileError> {
    match test {
        Test::Relational {
            operand: Operand::Variable(v),
            ..
        } if !bound.contains(v) => Err(CompileError::UnboundVariable {
            production: production.to_string(),
            variable: v.name().to_string(),
        }),
        Test::Disjunction(constants) if constants.is_empty() => Err(CompileError::EmptyDisjunction {
            production: production.to_string(),
        }),
        Test::Conjunctive(tests) => tests
            .iter()
            .try_for_each(|t| check_test(production, t, bound)),
        _ => Ok(()),
    }
}

/// Order conditions for compilation.
///
/// Positive conditions keep their relative order. Each negation moves down to
/// the first point where every variable it shares with the positive
/// conditions has been bound, so a variable in a negation always refers to
/// the positive binding wherever that binding is written.
pub(crate) fn reorder(conditions: &[Condition]) -> Vec<&Condition> {
    let positives: Vec<&Condition> = conditions.iter().filter(|c| c.is_positive()).collect();

    let mut prefix = vec![BTreeSet::new()];
    for p in &positives {
        let mut next = prefix[prefix.len() - 1].clone();
        next.extend(p.bound_variables());
        prefix.push(next);
    }
    let all_bound = prefix[positives.len()].clone();

    let mut placed: Vec<Vec<&Condition>> = vec![Vec::new(); positives.len() + 1];
    let mut seen = 0;
    for condition in conditions {
        if condition.is_positive() {
            seen += 1;
            continue;
        }
        let needed: BTreeSet<Variable> = condition
            .variables()
            .intersection(&all_bound)
            .cloned()
            .collect();
        let slot = (seen..=positives.len())
            .find(|&s| needed.is_subset(&prefix[s]))
            .unwrap_or(positives.len());
        placed[slot].push(condition);
    }

    let mut out = Vec::with_capacity(conditions.len());
    for (slot, negations) in placed.into_iter().enumerate() {
        out.extend(negations);
        if let Some(p) = positives.get(slot) {
            out.push(*p);
        }
    }
    out
}

//! Rich diagnostic error types for the heka engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! so a rejected production or a broken internal invariant arrives at the caller
//! with an error code and help text. Impasses are not errors: they are decision
//! outcomes and never show up here.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the heka engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum HekaError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rhs(#[from] RhsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Agent(#[from] AgentError),
}

// ---------------------------------------------------------------------------
// Symbol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SymbolError {
    #[error("unknown symbol: {symbol}")]
    #[diagnostic(
        code(heka::symbol::unknown),
        help(
            "The symbol id is not registered in this agent's symbol table. \
             Symbols are per-agent; an id from another agent, or an identifier \
             that has already been reclaimed, cannot be used here."
        )
    )]
    Unknown { symbol: u64 },

    #[error("symbol {symbol} is not an identifier")]
    #[diagnostic(
        code(heka::symbol::not_identifier),
        help("Only identifiers carry goal flags, levels and link counts.")
    )]
    NotAnIdentifier { symbol: String },

    #[error("symbol id space exhausted")]
    #[diagnostic(
        code(heka::symbol::exhausted),
        help("The agent allocated every available symbol id. Create a fresh agent.")
    )]
    Exhausted,
}

// ---------------------------------------------------------------------------
// Compile errors
// ---------------------------------------------------------------------------

/// A production was rejected before it touched the match network.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error("production has an empty name")]
    #[diagnostic(
        code(heka::compile::empty_name),
        help("Give every production a unique, non-empty name.")
    )]
    EmptyName,

    #[error("production \"{production}\" has no positive conditions")]
    #[diagnostic(
        code(heka::compile::no_positive_conditions),
        help(
            "A production must test at least one WME positively before any \
             negated condition can be evaluated."
        )
    )]
    NoPositiveConditions { production: String },

    #[error("production \"{production}\": variable <{variable}> is tested before it is bound")]
    #[diagnostic(
        code(heka::compile::unbound_variable),
        help(
            "Relational tests and tests inside negations may only refer to variables \
             bound by an equality test in an earlier positive condition or in the \
             same condition."
        )
    )]
    UnboundVariable { production: String, variable: String },

    #[error("production \"{production}\" has an empty disjunction test")]
    #[diagnostic(
        code(heka::compile::empty_disjunction),
        help("A disjunction must list at least one constant.")
    )]
    EmptyDisjunction { production: String },

    #[error("production \"{production}\" has an empty conjunctive negation")]
    #[diagnostic(
        code(heka::compile::empty_negation),
        help("A conjunctive negation must contain at least one condition.")
    )]
    EmptyConjunctiveNegation { production: String },

    #[error("production \"{production}\" calls unknown RHS function \"{name}\"")]
    #[diagnostic(
        code(heka::compile::unknown_function),
        help("Register the function with `Agent::register_function` before adding the production.")
    )]
    UnknownFunction { production: String, name: String },

    #[error("production \"{production}\": {preference} preference needs a referent")]
    #[diagnostic(
        code(heka::compile::missing_referent),
        help("Binary preferences (better, worse, binary indifferent) compare the value with a referent.")
    )]
    MissingReferent { production: String, preference: String },

    #[error("production \"{production}\": {preference} preference does not take a referent")]
    #[diagnostic(
        code(heka::compile::unexpected_referent),
        help("Only better, worse, binary and numeric indifferent preferences carry a referent.")
    )]
    UnexpectedReferent { production: String, preference: String },
}

// ---------------------------------------------------------------------------
// Invariant violations
// ---------------------------------------------------------------------------

/// An internal bookkeeping defect. These abort the affected agent operation
/// and are never recovered locally.
#[derive(Debug, Error, Diagnostic)]
pub enum InvariantViolation {
    #[error("unknown WME timetag {timetag}")]
    #[diagnostic(
        code(heka::invariant::unknown_wme),
        help("A component referenced a WME that working memory does not hold.")
    )]
    UnknownWme { timetag: u64 },

    #[error("duplicate WME timetag {timetag}")]
    #[diagnostic(
        code(heka::invariant::duplicate_timetag),
        help("Timetags are allocated once and never reused.")
    )]
    DuplicateTimetag { timetag: u64 },

    #[error("unknown rete node {node}")]
    #[diagnostic(
        code(heka::invariant::unknown_node),
        help("The beta network referenced a node that was already pruned.")
    )]
    UnknownNode { node: usize },

    #[error("unknown token {token}")]
    #[diagnostic(
        code(heka::invariant::unknown_token),
        help("A token was referenced after it had been deleted.")
    )]
    UnknownToken { token: u64 },

    #[error("unknown preference {preference}")]
    #[diagnostic(
        code(heka::invariant::unknown_preference),
        help("A slot referenced a preference that is no longer in preference memory.")
    )]
    UnknownPreference { preference: u64 },

    #[error("unknown instantiation {instantiation}")]
    #[diagnostic(
        code(heka::invariant::unknown_instantiation),
        help("A preference referenced an instantiation that was already discarded.")
    )]
    UnknownInstantiation { instantiation: u64 },

    #[error("unknown goal {goal}")]
    #[diagnostic(
        code(heka::invariant::unknown_goal),
        help("The goal stack does not contain this identifier.")
    )]
    UnknownGoal { goal: String },

    #[error("slot inconsistency: {message}")]
    #[diagnostic(code(heka::invariant::slot), help("Slot membership and WME state disagree."))]
    SlotInconsistency { message: String },

    #[error("goal dependency set inconsistency: {message}")]
    #[diagnostic(code(heka::invariant::gds), help("A goal dependency set outlived its goal."))]
    GdsInconsistency { message: String },
}

// ---------------------------------------------------------------------------
// RHS function errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RhsError {
    #[error("RHS function \"{function}\" expects {expected} arguments, got {actual}")]
    #[diagnostic(code(heka::rhs::arity), help("Check the argument list of the function call."))]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("RHS function \"{function}\" expects a number, got {value}")]
    #[diagnostic(
        code(heka::rhs::not_numeric),
        help("Arithmetic functions only accept integer and float symbols.")
    )]
    NotNumeric { function: String, value: String },

    #[error("RHS function \"{function}\": division by zero")]
    #[diagnostic(code(heka::rhs::divide_by_zero), help("Guard the divisor in the production's conditions."))]
    DivideByZero { function: String },

    #[error("RHS function \"{function}\" failed: {message}")]
    #[diagnostic(code(heka::rhs::failed))]
    Failed { function: String, message: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read agent config: {path}")]
    #[diagnostic(
        code(heka::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse agent config: {path}: {message}")]
    #[diagnostic(
        code(heka::config::parse),
        help("Check the TOML syntax and field names in the agent config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write agent config: {path}")]
    #[diagnostic(
        code(heka::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize agent config: {message}")]
    #[diagnostic(code(heka::config::serialize))]
    Serialize { message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(heka::config::invalid), help("Check the AgentConfig fields. {message}"))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Agent errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error("unknown production \"{name}\"")]
    #[diagnostic(
        code(heka::agent::unknown_production),
        help("List productions with `Agent::productions()`.")
    )]
    UnknownProduction { name: String },

    #[error("instantiation {id} is not live")]
    #[diagnostic(
        code(heka::agent::stale_instantiation),
        help(
            "Only instantiations delivered by `drain_match_set` and not yet retracted \
             can be fired or retracted."
        )
    )]
    StaleInstantiation { id: u64 },

    #[error("{symbol} is not a goal")]
    #[diagnostic(code(heka::agent::not_a_goal))]
    NotAGoal { symbol: String },
}

/// Convenience alias for results throughout the heka engine.
pub type HekaResult<T> = std::result::Result<T, HekaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_converts_to_heka_error() {
        let err = CompileError::NoPositiveConditions {
            production: "p1".into(),
        };
        let heka: HekaError = err.into();
        assert!(matches!(
            heka,
            HekaError::Compile(CompileError::NoPositiveConditions { .. })
        ));
    }

    #[test]
    fn invariant_violation_converts_to_heka_error() {
        let heka: HekaError = InvariantViolation::UnknownWme { timetag: 7 }.into();
        assert!(matches!(
            heka,
            HekaError::Invariant(InvariantViolation::UnknownWme { timetag: 7 })
        ));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = CompileError::UnboundVariable {
            production: "compare".into(),
            variable: "x".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("compare"));
        assert!(msg.contains("<x>"));
    }

    #[test]
    fn diagnostic_codes_are_namespaced() {
        let err = RhsError::DivideByZero {
            function: "/".into(),
        };
        let code = err.code().map(|c| c.to_string()).unwrap_or_default();
        assert_eq!(code, "heka::rhs::divide_by_zero");
    }
}

// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # heka
//!
//! An incremental production-rule matcher with a preference-based decision
//! procedure, in the tradition of Soar.
//!
//! ## Architecture
//!
//! - **Symbols** (`symbol`): interned constants and identifiers with goal levels and link counts
//! - **Working memory** (`memory`): timetagged WMEs grouped into slots
//! - **Rete** (`rete`): alpha memories plus a shared beta network on a `petgraph` arena
//! - **Preferences** (`preference`, `instantiation`): what fired rules assert, and why
//! - **Decider** (`decide`): preference semantics, impasses and the goal stack
//! - **GDS** (`gds`): goal dependency sets for o-supported results in substates
//! - **Agent** (`agent`): the facade that drives elaboration and decision cycles
//!
//! ## Library usage
//!
//! ```no_run
//! use heka::agent::Agent;
//! use heka::config::AgentConfig;
//! use heka::production::{Action, Condition, Production, RhsValue, Test};
//!
//! let mut agent = Agent::new(AgentConfig::default()).unwrap();
//! let superstate = agent.intern("superstate").unwrap();
//! let nil = agent.intern("nil").unwrap();
//! let done = agent.intern("done").unwrap();
//! let yes = agent.intern("yes").unwrap();
//! agent
//!     .add_production(
//!         Production::new("done")
//!             .when(Condition::positive(Test::var("s"), Test::constant(superstate), Test::constant(nil)))
//!             .then(Action::make(RhsValue::var("s"), RhsValue::Constant(done), RhsValue::Constant(yes))),
//!     )
//!     .unwrap();
//! agent.run_decision_cycle().unwrap();
//! ```

pub mod agent;
pub mod config;
pub mod decide;
pub mod demo;
pub mod error;
pub mod gds;
pub mod instantiation;
pub mod kernel;
pub mod memory;
pub mod preference;
pub mod production;
pub mod rete;
pub mod rhs;
pub mod symbol;

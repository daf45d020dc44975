//! `cadence-core` — building blocks shared by every runnable.
//!
//! This crate holds the pure pieces of the dispatch layer (no collaborators):
//! the error taxonomy, the named-argument store with its validators, and the
//! string helpers used to derive event names and cache tags.

pub mod arguments;
pub mod error;
pub mod inflect;
pub mod tags;
pub mod validation;

pub use arguments::{Arguments, Fallback};
pub use error::{RunError, RunResult};
pub use validation::{BasicRules, Kind, RuleEngine, RuleViolations, Validates, Validator};

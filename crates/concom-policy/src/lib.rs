//! Policy bundle evaluation.
//!
//! A policy bundle is a directory (or single file) of declarative policy
//! modules. Each module names its package, carries optional annotations
//! and metadata, and declares violation rules whose conditions are JSON
//! Schemas matched against the plugin-collected input. Evaluating a bundle
//! yields one [`PolicyResult`] per module; a module with no matching rules
//! is satisfied.
//!
//! The evaluation engine itself is pluggable: everything downstream goes
//! through the [`PolicyEngine`] trait, and [`SchemaPolicyEngine`] is the
//! built-in implementation.

pub mod bundle;
pub mod engine;
pub mod error;
pub mod result;

pub use bundle::{Bundle, Module, Rule};
pub use engine::{PolicyEngine, SchemaPolicyEngine};
pub use error::{PolicyError, PolicyEvalResult};
pub use result::{Annotations, Control, Policy, PolicyResult, Violation};

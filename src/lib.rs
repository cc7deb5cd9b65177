//! Metamodel-driven validation of requirement items
//!
//! A metamodel declares item types with their fields and links, plus
//! prohibited-word and graph checks. Items exported from a documentation build
//! are validated against it by a set of registered rules, and violations are
//! collected in a [`ResultLog`].

pub mod domain;
pub use domain::{Config, Item, ItemGraph, Metamodel, MetamodelError, MetamodelSource};

/// Validation rules, their registry and the runner.
pub mod checks;
pub use checks::{CheckRunner, Diagnostic, ResultLog, RuleRegistry, Severity, Summary};

/// Structural schemas derived from the metamodel.
pub mod schema;

/// Validation runs that reuse the loaded metamodel.
pub mod session;
pub use session::{RunSettings, Session};

/// Reading metamodels and item snapshots from disk.
pub mod storage;

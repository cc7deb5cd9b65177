//! Domain models for metamodel validation.
//!
//! This module contains the metamodel (types, links, checks), the item graph
//! being validated, and the configuration of a validation run.

mod config;
pub use config::Config;

/// Conditions used by declarative graph checks.
pub mod condition;
pub use condition::Condition;

mod directive;
pub use directive::{Directive, InvalidDirectiveError};

/// The item collection and its link structure.
pub mod graph;
pub use graph::{DuplicateItemError, ItemGraph, LinkGraph};

mod item;
pub use item::{FieldValue, Item, Location};

/// Loading and resolving the metamodel.
pub mod loader;
pub use loader::{MetamodelError, MetamodelSource};

/// The resolved metamodel.
pub mod metamodel;
pub use metamodel::{
    ConfigError, LinkTarget, LinkTargetEntry, Metamodel, Necessity, Pattern, TypeDefinition,
    TypeRegistry,
};

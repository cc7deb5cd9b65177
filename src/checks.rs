//! Validation rules and the machinery that runs them.
//!
//! A rule is either *local* (run once per internal item) or *graph* (run once
//! over the whole item collection). Rules report violations through a
//! [`RuleLog`]; an `Err` from a rule is a fault in the rule itself and aborts
//! the run.

use std::fmt;

use crate::domain::{Item, LinkGraph, Metamodel};

mod dead_links;
mod extra_options;
mod id_parts;
mod link_targets;
mod log;
mod metamodel_graph;
mod options;
mod prohibited_words;
mod registry;
mod report;
mod runner;

pub use log::{Diagnostic, ResultLog, RuleLog, Severity, Summary};
pub use registry::{FilterError, RuleFilter, RuleInfo, RuleKind, RuleRegistry};
pub use report::RunReport;
pub use runner::{CheckRunner, RunError};

/// The rollout stage of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Violations are warnings and fail the run.
    Enforced,
    /// Violations are infos while the rule is being rolled out.
    New,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enforced => write!(f, "enforced"),
            Self::New => write!(f, "new"),
        }
    }
}

/// What every rule gets to look at besides the items.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    /// The loaded metamodel.
    pub metamodel: &'a Metamodel,
}

/// A rule that inspects one item at a time.
pub trait LocalRule: Send + Sync {
    /// The unique name of the rule.
    fn name(&self) -> &str;

    /// The default rollout stage.
    fn stage(&self) -> Stage {
        Stage::Enforced
    }

    /// Checks a single internal item.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleFault`] if the rule cannot do its job. Violations found
    /// in the item are reported through `log`, not returned.
    fn check(&self, ctx: &CheckContext<'_>, item: &Item, log: &RuleLog<'_>)
    -> Result<(), RuleFault>;
}

/// A rule that inspects the whole item collection.
pub trait GraphRule: Send + Sync {
    /// The unique name of the rule.
    fn name(&self) -> &str;

    /// The default rollout stage.
    fn stage(&self) -> Stage {
        Stage::Enforced
    }

    /// Checks the full collection, external items included.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleFault`] if the rule cannot do its job.
    fn check(
        &self,
        ctx: &CheckContext<'_>,
        graph: &LinkGraph<'_>,
        log: &RuleLog<'_>,
    ) -> Result<(), RuleFault>;
}

/// A rule failed to execute.
///
/// This signals a bug in a rule or data the rule did not expect, never a
/// violation found in an item.
#[derive(Debug, thiserror::Error)]
pub enum RuleFault {
    /// An item field did not have the shape the rule relies on.
    #[error("item '{item}' has a malformed field '{field}': {reason}")]
    MalformedItem {
        /// The item id.
        item: String,
        /// The field name.
        field: String,
        /// What was wrong.
        reason: String,
    },
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// Builds the registry of every built-in rule.
///
/// Local rules run in the order listed here, and so do graph rules.
#[must_use]
pub fn builtin() -> RuleRegistry {
    let mut registry = RuleRegistry::default();

    registry.register_local(options::CheckOptions);
    registry.register_local(extra_options::CheckExtraOptions);
    registry.register_local(id_parts::CheckIdParts);
    registry.register_local(prohibited_words::CheckProhibitedWords);

    registry.register_graph(link_targets::CheckLinkTargets);
    registry.register_graph(dead_links::CheckDeadLinks);
    registry.register_graph(metamodel_graph::CheckMetamodelGraph);

    registry
}

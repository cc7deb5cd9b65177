use std::{collections::BTreeSet, fmt};

use nonempty::NonEmpty;

use crate::checks::{GraphRule, LocalRule, Stage};

/// The catalog of rules available to a run.
///
/// Built once at startup (see [`builtin`](crate::checks::builtin)) and read
/// many times afterwards.
#[derive(Default)]
pub struct RuleRegistry {
    local: Vec<Box<dyn LocalRule>>,
    graph: Vec<Box<dyn GraphRule>>,
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("local", &self.local.iter().map(|r| r.name()).collect::<Vec<_>>())
            .field("graph", &self.graph.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Which phase a rule runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Runs once per internal item.
    Local,
    /// Runs once over all items.
    Graph,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Graph => write!(f, "graph"),
        }
    }
}

/// A description of a registered rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInfo {
    /// The rule name.
    pub name: String,
    /// The phase the rule runs in.
    pub kind: RuleKind,
    /// The default rollout stage.
    pub stage: Stage,
}

/// The set of rules enabled for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleFilter {
    /// Every registered rule runs.
    All,
    /// Only the named rules run.
    Only(NonEmpty<String>),
}

impl RuleFilter {
    /// Whether the named rule runs.
    #[must_use]
    pub fn is_enabled(&self, rule: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.iter().any(|name| name == rule),
        }
    }
}

/// The enabled-rule filter is invalid.
///
/// This is a configuration error: the run must not start.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FilterError {
    /// A name in the filter does not match any rule.
    #[error("Check: '{name}' is not one of the defined local or graph checks: {}", valid.join(", "))]
    UnknownRule {
        /// The unknown name.
        name: String,
        /// Every registered rule name.
        valid: Vec<String>,
    },
    /// Two registered rules share a name.
    #[error("Check: '{0}' is registered more than once")]
    DuplicateRule(String),
}

impl RuleRegistry {
    /// Appends an item-local rule.
    pub fn register_local(&mut self, rule: impl LocalRule + 'static) {
        tracing::debug!(rule = rule.name(), "registered local rule");
        self.local.push(Box::new(rule));
    }

    /// Appends a graph rule.
    pub fn register_graph(&mut self, rule: impl GraphRule + 'static) {
        tracing::debug!(rule = rule.name(), "registered graph rule");
        self.graph.push(Box::new(rule));
    }

    /// The local rules, in registration order.
    pub fn local(&self) -> impl Iterator<Item = &dyn LocalRule> + '_ {
        self.local.iter().map(AsRef::as_ref)
    }

    /// The graph rules, in registration order.
    pub fn graph(&self) -> impl Iterator<Item = &dyn GraphRule> + '_ {
        self.graph.iter().map(AsRef::as_ref)
    }

    /// Describes every rule, local rules first.
    #[must_use]
    pub fn describe(&self) -> Vec<RuleInfo> {
        let local = self.local().map(|rule| RuleInfo {
            name: rule.name().to_string(),
            kind: RuleKind::Local,
            stage: rule.stage(),
        });
        let graph = self.graph().map(|rule| RuleInfo {
            name: rule.name().to_string(),
            kind: RuleKind::Graph,
            stage: rule.stage(),
        });
        local.chain(graph).collect()
    }

    /// Every rule name, local rules first.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.local
            .iter()
            .map(|rule| rule.name())
            .chain(self.graph.iter().map(|rule| rule.name()))
    }

    /// Parses a comma-separated list of rule names.
    ///
    /// Names are trimmed. An empty filter enables every rule.
    ///
    /// # Errors
    ///
    /// Returns an error if a name does not match any registered rule, or if
    /// two registered rules share a name.
    pub fn resolve_filter(&self, filter: &str) -> Result<RuleFilter, FilterError> {
        let mut known = BTreeSet::new();
        for name in self.names() {
            if !known.insert(name) {
                return Err(FilterError::DuplicateRule(name.to_string()));
            }
        }

        let names: Vec<String> = filter
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        for name in &names {
            if !known.contains(name.as_str()) {
                return Err(FilterError::UnknownRule {
                    name: name.clone(),
                    valid: self.names().map(str::to_string).collect(),
                });
            }
        }

        Ok(NonEmpty::from_vec(names).map_or(RuleFilter::All, RuleFilter::Only))
    }
}

use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
};

use serde::Serialize;

use crate::{checks::Stage, domain::Item};

/// How a violation affects the outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fails the run.
    Warning,
    /// Reported, but does not fail the run (yet).
    Info,
}

/// A single violation reported by a rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Diagnostic {
    /// Where the offending item was defined, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// The offending item.
    pub item: String,
    /// The offending field, if the violation is about one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The offending value, if the violation is about one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// What is wrong.
    pub message: String,
    /// The rule that reported the violation.
    pub rule: String,
    /// Whether the violation is fatal.
    pub severity: Severity,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{location}: ")?;
        }
        write!(f, "{}", self.item)?;
        if let Some(field) = &self.field {
            write!(f, ".{field}")?;
        }
        if let Some(value) = &self.value {
            write!(f, " ({value:?})")?;
        }
        write!(f, ": {} [{}]", self.message, self.rule)
    }
}

/// Accumulates the results of one validation run.
///
/// A fresh log is created for every run. It is safe to share between threads.
#[derive(Debug, Default)]
pub struct ResultLog {
    new_rules: BTreeSet<String>,
    warnings: AtomicUsize,
    infos: AtomicUsize,
    fired_new_rules: Mutex<BTreeSet<String>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl ResultLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty log that demotes violations of the named rules to
    /// infos.
    #[must_use]
    pub fn with_new_rules<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            new_rules: rules.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Whether the rule's violations are reported as infos.
    #[must_use]
    pub fn is_new(&self, rule: &str, stage: Stage) -> bool {
        stage == Stage::New || self.new_rules.contains(rule)
    }

    /// The number of warnings so far.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    /// The number of infos so far.
    #[must_use]
    pub fn info_count(&self) -> usize {
        self.infos.load(Ordering::Relaxed)
    }

    /// All diagnostics, sorted.
    ///
    /// The order does not depend on the order in which rules ran.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = self
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        diagnostics.sort();
        diagnostics
    }

    /// Names of new rules that reported at least one violation.
    #[must_use]
    pub fn fired_new_rules(&self) -> Vec<String> {
        self.fired_new_rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Summarizes the run so far.
    #[must_use]
    pub fn summary(&self) -> Summary {
        Summary {
            warnings: self.warning_count(),
            infos: self.info_count(),
            new_rules: self.fired_new_rules(),
        }
    }

    fn record(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => {
                tracing::warn!("{diagnostic}");
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            Severity::Info => {
                tracing::info!("{diagnostic}");
                self.infos.fetch_add(1, Ordering::Relaxed);
                self.fired_new_rules
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(diagnostic.rule.clone());
            }
        }
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}

/// The log as seen by a single rule.
///
/// Every violation reported through it is attributed to the rule, and its
/// severity follows the rule's rollout stage.
#[derive(Debug, Clone, Copy)]
pub struct RuleLog<'a> {
    log: &'a ResultLog,
    rule: &'a str,
    severity: Severity,
}

impl<'a> RuleLog<'a> {
    /// Creates the log handle for a rule.
    #[must_use]
    pub fn new(log: &'a ResultLog, rule: &'a str, stage: Stage) -> Self {
        let severity = if log.is_new(rule, stage) {
            Severity::Info
        } else {
            Severity::Warning
        };
        Self {
            log,
            rule,
            severity,
        }
    }

    /// The severity violations are reported with.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Reports a violation concerning the item as a whole.
    pub fn for_item(&self, item: &Item, message: impl Into<String>) {
        self.report(item, None, None, message.into());
    }

    /// Reports a violation concerning one field of the item.
    pub fn for_field(&self, item: &Item, field: &str, message: impl Into<String>) {
        self.report(item, Some(field), None, message.into());
    }

    /// Reports a violation concerning one value of a field of the item.
    pub fn for_value(&self, item: &Item, field: &str, value: &str, message: impl Into<String>) {
        self.report(item, Some(field), Some(value), message.into());
    }

    fn report(&self, item: &Item, field: Option<&str>, value: Option<&str>, message: String) {
        self.log.record(Diagnostic {
            location: item.location().map(ToString::to_string),
            item: item.id().to_string(),
            field: field.map(str::to_string),
            value: value.map(str::to_string),
            message,
            rule: self.rule.to_string(),
            severity: self.severity,
        });
    }
}

/// The outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// The number of fatal violations.
    pub warnings: usize,
    /// The number of non-fatal violations.
    pub infos: usize,
    /// New rules that reported violations.
    pub new_rules: Vec<String>,
}

impl Summary {
    /// Whether the host should treat the run as failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.warnings > 0
    }

    /// The fatal summary line, if there were warnings.
    #[must_use]
    pub fn warning_line(&self) -> Option<String> {
        (self.warnings > 0).then(|| {
            format!(
                "{} issues found. See the log for more information.",
                self.warnings
            )
        })
    }

    /// The non-fatal summary lines, if there were infos.
    #[must_use]
    pub fn info_lines(&self) -> Vec<String> {
        if self.infos == 0 {
            return Vec::new();
        }
        vec![
            format!(
                "The {} findings above are non fatal for now. They will become fatal in the \
                 future. Please fix them as soon as possible.",
                self.infos
            ),
            format!("New checks: {}", self.new_rules.join(", ")),
        ]
    }
}

impl Summary {
    /// Every summary line, tagged with the severity it reports on.
    ///
    /// A clean run yields a single untagged line.
    #[must_use]
    pub fn lines(&self) -> Vec<(Option<Severity>, String)> {
        let mut lines: Vec<_> = self
            .warning_line()
            .map(|line| (Some(Severity::Warning), line))
            .into_iter()
            .chain(
                self.info_lines()
                    .into_iter()
                    .map(|line| (Some(Severity::Info), line)),
            )
            .collect();
        if lines.is_empty() {
            lines.push((None, "No issues found.".to_string()));
        }
        lines
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, line) in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

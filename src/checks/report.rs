use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::checks::{Diagnostic, ResultLog, Summary};

/// A persisted record of one validation run.
///
/// The `new_checks` list tells a project which rules it could promote to
/// enforced once their findings are fixed.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// The number of fatal violations.
    pub warnings: usize,
    /// The number of non-fatal violations.
    pub infos: usize,
    /// New rules that reported violations.
    pub new_checks: Vec<String>,
    /// Every violation, sorted.
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    /// Captures the current state of a log.
    #[must_use]
    pub fn new(log: &ResultLog) -> Self {
        let Summary {
            warnings,
            infos,
            new_rules,
        } = log.summary();
        Self {
            run_id: Uuid::new_v4(),
            finished_at: Utc::now(),
            warnings,
            infos,
            new_checks: new_rules,
            diagnostics: log.diagnostics(),
        }
    }

    /// Whether the run failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.warnings > 0
    }
}

//! Repeated validation runs with a cached metamodel.
//!
//! A host that validates several times (a watch loop, an editor integration)
//! should not reload the metamodel each time. A [`Session`] fingerprints the
//! effective configuration and only rebuilds when the fingerprint changes.
//! Every run still gets a fresh [`ResultLog`].

use std::{collections::BTreeSet, sync::Arc};

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::{
    checks::{CheckRunner, FilterError, ResultLog, RunError, RuleRegistry, Summary},
    domain::{loader, ItemGraph, Metamodel, MetamodelError, MetamodelSource},
};

/// The configuration a run depends on.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings<'a> {
    /// The metamodel YAML text.
    pub metamodel: &'a str,
    /// Comma-separated names of enabled rules. Empty enables all.
    pub enabled_checks: &'a str,
    /// Rules whose violations are reported as infos.
    pub new_checks: &'a BTreeSet<String>,
    /// Whether item-local rules run on a thread pool.
    pub parallel: bool,
}

impl RunSettings<'_> {
    /// A stable hash of everything that affects the outcome of a run.
    ///
    /// Scheduling (`parallel`) does not contribute.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        #[derive(BorshSerialize)]
        struct FingerprintData<'a> {
            metamodel: &'a str,
            enabled_checks: &'a str,
            new_checks: &'a BTreeSet<String>,
        }

        let data = FingerprintData {
            metamodel: self.metamodel,
            enabled_checks: self.enabled_checks,
            new_checks: self.new_checks,
        };

        let encoded = borsh::to_vec(&data).expect("this should never fail");
        let hash = Sha256::digest(encoded);
        format!("{hash:x}")
    }
}

/// An error from a session run.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The metamodel could not be loaded.
    #[error(transparent)]
    Metamodel(#[from] MetamodelError),
    /// The rule filter is invalid.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// A rule failed to execute.
    #[error(transparent)]
    Run(#[from] RunError),
}

/// The result of one run.
#[derive(Debug)]
pub struct Outcome {
    /// The summary of the run.
    pub summary: Summary,
    /// Everything the run recorded.
    pub log: ResultLog,
    /// The metamodel the run validated against.
    pub metamodel: Arc<Metamodel>,
}

#[derive(Debug)]
struct Cached {
    fingerprint: String,
    metamodel: Arc<Metamodel>,
}

/// Runs validations, reusing the loaded metamodel between runs.
#[derive(Debug)]
pub struct Session {
    registry: RuleRegistry,
    cached: Option<Cached>,
    rebuilds: usize,
}

impl Session {
    /// Creates a session over a rule registry.
    #[must_use]
    pub const fn new(registry: RuleRegistry) -> Self {
        Self {
            registry,
            cached: None,
            rebuilds: 0,
        }
    }

    /// The rules available to runs.
    #[must_use]
    pub const fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// How many times the metamodel has been loaded.
    #[must_use]
    pub const fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Returns the metamodel for the settings, loading it if they changed
    /// since the last call.
    ///
    /// # Errors
    ///
    /// Returns an error if the metamodel cannot be loaded.
    pub fn metamodel(&mut self, settings: &RunSettings<'_>) -> Result<Arc<Metamodel>, SessionError> {
        let fingerprint = settings.fingerprint();
        if let Some(cached) = &self.cached {
            if cached.fingerprint == fingerprint {
                debug!(%fingerprint, "reusing cached metamodel");
                return Ok(Arc::clone(&cached.metamodel));
            }
        }

        debug!(%fingerprint, "loading metamodel");
        let metamodel = Arc::new(loader::load(MetamodelSource::from_yaml(settings.metamodel)?)?);
        self.rebuilds += 1;
        self.cached = Some(Cached {
            fingerprint,
            metamodel: Arc::clone(&metamodel),
        });
        Ok(metamodel)
    }

    /// Validates the items.
    ///
    /// # Errors
    ///
    /// Returns an error if the metamodel cannot be loaded, the rule filter is
    /// invalid or a rule fails to execute.
    #[instrument(level = "debug", skip_all)]
    pub fn run(
        &mut self,
        settings: &RunSettings<'_>,
        items: &mut ItemGraph,
    ) -> Result<Outcome, SessionError> {
        let metamodel = self.metamodel(settings)?;
        let runner = CheckRunner::new(&metamodel, &self.registry)
            .with_filter(settings.enabled_checks)?
            .parallel(settings.parallel);

        let log = ResultLog::with_new_rules(settings.new_checks.iter().cloned());
        let summary = runner.run(items, &log)?;

        Ok(Outcome {
            summary,
            log,
            metamodel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{checks::builtin, domain::Item};

    const METAMODEL: &str = r"
needs_types:
  comp:
    title: Component
    mandatory_links:
      implements: comp
";

    fn settings<'a>(metamodel: &'a str, new_checks: &'a BTreeSet<String>) -> RunSettings<'a> {
        RunSettings {
            metamodel,
            enabled_checks: "",
            new_checks,
            parallel: false,
        }
    }

    fn items() -> ItemGraph {
        ItemGraph::from_items([Item::new("comp__a__b", "comp")]).unwrap()
    }

    #[test]
    fn unchanged_settings_reuse_the_metamodel() {
        let new_checks = BTreeSet::new();
        let mut session = Session::new(builtin());

        let first = session.run(&settings(METAMODEL, &new_checks), &mut items()).unwrap();
        let second = session.run(&settings(METAMODEL, &new_checks), &mut items()).unwrap();

        assert_eq!(session.rebuilds(), 1);
        assert!(Arc::ptr_eq(&first.metamodel, &second.metamodel));
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.log.diagnostics(), second.log.diagnostics());
    }

    #[test]
    fn changed_settings_rebuild() {
        let none = BTreeSet::new();
        let demoted = BTreeSet::from(["check_options".to_string()]);
        let mut session = Session::new(builtin());

        let enforced = session.run(&settings(METAMODEL, &none), &mut items()).unwrap();
        let relaxed = session.run(&settings(METAMODEL, &demoted), &mut items()).unwrap();

        assert_eq!(session.rebuilds(), 2);
        assert!(enforced.summary.is_failure());
        assert!(!relaxed.summary.is_failure());
    }

    #[test]
    fn fingerprint_ignores_scheduling() {
        let new_checks = BTreeSet::new();
        let sequential = settings(METAMODEL, &new_checks);
        let parallel = RunSettings {
            parallel: true,
            ..sequential
        };

        assert_eq!(sequential.fingerprint(), parallel.fingerprint());
        assert_ne!(
            sequential.fingerprint(),
            settings("needs_types: {}", &new_checks).fingerprint()
        );
    }

    #[test]
    fn invalid_filter_is_reported() {
        let new_checks = BTreeSet::new();
        let mut session = Session::new(builtin());
        let settings = RunSettings {
            enabled_checks: "no_such_check",
            ..settings(METAMODEL, &new_checks)
        };

        let error = session.run(&settings, &mut items()).unwrap_err();
        assert!(matches!(error, SessionError::Filter(_)));
    }
}

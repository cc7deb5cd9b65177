use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, instrument, warn};

use crate::{
    checks::{
        CheckContext, FilterError, LocalRule, ResultLog, RuleFault, RuleFilter, RuleLog,
        RuleRegistry, Summary,
    },
    domain::{Item, ItemGraph, LinkGraph, Metamodel},
};

/// Runs the enabled rules of a registry over an item graph.
#[derive(Debug)]
pub struct CheckRunner<'a> {
    metamodel: &'a Metamodel,
    registry: &'a RuleRegistry,
    filter: RuleFilter,
    parallel: bool,
}

/// A rule failed to execute and the run was aborted.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The named rule returned a fault.
    #[error("check '{rule}' failed: {source}")]
    RuleFault {
        /// The failing rule.
        rule: String,
        /// What went wrong.
        source: RuleFault,
    },
}

impl<'a> CheckRunner<'a> {
    /// Creates a runner with every rule enabled, running sequentially.
    #[must_use]
    pub const fn new(metamodel: &'a Metamodel, registry: &'a RuleRegistry) -> Self {
        Self {
            metamodel,
            registry,
            filter: RuleFilter::All,
            parallel: false,
        }
    }

    /// Restricts the run to a comma-separated list of rule names.
    ///
    /// # Errors
    ///
    /// Returns an error if a name does not match a registered rule.
    pub fn with_filter(mut self, filter: &str) -> Result<Self, FilterError> {
        self.filter = self.registry.resolve_filter(filter)?;
        Ok(self)
    }

    /// Whether item-local rules run on a thread pool.
    #[must_use]
    pub const fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validates the graph, recording violations in `log`.
    ///
    /// Link fields of the items are postprocessed in place first. Local rules
    /// then run over every internal item, and graph rules once over all
    /// items.
    ///
    /// # Errors
    ///
    /// Returns an error if a rule fails to execute. Violations found in items
    /// are not errors; they are recorded in the log.
    #[instrument(level = "debug", skip_all, fields(items = items.len()))]
    pub fn run(&self, items: &mut ItemGraph, log: &ResultLog) -> Result<Summary, RunError> {
        items.postprocess_links(self.metamodel);

        let ctx = CheckContext {
            metamodel: self.metamodel,
        };
        self.run_local(&ctx, items, log)?;
        self.run_graph(&ctx, items, log)?;

        let summary = log.summary();
        if let Some(line) = summary.warning_line() {
            warn!("{line}");
        }
        for line in summary.info_lines() {
            info!("{line}");
        }
        Ok(summary)
    }

    fn run_local(
        &self,
        ctx: &CheckContext<'_>,
        items: &ItemGraph,
        log: &ResultLog,
    ) -> Result<(), RunError> {
        let rules: Vec<(&dyn LocalRule, RuleLog<'_>)> = self
            .registry
            .local()
            .filter(|rule| self.filter.is_enabled(rule.name()))
            .map(|rule| (rule, RuleLog::new(log, rule.name(), rule.stage())))
            .collect();

        let check_item = |item: &Item| {
            rules.iter().try_for_each(|(rule, rule_log)| {
                debug!(rule = rule.name(), item = item.id(), "running local check");
                rule.check(ctx, item, rule_log)
                    .map_err(|source| RunError::RuleFault {
                        rule: rule.name().to_string(),
                        source,
                    })
            })
        };

        if self.parallel {
            let internal: Vec<&Item> = items.internal().collect();
            internal.par_iter().try_for_each(|item| check_item(*item))
        } else {
            items.internal().try_for_each(check_item)
        }
    }

    fn run_graph(
        &self,
        ctx: &CheckContext<'_>,
        items: &ItemGraph,
        log: &ResultLog,
    ) -> Result<(), RunError> {
        let graph = LinkGraph::new(items);
        let rules = self
            .registry
            .graph()
            .filter(|rule| self.filter.is_enabled(rule.name()));

        for rule in rules {
            debug!(rule = rule.name(), "running graph check");
            let rule_log = RuleLog::new(log, rule.name(), rule.stage());
            rule.check(ctx, &graph, &rule_log)
                .map_err(|source| RunError::RuleFault {
                    rule: rule.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use test_case::test_case;

    use super::*;
    use crate::checks::{builtin, test_support::metamodel, GraphRule, Severity};

    /// Counts invocations and remembers which items it saw.
    #[derive(Clone, Default)]
    struct Recorder {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Recorder {
        fn named(name: &'static str) -> Self {
            Self {
                name,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<String> {
            let mut seen = self.seen.lock().unwrap().clone();
            seen.sort();
            seen
        }
    }

    impl LocalRule for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn check(
            &self,
            _ctx: &CheckContext<'_>,
            item: &Item,
            _log: &RuleLog<'_>,
        ) -> Result<(), RuleFault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(item.id().to_string());
            if self.fail {
                return Err(RuleFault::Other("boom".to_string()));
            }
            Ok(())
        }
    }

    impl GraphRule for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn check(
            &self,
            _ctx: &CheckContext<'_>,
            graph: &LinkGraph<'_>,
            _log: &RuleLog<'_>,
        ) -> Result<(), RuleFault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .extend(graph.items().all().map(|item| item.id().to_string()));
            Ok(())
        }
    }

    fn items() -> ItemGraph {
        ItemGraph::from_items([
            Item::new("A", "t"),
            Item::new("B", "t"),
            Item::new("EXT", "t").external(),
        ])
        .unwrap()
    }

    #[test]
    fn external_items_only_reach_graph_rules() {
        let metamodel = metamodel("needs_types: {}");
        let local = Recorder::named("local");
        let graph = Recorder::named("graph");
        let mut registry = RuleRegistry::default();
        registry.register_local(local.clone());
        registry.register_graph(graph.clone());

        CheckRunner::new(&metamodel, &registry)
            .run(&mut items(), &ResultLog::new())
            .unwrap();

        assert_eq!(local.seen(), ["A", "B"]);
        assert_eq!(graph.calls(), 1);
        assert_eq!(graph.seen(), ["A", "B", "EXT"]);
    }

    #[test]
    fn filter_limits_which_rules_run() {
        let metamodel = metamodel("needs_types: {}");
        let first = Recorder::named("first");
        let second = Recorder::named("second");
        let graph = Recorder::named("graph");
        let mut registry = RuleRegistry::default();
        registry.register_local(first.clone());
        registry.register_local(second.clone());
        registry.register_graph(graph.clone());

        CheckRunner::new(&metamodel, &registry)
            .with_filter("second, graph")
            .unwrap()
            .run(&mut items(), &ResultLog::new())
            .unwrap();

        assert_eq!(first.calls(), 0);
        assert_eq!(second.calls(), 2);
        assert_eq!(graph.calls(), 1);
    }

    #[test]
    fn unknown_filter_name_is_rejected_before_running() {
        let metamodel = metamodel("needs_types: {}");
        let local = Recorder::named("local");
        let mut registry = RuleRegistry::default();
        registry.register_local(local.clone());

        let error = CheckRunner::new(&metamodel, &registry)
            .with_filter("local, nope")
            .unwrap_err();

        assert!(matches!(error, FilterError::UnknownRule { name, .. } if name == "nope"));
        assert_eq!(local.calls(), 0);
    }

    #[test_case(false; "sequential")]
    #[test_case(true; "parallel")]
    fn rule_fault_aborts_the_run(parallel: bool) {
        let metamodel = metamodel("needs_types: {}");
        let graph = Recorder::named("graph");
        let mut registry = RuleRegistry::default();
        registry.register_local(Recorder {
            fail: true,
            ..Recorder::named("faulty")
        });
        registry.register_graph(graph.clone());

        let error = CheckRunner::new(&metamodel, &registry)
            .parallel(parallel)
            .run(&mut items(), &ResultLog::new())
            .unwrap_err();

        let RunError::RuleFault { rule, .. } = error;
        assert_eq!(rule, "faulty");
        assert_eq!(graph.calls(), 0);
    }

    const METAMODEL: &str = r#"
needs_types:
  comp:
    title: Component
    mandatory_links:
      implements: req
  req:
    title: Requirement
    optional_links:
      relates: spec
  spec:
    title: Specification
  other:
    title: Other
prohibited_words_checks:
  todo:
    types: [spec]
    pattern: TODO
"#;

    fn scenario() -> ItemGraph {
        ItemGraph::from_items([
            Item::new("comp__brake__main", "comp").with_field("title", "Brake"),
            Item::new("req__brake__force", "req").with_field("relates", "other__x__y"),
            Item::new("spec__brake__doc", "spec").with_field("title", "TODO describe"),
            Item::new("other__x__y", "other"),
        ])
        .unwrap()
    }

    #[test_case(false; "sequential")]
    #[test_case(true; "parallel")]
    fn runs_are_idempotent(parallel: bool) {
        let metamodel = metamodel(METAMODEL);
        let registry = builtin();
        let runner = CheckRunner::new(&metamodel, &registry).parallel(parallel);
        let mut items = scenario();

        let first = ResultLog::new();
        let first_summary = runner.run(&mut items, &first).unwrap();
        let second = ResultLog::new();
        let second_summary = runner.run(&mut items, &second).unwrap();

        assert_eq!(first_summary, second_summary);
        assert_eq!(first.diagnostics(), second.diagnostics());
    }

    #[test]
    fn full_scenario_reports_each_violation_once() {
        let metamodel = metamodel(METAMODEL);
        let registry = builtin();
        let log = ResultLog::new();

        let summary = CheckRunner::new(&metamodel, &registry)
            .run(&mut scenario(), &log)
            .unwrap();

        let warnings: Vec<_> = log
            .diagnostics()
            .into_iter()
            .filter(|d| d.severity == Severity::Warning)
            .map(|d| (d.item, d.field, d.rule))
            .collect();
        assert_eq!(
            warnings,
            [
                (
                    "comp__brake__main".to_string(),
                    Some("implements".to_string()),
                    "check_options".to_string()
                ),
                (
                    "req__brake__force".to_string(),
                    Some("relates".to_string()),
                    "check_link_targets".to_string()
                ),
                (
                    "spec__brake__doc".to_string(),
                    Some("title".to_string()),
                    "check_prohibited_words".to_string()
                ),
            ]
        );
        assert!(summary.is_failure());
        assert_eq!(summary.infos, 0);
    }

    #[test]
    fn missing_mandatory_link_is_exactly_one_warning() {
        let metamodel = metamodel(METAMODEL);
        let registry = builtin();
        let log = ResultLog::new();
        let mut items =
            ItemGraph::from_items([Item::new("comp__brake__main", "comp")]).unwrap();

        CheckRunner::new(&metamodel, &registry)
            .run(&mut items, &log)
            .unwrap();

        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.diagnostics()[0].field.as_deref(), Some("implements"));
    }

    #[test]
    fn prohibited_word_is_one_violation() {
        let metamodel = metamodel(METAMODEL);
        let registry = builtin();
        let log = ResultLog::new();
        let mut items = ItemGraph::from_items([
            Item::new("spec__brake__doc", "spec").with_field("title", "TODO describe")
        ])
        .unwrap();

        CheckRunner::new(&metamodel, &registry)
            .with_filter("check_prohibited_words")
            .unwrap()
            .run(&mut items, &log)
            .unwrap();

        assert_eq!(log.warning_count(), 1);
        let diagnostic = &log.diagnostics()[0];
        assert_eq!(diagnostic.field.as_deref(), Some("title"));
        assert_eq!(diagnostic.value.as_deref(), Some("TODO"));
    }

    #[test]
    fn wrong_target_type_is_only_caught_by_the_graph_phase() {
        let metamodel = metamodel(METAMODEL);
        let registry = builtin();
        let mut items = ItemGraph::from_items([
            Item::new("req__brake__force", "req").with_field("relates", "other__x__y"),
            Item::new("other__x__y", "other"),
        ])
        .unwrap();

        let local_names: Vec<_> = registry.local().map(|rule| rule.name()).collect();
        let local_only = ResultLog::new();
        CheckRunner::new(&metamodel, &registry)
            .with_filter(&local_names.join(","))
            .unwrap()
            .run(&mut items, &local_only)
            .unwrap();
        assert_eq!(local_only.warning_count(), 0);

        let log = ResultLog::new();
        CheckRunner::new(&metamodel, &registry)
            .run(&mut items, &log)
            .unwrap();
        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.diagnostics()[0].rule, "check_link_targets");
    }

    #[test]
    fn configured_new_rules_do_not_fail_the_run() {
        let metamodel = metamodel(METAMODEL);
        let registry = builtin();
        let log = ResultLog::with_new_rules(["check_options"]);
        let mut items =
            ItemGraph::from_items([Item::new("comp__brake__main", "comp")]).unwrap();

        let summary = CheckRunner::new(&metamodel, &registry)
            .run(&mut items, &log)
            .unwrap();

        assert!(!summary.is_failure());
        assert_eq!(summary.infos, 1);
        assert_eq!(summary.new_rules, ["check_options"]);
    }
}

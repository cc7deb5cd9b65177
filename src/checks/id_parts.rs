use crate::{
    checks::{CheckContext, LocalRule, RuleFault, RuleLog, Stage},
    domain::Item,
};

const SEPARATOR: &str = "__";

/// Checks that an id has as many `__`-separated parts as its type expects.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckIdParts;

impl LocalRule for CheckIdParts {
    fn name(&self) -> &str {
        "check_id_parts"
    }

    fn stage(&self) -> Stage {
        Stage::New
    }

    fn check(
        &self,
        ctx: &CheckContext<'_>,
        item: &Item,
        log: &RuleLog<'_>,
    ) -> Result<(), RuleFault> {
        let Some(definition) = ctx.metamodel.types().get(item.kind()) else {
            return Ok(());
        };

        let parts = item.id().split(SEPARATOR).count();
        if parts != definition.parts() {
            log.for_value(
                item,
                "id",
                item.id(),
                format!(
                    "expected {} parts separated by `{SEPARATOR}`, found {parts}",
                    definition.parts()
                ),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::checks::{test_support::metamodel, ResultLog, Severity};

    #[test_case("feat__speed__limit", 0; "three parts")]
    #[test_case("feat__speed", 1; "too few")]
    #[test_case("feat__a__b__c", 1; "too many")]
    fn counts_parts(id: &str, violations: usize) {
        let metamodel = metamodel("needs_types:\n  feat:\n    title: Feature\n");
        let log = ResultLog::new();
        let rule_log = RuleLog::new(&log, CheckIdParts.name(), CheckIdParts.stage());

        CheckIdParts
            .check(
                &CheckContext {
                    metamodel: &metamodel,
                },
                &Item::new(id, "feat"),
                &rule_log,
            )
            .unwrap();

        assert_eq!(log.info_count(), violations);
        assert_eq!(log.warning_count(), 0);
        assert_eq!(rule_log.severity(), Severity::Info);
    }

    #[test]
    fn parts_are_configurable() {
        let metamodel = metamodel("needs_types:\n  feat:\n    title: Feature\n    parts: 2\n");
        let log = ResultLog::new();

        CheckIdParts
            .check(
                &CheckContext {
                    metamodel: &metamodel,
                },
                &Item::new("feat__speed", "feat"),
                &RuleLog::new(&log, CheckIdParts.name(), CheckIdParts.stage()),
            )
            .unwrap();

        assert_eq!(log.info_count(), 0);
    }
}

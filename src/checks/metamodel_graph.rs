use crate::{
    checks::{CheckContext, GraphRule, RuleFault, RuleLog},
    domain::LinkGraph,
};

/// Evaluates the declarative `graph_checks` of the metamodel.
///
/// For every internal item a check selects, each existing target of every
/// checked link field must satisfy that field's condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckMetamodelGraph;

impl GraphRule for CheckMetamodelGraph {
    fn name(&self) -> &str {
        "check_metamodel_graph"
    }

    fn check(
        &self,
        ctx: &CheckContext<'_>,
        graph: &LinkGraph<'_>,
        log: &RuleLog<'_>,
    ) -> Result<(), RuleFault> {
        let items = graph.items();
        for check in ctx.metamodel.graph_checks() {
            for item in items.internal().filter(|item| check.selects(item)) {
                for (field, condition) in check.links() {
                    for target_id in item.links(field) {
                        let Some(target) = items.get(target_id) else {
                            continue;
                        };
                        if !condition.evaluate(target) {
                            log.for_value(
                                item,
                                field,
                                target_id,
                                format!(
                                    "target does not satisfy `{condition}` (check `{}`). {}",
                                    check.name(),
                                    check.explanation()
                                ),
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

use crate::{
    checks::{CheckContext, GraphRule, RuleFault, RuleLog},
    domain::LinkGraph,
};

/// Checks that links with concrete target types point at items of those
/// types.
///
/// Missing targets are not reported here; see `check_dead_links`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckLinkTargets;

impl GraphRule for CheckLinkTargets {
    fn name(&self) -> &str {
        "check_link_targets"
    }

    fn check(
        &self,
        ctx: &CheckContext<'_>,
        graph: &LinkGraph<'_>,
        log: &RuleLog<'_>,
    ) -> Result<(), RuleFault> {
        let items = graph.items();
        for item in items.internal() {
            let Some(definition) = ctx.metamodel.types().get(item.kind()) else {
                continue;
            };

            for (field, target_id) in graph.outgoing(item.id()) {
                let Some(spec) = definition.link(field).filter(|spec| spec.has_types()) else {
                    continue;
                };
                let Some(target) = items.get(target_id) else {
                    continue;
                };
                if !spec.accepts(target) {
                    log.for_value(
                        item,
                        field,
                        target_id,
                        format!(
                            "links to an item of type `{}`, expected `{spec}`",
                            target.kind()
                        ),
                    );
                }
            }
        }
        Ok(())
    }
}

use std::collections::BTreeSet;

use crate::{
    checks::{CheckContext, GraphRule, RuleFault, RuleLog, Stage},
    domain::LinkGraph,
};

/// Reports links from internal items to ids that are not in the graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckDeadLinks;

impl GraphRule for CheckDeadLinks {
    fn name(&self) -> &str {
        "check_dead_links"
    }

    fn stage(&self) -> Stage {
        Stage::New
    }

    fn check(
        &self,
        _ctx: &CheckContext<'_>,
        graph: &LinkGraph<'_>,
        log: &RuleLog<'_>,
    ) -> Result<(), RuleFault> {
        let dangling: BTreeSet<&str> = graph.dangling().collect();
        if dangling.is_empty() {
            return Ok(());
        }

        for item in graph.items().internal() {
            for (field, target) in graph.outgoing(item.id()) {
                if dangling.contains(target) {
                    log.for_value(item, field, target, "links to an unknown item");
                }
            }
        }
        Ok(())
    }
}

use crate::{
    checks::{CheckContext, LocalRule, RuleFault, RuleLog},
    domain::{
        metamodel::{is_builtin_field, BUILTIN_LINK_FIELD},
        Item,
    },
};

/// Reverse links are generated by the authoring toolchain, never declared.
const BACKLINK_SUFFIX: &str = "_back";

/// Reports fields and links an item carries but its type does not declare.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckExtraOptions;

impl LocalRule for CheckExtraOptions {
    fn name(&self) -> &str {
        "check_extra_options"
    }

    fn check(
        &self,
        ctx: &CheckContext<'_>,
        item: &Item,
        log: &RuleLog<'_>,
    ) -> Result<(), RuleFault> {
        // unknown types are reported by `check_options`
        let Some(definition) = ctx.metamodel.types().get(item.kind()) else {
            return Ok(());
        };
        let link_fields = ctx.metamodel.link_fields();

        let extra = item.fields().filter(|(name, value)| {
            !value.is_empty()
                && !definition.declares(name)
                && !is_builtin_field(name)
                && *name != BUILTIN_LINK_FIELD
                && !name.ends_with(BACKLINK_SUFFIX)
        });

        for (name, _) in extra {
            let kind = if link_fields.contains(name) {
                "link"
            } else {
                "option"
            };
            log.for_field(
                item,
                name,
                format!("has undeclared {kind} `{name}` for type `{}`", item.kind()),
            );
        }

        Ok(())
    }
}

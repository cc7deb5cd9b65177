use crate::{
    checks::{CheckContext, LocalRule, RuleFault, RuleLog},
    domain::{FieldValue, Item, LinkTarget, Necessity, Pattern},
};

/// Checks declared fields and links of an item against its type.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions;

impl LocalRule for CheckOptions {
    fn name(&self) -> &str {
        "check_options"
    }

    fn check(
        &self,
        ctx: &CheckContext<'_>,
        item: &Item,
        log: &RuleLog<'_>,
    ) -> Result<(), RuleFault> {
        let Some(definition) = ctx.metamodel.types().get(item.kind()) else {
            log.for_item(item, format!("has unknown type `{}`", item.kind()));
            return Ok(());
        };

        for (name, pattern, necessity) in definition.fields() {
            check_field(item, name, pattern, necessity, log);
        }

        for (name, target, necessity) in definition.links() {
            check_link(item, name, target, necessity, log)?;
        }

        Ok(())
    }
}

fn check_field(item: &Item, name: &str, pattern: &Pattern, necessity: Necessity, log: &RuleLog<'_>) {
    let values = item.values_of(name).unwrap_or_default();
    if values.iter().all(|value| value.trim().is_empty()) {
        if necessity == Necessity::Mandatory {
            log.for_field(item, name, format!("is missing required option `{name}`"));
        }
        return;
    }

    for value in values {
        if !pattern.is_match(value) {
            log.for_value(
                item,
                name,
                value,
                format!("does not follow pattern `{pattern}`"),
            );
        }
    }
}

fn check_link(
    item: &Item,
    name: &str,
    target: &LinkTarget,
    necessity: Necessity,
    log: &RuleLog<'_>,
) -> Result<(), RuleFault> {
    let targets: &[String] = match item.field(name) {
        None => &[],
        Some(FieldValue::Links(targets)) => targets.as_slice(),
        Some(_) => {
            return Err(RuleFault::MalformedItem {
                item: item.id().to_string(),
                field: name.to_string(),
                reason: "link field was not postprocessed".to_string(),
            });
        }
    };

    if targets.is_empty() {
        if necessity == Necessity::Mandatory {
            log.for_field(item, name, format!("is missing required link `{name}`"));
        }
        return Ok(());
    }

    // Concrete targets are checked against the graph; pattern-only links can
    // only be checked by shape.
    if target.is_pattern_only() {
        for id in targets.iter().filter(|id| !target.matches_id(id)) {
            log.for_value(
                item,
                name,
                id,
                format!("does not match any of `{target}`"),
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::checks::{test_support::metamodel, ResultLog, Stage};

    const METAMODEL: &str = r#"
needs_types:
  comp:
    title: Component
    mandatory_options:
      status: "^(valid|draft)$"
    optional_options:
      tags: "^[a-z]+$"
    mandatory_links:
      implements: req
    optional_links:
      external: "^ext__.*$"
  req:
    title: Requirement
"#;

    fn check(item: &Item) -> ResultLog {
        let metamodel = metamodel(METAMODEL);
        let log = ResultLog::new();
        let ctx = CheckContext {
            metamodel: &metamodel,
        };
        CheckOptions
            .check(&ctx, item, &RuleLog::new(&log, "check_options", Stage::Enforced))
            .unwrap();
        log
    }

    fn valid() -> Item {
        Item::new("comp__engine", "comp")
            .with_field("status", "valid")
            .with_links("implements", ["req__speed"])
    }

    #[test]
    fn valid_item_passes() {
        assert_eq!(check(&valid()).warning_count(), 0);
    }

    #[test]
    fn missing_mandatory_link_is_one_warning() {
        let item = Item::new("comp__engine", "comp").with_field("status", "valid");
        let log = check(&item);

        assert_eq!(log.warning_count(), 1);
        let diagnostic = &log.diagnostics()[0];
        assert_eq!(diagnostic.field.as_deref(), Some("implements"));
    }

    #[test]
    fn empty_mandatory_link_counts_as_missing() {
        let item = valid().with_links("implements", Vec::<String>::new());
        assert_eq!(check(&item).warning_count(), 1);
    }

    #[test_case(None; "missing")]
    #[test_case(Some(""); "blank")]
    #[test_case(Some("obsolete"); "wrong pattern")]
    fn bad_mandatory_field(status: Option<&str>) {
        let mut item = Item::new("comp__engine", "comp").with_links("implements", ["req__speed"]);
        if let Some(status) = status {
            item.set_field("status", status);
        }
        let log = check(&item);

        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.diagnostics()[0].field.as_deref(), Some("status"));
    }

    #[test]
    fn id_must_follow_prefix_pattern() {
        let item = Item::new("COMP-1", "comp")
            .with_field("status", "valid")
            .with_links("implements", ["req__speed"]);
        let log = check(&item);

        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.diagnostics()[0].value.as_deref(), Some("COMP-1"));
    }

    #[test]
    fn every_list_element_is_matched() {
        let item = valid().with_field(
            "tags",
            vec!["ok".to_string(), "NotOk".to_string(), "BAD".to_string()],
        );
        assert_eq!(check(&item).warning_count(), 2);
    }

    #[test_case(&["ext__lib"], 0; "matching")]
    #[test_case(&["ext__lib", "lib"], 1; "one mismatch")]
    fn pattern_links_are_checked_by_shape(targets: &[&str], warnings: usize) {
        let item = valid().with_links("external", targets.iter().copied());
        assert_eq!(check(&item).warning_count(), warnings);
    }

    #[test]
    fn unknown_type_is_reported_once() {
        let log = check(&Item::new("X", "mystery"));
        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.diagnostics()[0].field, None);
    }

    #[test]
    fn raw_link_field_is_a_fault() {
        let metamodel = metamodel(METAMODEL);
        let log = ResultLog::new();
        let item = valid().with_field("implements", "req__speed");

        let fault = CheckOptions
            .check(
                &CheckContext {
                    metamodel: &metamodel,
                },
                &item,
                &RuleLog::new(&log, "check_options", Stage::Enforced),
            )
            .unwrap_err();

        assert!(matches!(fault, RuleFault::MalformedItem { field, .. } if field == "implements"));
    }
}

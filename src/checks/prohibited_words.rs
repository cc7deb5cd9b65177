use crate::{
    checks::{CheckContext, LocalRule, RuleFault, RuleLog},
    domain::Item,
};

/// Scans configured fields for prohibited terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckProhibitedWords;

impl LocalRule for CheckProhibitedWords {
    fn name(&self) -> &str {
        "check_prohibited_words"
    }

    fn check(
        &self,
        ctx: &CheckContext<'_>,
        item: &Item,
        log: &RuleLog<'_>,
    ) -> Result<(), RuleFault> {
        let checks = ctx
            .metamodel
            .prohibited_words()
            .iter()
            .filter(|check| check.applies_to(item.kind()));

        for check in checks {
            for (field, terms) in check.fields() {
                let Some(values) = item.values_of(field) else {
                    continue;
                };
                for value in values {
                    for found in terms.iter().filter_map(|term| term.find(value)) {
                        log.for_value(
                            item,
                            field,
                            found,
                            format!(
                                "contains prohibited word `{found}` (check `{}`)",
                                check.name()
                            ),
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::checks::{test_support::metamodel, ResultLog, Stage};

    const METAMODEL: &str = r"
needs_types:
  spec:
    title: Specification
  req:
    title: Requirement
prohibited_words_checks:
  todo:
    types: [spec]
    pattern: TODO
  weak:
    types: [req]
    title: [shall, must]
";

    fn check(item: &Item) -> ResultLog {
        let metamodel = metamodel(METAMODEL);
        let log = ResultLog::new();
        CheckProhibitedWords
            .check(
                &CheckContext {
                    metamodel: &metamodel,
                },
                item,
                &RuleLog::new(&log, "check_prohibited_words", Stage::Enforced),
            )
            .unwrap();
        log
    }

    #[test]
    fn todo_in_title_is_one_violation() {
        let item = Item::new("spec__x", "spec").with_field("title", "TODO write this");
        let log = check(&item);

        assert_eq!(log.warning_count(), 1);
        let diagnostic = &log.diagnostics()[0];
        assert_eq!(diagnostic.field.as_deref(), Some("title"));
        assert_eq!(diagnostic.value.as_deref(), Some("TODO"));
        assert!(diagnostic.message.contains("`todo`"));
    }

    #[test_case("todo: finish", 1; "case insensitive")]
    #[test_case("TODOs remain", 1; "inside a longer word")]
    #[test_case("nothing to see", 0; "absent")]
    fn matching_rules(content: &str, violations: usize) {
        let item = Item::new("spec__x", "spec").with_field("content", content);
        assert_eq!(check(&item).warning_count(), violations);
    }

    #[test_case("'TODO:'", "TODO: fix this", 1; "trailing colon")]
    #[test_case(r"'TBD\?'", "value TBD? later", 1; "escaped question mark")]
    #[test_case(r"'TBD\?'", "value TBD later", 0; "punctuation is required")]
    #[test_case("'#fixme'", "see #FIXME", 1; "leading punctuation")]
    fn patterns_match_as_written(pattern: &str, title: &str, violations: usize) {
        let yaml = format!(
            "
needs_types:
  spec:
    title: Specification
prohibited_words_checks:
  marker:
    types: [spec]
    fields: [title]
    pattern: {pattern}
"
        );
        let metamodel = metamodel(&yaml);
        let log = ResultLog::new();
        let item = Item::new("spec__x", "spec").with_field("title", title);
        CheckProhibitedWords
            .check(
                &CheckContext {
                    metamodel: &metamodel,
                },
                &item,
                &RuleLog::new(&log, "check_prohibited_words", Stage::Enforced),
            )
            .unwrap();

        assert_eq!(log.warning_count(), violations);
    }

    #[test_case("The system shall brake", 1; "whole word")]
    #[test_case("Marshall the fleet", 0; "inside a longer word")]
    fn word_lists_match_whole_words(title: &str, violations: usize) {
        let item = Item::new("req__x", "req").with_field("title", title);
        assert_eq!(check(&item).warning_count(), violations);
    }

    #[test]
    fn only_listed_types_are_scanned() {
        let item = Item::new("req__x", "req").with_field("title", "TODO");
        assert_eq!(check(&item).warning_count(), 0);
    }

    #[test]
    fn per_field_terms_only_scan_their_field() {
        let item = Item::new("req__x", "req")
            .with_field("title", "The system shall brake")
            .with_field("content", "It must stop");
        let log = check(&item);

        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.diagnostics()[0].value.as_deref(), Some("shall"));
    }
}

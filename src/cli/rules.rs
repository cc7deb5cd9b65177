use metamodel::{
    checks::{self, FilterError, RuleInfo, Stage},
    Config, RuleRegistry,
};

use super::terminal::Colorize;

/// Prints every available check with the phase it runs in and its rollout
/// stage under the given configuration.
pub fn run(config: &Config) -> anyhow::Result<()> {
    let rules = listing(&checks::builtin(), config)?;
    let width = rules.iter().map(|(rule, _)| rule.name.len()).max().unwrap_or(0);

    for (rule, enabled) in rules {
        let stage = match rule.stage {
            Stage::Enforced => rule.stage.to_string().failure(),
            Stage::New => rule.stage.to_string().info(),
        };

        let line = format!("{:<width$}  {:<5}  {stage}", rule.name, rule.kind.to_string());
        if enabled {
            println!("{line}");
        } else {
            println!("{}", format!("{line}  (disabled)").dim());
        }
    }
    Ok(())
}

/// Every rule with its effective stage, and whether the configured filter
/// enables it.
fn listing(
    registry: &RuleRegistry,
    config: &Config,
) -> Result<Vec<(RuleInfo, bool)>, FilterError> {
    let filter = registry.resolve_filter(&config.enabled_checks)?;

    Ok(registry
        .describe()
        .into_iter()
        .map(|mut rule| {
            if config.new_checks.contains(&rule.name) {
                rule.stage = Stage::New;
            }
            let enabled = filter.is_enabled(&rule.name);
            (rule, enabled)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled_checks: &str) -> Config {
        Config {
            enabled_checks: enabled_checks.to_string(),
            new_checks: ["check_options".to_string()].into(),
            ..Config::default()
        }
    }

    #[test]
    fn misspelled_check_is_rejected() {
        let error = listing(&checks::builtin(), &config("check_optoins")).unwrap_err();
        assert!(matches!(error, FilterError::UnknownRule { ref name, .. } if name == "check_optoins"));
    }

    #[test]
    fn filter_marks_enabled_rules() {
        let rules = listing(&checks::builtin(), &config(" check_options, check_dead_links ")).unwrap();

        let enabled: Vec<_> = rules
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(rule, _)| rule.name.as_str())
            .collect();
        assert_eq!(enabled, ["check_options", "check_dead_links"]);
    }

    #[test]
    fn configured_new_checks_are_demoted() {
        let rules = listing(&checks::builtin(), &config("")).unwrap();

        assert!(rules.iter().all(|(_, enabled)| *enabled));
        let options = rules.iter().find(|(rule, _)| rule.name == "check_options").unwrap();
        assert_eq!(options.0.stage, Stage::New);
    }
}

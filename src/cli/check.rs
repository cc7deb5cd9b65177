use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use metamodel::{
    checks::{self, Diagnostic, RunReport, Severity},
    schema,
    session::{RunSettings, Session},
    storage, Config,
};
use tracing::instrument;

use super::terminal::{is_narrow, severity_label, Colorize};

/// Exit code for a run with fatal findings.
const FAILURE_EXIT_CODE: i32 = 2;

#[derive(Debug, Default, clap::Parser)]
pub struct Command {
    /// Comma-separated checks to run, overriding the configuration
    #[arg(long, value_name = "CHECKS")]
    checks: Option<String>,

    /// Item snapshot file or directory, overriding the configuration
    #[arg(long, value_name = "PATH")]
    items: Option<PathBuf>,

    /// Run item checks on a single thread
    #[arg(long)]
    sequential: bool,

    /// Only print the summary
    #[arg(long, short)]
    quiet: bool,
}

impl Command {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, config: Config) -> anyhow::Result<()> {
        let spinner = spinner();

        spinner.set_message("Loading metamodel");
        let metamodel_text = storage::read_metamodel(&config.metamodel)?;
        let mut session = Session::new(checks::builtin());
        let settings = RunSettings {
            metamodel: &metamodel_text,
            enabled_checks: self.checks.as_deref().unwrap_or(&config.enabled_checks),
            new_checks: &config.new_checks,
            parallel: config.parallel && !self.sequential,
        };

        // depends on the metamodel alone
        let metamodel = session.metamodel(&settings)?;
        if let Some(path) = &config.schema_output {
            storage::write_json(path, &schema::emit(metamodel.types()))?;
        }

        let items_path = self.items.clone().unwrap_or_else(|| config.items.clone());
        spinner.set_message(format!("Loading items from {}", items_path.display()));
        let mut items = storage::load_items(&items_path)?;

        spinner.set_message(format!("Checking {} items", items.len()));
        let outcome = session
            .run(&settings, &mut items)
            .with_context(|| format!("checking {}", items_path.display()))?;
        spinner.finish_and_clear();

        let config_errors = outcome.metamodel.config_errors();
        if !config_errors.is_empty() {
            eprintln!(
                "{}",
                format!(
                    "{} metamodel configuration errors were ignored (run with -v for details)",
                    config_errors.len()
                )
                .warning()
            );
        }

        if !self.quiet {
            let narrow = is_narrow();
            for diagnostic in outcome.log.diagnostics() {
                print_diagnostic(&diagnostic, narrow);
            }
        }

        let summary = &outcome.summary;
        for (severity, line) in summary.lines() {
            let line = match severity {
                Some(Severity::Warning) => line.failure(),
                Some(Severity::Info) => line.info(),
                None => line.success(),
            };
            println!("{line}");
        }

        if let Some(path) = &config.report {
            storage::write_json(path, &RunReport::new(&outcome.log))?;
        }

        if summary.is_failure() {
            std::process::exit(FAILURE_EXIT_CODE);
        }
        Ok(())
    }
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_diagnostic(diagnostic: &Diagnostic, narrow: bool) {
    let label = severity_label(diagnostic.severity);
    if !narrow {
        println!("{label}: {diagnostic}");
        return;
    }

    let target = match &diagnostic.field {
        Some(field) => format!("{}.{field}", diagnostic.item),
        None => diagnostic.item.clone(),
    };
    println!("{label}: {target}");
    if let Some(location) = &diagnostic.location {
        println!("  {}", location.dim());
    }
    match &diagnostic.value {
        Some(value) => println!("  {value:?}: {}", diagnostic.message),
        None => println!("  {}", diagnostic.message),
    }
    println!("  {}", format!("[{}]", diagnostic.rule).dim());
}

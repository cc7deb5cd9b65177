use std::path::PathBuf;

use anyhow::Context;
use dialoguer::Confirm;
use metamodel::{schema, storage, Config};
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// Output file. Defaults to the configured schema output, or stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Overwrite an existing file without asking
    #[arg(long, short)]
    yes: bool,
}

impl Command {
    #[instrument(level = "debug", skip(config))]
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let metamodel = storage::load_metamodel(&config.metamodel)?;
        let schemas = schema::emit(metamodel.types());

        let Some(path) = self.output.or_else(|| config.schema_output.clone()) else {
            println!("{}", schemas.to_json_pretty()?);
            return Ok(());
        };

        if path.exists() && !self.yes {
            let overwrite = Confirm::new()
                .with_prompt(format!("{} exists. Overwrite?", path.display()))
                .default(false)
                .interact()
                .context("reading confirmation")?;
            if !overwrite {
                println!("Cancelled");
                std::process::exit(130);
            }
        }

        storage::write_json(&path, &schemas)?;
        println!(
            "{}",
            format!(
                "Wrote {} schemas to {}",
                schemas.schemas.len(),
                path.display()
            )
            .success()
        );
        Ok(())
    }
}

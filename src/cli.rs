use std::path::{Path, PathBuf};

mod check;
mod fields;
mod init;
mod rules;
mod schema;
mod terminal;

use clap::ArgAction;
use metamodel::Config;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The path to the configuration file
    #[arg(short, long, default_value = "metacheck.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Check(check::Command::default()))
            .run(&self.config)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Validate the items against the metamodel (default)
    Check(check::Command),

    /// Write the structural schemas derived from the metamodel
    Schema(schema::Command),

    /// List the available checks
    Rules,

    /// List custom fields and extra links declared by the metamodel
    Fields,

    /// Create a configuration file
    Init(init::Command),
}

impl Command {
    fn run(self, config_path: &Path) -> anyhow::Result<()> {
        match self {
            Self::Init(command) => command.run(config_path),
            Self::Check(command) => command.run(load_config(config_path)?),
            Self::Schema(command) => command.run(&load_config(config_path)?),
            Self::Rules => rules::run(&load_config(config_path)?),
            Self::Fields => fields::run(&load_config(config_path)?),
        }
    }
}

/// Loads the configuration, falling back to the defaults if the file does not
/// exist.
///
/// Paths in the configuration are relative to the file's directory.
fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = if path.exists() {
        Config::load(path).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?
    } else {
        tracing::debug!("No config file at {}, using defaults", path.display());
        Config::default()
    };

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(config.relative_to(base))
}

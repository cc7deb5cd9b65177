use std::{fs, path::Path};

use metamodel::Config;
use tracing::instrument;

use super::terminal::Colorize;

/// A small metamodel to start from.
const STARTER_METAMODEL: &str = r#"needs_types_base_options:
  optional_options:
    status: ^(draft|valid|obsolete)$

needs_types:
  req:
    title: Requirement
    prefix: REQ_
    optional_links:
      satisfies: req
  spec:
    title: Specification
    prefix: SPEC_
    mandatory_links:
      implements: req

needs_extra_links:
  satisfies:
    incoming: satisfied by
    outgoing: satisfies
  implements:
    incoming: implemented by
    outgoing: implements

prohibited_words_checks:
  weak_words:
    types: [req]
    title: [TODO, TBD]
"#;

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Also write a starter metamodel next to the configuration
    #[arg(long)]
    metamodel: bool,
}

impl Command {
    #[instrument]
    pub fn run(self, config_path: &Path) -> anyhow::Result<()> {
        if config_path.exists() && !self.force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", parent.display()))?;
        }

        let config = Config::default();
        config
            .save(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", config_path.display()))?;
        println!("{} {}", "Created:".success(), config_path.display());

        if self.metamodel {
            let base = config_path.parent().unwrap_or_else(|| Path::new(""));
            let metamodel_path = base.join(&config.metamodel);
            if metamodel_path.exists() && !self.force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    metamodel_path.display()
                );
            }
            fs::write(&metamodel_path, STARTER_METAMODEL).map_err(|e| {
                anyhow::anyhow!("Failed to create {}: {e}", metamodel_path.display())
            })?;
            println!("{} {}", "Created:".success(), metamodel_path.display());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use metamodel::storage;

    use super::*;

    fn command(force: bool, metamodel: bool) -> Command {
        Command { force, metamodel }
    }

    #[test]
    fn writes_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metacheck.toml");

        command(false, false).run(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), Config::default());
        assert!(!tmp.path().join("metamodel.yaml").exists());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metacheck.toml");
        fs::write(&path, "_version = \"1\"\nparallel = false\n").unwrap();

        assert!(command(false, false).run(&path).is_err());
        assert!(!Config::load(&path).unwrap().parallel);

        command(true, false).run(&path).unwrap();
        assert!(Config::load(&path).unwrap().parallel);
    }

    #[test]
    fn starter_metamodel_loads_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metacheck.toml");

        command(false, true).run(&path).unwrap();

        let metamodel = storage::load_metamodel(&tmp.path().join("metamodel.yaml")).unwrap();
        assert!(metamodel.config_errors().is_empty());
        assert_eq!(metamodel.types().len(), 2);
        assert_eq!(metamodel.extra_links().len(), 2);
    }
}

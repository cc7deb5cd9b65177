use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Configuration for a validation run.
///
/// This struct holds the locations of the metamodel and item snapshot, and
/// the settings that control which checks run and how their results are
/// reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Path to the metamodel YAML file.
    pub metamodel: PathBuf,

    /// Path to the item snapshot.
    ///
    /// Either a single JSON/YAML file or a directory of them.
    pub items: PathBuf,

    /// Comma-separated list of enabled checks.
    ///
    /// When empty, all checks are enabled.
    pub enabled_checks: String,

    /// Checks whose findings are reported as info rather than warnings.
    ///
    /// This is in addition to checks that are new by default. Listing a check
    /// here lets a project roll it out without breaking the build.
    pub new_checks: BTreeSet<String>,

    /// Where to write the structural schema artifact, if anywhere.
    pub schema_output: Option<PathBuf>,

    /// Where to write the run report, if anywhere.
    pub report: Option<PathBuf>,

    /// Whether item-local checks run in parallel.
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metamodel: default_metamodel(),
            items: default_items(),
            enabled_checks: String::new(),
            new_checks: BTreeSet::new(),
            schema_output: None,
            report: None,
            parallel: true,
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Resolves the configured paths against the directory holding the
    /// config file.
    #[must_use]
    pub fn relative_to(mut self, base: &Path) -> Self {
        self.metamodel = base.join(&self.metamodel);
        self.items = base.join(&self.items);
        self.schema_output = self.schema_output.map(|path| base.join(path));
        self.report = self.report.map(|path| base.join(path));
        self
    }
}

fn default_metamodel() -> PathBuf {
    PathBuf::from("metamodel.yaml")
}

fn default_items() -> PathBuf {
    PathBuf::from("needs.json")
}

const fn default_parallel() -> bool {
    true
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_metamodel")]
        metamodel: PathBuf,

        #[serde(default = "default_items")]
        items: PathBuf,

        #[serde(default, skip_serializing_if = "String::is_empty")]
        enabled_checks: String,

        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        new_checks: BTreeSet<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_output: Option<PathBuf>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        report: Option<PathBuf>,

        #[serde(default = "default_parallel")]
        parallel: bool,
    },
}

impl From<Versions> for super::Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                metamodel,
                items,
                enabled_checks,
                new_checks,
                schema_output,
                report,
                parallel,
            } => Self {
                metamodel,
                items,
                enabled_checks,
                new_checks,
                schema_output,
                report,
                parallel,
            },
        }
    }
}

impl From<super::Config> for Versions {
    fn from(config: super::Config) -> Self {
        Self::V1 {
            metamodel: config.metamodel,
            items: config.items,
            enabled_checks: config.enabled_checks,
            new_checks: config.new_checks,
            schema_output: config.schema_output,
            report: config.report,
            parallel: config.parallel,
        }
    }
}

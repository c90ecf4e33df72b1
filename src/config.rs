//! Configuration management for the relation migrator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (relations.toml)
//! - Environment variables (RELATIONS__*)
//!
//! ## Example config file (relations.toml):
//! ```toml
//! [corpus]
//! targets = ["./Metadata/MyModel"]
//! references = ["./PackagesLocalDirectory/ApplicationSuite"]
//!
//! [layout]
//! edt_dirs = ["AxEdt"]
//! table_dirs = ["AxTable", "AxTableExtension"]
//!
//! [output]
//! report_dir = "reports"
//! dry_run = false
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for a migration run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Corpus roots
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Directory names that hold each document kind
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Reports and write-back
    #[serde(default)]
    pub output: OutputConfig,
}

/// Corpus roots
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Roots that are read and rewritten
    #[serde(default)]
    pub targets: Vec<PathBuf>,

    /// Roots that are only read, to resolve ancestors
    #[serde(default)]
    pub references: Vec<PathBuf>,
}

/// Directory layout of a model root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Directories holding extended data type documents
    #[serde(default = "default_edt_dirs")]
    pub edt_dirs: Vec<String>,

    /// Directories holding table and table extension documents
    #[serde(default = "default_table_dirs")]
    pub table_dirs: Vec<String>,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where report files are written
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Compute and report without rewriting any document
    #[serde(default)]
    pub dry_run: bool,
}

// Default value functions
fn default_edt_dirs() -> Vec<String> {
    vec!["AxEdt".to_string()]
}

fn default_table_dirs() -> Vec<String> {
    vec!["AxTable".to_string(), "AxTableExtension".to_string()]
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            edt_dirs: default_edt_dirs(),
            table_dirs: default_table_dirs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            dry_run: false,
        }
    }
}

impl MigrationConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, with an optional explicit file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["relations.toml", ".relations.toml", "config/relations.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "relations", "relation-migrator") {
            let xdg_config = config_dir.config_dir().join("relations.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // RELATIONS__OUTPUT__DRY_RUN=true etc.
        builder = builder.add_source(
            Environment::with_prefix("RELATIONS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Is the document kind directory `name` one of the extended data type dirs?
    pub fn is_edt_dir(&self, name: &str) -> bool {
        self.layout.edt_dirs.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    pub fn is_table_dir(&self, name: &str) -> bool {
        self.layout.table_dirs.iter().any(|d| d.eq_ignore_ascii_case(name))
    }
}

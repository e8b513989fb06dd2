//! Configuration for the repository core
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (metarepo.toml)
//! - Environment variables (METAREPO_*)
//!
//! ## Example config file (metarepo.toml):
//! ```toml
//! [repository]
//! name = "production-metadata"
//! metadata_collection_id = "6f7c2b1e-repo"
//! instance_url_root = "https://metadata.example.org"
//!
//! [archives]
//! search_paths = ["./archives", "/usr/share/metarepo/archives"]
//!
//! [events]
//! protocol_version = "1.0"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the repository core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Local repository identity
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Archive ingestion settings
    #[serde(default)]
    pub archives: ArchiveConfig,

    /// Event distribution settings
    #[serde(default)]
    pub events: EventConfig,
}

/// Identity of the local repository within the federation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Human-readable repository name, used as the default source tag
    #[serde(default = "default_repository_name")]
    pub name: String,

    /// Metadata collection id that marks instances homed here
    #[serde(default = "default_metadata_collection_id")]
    pub metadata_collection_id: String,

    /// Root for minted instance URLs; no URLs are minted when unset
    #[serde(default)]
    pub instance_url_root: Option<String>,
}

/// Where to look for type archives at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_paths")]
    pub search_paths: Vec<PathBuf>,

    /// Refuse archives whose fingerprints do not verify
    #[serde(default = "default_true")]
    pub verify_fingerprints: bool,
}

/// Event distribution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

fn default_repository_name() -> String {
    "metarepo".to_string()
}

fn default_metadata_collection_id() -> String {
    // A stable placeholder; deployments set their own id
    "local".to_string()
}

fn default_archive_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("archives")]
}

fn default_true() -> bool {
    true
}

fn default_protocol_version() -> String {
    "1.0".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: default_repository_name(),
            metadata_collection_id: default_metadata_collection_id(),
            instance_url_root: None,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            search_paths: default_archive_paths(),
            verify_fingerprints: true,
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            protocol_version: default_protocol_version(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["metarepo.toml", ".metarepo.toml", "config/metarepo.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("org", "metarepo", "metarepo") {
            let xdg_config = config_dir.config_dir().join("metarepo.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Environment variables (METAREPO_*)
        builder = builder.add_source(
            Environment::with_prefix("METAREPO")
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
}

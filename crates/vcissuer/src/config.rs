use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vcissuer_status::{DEFAULT_CAPACITY, STATUS_LIST_CONTEXT};
use vcissuer_vault::blind_index::DEFAULT_INDEX_FAMILY;

use crate::error::{RootError, RootResult};

const SIGNATURE_REPRESENTATIONS: [&str; 2] = ["jws", "proofValue"];

/// Status list settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Slots per shard. Fixed once the deployment has allocated a slot.
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Context declared by credentials that carry a status reference.
    #[serde(default = "default_status_context")]
    pub context: String,
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

fn default_status_context() -> String {
    STATUS_LIST_CONTEXT.to_string()
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            context: default_status_context(),
        }
    }
}

/// Blind index settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Label MACed into the indexed attribute name.
    #[serde(default = "default_family")]
    pub family: String,
}

fn default_family() -> String {
    DEFAULT_INDEX_FAMILY.to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            family: default_family(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Proof representation for compose requests without a `proofFormat`.
    #[serde(default = "default_representation")]
    pub default_representation: String,
}

fn default_representation() -> String {
    "jws".to_string()
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            default_representation: default_representation(),
        }
    }
}

/// Top-level configuration, loaded from `~/.vcissuer/config.toml` by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    /// Directory holding the record database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Public base URL. Status shards are published under `<host_url>/status`.
    #[serde(default = "default_host_url")]
    pub host_url: String,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub signing: SigningConfig,
}

fn default_data_dir() -> PathBuf {
    dirs_or_default(".vcissuer")
}

fn default_host_url() -> String {
    "http://localhost:8070".to_string()
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            host_url: default_host_url(),
            status: StatusConfig::default(),
            index: IndexConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}

impl RootConfig {
    /// Load configuration from a TOML file. A missing file yields the
    /// default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> RootResult<()> {
        if !(self.host_url.starts_with("http://") || self.host_url.starts_with("https://")) {
            return Err(RootError::Config(format!(
                "host_url must start with http:// or https://, got '{}'",
                self.host_url
            )));
        }
        if self.status.capacity == 0 {
            return Err(RootError::Config("status.capacity must be > 0".into()));
        }
        if self.status.context.is_empty() {
            return Err(RootError::Config("status.context must not be empty".into()));
        }
        if self.index.family.is_empty() {
            return Err(RootError::Config("index.family must not be empty".into()));
        }
        if !SIGNATURE_REPRESENTATIONS.contains(&self.signing.default_representation.as_str()) {
            return Err(RootError::Config(format!(
                "signing.default_representation must be 'jws' or 'proofValue', got '{}'",
                self.signing.default_representation
            )));
        }
        Ok(())
    }

    /// Base URL of the status list shards.
    pub fn status_base_url(&self) -> String {
        format!("{}/status", self.host_url.trim_end_matches('/'))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("vcissuer.db")
    }

    /// Key material lives in its own database, never beside vault documents.
    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join("keys.db")
    }

    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".vcissuer/config.toml")
    }
}

// Association Configuration
//
// Defines engine tunables (window size, similarity threshold, cache TTL,
// refresh cadence), artifact locations, and the persisted user settings.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::AnamnesisError;

pub const MANUAL_INTERVENTION_FILE: &str = "manual-interventions.txt";
pub const INTERACTION_LOG_FILE: &str = "interaction-log.txt";
pub const ANON_TOKEN_FILE: &str = "token-anonymous.txt";
pub const TOKEN_SEQUENCE_FILE: &str = "token-sequence.txt";
pub const EMBEDDINGS_FILE: &str = "embeddings.txt";
pub const VISIT_DB_FILE: &str = "visits.db";
pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for AnamnesisError {
    fn from(err: ConfigError) -> Self {
        AnamnesisError::Config(err.to_string())
    }
}

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Directory holding every artifact (ledger, logs, dumps, embeddings, visit db)
    pub data_dir: PathBuf,

    /// Half-width of the co-occurrence window
    pub window_size: usize,

    /// Minimum cosine similarity for a resource to be recommended
    pub similarity_threshold: f32,

    /// Age after which a cached similarity is recomputed (in seconds)
    #[serde(with = "serde_duration")]
    pub cache_ttl: Duration,

    /// Maximum number of cached pair scores
    pub cache_capacity: usize,

    /// Interval between background model refreshes (in seconds)
    #[serde(with = "serde_duration")]
    pub refresh_interval: Duration,

    /// Maximum duration of a single refresh (in seconds)
    #[serde(with = "serde_duration")]
    pub refresh_timeout: Duration,

    /// Prefix artifact file names with `dev-`
    pub development: bool,

    /// Address of the HTTP surface
    pub api_addr: SocketAddr,

    /// Applications whose activation keeps the previous active resource
    pub ignored_apps: Vec<String>,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            window_size: 3,
            similarity_threshold: 0.6,
            cache_ttl: Duration::from_secs(300), // 5 minutes
            cache_capacity: 250_000,
            refresh_interval: Duration::from_secs(300), // 5 minutes
            refresh_timeout: Duration::from_secs(300),
            development: false,
            api_addr: ([127, 0, 0, 1], 3456).into(),
            ignored_apps: vec!["Anamnesis".to_string()],
        }
    }
}

/// Default data directory following the platform data-local convention
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("anamnesis")
}

impl AssociationConfig {
    /// Configuration rooted at a specific data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: AssociationConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ValidationError(
                "window_size must be at least 1".to_string(),
            ));
        }

        if !self.similarity_threshold.is_finite() {
            return Err(ConfigError::ValidationError(
                "similarity_threshold must be a finite number".to_string(),
            ));
        }

        if self.cache_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "cache_capacity must be at least 1".to_string(),
            ));
        }

        if self.refresh_interval < Duration::from_secs(1) {
            return Err(ConfigError::ValidationError(
                "refresh_interval must be at least 1 second".to_string(),
            ));
        }

        if self.refresh_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "refresh_timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }

    fn file_name(&self, name: &str) -> String {
        if self.development {
            format!("dev-{}", name)
        } else {
            name.to_string()
        }
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(self.file_name(name))
    }

    pub fn intervention_path(&self) -> PathBuf {
        self.artifact_path(MANUAL_INTERVENTION_FILE)
    }

    pub fn interaction_log_path(&self) -> PathBuf {
        self.artifact_path(INTERACTION_LOG_FILE)
    }

    pub fn anon_token_path(&self) -> PathBuf {
        self.artifact_path(ANON_TOKEN_FILE)
    }

    pub fn token_sequence_path(&self) -> PathBuf {
        self.artifact_path(TOKEN_SEQUENCE_FILE)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.artifact_path(EMBEDDINGS_FILE)
    }

    pub fn visit_db_path(&self) -> PathBuf {
        self.artifact_path(VISIT_DB_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.artifact_path(SETTINGS_FILE)
    }

    pub fn is_ignored_app(&self, app_name: &str) -> bool {
        self.ignored_apps.iter().any(|app| app == app_name)
    }
}

/// Persisted user preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Show recommendations when the active resource changes
    pub recommendations_enabled: bool,

    /// Include confirmed-dissimilar resources in the result list
    pub show_dissimilar: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            recommendations_enabled: true,
            show_dissimilar: false,
        }
    }
}

impl UserSettings {
    /// Load settings, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Persist settings as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        info!("Saved user settings to {:?}", path);
        Ok(())
    }
}

// Custom serde module for Duration (serialize/deserialize as seconds)
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

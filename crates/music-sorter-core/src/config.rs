use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub checkpoint: CheckpointConfig,
    pub fingerprint: FingerprintConfig,
    pub dedupe: DedupeConfig,
    pub target: TargetConfig,
    pub migration: MigrationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "music_library.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Files per catalog transaction.
    pub batch_size: usize,
    pub ignore_patterns: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            ignore_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Number of leading bytes fed into the partial hash.
    pub chunk_size_bytes: u64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupeConfig {
    /// Files smaller than this never take part in duplicate grouping.
    pub min_file_size_bytes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_path: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_path: "./organized".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub verify: bool,
    pub commit_every: usize,
    pub preview_limit: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            verify: true,
            commit_every: 10,
            preview_limit: 100,
        }
    }
}

/// Load `Config.toml` (optional) overlaid with `MUSIC_SORTER__SECTION__KEY` env vars.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("MUSIC_SORTER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

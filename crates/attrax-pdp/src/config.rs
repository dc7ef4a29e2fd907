use std::path::Path;

use serde::Deserialize;

use attrax_core::cache::CacheConfig;
use attrax_core::engine::EngineConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSettings,
    pub cache: CacheSettings,
    pub migration: MigrationSettings,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub traversal_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            traversal_limit: 256,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
        }
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self { page_size: 500 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| ConfigError::ParseToml(e.to_string()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ATTRAX_ENGINE_TRAVERSAL_LIMIT")
            && let Ok(n) = v.parse()
        {
            self.engine.traversal_limit = n;
        }
        if let Ok(v) = std::env::var("ATTRAX_CACHE_MAX_ENTRIES")
            && let Ok(n) = v.parse()
        {
            self.cache.max_entries = n;
        }
        if let Ok(v) = std::env::var("ATTRAX_MIGRATION_PAGE_SIZE")
            && let Ok(n) = v.parse()
        {
            self.migration.page_size = n;
        }
        if let Ok(v) = std::env::var("ATTRAX_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("ATTRAX_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.traversal_limit == 0 {
            return Err(ConfigError::Validation(
                "engine.traversal_limit must be non-zero".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Validation(
                "cache.max_entries must be non-zero".to_string(),
            ));
        }
        if self.migration.page_size == 0 {
            return Err(ConfigError::Validation(
                "migration.page_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            traversal_limit: self.engine.traversal_limit,
        }
    }

    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache.max_entries,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}

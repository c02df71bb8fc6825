//! `geoindex.toml` loading.
//!
//! Values come from the TOML file, then `GEOINDEX_ELASTIC_INDEX` and
//! `GEOINDEX_ELASTIC_URLS` (comma separated) override the search engine
//! settings so deployments can retarget an import without editing files.

use std::path::{Path, PathBuf};

use geoindex_importer_models::ImportConfig;
use geoindex_search::ElasticConfig;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "geoindex.toml";

/// Environment variable overriding `elastic_index`.
pub const ENV_ELASTIC_INDEX: &str = "GEOINDEX_ELASTIC_INDEX";

/// Environment variable overriding `elastic_urls`.
pub const ENV_ELASTIC_URLS: &str = "GEOINDEX_ELASTIC_URLS";

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`ImportConfig`].
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },

    /// A value is present but unusable.
    #[error("Invalid value for {key}: {message}")]
    Invalid {
        /// Offending key.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Reads the config file at `path`, falling back to defaults when it does
/// not exist, then applies environment overrides.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed, or if
/// the resulting configuration is invalid.
pub fn load(path: &Path) -> Result<ImportConfig, ConfigError> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        parse(&contents, path)?
    } else {
        log::info!("No config at {}, using defaults", path.display());
        ImportConfig::default()
    };

    apply_env(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

fn parse(contents: &str, path: &Path) -> Result<ImportConfig, ConfigError> {
    toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Applies the environment overrides using `lookup` to read variables.
pub fn apply_env(config: &mut ImportConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(index) = lookup(ENV_ELASTIC_INDEX).filter(|v| !v.trim().is_empty()) {
        config.elastic_index = index.trim().to_string();
    }

    if let Some(urls) = lookup(ENV_ELASTIC_URLS) {
        let urls: Vec<String> = urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToString::to_string)
            .collect();
        if !urls.is_empty() {
            config.elastic_urls = urls;
        }
    }
}

fn validate(config: &ImportConfig) -> Result<(), ConfigError> {
    if config.elastic_index.trim().is_empty() {
        return Err(ConfigError::Invalid {
            key: "elastic_index".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if config.elastic_urls.is_empty() {
        return Err(ConfigError::Invalid {
            key: "elastic_urls".to_string(),
            message: "at least one URL is required".to_string(),
        });
    }
    Ok(())
}

/// Builds the search client settings, reading the index settings document
/// when one is configured.
///
/// # Errors
///
/// Returns an error if the settings file cannot be read.
pub fn elastic_config(config: &ImportConfig) -> Result<ElasticConfig, ConfigError> {
    let settings = config
        .index_settings
        .as_deref()
        .map(read_settings)
        .transpose()?;

    Ok(ElasticConfig {
        urls: config.elastic_urls.clone(),
        index: config.elastic_index.clone(),
        settings,
    })
}

fn read_settings(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Resolves the config path: the explicit one if given, else
/// [`CONFIG_FILE`].
#[must_use]
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

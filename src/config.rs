use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_API_URL, DEFAULT_CACHE_EXPIRY_SECS, DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL,
    DEFAULT_PAGE_SIZE, DEFAULT_TOP_K, DEFAULT_WINDOW_SIZE,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Forum account
    pub email: String,
    pub password: String,
    pub api_url: String,

    // Feed walking and caching
    pub page_size: usize,
    pub cache_expiry: Duration,

    // Search
    pub top_k: usize,
    pub embedding_enabled: bool,
    pub embedding_api_url: String,
    pub embedding_api_key: Option<String>,
    pub embedding_model: String,

    // Post view
    pub window_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Forum account
            email: required_env("PIAZZA_EMAIL")?,
            password: required_env("PIAZZA_PASSWORD")?,
            api_url: env_or_default("PIAZZA_API_URL", DEFAULT_API_URL),

            // Feed walking and caching
            page_size: parse_env_usize("FEED_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            cache_expiry: Duration::from_secs(parse_env_u64(
                "CACHE_EXPIRY_SECS",
                DEFAULT_CACHE_EXPIRY_SECS,
            )?),

            // Search
            top_k: parse_env_usize("SEARCH_TOP_K", DEFAULT_TOP_K)?,
            embedding_enabled: parse_env_bool("EMBEDDING_ENABLED", true)?,
            embedding_api_url: env_or_default("EMBEDDING_API_URL", DEFAULT_EMBEDDING_URL),
            embedding_api_key: optional_env("EMBEDDING_API_KEY"),
            embedding_model: env_or_default("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),

            // Post view
            window_size: parse_env_usize("VIEWPORT_WINDOW", DEFAULT_WINDOW_SIZE)?,
        })
    }

    /// Configuration with defaults and placeholder credentials, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            email: "student@example.edu".to_string(),
            password: "hunter2".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            cache_expiry: Duration::from_secs(DEFAULT_CACHE_EXPIRY_SECS),
            top_k: DEFAULT_TOP_K,
            embedding_enabled: false,
            embedding_api_url: DEFAULT_EMBEDDING_URL.to_string(),
            embedding_api_key: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }

    /// Whether the semantic backend should be attempted at all.
    #[must_use]
    pub fn wants_embeddings(&self) -> bool {
        self.embedding_enabled && self.embedding_api_key.is_some()
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "PIAZZA_EMAIL".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "FEED_PAGE_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.cache_expiry.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "CACHE_EXPIRY_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SEARCH_TOP_K".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.window_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "VIEWPORT_WINDOW".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        validate_url("PIAZZA_API_URL", &self.api_url)?;
        validate_url("EMBEDDING_API_URL", &self.embedding_api_url)?;
        Ok(())
    }
}

fn validate_url(name: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("not a valid URL ({e})"),
        })
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

//! File/environment-backed configuration for a [`Collection`] deployment.
//!
//! [`crate::collection::CollectionOptions`] stays the plain, call-site
//! struct spec.md §6 describes; `ChunkStoreConfig` is the one layer above
//! it a deployment plausibly wants to source from a file or environment
//! variables rather than relitigating every `with_options` call, following
//! the teacher's `figment`+`toml` precedence (defaults < file < env).

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::CHUNK_SIZE;
use crate::pool::DEFAULT_POOL_CAPACITY;

/// Configuration errors, kept separate from [`crate::error::Error`] since
/// config loading happens before any collection exists to attach errors
/// to.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to merge or parse the configuration sources.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A loaded value failed [`ChunkStoreConfig::validate`].
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Deployment-wide defaults, loaded from a TOML file and/or
/// `CHUNKSTORE_`-prefixed environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkStoreConfig {
    /// Row slots per chunk. Recorded for operational visibility only: the
    /// store's addressing scheme fixes chunk size at compile time
    /// (`handle::CHUNK_SIZE`, spec.md §3), so [`Self::validate`] rejects a
    /// value that disagrees with it rather than applying it silently.
    pub chunk_size: u32,
    /// Default TTL vacuum sweep period, in seconds. Zero disables the
    /// background sweep (spec.md §6's `Vacuum` option).
    pub vacuum_interval_secs: u64,
    /// Default bounded capacity of a collection's transaction scratch
    /// pool (spec.md §5).
    pub pool_capacity: usize,
}

impl Default for ChunkStoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            vacuum_interval_secs: 0,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl ChunkStoreConfig {
    /// Loads configuration layered as defaults < `path` (if present) <
    /// `CHUNKSTORE_*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::ParseError`] if the merged sources don't
    /// deserialize into `Self`, or [`ConfigError::InvalidValue`] if
    /// [`Self::validate`] rejects the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CHUNKSTORE_"));

        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from an in-memory TOML string, defaults
    /// layered underneath. Used by tests and by callers embedding their
    /// config rather than reading it from disk.
    ///
    /// # Errors
    /// Returns [`ConfigError::ParseError`] on malformed TOML, or
    /// [`ConfigError::InvalidValue`] if [`Self::validate`] rejects the
    /// result.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the loaded configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] if `chunk_size` does not
    /// match the compiled-in [`CHUNK_SIZE`], or if `pool_capacity` is
    /// zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size != CHUNK_SIZE {
            return Err(ConfigError::InvalidValue {
                key: "chunk_size".to_string(),
                message: format!(
                    "value {} does not match the compiled-in chunk size {CHUNK_SIZE}; \
                     rebuild with a different handle::CHUNK_SIZE instead of overriding it here",
                    self.chunk_size
                ),
            });
        }
        if self.pool_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pool_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The configured vacuum period, or `None` if sweeping is disabled.
    #[must_use]
    pub fn vacuum_period(&self) -> Option<Duration> {
        (self.vacuum_interval_secs > 0).then(|| Duration::from_secs(self.vacuum_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate_cleanly() {
        assert!(ChunkStoreConfig::default().validate().is_ok());
    }

    #[test]
    fn mismatched_chunk_size_is_rejected() {
        let config = ChunkStoreConfig { chunk_size: 1024, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_pool_capacity_is_rejected() {
        let config = ChunkStoreConfig { pool_capacity: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_overrides_from_a_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "vacuum_interval_secs = 30").unwrap();
        writeln!(file, "pool_capacity = 64").unwrap();
        writeln!(file, "chunk_size = {CHUNK_SIZE}").unwrap();

        let config = ChunkStoreConfig::load(file.path()).unwrap();
        assert_eq!(config.vacuum_interval_secs, 30);
        assert_eq!(config.pool_capacity, 64);
        assert_eq!(config.vacuum_period(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ChunkStoreConfig::load("/nonexistent/path/chunkstore.toml").unwrap();
        assert_eq!(config.pool_capacity, DEFAULT_POOL_CAPACITY);
        assert_eq!(config.vacuum_period(), None);
    }

    #[test]
    fn from_toml_string_parses_a_partial_override() {
        let config = ChunkStoreConfig::from_toml("vacuum_interval_secs = 5").unwrap();
        assert_eq!(config.vacuum_interval_secs, 5);
        assert_eq!(config.pool_capacity, DEFAULT_POOL_CAPACITY);
    }
}

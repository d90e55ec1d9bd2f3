//! Configuration, loadable from TOML.
//!
//! Every section and field is optional; missing values take the defaults
//! below.
//!
//! ```toml
//! [pool]
//! sweep_delay_ms = 2000
//! idle_timeout_ms = 10000
//!
//! [comparison]
//! null_equals_empty = true
//! ignore_whitespace = false
//!
//! [logging]
//! level = "info"
//! ansi = true
//!
//! [storage]
//! compression_level = 3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use godb_model::{ComparisonConfig, TypeModel};

use crate::error::{SdkError, SdkResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GodbConfig {
    pub pool: PoolConfig,
    pub comparison: ComparisonConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

impl GodbConfig {
    pub fn from_toml_str(input: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// An empty type model using this configuration's text comparison.
    pub fn type_model(&self) -> TypeModel {
        TypeModel::new(self.comparison)
    }

    fn validate(&self) -> SdkResult<()> {
        if !(1..=22).contains(&self.storage.compression_level) {
            return Err(SdkError::InvalidConfig(format!(
                "storage.compression_level must be within 1..=22, got {}",
                self.storage.compression_level
            )));
        }
        if self.pool.idle_timeout_ms == 0 {
            return Err(SdkError::InvalidConfig(
                "pool.idle_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Idle-handle eviction timings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Quiet period after the last release before a sweep runs.
    pub sweep_delay_ms: u64,
    /// How long a handle must sit unborrowed before it is closed.
    pub idle_timeout_ms: u64,
}

impl PoolConfig {
    pub fn sweep_delay(&self) -> Duration {
        Duration::from_millis(self.sweep_delay_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sweep_delay_ms: 2_000,
            idle_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// A `tracing` filter directive, e.g. `"info"` or `"godb_merge=debug"`.
    pub level: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            ansi: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// zstd level for loose objects.
    pub compression_level: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression_level: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = GodbConfig::from_toml_str("").unwrap();
        assert_eq!(config, GodbConfig::default());
        assert_eq!(config.pool.sweep_delay(), Duration::from_secs(2));
        assert_eq!(config.pool.idle_timeout(), Duration::from_secs(10));
        assert!(config.comparison.null_equals_empty);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = GodbConfig::from_toml_str(
            r#"
            [pool]
            idle_timeout_ms = 500

            [comparison]
            ignore_whitespace = true
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.idle_timeout_ms, 500);
        assert_eq!(config.pool.sweep_delay_ms, 2_000);
        assert!(config.comparison.ignore_whitespace);
        assert!(config.comparison.null_equals_empty);
        assert_eq!(config.storage.compression_level, 3);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            GodbConfig::from_toml_str("[storage]\ncompression_level = 40"),
            Err(SdkError::InvalidConfig(_))
        ));
        assert!(matches!(
            GodbConfig::from_toml_str("[pool]\nidle_timeout_ms = \"soon\""),
            Err(SdkError::ConfigParse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("godb.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\nansi = false\n").unwrap();
        let config = GodbConfig::load(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.ansi);
    }
}

//! ECS configuration
//!
//! Loaded from JSON; every field has a default so an empty object is a
//! valid config.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest accepted `growth_factor`.
pub const MAX_GROWTH_FACTOR: f32 = 16.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    pub storage: StorageConfig,
    pub staging: StagingConfig,
}

/// Sizing of entity group columns and the persistent slot store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Rows allocated the first time a group grows.
    pub min_group_capacity: usize,
    /// Multiplier applied to a full group's capacity, in `(1, 16]`.
    pub growth_factor: f32,
    /// Slots per page of the persistent entity store (power of two).
    pub entity_page_size: usize,
}

/// Sizing of initializer staging segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub initial_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            min_group_capacity: 8,
            growth_factor: 1.5,
            entity_page_size: 1024,
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self { initial_bytes: 64 }
    }
}

impl StorageConfig {
    /// Capacity to grow to when a group holding `current` rows is full.
    pub fn next_capacity(&self, current: usize) -> usize {
        let scaled = (current as f64 * self.growth_factor as f64).ceil() as usize;
        scaled.max(current + 1).max(self.min_group_capacity)
    }
}

impl EcsConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded ecs config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let storage = &self.storage;
        if storage.min_group_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "storage.min_group_capacity",
                reason: "must be at least 1".into(),
            });
        }
        let factor = storage.growth_factor;
        if !factor.is_finite() || factor <= 1.0 || factor > MAX_GROWTH_FACTOR {
            return Err(ConfigError::Invalid {
                field: "storage.growth_factor",
                reason: format!("must be above 1.0 and at most {MAX_GROWTH_FACTOR}, got {factor}"),
            });
        }
        if !storage.entity_page_size.is_power_of_two() {
            return Err(ConfigError::Invalid {
                field: "storage.entity_page_size",
                reason: format!("must be a non-zero power of two, got {}", storage.entity_page_size),
            });
        }
        if self.staging.initial_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "staging.initial_bytes",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = EcsConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EcsConfig::default());
        assert_eq!(config.storage.min_group_capacity, 8);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config =
            EcsConfig::from_json_str(r#"{ "storage": { "entity_page_size": 64 } }"#).unwrap();
        assert_eq!(config.storage.entity_page_size, 64);
        assert_eq!(config.storage.growth_factor, 1.5);
        assert_eq!(config.staging.initial_bytes, 64);
    }

    #[test]
    fn rejects_bad_values() {
        let err = EcsConfig::from_json_str(r#"{ "storage": { "growth_factor": 1.0 } }"#);
        assert!(matches!(err, Err(ConfigError::Invalid { field: "storage.growth_factor", .. })));

        let err = EcsConfig::from_json_str(r#"{ "storage": { "growth_factor": 1e30 } }"#);
        assert!(matches!(err, Err(ConfigError::Invalid { field: "storage.growth_factor", .. })));

        let config = EcsConfig::from_json_str(r#"{ "storage": { "growth_factor": 16.0 } }"#).unwrap();
        assert_eq!(config.storage.next_capacity(8), 128);

        let err = EcsConfig::from_json_str(r#"{ "storage": { "entity_page_size": 100 } }"#);
        assert!(matches!(err, Err(ConfigError::Invalid { field: "storage.entity_page_size", .. })));

        assert!(matches!(EcsConfig::from_json_str("not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn growth_is_geometric_with_minimum() {
        let storage = StorageConfig::default();
        assert_eq!(storage.next_capacity(0), 8);
        assert_eq!(storage.next_capacity(8), 12);
        assert_eq!(storage.next_capacity(12), 18);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EcsConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}

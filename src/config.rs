// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::canonical_key;
use crate::integrity::MIN_FILE_SIZE;
use crate::route::{RouteOptions, TurnThresholds, DEFAULT_COVERAGE_KM};

/// Error which can occur when reading a [Config].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}: io: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings of a [Navigator](crate::Navigator), usually read from a JSON file.
///
/// Every field is optional; missing fields take their [default](Config::default) values.
///
/// ```
/// let config = cityroute::Config::from_json(r#"{"cities": ["Kraków"], "coverage_km": 0.5}"#)
///     .unwrap();
/// assert_eq!(config.cities, vec!["Kraków".to_string()]);
/// assert_eq!(config.min_file_size, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory with all city bundles and the POI store.
    /// A relative path in a config file is resolved against the file's directory.
    pub data_dir: PathBuf,

    /// Display names of supported cities.
    pub cities: Vec<String>,

    /// Max distance (in km) between a query coordinate and the nearest road.
    pub coverage_km: f64,

    /// Files smaller than this (in bytes) are considered corrupt.
    pub min_file_size: u64,

    pub turns: TurnThresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            cities: vec![
                "San Francisco".to_string(),
                "Paris".to_string(),
                "Tokyo".to_string(),
            ],
            coverage_km: DEFAULT_COVERAGE_KM,
            min_file_size: MIN_FILE_SIZE,
            turns: TurnThresholds::default(),
        }
    }
}

impl Config {
    /// Reads and validates a config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_json(&content)?;
        if config.data_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.data_dir = parent.join(&config.data_dir);
            }
        }

        log::debug!("read config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a config from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that thresholds are sensible and that city names are non-empty and unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !self.coverage_km.is_finite() || self.coverage_km <= 0.0 {
            return invalid(format!("coverage_km must be positive, got {}", self.coverage_km));
        }

        if !self.turns.is_valid() {
            return invalid("turn thresholds must be increasing and within 0..=180".to_string());
        }

        let mut seen = HashSet::new();
        for name in &self.cities {
            let key = canonical_key(name);
            if key.is_empty() {
                return invalid("empty city name".to_string());
            }
            if !seen.insert(key) {
                return invalid(format!("duplicate city: {name:?}"));
            }
        }

        Ok(())
    }

    pub fn route_options(&self) -> RouteOptions {
        RouteOptions {
            coverage_km: self.coverage_km,
            turns: self.turns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.route_options(), RouteOptions::default());
    }

    #[test]
    fn partial_turns() {
        let config = Config::from_json(r#"{"turns": {"straight": 10.0}}"#).unwrap();
        assert_eq!(config.turns.straight, 10.0);
        assert_eq!(config.turns.sharp, TurnThresholds::default().sharp);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            Config::from_json(r#"{"coverage_km": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{"cities": ["Paris", " paris "]}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{"cities": [""]}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{"turns": {"straight": 50.0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json("[1, 2]"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn relative_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cityroute.json");
        std::fs::write(&path, r#"{"data_dir": "bundles"}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, dir.path().join("bundles"));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/cityroute.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}

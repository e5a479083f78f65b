//! Store configuration module.
//!
//! This module provides configuration loading for rbkv from environment
//! variables.
//!
//! # Environment Variables
//!
//! - `RBKV_STORAGE`: Storage file used when no `--storage` argument is given
//! - `RBKV_DUPLICATE_KEYS`: `upsert` or `reject` (default: `upsert`)
//! - `RBKV_CREATE_PARENT_DIRS`: Create missing parent directories on `init`
//!   (default: `true`)

use std::path::PathBuf;

use crate::storage::DuplicatePolicy;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Default storage file path.
    pub storage_path: Option<PathBuf>,
    /// What `set` does with a key that already exists.
    pub duplicate_policy: DuplicatePolicy,
    /// Whether `init` creates missing parent directories.
    pub create_parent_dirs: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            duplicate_policy: DuplicatePolicy::Upsert,
            create_parent_dirs: true,
        }
    }
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl StoreConfig {
    pub const STORAGE_VAR: &'static str = "RBKV_STORAGE";
    pub const DUPLICATE_KEYS_VAR: &'static str = "RBKV_DUPLICATE_KEYS";
    pub const CREATE_PARENT_DIRS_VAR: &'static str = "RBKV_CREATE_PARENT_DIRS";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `RBKV_DUPLICATE_KEYS` or `RBKV_CREATE_PARENT_DIRS`
    /// is set to an unrecognized value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let storage_path = lookup(Self::STORAGE_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let duplicate_policy = match lookup(Self::DUPLICATE_KEYS_VAR) {
            Some(value) => value
                .parse::<DuplicatePolicy>()
                .map_err(|message| ConfigError::InvalidValue {
                    name: Self::DUPLICATE_KEYS_VAR.to_string(),
                    message,
                })?,
            None => defaults.duplicate_policy,
        };

        let create_parent_dirs = match lookup(Self::CREATE_PARENT_DIRS_VAR) {
            Some(value) => parse_bool(Self::CREATE_PARENT_DIRS_VAR, &value)?,
            None => defaults.create_parent_dirs,
        };

        Ok(Self {
            storage_path,
            duplicate_policy,
            create_parent_dirs,
        })
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = StoreConfig::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Upsert);
        assert!(config.create_parent_dirs);
        assert_eq!(config.storage_path, None);
    }

    #[test]
    fn test_values_from_environment() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("RBKV_STORAGE", "/tmp/store.rbkv"),
            ("RBKV_DUPLICATE_KEYS", "reject"),
            ("RBKV_CREATE_PARENT_DIRS", "0"),
        ]))
        .expect("config");

        assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/store.rbkv")));
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
        assert!(!config.create_parent_dirs);
    }

    #[test]
    fn test_empty_storage_is_unset() {
        let config =
            StoreConfig::from_lookup(lookup_from(&[("RBKV_STORAGE", "")])).expect("config");
        assert_eq!(config.storage_path, None);
    }

    #[test]
    fn test_invalid_values() {
        let error = StoreConfig::from_lookup(lookup_from(&[("RBKV_DUPLICATE_KEYS", "merge")]))
            .expect_err("invalid policy");
        assert!(matches!(error, ConfigError::InvalidValue { ref name, .. } if name == "RBKV_DUPLICATE_KEYS"));

        let error = StoreConfig::from_lookup(lookup_from(&[("RBKV_CREATE_PARENT_DIRS", "maybe")]))
            .expect_err("invalid bool");
        assert_eq!(
            error.to_string(),
            "invalid value for RBKV_CREATE_PARENT_DIRS: 'maybe' is not a boolean"
        );
    }
}

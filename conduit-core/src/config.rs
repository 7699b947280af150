//! Runtime configuration.
//!
//! A [`Config`] travels with a [`Store`](crate::store::Store) and is read by
//! the synchronization primitives created against it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of consecutive forced renders tolerated before a render
/// loop is reported.
pub const DEFAULT_NESTED_RENDER_LIMIT: u32 = 50;

/// Tunables shared by a store and every binding created against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many forced updates may be requested in a row by a single
    /// snapshot instance without the snapshot settling.
    pub nested_render_limit: u32,

    /// Read every snapshot twice during render and report getters that
    /// return a fresh value on each call.
    pub check_snapshot_caching: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nested_render_limit: DEFAULT_NESTED_RENDER_LIMIT,
            check_snapshot_caching: cfg!(debug_assertions),
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = Config::from_json(r#"{ "nested_render_limit": 5 }"#).unwrap();
        assert_eq!(config.nested_render_limit, 5);
        assert_eq!(
            config.check_snapshot_caching,
            Config::default().check_snapshot_caching
        );
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = Config::from_json("{ nope").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

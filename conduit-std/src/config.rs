//! Bus configuration.
//!
//! Values are layered with `figment`, lowest to highest priority:
//!
//! 1. Built-in defaults
//! 2. Environment variables (`CONDUIT_*`)
//!
//! - `CONDUIT_MAX_DISPATCH_DEPTH=20` → `max_dispatch_depth = 20`
//! - `CONDUIT_CATCH_HANDLER_PANICS=false` → `catch_handler_panics = false`
//!
//! Callers with their own sources can merge onto [`BusConfig::figment`] and
//! extract with [`BusConfig::from_figment`].

use crate::guard::DEFAULT_MAX_DEPTH;
use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CONDUIT_";

/// Tunables for an [`EventBus`](crate::bus::EventBus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum nesting of `send` calls on one call-flow.
    pub max_dispatch_depth: usize,
    /// Isolate handler panics during fan-out like handler errors.
    pub catch_handler_panics: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_dispatch_depth: DEFAULT_MAX_DEPTH,
            catch_handler_panics: true,
        }
    }
}

impl BusConfig {
    /// Defaults overlaid with `CONDUIT_*` environment variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load from defaults and the environment, then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment())
    }

    /// Extract from an arbitrary figment, then validate.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_dispatch_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_dispatch_depth must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the schema.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_environment() {
        Jail::expect_with(|_jail| {
            assert_eq!(BusConfig::from_env().unwrap(), BusConfig::default());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("CONDUIT_MAX_DISPATCH_DEPTH", "7");
            jail.set_env("CONDUIT_CATCH_HANDLER_PANICS", "false");

            let config = BusConfig::from_env().unwrap();
            assert_eq!(config.max_dispatch_depth, 7);
            assert!(!config.catch_handler_panics);
            Ok(())
        });
    }

    #[test]
    fn zero_depth_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("CONDUIT_MAX_DISPATCH_DEPTH", "0");
            assert!(matches!(BusConfig::from_env(), Err(ConfigError::Invalid(_))));
            Ok(())
        });
    }

    #[test]
    fn malformed_values_fail_to_load() {
        Jail::expect_with(|jail| {
            jail.set_env("CONDUIT_MAX_DISPATCH_DEPTH", "many");
            assert!(matches!(BusConfig::from_env(), Err(ConfigError::Load(_))));
            Ok(())
        });
    }
}

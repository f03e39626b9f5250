//! Registry configuration.
//!
//! Values are merged, later sources overriding earlier ones, from:
//! 1. the defaults of [RegistryConfig],
//! 2. an optional TOML file,
//! 3. environment variables prefixed with `LAZY_REGISTRY_` (nested keys separated by `__`,
//!    e.g. `LAZY_REGISTRY_LOCATOR__SUFFIX=.js`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default bound on a single remote load
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 5000;

/// Prefix of the environment variables read by [ConfigLoader]
pub const ENV_PREFIX: &str = "LAZY_REGISTRY_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Time allowed to fetch the source of a single object, in milliseconds
    pub load_timeout_ms: u64,
    pub locator: LocatorConfig,
    /// Root directory of the default file loader
    pub base_dir: PathBuf,
    pub logging: LoggingConfig,
}

impl RegistryConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
            locator: LocatorConfig::default(),
            base_dir: PathBuf::from("."),
            logging: LoggingConfig::default(),
        }
    }
}

/// Mapping of object names to locators: `{prefix}{name}{suffix}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub prefix: String,
    pub suffix: String,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: ".mod".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Loads a [RegistryConfig] from defaults, a TOML file and the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn load(&self) -> Result<RegistryConfig, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(RegistryConfig::default()));

        if let Some(path) = &self.config_path {
            if path.exists() {
                tracing::info!(path = %path.display(), "configuration loaded");
                figment = figment.merge(Toml::file(path));
            } else {
                tracing::warn!(path = %path.display(), "configuration file not found");
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().map_err(|e| ConfigError::Extract(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = RegistryConfig::default();
        assert_eq!(config.load_timeout(), Duration::from_secs(5));
        assert_eq!(config.locator.suffix, ".mod");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn toml_file_and_environment_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "registry.toml",
                r#"
                load_timeout_ms = 250

                [locator]
                prefix = "js/"
                suffix = ".js"
                "#,
            )?;
            jail.set_env("LAZY_REGISTRY_LOGGING__LEVEL", "debug");

            let config = ConfigLoader::new()
                .with_config_path("registry.toml")
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.load_timeout_ms, 250);
            assert_eq!(config.locator.prefix, "js/");
            assert_eq!(config.locator.suffix, ".js");
            assert_eq!(config.logging.level, "debug");
            Ok(())
        });
    }

    #[test]
    fn missing_file_keeps_defaults() {
        figment::Jail::expect_with(|_| {
            let config = ConfigLoader::new()
                .with_config_path("nowhere.toml")
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config, RegistryConfig::default());
            Ok(())
        });
    }
}

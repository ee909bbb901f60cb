//! Layered configuration
//!
//! Sources, highest priority first:
//! 1. Environment variables (`ADDONSMITH_*`, `__` separates sections)
//! 2. `./addonsmith.toml`
//! 3. `~/.config/addonsmith/config.toml`
//! 4. Built-in defaults
//!
//! `ADDONSMITH_BACKEND__API_KEY` maps to `backend.api_key`, and so on.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::request::{parse_version, SUPPORTED_VERSIONS};

pub const ENV_PREFIX: &str = "ADDONSMITH_";
pub const LOCAL_CONFIG_FILE: &str = "addonsmith.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Figment(Box::new(e))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Grounding, critique and other light calls.
    #[serde(default = "default_text_model")]
    pub text_model: String,
    /// Structured add-on content generation.
    #[serde(default = "default_content_model")]
    pub content_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
}

fn default_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".into() }
fn default_text_model() -> String { "gemini-2.5-flash".into() }
fn default_content_model() -> String { "gemini-2.5-pro".into() }
fn default_image_model() -> String { "gemini-2.5-flash-image".into() }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            text_model: default_text_model(),
            content_model: default_content_model(),
            image_model: default_image_model(),
        }
    }
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory holding the saved collection. Defaults to the user data dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("addonsmith")
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    #[serde(default = "default_version_tag")]
    pub default_version: String,
    /// Surface the pipeline's diagnostic trail (e.g. critique failures).
    #[serde(default)]
    pub debug: bool,
}

fn default_version_tag() -> String { SUPPORTED_VERSIONS[0].to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { default_version: default_version_tag(), debug: false }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AddonConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

impl AddonConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.check()?;
        Ok(config)
    }

    /// Load with an explicit config file layered over the defaults, below env.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.check()?;
        Ok(config)
    }

    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global) = Self::global_config_path() {
            if global.exists() {
                figment = figment.merge(Toml::file(global));
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            figment = figment.merge(Toml::file(local));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("addonsmith").join("config.toml"))
    }

    fn check(&self) -> Result<(), ConfigError> {
        parse_version(&self.general.default_version).map_err(|e| ConfigError::InvalidValue {
            field: "general.default_version".into(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = AddonConfig::default();
        assert!(!config.backend.is_configured());
        assert_eq!(config.backend.text_model, "gemini-2.5-flash");
        assert_eq!(config.general.default_version, "1.21.120");
        assert!(!config.general.debug);
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                LOCAL_CONFIG_FILE,
                r#"
                [backend]
                api_key = "from-file"
                image_model = "custom-image"

                [general]
                default_version = "1.20.80"
                "#,
            )?;
            jail.set_env("ADDONSMITH_BACKEND__API_KEY", "from-env");

            let config: AddonConfig = AddonConfig::figment().extract()?;
            assert_eq!(config.backend.api_key, "from-env");
            assert_eq!(config.backend.image_model, "custom-image");
            assert_eq!(config.general.default_version, "1.20.80");
            Ok(())
        });
    }

    #[test]
    fn test_rejects_bad_default_version() {
        Jail::expect_with(|jail| {
            jail.set_env("ADDONSMITH_GENERAL__DEFAULT_VERSION", "latest");
            assert!(matches!(AddonConfig::load(), Err(ConfigError::InvalidValue { .. })));
            Ok(())
        });
    }
}

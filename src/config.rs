//! Startup configuration: the bot token and the operator identity.
//!
//! Values come from `photobind.toml` (path overridable through
//! `PHOTOBIND_CONFIG`) with environment overrides for the token and the
//! operator id. Startup fails when either required value is missing.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_PATH_ENV: &str = "PHOTOBIND_CONFIG";
const BOT_TOKEN_ENV: &str = "PHOTOBIND_BOT_TOKEN";
const OPERATOR_ID_ENV: &str = "PHOTOBIND_OPERATOR_ID";
const DEFAULT_CONFIG_PATH: &str = "photobind.toml";
const DEFAULT_STAGING_DIR: &str = "staging";

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    bot_token: Option<String>,
    #[serde(default)]
    operator_id: Option<i64>,
    #[serde(default)]
    staging_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub operator_id: i64,
    pub staging_dir: PathBuf,
}

impl Config {
    /// Loads configuration from the default path and the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let file = Self::read_file(&path)?;
        Self::from_parts(
            file,
            std::env::var(BOT_TOKEN_ENV).ok(),
            std::env::var(OPERATOR_ID_ENV).ok(),
        )
    }

    fn read_file(path: &Path) -> Result<ConfigFile> {
        if !path.exists() {
            return Ok(ConfigFile::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn from_parts(
        file: ConfigFile,
        token_env: Option<String>,
        operator_env: Option<String>,
    ) -> Result<Self> {
        let bot_token = token_env
            .filter(|token| !token.trim().is_empty())
            .or(file.bot_token)
            .filter(|token| !token.trim().is_empty())
            .with_context(|| {
                format!("Bot token is not configured; set bot_token in {DEFAULT_CONFIG_PATH} or {BOT_TOKEN_ENV}")
            })?;

        let operator_id = match operator_env {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("Invalid {OPERATOR_ID_ENV} value: {raw}"))?,
            None => file.operator_id.with_context(|| {
                format!("Operator id is not configured; set operator_id in {DEFAULT_CONFIG_PATH} or {OPERATOR_ID_ENV}")
            })?,
        };

        let staging_dir = file
            .staging_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STAGING_DIR));

        Ok(Self {
            bot_token,
            operator_id,
            staging_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(toml: &str) -> ConfigFile {
        toml::from_str(toml).expect("config toml should parse")
    }

    #[test]
    fn file_values_are_enough() {
        let config = Config::from_parts(
            file("bot_token = \"t0k3n\"\noperator_id = 42\nstaging_dir = \"/tmp/stage\""),
            None,
            None,
        )
        .expect("config should load");

        assert_eq!(config.bot_token, "t0k3n");
        assert_eq!(config.operator_id, 42);
        assert_eq!(config.staging_dir, PathBuf::from("/tmp/stage"));
    }

    #[test]
    fn environment_overrides_the_file() {
        let config = Config::from_parts(
            file("bot_token = \"from-file\"\noperator_id = 42"),
            Some("from-env".to_string()),
            Some("7".to_string()),
        )
        .expect("config should load");

        assert_eq!(config.bot_token, "from-env");
        assert_eq!(config.operator_id, 7);
    }

    #[test]
    fn staging_dir_defaults_when_unset() {
        let config = Config::from_parts(
            file("bot_token = \"t\"\noperator_id = 1"),
            None,
            None,
        )
        .expect("config should load");
        assert_eq!(config.staging_dir, PathBuf::from(DEFAULT_STAGING_DIR));
    }

    #[test]
    fn missing_token_is_fatal() {
        let result = Config::from_parts(file("operator_id = 42"), None, None);
        assert!(result.is_err());

        let blank = Config::from_parts(
            file("bot_token = \"  \"\noperator_id = 42"),
            None,
            None,
        );
        assert!(blank.is_err());
    }

    #[test]
    fn missing_or_invalid_operator_id_is_fatal() {
        let missing = Config::from_parts(file("bot_token = \"t\""), None, None);
        assert!(missing.is_err());

        let invalid = Config::from_parts(
            file("bot_token = \"t\""),
            None,
            Some("not-a-number".to_string()),
        );
        assert!(invalid.is_err());
    }

    #[test]
    fn absent_config_file_yields_empty_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = Config::read_file(&dir.path().join("missing.toml")).expect("read");
        assert!(loaded.bot_token.is_none());
        assert!(loaded.operator_id.is_none());
    }
}

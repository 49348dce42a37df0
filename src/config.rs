// Runtime configuration
//
// Every setting comes from an environment variable (after `.env` is loaded)
// and falls back to a default when unset or blank.

use crate::ai::gemini_client::{DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::ai::CatalogMode;
use crate::error::ConfigError;
use crate::search::DEFAULT_MIN_DISPLAY;
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub mode: CatalogMode,
    pub model: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub min_display: Duration,
    pub request_timeout: Duration,
    pub catalog_path: Option<PathBuf>,
    pub use_keychain: bool,
    pub ui_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([127, 0, 0, 1]),
            port: 8384,
            mode: CatalogMode::Catalog,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            min_display: DEFAULT_MIN_DISPLAY,
            request_timeout: Duration::from_secs(30),
            catalog_path: None,
            use_keychain: true,
            ui_dir: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match get("LIBRARIAN_MODE") {
            Some(value) => CatalogMode::parse(&value).ok_or(ConfigError::Invalid {
                key: "LIBRARIAN_MODE",
                value,
            })?,
            None => defaults.mode,
        };

        Ok(Self {
            bind: parse_or(get("LIBRARIAN_BIND"), "LIBRARIAN_BIND", defaults.bind)?,
            port: parse_or(get("LIBRARIAN_PORT"), "LIBRARIAN_PORT", defaults.port)?,
            mode,
            model: get("LIBRARIAN_MODEL").unwrap_or(defaults.model),
            api_base: get("LIBRARIAN_API_BASE").unwrap_or(defaults.api_base),
            api_key: get("GEMINI_API_KEY").or_else(|| get("API_KEY")),
            min_display: Duration::from_millis(parse_or(
                get("LIBRARIAN_MIN_DISPLAY_MS"),
                "LIBRARIAN_MIN_DISPLAY_MS",
                defaults.min_display.as_millis() as u64,
            )?),
            request_timeout: Duration::from_secs(parse_nonzero(
                get("LIBRARIAN_TIMEOUT_SECS"),
                "LIBRARIAN_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            catalog_path: get("LIBRARIAN_CATALOG_PATH").map(PathBuf::from),
            use_keychain: parse_bool(get("LIBRARIAN_USE_KEYCHAIN"), "LIBRARIAN_USE_KEYCHAIN", defaults.use_keychain)?,
            ui_dir: get("LIBRARIAN_UI_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match value {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Like `parse_or`, but zero is rejected
fn parse_nonzero(value: Option<String>, key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = value.clone();
    match parse_or(value, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: raw.unwrap_or_default(),
        }),
        n => Ok(n),
    }
}

fn parse_bool(value: Option<String>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

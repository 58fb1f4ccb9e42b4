use calpresence_core::config::TrackerConfig;
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const CONFIG_FILE: &str = "calpresence.toml";

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Zone used for display and for items that name no zone
    pub default_timezone: String,
    /// `tracing` filter directive when RUST_LOG is unset
    pub log_filter: String,
    pub json_logs: bool,
    pub tracker: TrackerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timezone: detect_system_timezone(),
            log_filter: "info".to_string(),
            json_logs: false,
            tracker: TrackerConfig::default(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, figment::Error> {
        Self::from_file(CONFIG_FILE)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CALPRESENCE_").split("__"))
            .extract()?;
        if config.tracker.default_timezone.is_none() {
            config.tracker.default_timezone = Some(config.default_timezone.clone());
        }
        Ok(config)
    }

    pub fn default_zone(&self) -> Tz {
        Tz::from_str(&self.default_timezone).unwrap_or(chrono_tz::UTC)
    }
}

/// Detects the system timezone, falling back to UTC if detection fails
pub fn detect_system_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if Tz::from_str(&tz).is_ok() {
            return tz;
        }
    }

    if let Ok(tz) = iana_time_zone::get_timezone() {
        if Tz::from_str(&tz).is_ok() {
            return tz;
        }
    }

    "UTC".to_string()
}

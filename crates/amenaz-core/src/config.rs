//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend URL, where the city list comes from, and the
//! last used account email.
//!
//! Configuration is stored at `~/.config/amenaz/config.json`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "amenaz";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when nothing is configured
const DEFAULT_API_URL: &str = "http://localhost:3000/api/";

const ENV_API_URL: &str = "AMENAZ_API_URL";
const ENV_CITY_SOURCE: &str = "AMENAZ_CITY_SOURCE";

/// Where the registry gets its cities from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitySource {
    /// Built-in list with pre-seeded layers
    Static,
    /// `data/getlocations`, cached under `cities`
    #[default]
    Backend,
}

impl FromStr for CitySource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(CitySource::Static),
            "backend" => Ok(CitySource::Backend),
            other => Err(anyhow::anyhow!(
                "Unknown city source '{}' (expected 'static' or 'backend')",
                other
            )),
        }
    }
}

impl fmt::Display for CitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CitySource::Static => write!(f, "static"),
            CitySource::Backend => write!(f, "backend"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub city_source: CitySource,
    #[serde(default)]
    pub last_email: Option<String>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            city_source: CitySource::default(),
            last_email: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `AMENAZ_API_URL` and `AMENAZ_CITY_SOURCE` if set
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_CITY_SOURCE).ok(),
        );
    }

    fn apply_overrides(&mut self, api_url: Option<String>, city_source: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(source) = city_source {
            match source.parse() {
                Ok(source) => self.city_source = source,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_CITY_SOURCE),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

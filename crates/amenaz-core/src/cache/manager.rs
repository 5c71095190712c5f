use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::geo::GeoData;
use crate::models::CityRecord;

/// Key holding the city list snapshot
pub const CITIES_KEY: &str = "cities";

/// Key holding the layer descriptors of one city
pub fn city_layers_key(city_id: i64) -> String {
    format!("cityLayers-id{}", city_id)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Device-local key/value store for downloaded map data.
///
/// Each key is one JSON file. Entries never expire; they are replaced on the
/// next successful download or removed by [`CacheManager::clear`].
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Map a cache key to a file name. Layer names can contain spaces and
    /// accents, so anything outside `[A-Za-z0-9._-]` becomes `_`.
    fn file_name(key: &str) -> String {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}.json", safe)
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(Self::file_name(key))
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache entry: {}", key))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache entry: {}", key))?;

        Ok(Some(cached))
    }

    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let path = self.cache_path(key);
        let contents = serde_json::to_string(&cached)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write cache entry: {}", key))?;
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache_path(key).exists()
    }

    /// Remove every cache entry, returning how many were deleted
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }
        debug!(removed, "Cache cleared");
        Ok(removed)
    }

    // ===== Cities =====

    pub fn load_cities(&self) -> Result<Option<CachedData<Vec<CityRecord>>>> {
        self.load(CITIES_KEY)
    }

    pub fn save_cities(&self, cities: &[CityRecord]) -> Result<()> {
        self.save(CITIES_KEY, &cities)
    }

    // ===== City layer descriptors =====

    pub fn load_city_layers(&self, city_id: i64) -> Result<Option<CachedData<Vec<Value>>>> {
        self.load(&city_layers_key(city_id))
    }

    pub fn save_city_layers(&self, city_id: i64, layers: &[Value]) -> Result<()> {
        self.save(&city_layers_key(city_id), &layers)
    }

    // ===== Layer geo data =====

    pub fn load_layer(&self, query_name: &str) -> Result<Option<CachedData<GeoData>>> {
        self.load(query_name)
    }

    pub fn save_layer(&self, query_name: &str, data: &GeoData) -> Result<()> {
        self.save(query_name, data)
    }

    // ===== Cache Age Information =====

    /// Human-readable age of an entry, or `None` if it is missing or unreadable
    pub fn entry_age(&self, key: &str) -> Option<String> {
        match self.load::<IgnoredAny>(key) {
            Ok(Some(cached)) => Some(cached.age_display()),
            Ok(None) => None,
            Err(e) => {
                debug!(cache = key, error = %e, "Failed to load cache for age display");
                None
            }
        }
    }
}

//! Application state for the amenaz command line.
//!
//! `App` ties together config, session and the map registry, and implements
//! the commands exposed by `main`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use amenaz_core::auth::{Session, SessionData};
use amenaz_core::cache::CITIES_KEY;
use amenaz_core::render::render_layer;
use amenaz_core::search::NominatimGeocoder;
use amenaz_core::{ApiClient, CacheManager, CitySource, Config, MapContext, MapEvent};

/// Cache subdirectory for map data, next to the session file
const DATA_DIR: &str = "data";

/// Environment variable with a token to use instead of the stored session
const ENV_TOKEN: &str = "AMENAZ_TOKEN";

pub struct App {
    config: Config,
    session: Session,
    cache_dir: PathBuf,
}

impl App {
    pub fn new() -> Result<Self> {
        let mut config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        config.apply_env_overrides();
        debug!(api_url = %config.api_url, source = %config.city_source, "Config loaded");

        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
        debug!(?cache_dir, "Cache directory configured");

        let mut session = Session::new(cache_dir.clone());
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load session");
        }

        Ok(Self {
            config,
            session,
            cache_dir,
        })
    }

    pub fn set_city_source(&mut self, source: CitySource) {
        self.config.city_source = source;
    }

    /// Persist a token obtained at login
    pub fn store_token(&mut self, token: String) -> Result<()> {
        let email = self.config.last_email.clone();
        self.session.update(SessionData::new(token, email));
        self.session.save().context("Failed to save session")?;
        info!("Session token stored");
        Ok(())
    }

    pub fn clear_cache(&self) -> Result<usize> {
        self.cache()?.clear()
    }

    fn cache(&self) -> Result<CacheManager> {
        CacheManager::new(self.cache_dir.join(DATA_DIR))
            .context("Failed to open cache directory")
    }

    fn api_client(&self) -> Result<ApiClient> {
        let mut api = ApiClient::new(&self.config.api_url)?;
        let token = std::env::var(ENV_TOKEN)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.session.token().map(str::to_string));
        match token {
            Some(token) => api.set_token(token),
            None => warn!("No session token - only cached map data is available"),
        }
        Ok(api)
    }

    /// Build the registry and load every layer
    pub async fn load_registry(&self) -> Result<MapContext<ApiClient>> {
        let mut ctx = MapContext::new(self.api_client()?, self.cache()?);
        let mut events = ctx.subscribe();

        ctx.initialize(self.config.city_source).await;

        while let Ok(event) = events.try_recv() {
            match event {
                MapEvent::CitiesLoaded { count } => debug!(count, "Cities loaded"),
                MapEvent::LayersLoaded { city_id, failed, .. } if failed > 0 => {
                    warn!(city_id, failed, "Some layers could not be loaded");
                }
                MapEvent::LayersLoaded { .. } => {}
            }
        }
        Ok(ctx)
    }

    /// Print one line per city with its layer status
    pub async fn print_summary(&self) -> Result<()> {
        let ctx = self.load_registry().await?;

        if self.config.city_source == CitySource::Backend {
            let age = ctx
                .cache()
                .entry_age(CITIES_KEY)
                .unwrap_or_else(|| "never".to_string());
            println!("City list cached: {}", age);
        }

        for city in ctx.cities() {
            println!(
                "[{}] {} - {} layers, {} downloaded, {} pending",
                city.id,
                city.name,
                city.layers.len(),
                city.downloaded_count(),
                city.pending_count()
            );
            for layer in &city.layers {
                let status = if layer.is_downloaded() { "ok" } else { "--" };
                println!(
                    "    {} {} ({})",
                    status,
                    layer.layer_name,
                    layer.threat_types.join(", ")
                );
            }
        }
        Ok(())
    }

    /// Look up a place and print the matches with the resulting search marker
    pub async fn search(&self, query: &str) -> Result<()> {
        let geocoder = NominatimGeocoder::new()?;
        let mut ctx = MapContext::new(self.api_client()?, self.cache()?);
        let places = ctx.search_place(&geocoder, query).await?;

        if places.is_empty() {
            println!("No places found for '{}'", query);
            return Ok(());
        }
        for place in &places {
            println!("{:.5}, {:.5}  {}", place.location.lat, place.location.lon, place.label);
        }
        if let Some(marker) = ctx.search_marker() {
            println!("{}", serde_json::to_string_pretty(marker)?);
        }
        Ok(())
    }

    /// Print a rendered layer as JSON
    pub async fn dump_layer(&self, city_id: i64, layer_name: &str) -> Result<()> {
        let ctx = self.load_registry().await?;
        let city = ctx
            .city(city_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown city id {}", city_id))?;
        let layer = city
            .layer(layer_name)
            .ok_or_else(|| anyhow::anyhow!("City {} has no layer '{}'", city.name, layer_name))?;
        let rendered = render_layer(layer)
            .ok_or_else(|| anyhow::anyhow!("Layer '{}' is not downloaded", layer_name))?;

        println!("{}", serde_json::to_string_pretty(&rendered)?);
        Ok(())
    }
}

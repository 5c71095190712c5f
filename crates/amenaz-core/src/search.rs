//! Place search.
//!
//! Free-text lookup of places to drop the search marker on. The default
//! provider is the OpenStreetMap Nominatim service.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::models::LatLng;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Nominatim rejects requests without an identifying user agent
const USER_AGENT: &str = concat!("amenaz/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub label: String,
    pub location: LatLng,
}

/// Geocoding provider used by place search
#[allow(async_fn_in_trait)]
pub trait Geocoder {
    async fn search(&self, query: &str) -> Result<Vec<Place>>;
}

/// One Nominatim result. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    lat: String,
    lon: String,
}

impl NominatimPlace {
    fn to_place(&self) -> Option<Place> {
        let lat = self.lat.parse::<f64>().ok()?;
        let lon = self.lon.parse::<f64>().ok()?;
        Some(Place {
            label: self.display_name.clone(),
            location: LatLng::new(lat, lon),
        })
    }
}

#[derive(Clone)]
pub struct NominatimGeocoder {
    client: Client,
    url: String,
}

impl NominatimGeocoder {
    pub fn new() -> Result<Self> {
        Self::with_url(NOMINATIM_URL)
    }

    pub fn with_url(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<Place>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "application/json")
            .query(&[("format", "json"), ("q", query)])
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to search places for '{}'", query))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read place search response")?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &text).into());
        }

        let places = parse_places(&text)?;
        debug!(query, count = places.len(), "Places found");
        Ok(places)
    }
}

/// Parse a Nominatim result list. Entries with unreadable coordinates are
/// skipped.
fn parse_places(body: &str) -> Result<Vec<Place>, ApiError> {
    let items: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
    Ok(items
        .iter()
        .filter_map(|item| {
            let place = item.to_place();
            if place.is_none() {
                warn!(label = %item.display_name, "Skipping place with invalid coordinates");
            }
            place
        })
        .collect())
}

use serde::{Deserialize, Serialize};

use super::Layer;
use crate::render::Marker;

/// Zoom level used when focusing a single city
pub const CITY_ZOOM_LEVEL: u8 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone)]
pub struct City {
    pub id: i64,
    pub name: String,
    /// Backend namespace holding this city's datasets
    pub schema_name: String,
    pub location: LatLng,
    pub zoom_level: u8,
    pub layers: Vec<Layer>,
    pub marker: Option<Marker>,
}

impl City {
    pub fn new(id: i64, name: &str, schema_name: &str, location: LatLng, zoom_level: u8) -> Self {
        Self {
            id,
            name: name.to_string(),
            schema_name: schema_name.to_string(),
            location,
            zoom_level,
            layers: Vec::new(),
            marker: None,
        }
    }

    pub fn with_layers(mut self, layers: Vec<Layer>) -> Self {
        self.layers = layers;
        self
    }

    pub fn downloaded_count(&self) -> usize {
        self.layers.iter().filter(|l| l.is_downloaded()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.layers.len() - self.downloaded_count()
    }

    pub fn layer(&self, layer_name: &str) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|l| l.layer_name == layer_name || l.query_name == layer_name)
    }
}

/// City row as returned by `data/getlocations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "esquema")]
    pub schema_name: String,
    #[serde(rename = "latitud")]
    pub latitude: f64,
    #[serde(rename = "longitud")]
    pub longitude: f64,
}

impl CityRecord {
    pub fn to_city(&self) -> City {
        City::new(
            self.id,
            &self.name,
            &self.schema_name,
            LatLng::new(self.latitude, self.longitude),
            CITY_ZOOM_LEVEL,
        )
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GeoData;

/// Threat label given to layers that are not tied to any hazard
pub const NO_THREAT_LABEL: &str = "None";

/// Stroke color used when the backend leaves a layer uncolored
const DEFAULT_LAYER_COLOR: &str = "#3388ff";

#[derive(Error, Debug, PartialEq)]
pub enum LayerError {
    #[error("Layer {0} already has geo data")]
    AlreadyLoaded(String),

    #[error("Layer {0} returned no features")]
    EmptyGeoData(String),
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub id: i64,
    pub layer_name: String,
    /// Table name on the backend, sent as `layerName` to `data/getlayer`
    pub query_name: String,
    pub color: String,
    pub description: String,
    pub datum: String,
    pub layer_type: String,
    pub threat_types: Vec<String>,
    /// Shown by default when the map opens
    pub fixed: bool,
    geo_data: Option<GeoData>,
}

impl Layer {
    pub fn new(id: i64, layer_name: &str, query_name: &str, color: &str) -> Self {
        Self {
            id,
            layer_name: layer_name.to_string(),
            query_name: query_name.to_string(),
            color: color.to_string(),
            description: String::new(),
            datum: String::new(),
            layer_type: String::new(),
            threat_types: vec![NO_THREAT_LABEL.to_string()],
            fixed: false,
            geo_data: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_threats(mut self, threats: &[&str]) -> Self {
        self.threat_types = if threats.is_empty() {
            vec![NO_THREAT_LABEL.to_string()]
        } else {
            threats.iter().map(|t| t.to_string()).collect()
        };
        self
    }

    pub fn is_downloaded(&self) -> bool {
        self.geo_data.is_some()
    }

    pub fn geo_data(&self) -> Option<&GeoData> {
        self.geo_data.as_ref()
    }

    pub fn has_threat(&self, label: &str) -> bool {
        self.threat_types.iter().any(|t| t.eq_ignore_ascii_case(label))
    }

    /// Attach downloaded geo data. Data can only be attached once and must
    /// contain at least one feature.
    pub fn attach_geo_data(&mut self, data: GeoData) -> Result<(), LayerError> {
        if self.geo_data.is_some() {
            return Err(LayerError::AlreadyLoaded(self.query_name.clone()));
        }
        if data.is_empty() {
            return Err(LayerError::EmptyGeoData(self.query_name.clone()));
        }
        self.geo_data = Some(data);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub nombre: String,
}

/// Layer row as returned by `data/getlocationslayers`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    #[serde(rename = "id_capa")]
    pub id: i64,
    #[serde(rename = "nombre")]
    pub layer_name: String,
    #[serde(rename = "nom_tabla")]
    pub query_name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(default)]
    pub datum: Option<String>,
    #[serde(rename = "rel_asociacion", default)]
    pub layer_type: Option<String>,
    #[serde(rename = "amenazas", default)]
    pub threats: Option<Vec<ThreatRecord>>,
    #[serde(rename = "fijar_capa", default)]
    pub fixed: Option<bool>,
    #[serde(default)]
    pub geojson: Option<GeoData>,
}

impl LayerDescriptor {
    pub fn threat_labels(&self) -> Vec<String> {
        match &self.threats {
            Some(threats) if !threats.is_empty() => {
                threats.iter().map(|t| t.nombre.clone()).collect()
            }
            _ => vec![NO_THREAT_LABEL.to_string()],
        }
    }

    /// Split the descriptor into a layer and any geo data embedded in it.
    pub fn into_layer(self) -> (Layer, Option<GeoData>) {
        let threat_types = self.threat_labels();
        let layer = Layer {
            id: self.id,
            layer_name: self.layer_name,
            query_name: self.query_name,
            color: self.color.unwrap_or_else(|| DEFAULT_LAYER_COLOR.to_string()),
            description: self.description.unwrap_or_default(),
            datum: self.datum.unwrap_or_default(),
            layer_type: self.layer_type.unwrap_or_default(),
            threat_types,
            fixed: self.fixed.unwrap_or(false),
            geo_data: None,
        };
        (layer, self.geojson)
    }
}

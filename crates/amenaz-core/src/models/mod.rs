//! Data models for the map registry.
//!
//! - `City`, `CityRecord`: cities shown on the map and their wire format
//! - `Layer`, `LayerDescriptor`: hazard and infrastructure layers

pub mod city;
pub mod layer;

pub use city::{City, CityRecord, LatLng};
pub use layer::{Layer, LayerDescriptor, LayerError, ThreatRecord, NO_THREAT_LABEL};

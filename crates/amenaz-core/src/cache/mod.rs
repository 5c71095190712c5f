//! Local caching module for offline map data.
//!
//! This module provides the `CacheManager`, a file-backed key/value store,
//! and its cache-or-fetch `resolve` operation. Entries are JSON files and
//! never expire.
//!
//! Keys in use:
//! - `cities`: the city list snapshot
//! - `cityLayers-id<id>`: layer descriptors for one city
//! - `<query name>`: GeoJSON for one layer

pub mod manager;
mod resolver;

pub use manager::{city_layers_key, CacheManager, CachedData, CITIES_KEY};

//! Core library for amenaz, a civil-protection hazard map.
//!
//! Cities and their hazard layers are fetched from the map backend, kept in
//! a local cache for offline use, and turned into styled map objects:
//!
//! - [`registry::MapContext`]: owns the cities and drives loading
//! - [`cache::CacheManager`]: file-backed store with cache-or-fetch `resolve`
//! - [`api::ApiClient`]: authenticated HTTP client for the backend
//! - [`render`]: layer styling, popups and marker icons
//! - [`geolocation::Geolocator`]: permission and GPS flow
//! - [`search`]: place lookup for the search marker

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod geo;
pub mod geolocation;
pub mod models;
pub mod registry;
pub mod render;
pub mod search;
pub mod seed;

pub use api::{ApiClient, ApiError, MapBackend};
pub use cache::CacheManager;
pub use config::{CitySource, Config};
pub use registry::{MapContext, MapEvent};

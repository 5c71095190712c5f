//! REST API client module for the map data backend.
//!
//! This module provides the `ApiClient` for fetching cities, layer
//! descriptors and layer GeoJSON, and the `MapBackend` trait the registry
//! is written against.
//!
//! Requests are authenticated with the session token, sent both as a
//! `Basic` authorization header and as an `x-access-token` header.

pub mod client;
pub mod error;

pub use client::{ApiClient, MapBackend};
pub use error::ApiError;

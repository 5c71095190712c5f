//! API client for the map data backend.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests for cities, layer descriptors and layer GeoJSON.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::geo::GeoData;
use crate::models::CityRecord;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// Layer GeoJSON can be several megabytes on slow mobile links.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Custom header carrying the session token alongside `Authorization`
const ACCESS_TOKEN_HEADER: &str = "x-access-token";

const LOCATIONS_PATH: &str = "data/getlocations";
const LOCATION_LAYERS_PATH: &str = "data/getlocationslayers";
const LAYER_PATH: &str = "data/getlayer";

/// Source of city and layer data.
///
/// `ApiClient` is the production implementation; the registry only depends
/// on this trait so it can run against any backend.
#[allow(async_fn_in_trait)]
pub trait MapBackend {
    /// Fetch the list of cities
    async fn fetch_locations(&self) -> Result<Vec<CityRecord>>;

    /// Fetch the raw layer descriptors for a city. Items are validated
    /// individually by the caller.
    async fn fetch_location_layers(&self, city_id: i64) -> Result<Vec<Value>>;

    /// Fetch the GeoJSON of one layer table in a city schema
    async fn fetch_layer(&self, schema_name: &str, layer_name: &str) -> Result<GeoData>;
}

/// API client for the map data backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client rooted at `api_url`
    pub fn new(api_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Self::normalize_base_url(api_url),
            token: None,
        })
    }

    /// Set the session token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoints are appended to the base URL, so it must end with a slash
    fn normalize_base_url(api_url: &str) -> String {
        let trimmed = api_url.trim();
        if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{}/", trimmed)
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Both headers carry the same token; the backend accepts either.
    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let token = match self.token.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => return Err(ApiError::MissingToken),
        };

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Basic {}", token))
                .map_err(|e| ApiError::InvalidToken(e.to_string()))?,
        );
        headers.insert(
            ACCESS_TOKEN_HEADER,
            header::HeaderValue::from_str(token)
                .map_err(|e| ApiError::InvalidToken(e.to_string()))?,
        );
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.endpoint(path);
        let headers = self.auth_headers()?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        let response = Self::check_response(response).await?;

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        debug!(url = %url, bytes = text.len(), "Response received");

        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }
}

impl MapBackend for ApiClient {
    async fn fetch_locations(&self) -> Result<Vec<CityRecord>> {
        self.get(LOCATIONS_PATH, &[]).await
    }

    async fn fetch_location_layers(&self, city_id: i64) -> Result<Vec<Value>> {
        let city_id = city_id.to_string();
        self.get(LOCATION_LAYERS_PATH, &[("cityID", city_id.as_str())])
            .await
    }

    async fn fetch_layer(&self, schema_name: &str, layer_name: &str) -> Result<GeoData> {
        self.get(
            LAYER_PATH,
            &[("cityName", schema_name), ("layerName", layer_name)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            ApiClient::normalize_base_url("https://maps.example.org/api"),
            "https://maps.example.org/api/"
        );
        assert_eq!(
            ApiClient::normalize_base_url(" https://maps.example.org/api/ "),
            "https://maps.example.org/api/"
        );
    }

    #[test]
    fn test_endpoint() {
        let client = ApiClient::new("http://localhost:3000/api").expect("client");
        assert_eq!(
            client.endpoint(LOCATION_LAYERS_PATH),
            "http://localhost:3000/api/data/getlocationslayers"
        );
    }

    #[test]
    fn test_auth_headers_carry_token_twice() {
        let client = ApiClient::new("http://localhost:3000/api")
            .expect("client")
            .with_token("abc123".to_string());
        let headers = client.auth_headers().expect("headers");

        assert_eq!(
            headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Basic abc123")
        );
        assert_eq!(
            headers.get(ACCESS_TOKEN_HEADER).and_then(|v| v.to_str().ok()),
            Some("abc123")
        );
    }

    #[test]
    fn test_missing_or_invalid_token() {
        let mut client = ApiClient::new("http://localhost:3000/api").expect("client");
        assert!(matches!(client.auth_headers(), Err(ApiError::MissingToken)));

        client.set_token(String::new());
        assert!(matches!(client.auth_headers(), Err(ApiError::MissingToken)));

        client.set_token("bad\ntoken".to_string());
        assert!(matches!(client.auth_headers(), Err(ApiError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_fetch_without_token_fails_before_request() {
        let client = ApiClient::new("http://127.0.0.1:9/").expect("client");
        let err = client.fetch_locations().await.expect_err("no token");
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::MissingToken)
        ));
    }
}

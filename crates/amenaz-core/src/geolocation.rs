//! Device geolocation flow.
//!
//! Getting a position takes up to four platform calls: check the location
//! permission, request it if missing, ask the user to enable high-accuracy
//! GPS, and finally read the position. Each step can be rejected, in which
//! case the user is alerted once and the flow stops where it was. Nothing is
//! retried automatically.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound for a GPS fix
pub const GPS_TIMEOUT: Duration = Duration::from_secs(5);

/// Oldest cached position the platform may return
const MAX_POSITION_AGE: Duration = Duration::from_millis(1000);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    #[error("Could not check location permission: {0}")]
    PermissionCheck(String),

    #[error("Error requesting location permissions: {0}")]
    PermissionDenied(String),

    #[error("Error enabling high accuracy location: {0}")]
    AccuracyRejected(String),

    #[error("Can not retrieve location: {0}")]
    PositionUnavailable(String),

    #[error("Timed out after {0:?} waiting for a GPS fix")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoState {
    NoPermission,
    PermissionRequested,
    PermissionGranted,
    GpsRequested,
    PositionAcquired,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub maximum_age: Duration,
    pub timeout: Duration,
    pub enable_high_accuracy: bool,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            maximum_age: MAX_POSITION_AGE,
            timeout: GPS_TIMEOUT,
            enable_high_accuracy: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of uncertainty in meters
    pub accuracy: f64,
}

/// Permission and location calls provided by the device.
#[allow(async_fn_in_trait)]
pub trait LocationPlatform {
    async fn has_permission(&self) -> Result<bool, GeolocationError>;

    /// Whether the platform can show the accuracy dialog without a separate
    /// permission prompt
    async fn can_request_accuracy(&self) -> bool;

    async fn request_permission(&self) -> Result<(), GeolocationError>;

    async fn request_high_accuracy(&self) -> Result<(), GeolocationError>;

    async fn current_position(&self, options: &PositionOptions) -> Result<GeoPosition, GeolocationError>;
}

/// Receives user-facing failure messages
pub trait AlertSink {
    fn alert(&self, message: &str);
}

pub struct Geolocator<P, A> {
    platform: P,
    alerts: A,
    state: GeoState,
    position: Option<GeoPosition>,
    options: PositionOptions,
}

impl<P: LocationPlatform, A: AlertSink> Geolocator<P, A> {
    pub fn new(platform: P, alerts: A) -> Self {
        Self {
            platform,
            alerts,
            state: GeoState::NoPermission,
            position: None,
            options: PositionOptions::default(),
        }
    }

    pub fn state(&self) -> GeoState {
        self.state
    }

    pub fn position(&self) -> Option<GeoPosition> {
        self.position
    }

    pub fn got_geoposition(&self) -> bool {
        self.position.is_some()
    }

    /// Run the flow from the start. Returns the position on success; on
    /// failure the user has been alerted and `state()` tells where it stopped.
    /// A fix from an earlier run is discarded.
    pub async fn locate(&mut self) -> Option<GeoPosition> {
        self.state = GeoState::NoPermission;
        self.position = None;
        match self.run().await {
            Ok(position) => Some(position),
            Err(e) => {
                warn!(state = ?self.state, error = %e, "Geolocation halted");
                self.alerts.alert(&e.to_string());
                None
            }
        }
    }

    async fn run(&mut self) -> Result<GeoPosition, GeolocationError> {
        if self.platform.has_permission().await? {
            self.state = GeoState::PermissionGranted;
        } else {
            self.state = GeoState::PermissionRequested;
            if self.platform.can_request_accuracy().await {
                debug!("Accuracy dialog covers the permission prompt");
            } else {
                self.platform.request_permission().await?;
            }
            self.state = GeoState::PermissionGranted;
        }

        self.platform.request_high_accuracy().await?;
        self.state = GeoState::GpsRequested;

        let position = tokio::time::timeout(
            self.options.timeout,
            self.platform.current_position(&self.options),
        )
        .await
        .map_err(|_| GeolocationError::Timeout(self.options.timeout))??;

        info!(
            latitude = position.latitude,
            longitude = position.longitude,
            accuracy = position.accuracy,
            "Position acquired"
        );
        self.state = GeoState::PositionAcquired;
        self.position = Some(position);
        Ok(position)
    }
}

//! Location resolution: device fix first, then two IP-geolocation services,
//! then a prompt for manual entry. Manual `"lat,lon"` input is parsed here too.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tokio::time::Instant;

use crate::constants::{GEO_MAX_AGE, GEO_TIMEOUT};
use crate::error::{ClientError, ClientResult};
use crate::models::{Coordinates, IpApiResponse, IpWhoResponse};
use crate::service::get_json;

pub const DETECTING: &str = "Detecting location…";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationStatus {
    Detected,
    ApproximateIp,
    ApproximateFallback,
    EnterManually,
}

impl LocationStatus {
    pub fn message(&self) -> &'static str {
        match self {
            LocationStatus::Detected => "Location detected ✅",
            LocationStatus::ApproximateIp => "Approximate location detected via IP ✅",
            LocationStatus::ApproximateFallback => "Approximate location via fallback ✅",
            LocationStatus::EnterManually => "Enter lat,lon manually.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationResult {
    pub status: LocationStatus,
    pub coords: Option<Coordinates>,
}

#[derive(Debug, Clone, Copy)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: GEO_TIMEOUT,
            maximum_age: GEO_MAX_AGE,
        }
    }
}

/// On-device positioning.
#[async_trait]
pub trait DeviceGeolocation: Send + Sync {
    async fn current_position(&self, options: &PositionOptions) -> ClientResult<Coordinates>;
}

/// An IP-based coordinate lookup.
#[async_trait]
pub trait IpGeolocation: Send + Sync {
    async fn locate(&self) -> ClientResult<Coordinates>;
}

/// A device position taken from configuration; a terminal has no sensor.
pub struct ConfiguredPosition {
    position: Option<Coordinates>,
}

impl ConfiguredPosition {
    pub fn new(position: Option<Coordinates>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl DeviceGeolocation for ConfiguredPosition {
    async fn current_position(&self, _options: &PositionOptions) -> ClientResult<Coordinates> {
        self.position
            .ok_or_else(|| ClientError::Unavailable("Device position".into()))
    }
}

/// First IP service: `latitude` and `longitude` must both be present.
pub struct IpApi {
    client: Arc<Client>,
    url: String,
}

impl IpApi {
    pub fn new(client: Arc<Client>, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl IpGeolocation for IpApi {
    async fn locate(&self) -> ClientResult<Coordinates> {
        let body: IpApiResponse = get_json(&self.client, &self.url).await?;
        match (body.latitude, body.longitude) {
            (Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
            _ => Err(ClientError::Unavailable("IP location".into())),
        }
    }
}

/// Second IP service: needs an explicit `success` flag besides coordinates.
pub struct IpWho {
    client: Arc<Client>,
    url: String,
}

impl IpWho {
    pub fn new(client: Arc<Client>, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl IpGeolocation for IpWho {
    async fn locate(&self) -> ClientResult<Coordinates> {
        let body: IpWhoResponse = get_json(&self.client, &self.url).await?;
        match (body.success, body.latitude, body.longitude) {
            (true, Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
            _ => Err(ClientError::Unavailable("Fallback IP location".into())),
        }
    }
}

pub struct LocationResolver {
    device: Arc<dyn DeviceGeolocation>,
    primary: Arc<dyn IpGeolocation>,
    fallback: Arc<dyn IpGeolocation>,
    options: PositionOptions,
    last_fix: Mutex<Option<(Instant, Coordinates)>>,
}

impl LocationResolver {
    pub fn new(
        device: Arc<dyn DeviceGeolocation>,
        primary: Arc<dyn IpGeolocation>,
        fallback: Arc<dyn IpGeolocation>,
    ) -> Self {
        Self {
            device,
            primary,
            fallback,
            options: PositionOptions::default(),
            last_fix: Mutex::new(None),
        }
    }

    /// Walks the chain; each step runs only when the previous one failed.
    pub async fn resolve(&self) -> LocationResult {
        match self.device_position().await {
            Ok(coords) => return found(LocationStatus::Detected, coords),
            Err(e) => tracing::info!("Device location failed: {}", e),
        }

        match self.primary.locate().await {
            Ok(coords) => return found(LocationStatus::ApproximateIp, coords),
            Err(e) => tracing::info!("IP location failed: {}", e),
        }

        match self.fallback.locate().await {
            Ok(coords) => found(LocationStatus::ApproximateFallback, coords),
            Err(e) => {
                tracing::info!("Fallback IP location failed: {}", e);
                LocationResult {
                    status: LocationStatus::EnterManually,
                    coords: None,
                }
            }
        }
    }

    async fn device_position(&self) -> ClientResult<Coordinates> {
        if let Some(coords) = self.recent_fix() {
            tracing::debug!("Reusing device fix younger than {:?}", self.options.maximum_age);
            return Ok(coords);
        }

        let coords = tokio::time::timeout(
            self.options.timeout,
            self.device.current_position(&self.options),
        )
        .await
        .map_err(|_| ClientError::TimedOut)??;

        if let Ok(mut last) = self.last_fix.lock() {
            *last = Some((Instant::now(), coords));
        }
        Ok(coords)
    }

    fn recent_fix(&self) -> Option<Coordinates> {
        let last = self.last_fix.lock().ok()?;
        (*last)
            .filter(|(at, _)| at.elapsed() <= self.options.maximum_age)
            .map(|(_, coords)| coords)
    }
}

fn found(status: LocationStatus, coords: Coordinates) -> LocationResult {
    LocationResult {
        status,
        coords: Some(coords),
    }
}

/// Parses `"lat,lon"`: exactly two comma-separated parts, each starting with a
/// finite number.
pub fn parse_manual(text: &str) -> Option<Coordinates> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [lat, lon] => Some(Coordinates::new(
            parse_float_prefix(lat)?,
            parse_float_prefix(lon)?,
        )),
        _ => None,
    }
}

/// Leading decimal number with optional sign and exponent.
static FLOAT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").unwrap());

/// Parses the longest numeric prefix of `s`, ignoring trailing text.
fn parse_float_prefix(s: &str) -> Option<f64> {
    let number = FLOAT_PREFIX.find(s.trim_start())?;
    number.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Ticketing for debounced input: only the newest ticket is acted on.
#[derive(Debug, Default)]
pub struct Debouncer {
    generation: u64,
}

impl Debouncer {
    pub fn schedule(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn is_latest(&self, ticket: u64) -> bool {
        ticket == self.generation
    }
}

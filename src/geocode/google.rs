//! Google Maps geocoding API client.

use super::{GatewayError, Geocoder};
use crate::types::Position;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Geocoding endpoint.
pub const GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Performs the HTTP GET. Timeouts and transport failures come back as
/// [`GatewayError::Unavailable`].
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &Url) -> Result<Vec<u8>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

/// Geocoder speaking the Google geocoding JSON API over `T`.
pub struct GoogleGeocoder<T> {
    transport: T,
    api_key: String,
    endpoint: String,
}

impl<T: HttpTransport> GoogleGeocoder<T> {
    pub fn new(transport: T, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            api_key: api_key.into(),
            endpoint: GEOCODE_ENDPOINT.to_string(),
        }
    }

    /// Point at a different endpoint (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Build the request URL with the address query-encoded.
    pub fn request_url(&self, address: &str) -> Result<Url, GatewayError> {
        Url::parse_with_params(
            &self.endpoint,
            &[("address", address), ("key", self.api_key.as_str())],
        )
        .map_err(|e| GatewayError::Unavailable(format!("bad endpoint: {}", e)))
    }

    /// Read the first result's location out of a response body.
    pub fn parse_response(body: &[u8]) -> Result<Position, GatewayError> {
        let response: GeocodeResponse = serde_json::from_slice(body)
            .map_err(|e| GatewayError::Unavailable(format!("malformed response: {}", e)))?;

        match response.status.as_str() {
            "OK" | "" => {}
            "ZERO_RESULTS" => return Err(GatewayError::NoResult),
            status => {
                return Err(GatewayError::Unavailable(match response.error_message {
                    Some(message) => format!("{}: {}", status, message),
                    None => status.to_string(),
                }))
            }
        }

        let location = &response
            .results
            .first()
            .ok_or(GatewayError::NoResult)?
            .geometry
            .location;

        Position::new(location.lat, location.lng)
            .map_err(|e| GatewayError::Unavailable(e.to_string()))
    }
}

impl<T: HttpTransport> Geocoder for GoogleGeocoder<T> {
    fn resolve(&self, address: &str) -> Result<Position, GatewayError> {
        let url = self.request_url(address.trim())?;
        let body = self.transport.get(&url)?;
        let result = Self::parse_response(&body);
        debug!(address, ok = result.is_ok(), "geocoded address");
        result
    }
}

//! OpenWeather API client.
//!
//! One call, one request: no retries, no caching. Failures come back as one
//! of the `WeatherError` variants.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::endpoint::Endpoint;
use crate::tiles::{tile_for, MapLayer};
use crate::types::{
    AirQualityResponse, AlertsResponse, CurrentWeather, ForecastResponse, GeocodingResult,
};
use nimbus_core::{ApiConfig, ReqwestErrorExt, Units, WeatherError};

const USER_AGENT: &str = concat!("nimbus/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`WeatherClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub geo_base_url: String,
    pub tile_base_url: String,
    pub units: Units,
    pub lang: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Default OpenWeather endpoints with the given key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_settings(&ApiConfig::default(), api_key)
    }

    pub fn from_settings(settings: &ApiConfig, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: settings.base_url.clone(),
            geo_base_url: settings.geo_base_url.clone(),
            tile_base_url: settings.tile_base_url.clone(),
            units: settings.units,
            lang: settings.lang.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// Point every endpoint family at one server (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self.geo_base_url = base_url.to_string();
        self.tile_base_url = base_url.to_string();
        self
    }
}

/// Error body shape returned by the API on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl WeatherClient {
    pub fn new(config: ClientConfig) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ReqwestErrorExt::into_weather_error)?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolve an endpoint without sending anything
    pub fn url_for(&self, endpoint: &Endpoint) -> Result<Url, WeatherError> {
        endpoint.url(&self.config)
    }

    /// Fetch `endpoint` and decode the JSON body as `T`.
    #[instrument(skip(self), fields(kind = %endpoint.kind()), level = "debug")]
    pub async fn fetch<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, WeatherError> {
        let body = self.fetch_bytes(endpoint).await?;

        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!("Decoding error for {}: {}", endpoint.kind(), e);
            WeatherError::InvalidData
        })
    }

    /// Fetch `endpoint` and return the raw body of a 2xx response.
    pub async fn fetch_bytes(&self, endpoint: &Endpoint) -> Result<Vec<u8>, WeatherError> {
        let url = self.url_for(endpoint)?;
        tracing::debug!("GET {} {}", endpoint.kind(), url.path());

        let response = self.client.get(url).send().await.map_err(|e| {
            tracing::debug!("Request for {} failed: {}", endpoint.kind(), e);
            e.into_weather_error()
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            tracing::debug!("Reading {} response failed: {}", endpoint.kind(), e);
            if e.is_timeout() {
                e.into_weather_error()
            } else {
                WeatherError::InvalidResponse
            }
        })?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("Status code: {}", status.as_u16()));
            tracing::warn!("{} returned {}: {}", endpoint.kind(), status, message);
            return Err(WeatherError::ApiError(message));
        }

        Ok(body.to_vec())
    }

    pub async fn current_weather(&self, lat: f64, lon: f64) -> Result<CurrentWeather, WeatherError> {
        self.fetch(&Endpoint::CurrentWeather { lat, lon }).await
    }

    pub async fn forecast(&self, lat: f64, lon: f64) -> Result<ForecastResponse, WeatherError> {
        self.fetch(&Endpoint::Forecast { lat, lon }).await
    }

    pub async fn air_quality(&self, lat: f64, lon: f64) -> Result<AirQualityResponse, WeatherError> {
        self.fetch(&Endpoint::AirQuality { lat, lon }).await
    }

    /// Alerts for a coordinate.
    ///
    /// Built from a current weather call and always empty; any current
    /// weather failure is returned as is.
    pub async fn alerts(&self, lat: f64, lon: f64) -> Result<AlertsResponse, WeatherError> {
        let weather = self.current_weather(lat, lon).await?;
        Ok(AlertsResponse::synthesized_from(&weather))
    }

    pub async fn geocode(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeocodingResult>, WeatherError> {
        self.fetch(&Endpoint::Geocoding {
            query: query.to_string(),
            limit,
        })
        .await
    }

    /// PNG bytes of one map tile
    pub async fn map_tile(
        &self,
        layer: MapLayer,
        zoom: u8,
        x: u32,
        y: u32,
    ) -> Result<Vec<u8>, WeatherError> {
        self.fetch_bytes(&Endpoint::MapTile { layer, zoom, x, y }).await
    }

    /// URL of the tile covering a coordinate
    pub fn map_tile_url(
        &self,
        layer: MapLayer,
        lat: f64,
        lon: f64,
        zoom: u8,
    ) -> Result<Url, WeatherError> {
        let tile = tile_for(lat, lon, zoom);
        self.url_for(&Endpoint::MapTile {
            layer,
            zoom: tile.zoom,
            x: tile.x,
            y: tile.y,
        })
    }
}

//! Typed request descriptors and their cache fingerprints.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::ClientConfig;
use crate::tiles::MapLayer;
use nimbus_core::WeatherError;

/// Decimal places kept when a coordinate becomes part of a cache key
const KEY_COORD_SCALE: f64 = 10_000.0;

/// The request families the API client knows about.
///
/// Cache lifetimes are attached to these, not to values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    CurrentWeather,
    Forecast,
    AirQuality,
    Alerts,
    Geocoding,
    MapTile,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentWeather => "current_weather",
            Self::Forecast => "forecast",
            Self::AirQuality => "air_quality",
            Self::Alerts => "alerts",
            Self::Geocoding => "geocoding",
            Self::MapTile => "map_tile",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single API request, fully described by its kind and parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    CurrentWeather { lat: f64, lon: f64 },
    Forecast { lat: f64, lon: f64 },
    AirQuality { lat: f64, lon: f64 },
    /// Fulfilled from the current weather request; see `AlertsResponse::synthesized_from`.
    Alerts { lat: f64, lon: f64 },
    Geocoding { query: String, limit: u32 },
    MapTile { layer: MapLayer, zoom: u8, x: u32, y: u32 },
}

impl Endpoint {
    pub fn kind(&self) -> EndpointKind {
        match self {
            Self::CurrentWeather { .. } => EndpointKind::CurrentWeather,
            Self::Forecast { .. } => EndpointKind::Forecast,
            Self::AirQuality { .. } => EndpointKind::AirQuality,
            Self::Alerts { .. } => EndpointKind::Alerts,
            Self::Geocoding { .. } => EndpointKind::Geocoding,
            Self::MapTile { .. } => EndpointKind::MapTile,
        }
    }

    /// Path relative to the kind's base URL
    pub fn path(&self) -> String {
        match self {
            Self::CurrentWeather { .. } | Self::Alerts { .. } => "/weather".to_string(),
            Self::Forecast { .. } => "/forecast".to_string(),
            Self::AirQuality { .. } => "/air_pollution".to_string(),
            Self::Geocoding { .. } => "/direct".to_string(),
            Self::MapTile { layer, zoom, x, y } => {
                format!("/maps/{}/{}/{}/{}.png", layer.as_str(), zoom, x, y)
            }
        }
    }

    /// Deterministic fingerprint used for cache lookups
    pub fn cache_key(&self) -> CacheKey {
        let params = match self {
            Self::CurrentWeather { lat, lon }
            | Self::Forecast { lat, lon }
            | Self::AirQuality { lat, lon }
            | Self::Alerts { lat, lon } => {
                format!("{},{}", key_coord(*lat), key_coord(*lon))
            }
            Self::Geocoding { query, limit } => {
                format!("{}|{}", query.trim().to_lowercase(), limit)
            }
            Self::MapTile { layer, zoom, x, y } => {
                format!("{}/{}/{}/{}", layer.as_str(), zoom, x, y)
            }
        };
        CacheKey {
            kind: self.kind(),
            params,
        }
    }

    /// Resolve the endpoint to a request URL, credential included.
    pub fn url(&self, config: &ClientConfig) -> Result<Url, WeatherError> {
        let base = match self {
            Self::Geocoding { .. } => &config.geo_base_url,
            Self::MapTile { .. } => &config.tile_base_url,
            _ => &config.base_url,
        };

        let mut url = Url::parse(&format!("{}{}", base.trim_end_matches('/'), self.path()))
            .map_err(|e| {
                tracing::warn!("Cannot build URL for {} from {:?}: {}", self.kind(), base, e);
                WeatherError::InvalidUrl
            })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            tracing::warn!("Unsupported URL scheme for {}: {}", self.kind(), url.scheme());
            return Err(WeatherError::InvalidUrl);
        }

        {
            let mut query = url.query_pairs_mut();
            match self {
                Self::CurrentWeather { lat, lon }
                | Self::Forecast { lat, lon }
                | Self::AirQuality { lat, lon }
                | Self::Alerts { lat, lon } => {
                    query
                        .append_pair("lat", &lat.to_string())
                        .append_pair("lon", &lon.to_string())
                        .append_pair("units", config.units.as_str());
                    if let Some(lang) = &config.lang {
                        query.append_pair("lang", lang);
                    }
                }
                Self::Geocoding { query: q, limit } => {
                    query
                        .append_pair("q", q)
                        .append_pair("limit", &limit.to_string());
                }
                Self::MapTile { .. } => {}
            }
            query.append_pair("appid", &config.api_key);
        }

        Ok(url)
    }
}

fn key_coord(value: f64) -> String {
    // Integer ticks first so -0.00001 and 0.0 land on the same key
    let ticks = (value * KEY_COORD_SCALE).round() as i64;
    format!("{:.4}", ticks as f64 / KEY_COORD_SCALE)
}

/// Cache fingerprint: endpoint kind plus its normalised parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: EndpointKind,
    params: String,
}

impl CacheKey {
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.params)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new("test_key")
    }

    #[test]
    fn test_same_request_same_key() {
        let a = Endpoint::Forecast { lat: 51.5, lon: -0.12 }.cache_key();
        let b = Endpoint::Forecast { lat: 51.5, lon: -0.12 }.cache_key();
        assert_eq!(a, b);
    }

    #[test]
    fn test_kinds_never_share_keys() {
        let current = Endpoint::CurrentWeather { lat: 51.5, lon: -0.12 }.cache_key();
        let forecast = Endpoint::Forecast { lat: 51.5, lon: -0.12 }.cache_key();
        let alerts = Endpoint::Alerts { lat: 51.5, lon: -0.12 }.cache_key();
        assert_ne!(current, forecast);
        assert_ne!(current, alerts);
        assert_ne!(current.to_string(), forecast.to_string());
    }

    #[test]
    fn test_key_format() {
        let key = Endpoint::CurrentWeather { lat: 51.5, lon: -0.12 }.cache_key();
        assert_eq!(key.to_string(), "current_weather:51.5000,-0.1200");
        assert_eq!(key.kind(), EndpointKind::CurrentWeather);
    }

    #[test]
    fn test_negative_zero_normalised() {
        let a = Endpoint::AirQuality { lat: 0.0, lon: -0.000001 }.cache_key();
        let b = Endpoint::AirQuality { lat: -0.0, lon: 0.0 }.cache_key();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_coordinates_distinct_keys() {
        let a = Endpoint::Forecast { lat: 51.5, lon: -0.12 }.cache_key();
        let b = Endpoint::Forecast { lat: 51.5, lon: -0.13 }.cache_key();
        assert_ne!(a, b);
    }

    #[test]
    fn test_geocoding_key_ignores_case_and_padding() {
        let a = Endpoint::Geocoding { query: " London ".into(), limit: 5 }.cache_key();
        let b = Endpoint::Geocoding { query: "london".into(), limit: 5 }.cache_key();
        let c = Endpoint::Geocoding { query: "london".into(), limit: 1 }.cache_key();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_current_weather_url() {
        let url = Endpoint::CurrentWeather { lat: 51.5, lon: -0.12 }
            .url(&config())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.openweathermap.org/data/2.5/weather?lat=51.5&lon=-0.12&units=metric&appid=test_key"
        );
    }

    #[test]
    fn test_alerts_resolve_to_current_weather_path() {
        let url = Endpoint::Alerts { lat: 1.0, lon: 2.0 }.url(&config()).unwrap();
        assert_eq!(url.path(), "/data/2.5/weather");
    }

    #[test]
    fn test_lang_attached_when_configured() {
        let mut config = config();
        config.lang = Some("de".into());
        let url = Endpoint::Forecast { lat: 1.0, lon: 2.0 }.url(&config).unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "lang" && v == "de"));
    }

    #[test]
    fn test_geocoding_url_encodes_query() {
        let url = Endpoint::Geocoding { query: "São Paulo".into(), limit: 5 }
            .url(&config())
            .unwrap();
        assert!(url.as_str().starts_with("https://api.openweathermap.org/geo/1.0/direct?"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "São Paulo".to_string()),
                ("limit".to_string(), "5".to_string()),
                ("appid".to_string(), "test_key".to_string()),
            ]
        );
    }

    #[test]
    fn test_map_tile_url_has_only_credential() {
        let url = Endpoint::MapTile { layer: MapLayer::Clouds, zoom: 2, x: 1, y: 3 }
            .url(&config())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://tile.openweathermap.org/maps/clouds_new/2/1/3.png?appid=test_key"
        );
    }

    #[test]
    fn test_unparseable_base_is_invalid_url() {
        let mut config = config();
        config.base_url = "not a url".into();
        let result = Endpoint::Forecast { lat: 1.0, lon: 2.0 }.url(&config);
        assert_eq!(result, Err(WeatherError::InvalidUrl));
    }

    #[test]
    fn test_non_http_base_is_invalid_url() {
        let mut config = config();
        config.base_url = "ftp://example.com".into();
        let result = Endpoint::Forecast { lat: 1.0, lon: 2.0 }.url(&config);
        assert_eq!(result, Err(WeatherError::InvalidUrl));
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Cache lifetimes
    #[serde(default)]
    pub cache: CacheConfig,

    /// Fetch behaviour
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Presentation settings
    #[serde(default)]
    pub display: DisplayConfig,

    /// Fallback location when none is given on the command line
    #[serde(default)]
    pub location: LocationConfig,
}

/// Measurement system requested from the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    /// Value of the `units` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
            Self::Standard => "standard",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// OpenWeather API key (falls back to `OPENWEATHER_API_KEY`)
    pub api_key: Option<String>,

    /// Base URL for weather, forecast and air quality data
    pub base_url: String,

    /// Base URL for geocoding
    pub geo_base_url: String,

    /// Base URL for map tiles
    pub tile_base_url: String,

    #[serde(default)]
    pub units: Units,

    /// Optional language code for descriptions (e.g. "de")
    pub lang: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            geo_base_url: "https://api.openweathermap.org/geo/1.0".to_string(),
            tile_base_url: "https://tile.openweathermap.org".to_string(),
            units: Units::Metric,
            lang: None,
            timeout_secs: 10,
        }
    }
}

/// Time-to-live per request kind, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_current_ttl")]
    pub current_weather_ttl_secs: u64,
    #[serde(default = "default_forecast_ttl")]
    pub forecast_ttl_secs: u64,
    #[serde(default = "default_current_ttl")]
    pub air_quality_ttl_secs: u64,
    #[serde(default = "default_current_ttl")]
    pub alerts_ttl_secs: u64,
    #[serde(default = "default_geocoding_ttl")]
    pub geocoding_ttl_secs: u64,
    #[serde(default = "default_map_tile_ttl")]
    pub map_tile_ttl_secs: u64,
    /// Optional bound; least recently used entries are evicted past it
    pub max_entries: Option<usize>,
}

fn default_current_ttl() -> u64 {
    10 * 60
}

fn default_forecast_ttl() -> u64 {
    30 * 60
}

fn default_geocoding_ttl() -> u64 {
    24 * 60 * 60
}

fn default_map_tile_ttl() -> u64 {
    60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            current_weather_ttl_secs: default_current_ttl(),
            forecast_ttl_secs: default_forecast_ttl(),
            air_quality_ttl_secs: default_current_ttl(),
            alerts_ttl_secs: default_current_ttl(),
            geocoding_ttl_secs: default_geocoding_ttl(),
            map_tile_ttl_secs: default_map_tile_ttl(),
            max_entries: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Artificial delay before each network fetch (preview/demo only)
    pub preview_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Fixed UTC offset used to group forecasts by day.
    /// When unset the forecast city's own offset is used.
    pub utc_offset_seconds: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LocationConfig {
    /// Both halves of the coordinate, if configured
    pub fn coordinate(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nimbus");

        Self {
            config_dir,
            api: ApiConfig::default(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            display: DisplayConfig::default(),
            location: LocationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Resolve the API key from config, then the environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = self.api.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.to_string());
        }
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => {
                tracing::debug!("Using API key from {}", API_KEY_ENV);
                Ok(key)
            }
            _ => Err(ConfigError::MissingSetting("api.api_key".to_string())),
        }
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.api.base_url, "api.base_url", &mut result);
        self.validate_url(&self.api.geo_base_url, "api.geo_base_url", &mut result);
        self.validate_url(&self.api.tile_base_url, "api.tile_base_url", &mut result);

        if self.api.timeout_secs == 0 {
            result.add_error("api.timeout_secs", "Timeout must be greater than 0");
        } else if self.api.timeout_secs > 120 {
            result.add_warning("api.timeout_secs", "Timeout is unusually long (>120s)");
        }

        if self
            .api
            .api_key
            .as_deref()
            .map_or(true, |k| k.trim().is_empty())
        {
            result.add_warning(
                "api.api_key",
                format!("No API key configured - {} must be set", API_KEY_ENV),
            );
        }

        let ttls = [
            ("cache.current_weather_ttl_secs", self.cache.current_weather_ttl_secs),
            ("cache.forecast_ttl_secs", self.cache.forecast_ttl_secs),
            ("cache.air_quality_ttl_secs", self.cache.air_quality_ttl_secs),
            ("cache.alerts_ttl_secs", self.cache.alerts_ttl_secs),
            ("cache.geocoding_ttl_secs", self.cache.geocoding_ttl_secs),
            ("cache.map_tile_ttl_secs", self.cache.map_tile_ttl_secs),
        ];
        for (field, ttl) in ttls {
            if ttl == 0 {
                result.add_warning(field, "Caching disabled (0 seconds)");
            }
        }

        if self.cache.max_entries == Some(0) {
            result.add_error("cache.max_entries", "Capacity must be greater than 0");
        }

        if let Some(offset) = self.display.utc_offset_seconds {
            if offset.abs() >= 24 * 60 * 60 {
                result.add_error(
                    "display.utc_offset_seconds",
                    "Offset must be less than 24 hours",
                );
            }
        }

        if let Some(lat) = self.location.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                result.add_error("location.latitude", "Latitude must be within [-90, 90]");
            }
        }
        if let Some(lon) = self.location.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                result.add_error("location.longitude", "Longitude must be within [-180, 180]");
            }
        }
        if self.location.latitude.is_some() != self.location.longitude.is_some() {
            result.add_warning(
                "location",
                "Only one of latitude/longitude is set - default location ignored",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if let Some(port) = url.port() {
                    if port == 0 {
                        result.add_error(field_name, "Port cannot be 0");
                    }
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}

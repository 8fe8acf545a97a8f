use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

const ICON_BASE_URL: &str = "https://openweathermap.org/img/wn";

/// Icon URL for an OpenWeather icon code such as "02d"
pub fn icon_url(icon: &str) -> Option<Url> {
    if icon.is_empty() {
        return None;
    }
    Url::parse(&format!("{}/{}@2x.png", ICON_BASE_URL, icon)).ok()
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Geographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

/// One weather condition entry ("Clouds", "few clouds", "02d")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: i32,
    pub main: String,
    pub description: String,
    pub icon: String,
}

/// Temperature, pressure and humidity block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainMetrics {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default)]
    pub humidity: u8,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    #[serde(default)]
    pub deg: f64,
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sys {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub sunrise: i64,
    #[serde(default)]
    pub sunset: i64,
}

/// Current conditions at a coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub coord: Coord,
    pub weather: Vec<Condition>,
    pub main: MainMetrics,
    #[serde(default)]
    pub wind: Wind,
    #[serde(default)]
    pub sys: Sys,
    #[serde(default)]
    pub visibility: Option<u32>,
    pub dt: i64,
    /// Shift in seconds from UTC
    #[serde(default)]
    pub timezone: i32,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

impl CurrentWeather {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        timestamp(self.dt)
    }

    pub fn icon_url(&self) -> Option<Url> {
        self.weather.first().and_then(|c| icon_url(&c.icon))
    }

    pub fn description(&self) -> &str {
        self.weather
            .first()
            .map(|c| c.description.as_str())
            .unwrap_or_default()
    }
}

/// One 3-hourly forecast sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastItem {
    pub dt: i64,
    pub main: MainMetrics,
    pub weather: Vec<Condition>,
    /// Probability of precipitation, 0.0 to 1.0
    #[serde(default)]
    pub pop: f64,
    #[serde(default)]
    pub wind: Wind,
    pub dt_txt: Option<String>,
}

impl ForecastItem {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        timestamp(self.dt)
    }

    pub fn icon(&self) -> &str {
        self.weather
            .first()
            .map(|c| c.icon.as_str())
            .unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        self.weather
            .first()
            .map(|c| c.description.as_str())
            .unwrap_or_default()
    }
}

/// Location descriptor attached to forecast and alert responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub coord: Coord,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub population: u64,
    /// Shift in seconds from UTC
    #[serde(default)]
    pub timezone: i32,
    #[serde(default)]
    pub sunrise: i64,
    #[serde(default)]
    pub sunset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub list: Vec<ForecastItem>,
    pub city: City,
}

impl ForecastResponse {
    /// The forecast city's UTC offset, usable as a day boundary for grouping
    pub fn city_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.city.timezone)
    }
}

/// Air quality index, 1 (good) to 5 (very poor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AqiMain {
    pub aqi: u8,
}

/// Pollutant concentrations in μg/m³
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub co: f64,
    #[serde(default)]
    pub no: f64,
    #[serde(default)]
    pub no2: f64,
    #[serde(default)]
    pub o3: f64,
    #[serde(default)]
    pub so2: f64,
    #[serde(default)]
    pub pm2_5: f64,
    #[serde(default)]
    pub pm10: f64,
    #[serde(default)]
    pub nh3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityData {
    pub main: AqiMain,
    #[serde(default)]
    pub components: Components,
    pub dt: i64,
}

impl AirQualityData {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        timestamp(self.dt)
    }

    pub fn level(&self) -> AqiLevel {
        AqiLevel::from_index(self.main.aqi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityResponse {
    pub coord: Coord,
    pub list: Vec<AirQualityData>,
}

/// Air quality categories as defined by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiLevel {
    Good,
    Fair,
    Moderate,
    Poor,
    VeryPoor,
    Unknown,
}

impl AqiLevel {
    pub fn from_index(aqi: u8) -> Self {
        match aqi {
            1 => Self::Good,
            2 => Self::Fair,
            3 => Self::Moderate,
            4 => Self::Poor,
            5 => Self::VeryPoor,
            _ => Self::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Moderate => "Moderate",
            Self::Poor => "Poor",
            Self::VeryPoor => "Very Poor",
            Self::Unknown => "Unknown",
        }
    }
}

/// A government weather alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub sender_name: String,
    pub event: String,
    pub start: i64,
    pub end: i64,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub alerts: Option<Vec<WeatherAlert>>,
    pub city: City,
}

impl AlertsResponse {
    /// Alerts response stand-in built from current conditions.
    ///
    /// The alerts endpoint needs a subscription we don't have, so the
    /// response always carries zero alerts and a city derived from `weather`.
    pub fn synthesized_from(weather: &CurrentWeather) -> Self {
        Self {
            alerts: None,
            city: City {
                id: weather.id,
                name: weather.name.clone(),
                coord: weather.coord,
                country: weather.sys.country.clone(),
                population: 0,
                timezone: weather.timezone,
                sunrise: weather.sys.sunrise,
                sunset: weather.sys.sunset,
            },
        }
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.as_ref().map_or(0, Vec::len)
    }
}

/// A direct geocoding match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodingResult {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub country: String,
    pub state: Option<String>,
}

/// One day's summary derived from the 3-hourly forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub max_temp: f64,
    pub min_temp: f64,
    /// Highest probability of precipitation across the day, 0.0 to 1.0
    pub precipitation_chance: f64,
    pub icon: String,
    pub description: String,
}

impl DailyForecast {
    pub fn icon_url(&self) -> Option<Url> {
        icon_url(&self.icon)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn london_weather() -> CurrentWeather {
        serde_json::from_value(serde_json::json!({
            "coord": {"lon": -0.12, "lat": 51.5},
            "weather": [{"id": 801, "main": "Clouds", "description": "few clouds", "icon": "02d"}],
            "base": "stations",
            "main": {"temp": 18.2, "feels_like": 17.9, "temp_min": 16.0, "temp_max": 19.5,
                     "pressure": 1015, "humidity": 60},
            "visibility": 10000,
            "wind": {"speed": 3.6, "deg": 240},
            "dt": 1717232400,
            "sys": {"country": "GB", "sunrise": 1717213000, "sunset": 1717272000},
            "timezone": 3600,
            "id": 2643743,
            "name": "London",
            "cod": 200
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_current_weather() {
        let weather = london_weather();
        assert_eq!(weather.name, "London");
        assert_eq!(weather.main.humidity, 60);
        assert_eq!(weather.description(), "few clouds");
        assert_eq!(
            weather.icon_url().unwrap().as_str(),
            "https://openweathermap.org/img/wn/02d@2x.png"
        );
    }

    #[test]
    fn test_synthesized_alerts_carry_no_alerts() {
        let weather = london_weather();
        let alerts = AlertsResponse::synthesized_from(&weather);
        assert_eq!(alerts.alert_count(), 0);
        assert_eq!(alerts.city.name, "London");
        assert_eq!(alerts.city.country, "GB");
        assert_eq!(alerts.city.timezone, 3600);
        assert_eq!(alerts.city.coord, weather.coord);
    }

    #[test]
    fn test_aqi_levels() {
        assert_eq!(AqiLevel::from_index(1), AqiLevel::Good);
        assert_eq!(AqiLevel::from_index(5), AqiLevel::VeryPoor);
        assert_eq!(AqiLevel::from_index(9), AqiLevel::Unknown);
        assert_eq!(AqiLevel::VeryPoor.description(), "Very Poor");
    }

    #[test]
    fn test_empty_icon_has_no_url() {
        assert!(icon_url("").is_none());
    }

    #[test]
    fn test_city_offset() {
        let forecast = ForecastResponse {
            list: vec![],
            city: City {
                id: 1,
                name: "Tokyo".into(),
                coord: Coord { lat: 35.68, lon: 139.69 },
                country: "JP".into(),
                population: 0,
                timezone: 9 * 3600,
                sunrise: 0,
                sunset: 0,
            },
        };
        assert_eq!(forecast.city_offset().unwrap().local_minus_utc(), 9 * 3600);
    }
}

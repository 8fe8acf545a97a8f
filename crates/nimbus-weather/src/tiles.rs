//! Weather map layers and Web-Mercator tile math.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mercator projection is undefined at the poles; latitudes are clamped to this.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.05;

/// Zoom used for the overview map shown after a fetch cycle
pub const DEFAULT_MAP_ZOOM: u8 = 2;

/// Overlay layers offered by the tile server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapLayer {
    Clouds,
    #[default]
    Precipitation,
    Pressure,
    Wind,
    Temperature,
}

impl MapLayer {
    pub const ALL: [MapLayer; 5] = [
        MapLayer::Clouds,
        MapLayer::Precipitation,
        MapLayer::Pressure,
        MapLayer::Wind,
        MapLayer::Temperature,
    ];

    /// Layer name as used in tile paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clouds => "clouds_new",
            Self::Precipitation => "precipitation_new",
            Self::Pressure => "pressure_new",
            Self::Wind => "wind_new",
            Self::Temperature => "temp_new",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Clouds => "Clouds",
            Self::Precipitation => "Precipitation",
            Self::Pressure => "Sea Level Pressure",
            Self::Wind => "Wind Speed",
            Self::Temperature => "Temperature",
        }
    }
}

impl fmt::Display for MapLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown map layer: {0}")]
pub struct UnknownLayer(pub String);

impl FromStr for MapLayer {
    type Err = UnknownLayer;

    /// Accepts short names ("clouds") and tile names ("clouds_new").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let name = lower.strip_suffix("_new").unwrap_or(&lower);
        match name {
            "clouds" => Ok(Self::Clouds),
            "precipitation" | "precip" => Ok(Self::Precipitation),
            "pressure" => Ok(Self::Pressure),
            "wind" => Ok(Self::Wind),
            "temp" | "temperature" => Ok(Self::Temperature),
            _ => Err(UnknownLayer(s.to_string())),
        }
    }
}

/// Tile indices at a zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

/// Convert a coordinate to the tile containing it (standard slippy-map formula).
pub fn tile_for(lat: f64, lon: f64, zoom: u8) -> TileCoord {
    let n = 2f64.powi(i32::from(zoom));
    let max_index = n - 1.0;

    let lat_rad = lat
        .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
        .to_radians();

    let x = ((lon + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

    TileCoord {
        zoom,
        x: x.clamp(0.0, max_index) as u32,
        y: y.clamp(0.0, max_index) as u32,
    }
}

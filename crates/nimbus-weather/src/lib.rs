//! Weather data for Nimbus
//!
//! Fetches current conditions, forecast, air quality and alerts from the
//! OpenWeather API concurrently, with a keyed TTL cache in front of every
//! request and per-source loading state for the presentation layer.

pub mod aggregate;
pub mod cache;
pub mod client;
pub mod endpoint;
pub mod geocode;
pub mod location;
pub mod orchestrator;
pub mod state;
pub mod tiles;
pub mod types;

pub use aggregate::{daily_forecasts, derive_daily_forecasts};
pub use cache::{CacheStore, CacheTtl};
pub use client::{ClientConfig, WeatherClient};
pub use endpoint::{CacheKey, Endpoint, EndpointKind};
pub use geocode::{search_locations, DEFAULT_SEARCH_LIMIT};
pub use location::{drive_location_feed, LocationSignal};
pub use orchestrator::{CycleHandle, FetchOptions, FetchOrchestrator};
pub use state::{LoadingState, SlotEvent, SlotUpdate, Source, StateStore, WeatherSnapshot};
pub use tiles::{tile_for, MapLayer, TileCoord};
pub use types::*;

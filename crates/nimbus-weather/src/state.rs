//! Per-source loading state and the store the presentation layer observes.
//!
//! All slot writes go through [`StateStore`], which owns a `watch` channel
//! holding the latest [`WeatherSnapshot`]. Writes carry the id of the cycle
//! that produced them and are dropped if that cycle is no longer current.

use tokio::sync::{broadcast, watch};
use url::Url;

use crate::endpoint::Endpoint;
use crate::tiles::MapLayer;
use crate::types::{AirQualityResponse, AlertsResponse, Coord, CurrentWeather, ForecastResponse};
use nimbus_core::WeatherError;

/// Capacity of the slot event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

/// Progress of one data source
#[derive(Debug, Clone, PartialEq)]
pub enum LoadingState<T> {
    Idle,
    /// Progress in [0, 1]
    Loading(f64),
    Success(T),
    Failure(WeatherError),
}

impl<T> Default for LoadingState<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> LoadingState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }

    /// Success or failure
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Failure(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&WeatherError> {
        match self {
            Self::Failure(error) => Some(error),
            _ => None,
        }
    }

    pub fn progress(&self) -> Option<f64> {
        match self {
            Self::Loading(progress) => Some(*progress),
            _ => None,
        }
    }

    /// The same state with the payload dropped
    pub fn summary(&self) -> LoadingState<()> {
        match self {
            Self::Idle => LoadingState::Idle,
            Self::Loading(progress) => LoadingState::Loading(*progress),
            Self::Success(_) => LoadingState::Success(()),
            Self::Failure(error) => LoadingState::Failure(error.clone()),
        }
    }
}

/// The four independently fetched data sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    CurrentWeather,
    Forecast,
    AirQuality,
    Alerts,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::CurrentWeather,
        Source::Forecast,
        Source::AirQuality,
        Source::Alerts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentWeather => "current_weather",
            Self::Forecast => "forecast",
            Self::AirQuality => "air_quality",
            Self::Alerts => "alerts",
        }
    }

    /// The request this source issues for a coordinate
    pub fn endpoint(&self, coord: Coord) -> Endpoint {
        let Coord { lat, lon } = coord;
        match self {
            Self::CurrentWeather => Endpoint::CurrentWeather { lat, lon },
            Self::Forecast => Endpoint::Forecast { lat, lon },
            Self::AirQuality => Endpoint::AirQuality { lat, lon },
            Self::Alerts => Endpoint::Alerts { lat, lon },
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A new state for exactly one slot
#[derive(Debug, Clone, PartialEq)]
pub enum SlotUpdate {
    CurrentWeather(LoadingState<CurrentWeather>),
    Forecast(LoadingState<ForecastResponse>),
    AirQuality(LoadingState<AirQualityResponse>),
    Alerts(LoadingState<AlertsResponse>),
}

impl SlotUpdate {
    pub fn source(&self) -> Source {
        match self {
            Self::CurrentWeather(_) => Source::CurrentWeather,
            Self::Forecast(_) => Source::Forecast,
            Self::AirQuality(_) => Source::AirQuality,
            Self::Alerts(_) => Source::Alerts,
        }
    }

    pub fn summary(&self) -> LoadingState<()> {
        match self {
            Self::CurrentWeather(s) => s.summary(),
            Self::Forecast(s) => s.summary(),
            Self::AirQuality(s) => s.summary(),
            Self::Alerts(s) => s.summary(),
        }
    }

    fn loading(source: Source, progress: f64) -> Self {
        match source {
            Source::CurrentWeather => Self::CurrentWeather(LoadingState::Loading(progress)),
            Source::Forecast => Self::Forecast(LoadingState::Loading(progress)),
            Source::AirQuality => Self::AirQuality(LoadingState::Loading(progress)),
            Source::Alerts => Self::Alerts(LoadingState::Loading(progress)),
        }
    }

    fn failure(source: Source, error: WeatherError) -> Self {
        match source {
            Source::CurrentWeather => Self::CurrentWeather(LoadingState::Failure(error)),
            Source::Forecast => Self::Forecast(LoadingState::Failure(error)),
            Source::AirQuality => Self::AirQuality(LoadingState::Failure(error)),
            Source::Alerts => Self::Alerts(LoadingState::Failure(error)),
        }
    }
}

/// One applied slot transition, as seen by event subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct SlotEvent {
    pub cycle: u64,
    pub source: Source,
    pub state: LoadingState<()>,
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, Default)]
pub struct WeatherSnapshot {
    /// Id of the cycle the slots belong to; 0 before the first cycle
    pub cycle: u64,
    pub coordinate: Option<Coord>,
    pub location_name: Option<String>,
    pub current: LoadingState<CurrentWeather>,
    pub forecast: LoadingState<ForecastResponse>,
    pub air_quality: LoadingState<AirQualityResponse>,
    pub alerts: LoadingState<AlertsResponse>,
    pub map_layer: MapLayer,
    pub map_url: Option<Url>,
}

impl WeatherSnapshot {
    pub fn slot_summary(&self, source: Source) -> LoadingState<()> {
        match source {
            Source::CurrentWeather => self.current.summary(),
            Source::Forecast => self.forecast.summary(),
            Source::AirQuality => self.air_quality.summary(),
            Source::Alerts => self.alerts.summary(),
        }
    }

    /// True once every slot holds a success or failure
    pub fn is_settled(&self) -> bool {
        Source::ALL
            .iter()
            .all(|s| self.slot_summary(*s).is_terminal())
    }

    fn apply(&mut self, update: SlotUpdate) {
        match update {
            SlotUpdate::CurrentWeather(s) => self.current = s,
            SlotUpdate::Forecast(s) => self.forecast = s,
            SlotUpdate::AirQuality(s) => self.air_quality = s,
            SlotUpdate::Alerts(s) => self.alerts = s,
        }
    }
}

/// Single synchronization point for slot writes
#[derive(Debug)]
pub struct StateStore {
    snapshot: watch::Sender<WeatherSnapshot>,
    events: broadcast::Sender<SlotEvent>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(WeatherSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { snapshot, events }
    }

    pub fn subscribe(&self) -> watch::Receiver<WeatherSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SlotEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> WeatherSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn current_cycle(&self) -> u64 {
        self.snapshot.borrow().cycle
    }

    /// Switch to `cycle` and put every slot in `Loading(0)`.
    ///
    /// Cycle ids only move forward; a stale `cycle` is ignored.
    pub(crate) fn begin_cycle(&self, cycle: u64, coordinate: Coord, location_name: Option<String>) {
        self.snapshot.send_if_modified(|snap| {
            if cycle <= snap.cycle {
                return false;
            }
            snap.cycle = cycle;
            snap.coordinate = Some(coordinate);
            snap.location_name = location_name;
            snap.map_url = None;
            for source in Source::ALL {
                self.apply_locked(snap, cycle, SlotUpdate::loading(source, 0.0));
            }
            true
        });
    }

    /// Switch to `cycle` with every slot failed, without a coordinate.
    pub(crate) fn fail_cycle(&self, cycle: u64, error: WeatherError, location_name: Option<String>) {
        self.snapshot.send_if_modified(|snap| {
            if cycle <= snap.cycle {
                return false;
            }
            snap.cycle = cycle;
            snap.coordinate = None;
            snap.location_name = location_name;
            snap.map_url = None;
            for source in Source::ALL {
                let failed = SlotUpdate::failure(source, error.clone());
                self.apply_locked(snap, cycle, failed);
            }
            true
        });
    }

    /// Write one slot. Returns false if `cycle` is not the current cycle.
    pub(crate) fn apply(&self, cycle: u64, update: SlotUpdate) -> bool {
        self.snapshot.send_if_modified(|snap| {
            if snap.cycle != cycle {
                tracing::debug!(
                    "Dropping {} update from stale cycle {} (current {})",
                    update.source(),
                    cycle,
                    snap.cycle
                );
                return false;
            }
            self.apply_locked(snap, cycle, update);
            true
        })
    }

    /// Select the map layer along with its tile URL.
    ///
    /// The layer always sticks; the URL is only kept if `cycle` is still
    /// current. Returns whether the URL was applied.
    pub(crate) fn set_map(&self, cycle: u64, layer: MapLayer, url: Option<Url>) -> bool {
        let mut url_applied = false;
        self.snapshot.send_if_modified(|snap| {
            let layer_changed = snap.map_layer != layer;
            snap.map_layer = layer;
            if snap.cycle == cycle {
                snap.map_url = url;
                url_applied = true;
            }
            layer_changed || url_applied
        });
        url_applied
    }

    /// Store a tile URL built for `layer` without touching the layer
    /// selection. Dropped if the cycle moved on or the layer changed since.
    pub(crate) fn set_map_url(&self, cycle: u64, layer: MapLayer, url: Url) -> bool {
        self.snapshot.send_if_modified(|snap| {
            if snap.cycle != cycle || snap.map_layer != layer {
                tracing::debug!("Dropping map URL for {} from cycle {}", layer, cycle);
                return false;
            }
            snap.map_url = Some(url);
            true
        })
    }

    fn apply_locked(&self, snap: &mut WeatherSnapshot, cycle: u64, update: SlotUpdate) {
        // Sent while the watch lock is held so event order matches apply order
        let _ = self.events.send(SlotEvent {
            cycle,
            source: update.source(),
            state: update.summary(),
        });
        snap.apply(update);
    }
}

//! Fetch cycles: four concurrent per-source fetches for one coordinate.
//!
//! Starting a cycle cancels the previous one. Each subtask walks its slot
//! through `Loading(0.3)`, `Loading(0.7)` and a terminal state, consulting
//! the cache first. Cancellation is cooperative and never surfaces as a
//! failure; late writes from an abandoned cycle are rejected by the
//! [`StateStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::CacheStore;
use crate::client::WeatherClient;
use crate::geocode;
use crate::state::{LoadingState, SlotEvent, SlotUpdate, Source, StateStore, WeatherSnapshot};
use crate::tiles::{MapLayer, DEFAULT_MAP_ZOOM};
use crate::types::{AlertsResponse, Coord, CurrentWeather, GeocodingResult};
use nimbus_core::{FetchConfig, WeatherError};

/// Progress written once a subtask has missed the cache
pub const PROGRESS_CACHE_MISS: f64 = 0.3;
/// Progress written right before the network call
pub const PROGRESS_REQUESTING: f64 = 0.7;

/// Display name written when no location could be acquired
const UNAVAILABLE_NAME: &str = "Location Unavailable";

/// Knobs fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Artificial delay before each network call, for previews and demos
    pub preview_delay: Option<Duration>,
    /// Zoom level of the weather map tile
    pub map_zoom: u8,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            preview_delay: None,
            map_zoom: DEFAULT_MAP_ZOOM,
        }
    }
}

impl FetchOptions {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            preview_delay: config.preview_delay_ms.map(Duration::from_millis),
            ..Self::default()
        }
    }
}

/// Handle to a spawned cycle
#[derive(Debug)]
pub struct CycleHandle {
    id: u64,
    join: JoinHandle<()>,
}

impl CycleHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait until every subtask of the cycle has stopped.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            tracing::error!("Fetch cycle {} aborted: {}", self.id, e);
        }
    }
}

#[derive(Debug, Default)]
struct ActiveCycle {
    id: u64,
    token: Option<CancellationToken>,
    coordinate: Option<Coord>,
    location_name: Option<String>,
}

/// Shared by the subtasks of one cycle
struct CycleContext {
    id: u64,
    coordinate: Coord,
    token: CancellationToken,
    client: Arc<WeatherClient>,
    cache: Arc<CacheStore>,
    state: Arc<StateStore>,
    options: FetchOptions,
}

impl CycleContext {
    fn write(&self, update: SlotUpdate) {
        self.state.apply(self.id, update);
    }

    /// Sleep for the preview delay; false if cancelled meanwhile
    async fn preview_pause(&self) -> bool {
        let Some(delay) = self.options.preview_delay else {
            return true;
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Coordinates fetch cycles and owns the observable weather state.
pub struct FetchOrchestrator {
    client: Arc<WeatherClient>,
    cache: Arc<CacheStore>,
    state: Arc<StateStore>,
    options: FetchOptions,
    active: Mutex<ActiveCycle>,
}

impl FetchOrchestrator {
    pub fn new(client: Arc<WeatherClient>, cache: Arc<CacheStore>, options: FetchOptions) -> Self {
        Self {
            client,
            cache,
            state: Arc::new(StateStore::new()),
            options,
            active: Mutex::new(ActiveCycle::default()),
        }
    }

    pub fn client(&self) -> &WeatherClient {
        &self.client
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Receiver of the latest snapshot, notified on every applied write
    pub fn subscribe(&self) -> watch::Receiver<WeatherSnapshot> {
        self.state.subscribe()
    }

    /// Every applied slot transition, in apply order
    pub fn events(&self) -> broadcast::Receiver<SlotEvent> {
        self.state.events()
    }

    pub fn snapshot(&self) -> WeatherSnapshot {
        self.state.snapshot()
    }

    /// Cancel any running cycle and start fetching all four sources for
    /// the coordinate. Must be called within a tokio runtime.
    pub fn start_cycle(&self, lat: f64, lon: f64) -> CycleHandle {
        self.start_named_cycle(Coord { lat, lon }, None)
    }

    /// Start a cycle for a search result, recording its display name.
    pub fn select_location(&self, location: &GeocodingResult) -> CycleHandle {
        let coordinate = Coord {
            lat: location.lat,
            lon: location.lon,
        };
        self.start_named_cycle(coordinate, Some(location.display_name()))
    }

    /// Re-run a cycle for the last coordinate, if there is one.
    pub fn refresh(&self) -> Option<CycleHandle> {
        let (coordinate, name) = {
            let active = self.active.lock();
            (active.coordinate?, active.location_name.clone())
        };
        tracing::info!("Refreshing weather");
        Some(self.start_named_cycle(coordinate, name))
    }

    /// Signal cancellation of the running cycle without waiting for it.
    pub fn cancel_cycle(&self) {
        if let Some(token) = self.active.lock().token.take() {
            token.cancel();
            tracing::info!("Fetch cycle cancelled");
        }
    }

    /// No location could be acquired: fail every slot without any request.
    pub fn location_unavailable(&self, reason: &str) {
        let mut active = self.active.lock();
        if let Some(token) = active.token.take() {
            token.cancel();
        }
        active.id += 1;
        active.coordinate = None;
        active.location_name = Some(UNAVAILABLE_NAME.to_string());

        tracing::warn!("Location unavailable: {}", reason);
        self.state.fail_cycle(
            active.id,
            WeatherError::LocationUnavailable,
            active.location_name.clone(),
        );
    }

    /// Cached place search.
    pub async fn search_locations(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeocodingResult>, WeatherError> {
        geocode::search_locations(&self.client, &self.cache, query, limit).await
    }

    /// Switch the map layer and recompute the tile URL for the current
    /// coordinate. Returns the new URL, if a coordinate is known.
    pub fn set_map_layer(&self, layer: MapLayer) -> Result<Option<Url>, WeatherError> {
        let snapshot = self.state.snapshot();
        let url = match snapshot.coordinate {
            Some(Coord { lat, lon }) => {
                Some(self.client.map_tile_url(layer, lat, lon, self.options.map_zoom)?)
            }
            None => None,
        };
        tracing::debug!("Map layer set to {}", layer);
        self.state.set_map(snapshot.cycle, layer, url.clone());
        Ok(url)
    }

    fn start_named_cycle(&self, coordinate: Coord, location_name: Option<String>) -> CycleHandle {
        let ctx = {
            let mut active = self.active.lock();
            if let Some(previous) = active.token.take() {
                previous.cancel();
                tracing::debug!("Cancelled fetch cycle {}", active.id);
            }
            active.id += 1;
            let token = CancellationToken::new();
            active.token = Some(token.clone());
            active.coordinate = Some(coordinate);
            active.location_name = location_name.clone();

            // Reset under the lock so slot resets follow cycle order
            self.state.begin_cycle(active.id, coordinate, location_name);

            Arc::new(CycleContext {
                id: active.id,
                coordinate,
                token,
                client: self.client.clone(),
                cache: self.cache.clone(),
                state: self.state.clone(),
                options: self.options.clone(),
            })
        };

        tracing::info!(
            "Starting fetch cycle {} for ({:.4}, {:.4})",
            ctx.id,
            coordinate.lat,
            coordinate.lon
        );

        let id = ctx.id;
        let join = tokio::spawn(drive_cycle(ctx));
        CycleHandle { id, join }
    }
}

impl Drop for FetchOrchestrator {
    fn drop(&mut self) {
        if let Some(token) = self.active.get_mut().token.take() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("cycle", &self.active.lock().id)
            .field("options", &self.options)
            .finish()
    }
}

async fn drive_cycle(ctx: Arc<CycleContext>) {
    let Coord { lat, lon } = ctx.coordinate;
    let mut tasks = JoinSet::new();

    for source in Source::ALL {
        let c = ctx.clone();
        match source {
            Source::CurrentWeather => {
                let fetch = async move { c.client.current_weather(lat, lon).await };
                tasks.spawn(run_source(ctx.clone(), source, SlotUpdate::CurrentWeather, fetch));
            }
            Source::Forecast => {
                let fetch = async move { c.client.forecast(lat, lon).await };
                tasks.spawn(run_source(ctx.clone(), source, SlotUpdate::Forecast, fetch));
            }
            Source::AirQuality => {
                let fetch = async move { c.client.air_quality(lat, lon).await };
                tasks.spawn(run_source(ctx.clone(), source, SlotUpdate::AirQuality, fetch));
            }
            Source::Alerts => {
                let fetch = async move { fetch_alerts(&c).await };
                tasks.spawn(run_source(ctx.clone(), source, SlotUpdate::Alerts, fetch));
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Fetch subtask in cycle {} panicked: {}", ctx.id, e);
        }
    }

    if ctx.token.is_cancelled() {
        tracing::debug!("Fetch cycle {} abandoned", ctx.id);
        return;
    }

    let layer = ctx.state.snapshot().map_layer;
    match ctx.client.map_tile_url(layer, lat, lon, ctx.options.map_zoom) {
        Ok(url) => {
            ctx.state.set_map_url(ctx.id, layer, url);
        }
        Err(e) => tracing::warn!("Could not build map URL: {}", e),
    }

    tracing::info!("Fetch cycle {} finished", ctx.id);
}

/// One source's walk from cache lookup to a terminal state.
async fn run_source<T, S, F>(ctx: Arc<CycleContext>, source: Source, slot: S, fetch: F)
where
    T: Clone + Send + Sync + 'static,
    S: Fn(LoadingState<T>) -> SlotUpdate,
    F: Future<Output = Result<T, WeatherError>> + Send + 'static,
{
    let key = source.endpoint(ctx.coordinate).cache_key();

    if let Some(cached) = ctx.cache.get::<T>(&key) {
        ctx.write(slot(LoadingState::Success(cached)));
        return;
    }

    ctx.write(slot(LoadingState::Loading(PROGRESS_CACHE_MISS)));

    if !ctx.preview_pause().await || ctx.token.is_cancelled() {
        tracing::debug!("{} cancelled before request", source);
        return;
    }

    ctx.write(slot(LoadingState::Loading(PROGRESS_REQUESTING)));

    let result = tokio::select! {
        biased;
        _ = ctx.token.cancelled() => {
            tracing::debug!("{} cancelled during request", source);
            return;
        }
        result = fetch => result,
    };

    if ctx.token.is_cancelled() {
        return;
    }

    match result {
        Ok(value) => {
            ctx.cache.put(key, value.clone());
            ctx.write(slot(LoadingState::Success(value)));
        }
        Err(e) => {
            tracing::warn!("Fetching {} failed: {}", source, e);
            ctx.write(slot(LoadingState::Failure(e)));
        }
    }
}

/// Alerts ride on current weather, read through the cache when possible.
async fn fetch_alerts(ctx: &CycleContext) -> Result<AlertsResponse, WeatherError> {
    let key = Source::CurrentWeather.endpoint(ctx.coordinate).cache_key();
    let weather = match ctx.cache.get::<CurrentWeather>(&key) {
        Some(weather) => weather,
        None => {
            let Coord { lat, lon } = ctx.coordinate;
            let weather = ctx.client.current_weather(lat, lon).await?;
            ctx.cache.put(key, weather.clone());
            weather
        }
    };
    Ok(AlertsResponse::synthesized_from(&weather))
}

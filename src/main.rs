use std::sync::Arc;

use anyhow::Result;
use chrono::{FixedOffset, Offset, Utc};
use clap::Parser;
use url::Url;

use nimbus_core::{AppError, Config};
use nimbus_weather::{
    derive_daily_forecasts, CacheStore, ClientConfig, FetchOptions, FetchOrchestrator,
    LoadingState, MapLayer, WeatherClient, WeatherSnapshot, DEFAULT_SEARCH_LIMIT,
};

/// Current conditions, forecast, air quality and weather map for a place
#[derive(Debug, Parser)]
#[command(name = "nimbus", version, about)]
struct Cli {
    /// Latitude in degrees
    #[arg(long, allow_hyphen_values = true, requires = "lon")]
    lat: Option<f64>,

    /// Longitude in degrees
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lon: Option<f64>,

    /// Look up a place by name instead of giving coordinates
    #[arg(long, short, conflicts_with_all = ["lat", "lon"])]
    search: Option<String>,

    /// Maximum number of search matches to list
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    limit: u32,

    /// Weather map overlay (clouds, precipitation, pressure, wind, temp)
    #[arg(long, default_value = "precipitation")]
    layer: MapLayer,
}

#[tokio::main]
async fn main() -> Result<()> {
    nimbus_core::init()?;

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let (config, _) = Config::load_validated()?;
    let api_key = config.api_key()?;

    let client = WeatherClient::new(ClientConfig::from_settings(&config.api, api_key))?;
    let orchestrator = FetchOrchestrator::new(
        Arc::new(client),
        Arc::new(CacheStore::from_config(&config.cache)),
        FetchOptions::from_config(&config.fetch),
    );
    orchestrator.set_map_layer(cli.layer)?;

    let handle = if let Some(query) = cli.search {
        let results = orchestrator.search_locations(&query, cli.limit).await?;
        let Some(place) = results.first() else {
            println!("No places match {:?}", query);
            return Ok(());
        };
        for (i, result) in results.iter().enumerate() {
            let marker = if i == 0 { '*' } else { ' ' };
            println!(
                "{} {} ({:.4}, {:.4})",
                marker,
                result.display_name(),
                result.lat,
                result.lon
            );
        }
        println!();
        orchestrator.select_location(place)
    } else {
        match cli.lat.zip(cli.lon).or_else(|| config.location.coordinate()) {
            Some((lat, lon)) => orchestrator.start_cycle(lat, lon),
            None => {
                orchestrator.location_unavailable("no coordinate given or configured");
                print_report(&orchestrator.snapshot(), None);
                return Ok(());
            }
        }
    };

    handle.join().await;
    print_report(
        &orchestrator.snapshot(),
        config
            .display
            .utc_offset_seconds
            .and_then(FixedOffset::east_opt),
    );

    Ok(())
}

fn print_report(snap: &WeatherSnapshot, offset: Option<FixedOffset>) {
    let title = snap
        .location_name
        .clone()
        .or_else(|| snap.current.value().map(|w| w.name.clone()))
        .unwrap_or_else(|| "Unknown location".to_string());
    println!("{}", title);

    match &snap.current {
        LoadingState::Success(w) => println!(
            "  Now:       {:.1}°, {} (feels like {:.1}°, humidity {}%)",
            w.main.temp,
            w.description(),
            w.main.feels_like,
            w.main.humidity
        ),
        LoadingState::Failure(e) => println!("  Now:       {}", e.user_message()),
        _ => println!("  Now:       not loaded"),
    }

    match &snap.air_quality {
        LoadingState::Success(air) => match air.list.first() {
            Some(reading) => println!("  Air:       {}", reading.level().description()),
            None => println!("  Air:       no readings"),
        },
        LoadingState::Failure(e) => println!("  Air:       {}", e.user_message()),
        _ => println!("  Air:       not loaded"),
    }

    match &snap.alerts {
        LoadingState::Success(alerts) if alerts.alert_count() == 0 => {
            println!("  Alerts:    none");
        }
        LoadingState::Success(alerts) => println!("  Alerts:    {}", alerts.alert_count()),
        LoadingState::Failure(e) => println!("  Alerts:    {}", e.user_message()),
        _ => println!("  Alerts:    not loaded"),
    }

    if let LoadingState::Failure(e) = &snap.forecast {
        println!("  Forecast:  {}", e.user_message());
    }

    let offset = offset
        .or_else(|| snap.forecast.value().and_then(|f| f.city_offset()))
        .unwrap_or_else(|| Utc.fix());
    let days = derive_daily_forecasts(&snap.forecast, &offset);
    if !days.is_empty() {
        println!();
        for day in days {
            println!(
                "  {}  {:>5.1}° / {:>5.1}°  {:>3.0}%  {}",
                day.date.format("%a %d %b"),
                day.max_temp,
                day.min_temp,
                day.precipitation_chance * 100.0,
                day.description
            );
        }
    }

    if let Some(url) = &snap.map_url {
        println!();
        println!("  Map ({}): {}", snap.map_layer, without_query(url));
    }
}

/// Tile URL as shown to the user; the query carries the API key
fn without_query(url: &Url) -> Url {
    let mut shown = url.clone();
    shown.set_query(None);
    shown
}

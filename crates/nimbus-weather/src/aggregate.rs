//! Collapse the 3-hourly forecast into one summary per calendar day.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{NaiveDate, TimeZone, Timelike};

use crate::state::LoadingState;
use crate::types::{DailyForecast, ForecastItem, ForecastResponse};

/// Local hours whose sample best represents the day's weather
const MIDDAY_HOURS: RangeInclusive<u32> = 12..=15;

/// Daily summaries for a forecast slot; empty unless the slot holds data.
///
/// Days are cut at midnight in `tz`.
pub fn derive_daily_forecasts<Tz: TimeZone>(
    state: &LoadingState<ForecastResponse>,
    tz: &Tz,
) -> Vec<DailyForecast> {
    match state {
        LoadingState::Success(forecast) => daily_forecasts(&forecast.list, tz),
        _ => Vec::new(),
    }
}

/// Group samples by local day, sorted ascending by day.
pub fn daily_forecasts<Tz: TimeZone>(items: &[ForecastItem], tz: &Tz) -> Vec<DailyForecast> {
    let mut days: BTreeMap<NaiveDate, Vec<(u32, &ForecastItem)>> = BTreeMap::new();

    for item in items {
        let Some(utc) = item.date() else {
            tracing::debug!("Skipping forecast sample with bad timestamp {}", item.dt);
            continue;
        };
        let local = utc.with_timezone(tz);
        days.entry(local.date_naive())
            .or_default()
            .push((local.hour(), item));
    }

    days.into_iter()
        .filter_map(|(date, samples)| summarize_day(date, &samples))
        .collect()
}

fn summarize_day(date: NaiveDate, samples: &[(u32, &ForecastItem)]) -> Option<DailyForecast> {
    let representative = samples
        .iter()
        .find(|(hour, _)| MIDDAY_HOURS.contains(hour))
        .or_else(|| samples.first())
        .map(|(_, item)| *item)?;

    let max_temp = samples
        .iter()
        .map(|(_, item)| item.main.temp_max)
        .fold(f64::NEG_INFINITY, f64::max);
    let min_temp = samples
        .iter()
        .map(|(_, item)| item.main.temp_min)
        .fold(f64::INFINITY, f64::min);
    let precipitation_chance = samples
        .iter()
        .map(|(_, item)| item.pop)
        .fold(0.0, f64::max);

    Some(DailyForecast {
        date,
        max_temp,
        min_temp,
        precipitation_chance,
        icon: representative.icon().to_string(),
        description: representative.description().to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::types::{City, Condition, Coord, MainMetrics, Wind};
    use chrono::{FixedOffset, Utc};
    use nimbus_core::WeatherError;

    /// 2024-06-01T00:00:00Z
    const JUNE_FIRST: i64 = 1_717_200_000;
    const HOUR: i64 = 3600;

    fn sample(dt: i64, temp: f64, pop: f64, icon: &str) -> ForecastItem {
        ForecastItem {
            dt,
            main: MainMetrics {
                temp,
                feels_like: temp,
                temp_min: temp,
                temp_max: temp,
                pressure: 1013.0,
                humidity: 50,
            },
            weather: vec![Condition {
                id: 800,
                main: "Clear".into(),
                description: format!("sky {}", icon),
                icon: icon.into(),
            }],
            pop,
            wind: Wind::default(),
            dt_txt: None,
        }
    }

    fn response(list: Vec<ForecastItem>) -> ForecastResponse {
        ForecastResponse {
            list,
            city: City {
                id: 1,
                name: "London".into(),
                coord: Coord { lat: 51.5, lon: -0.12 },
                country: "GB".into(),
                population: 0,
                timezone: 0,
                sunrise: 0,
                sunset: 0,
            },
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_midday_sample_is_representative() {
        let state = LoadingState::Success(response(vec![
            sample(JUNE_FIRST + 9 * HOUR, 18.0, 0.1, "01d"),
            sample(JUNE_FIRST + 13 * HOUR, 24.0, 0.0, "02d"),
            sample(JUNE_FIRST + 21 * HOUR, 15.0, 0.4, "01n"),
        ]));

        let days = derive_daily_forecasts(&state, &Utc);
        assert_eq!(days.len(), 1);
        let day = &days[0];
        assert_eq!(day.date, date(2024, 6, 1));
        assert_eq!(day.max_temp, 24.0);
        assert_eq!(day.min_temp, 15.0);
        assert_eq!(day.precipitation_chance, 0.4);
        assert_eq!(day.icon, "02d");
        assert_eq!(day.description, "sky 02d");
    }

    #[test]
    fn test_falls_back_to_first_sample() {
        let state = LoadingState::Success(response(vec![
            sample(JUNE_FIRST + 3 * HOUR, 12.0, 0.0, "04n"),
            sample(JUNE_FIRST + 18 * HOUR, 16.0, 0.0, "03d"),
        ]));

        let days = derive_daily_forecasts(&state, &Utc);
        assert_eq!(days[0].icon, "04n");
    }

    #[test]
    fn test_one_entry_per_day_sorted() {
        // Deliberately out of order
        let state = LoadingState::Success(response(vec![
            sample(JUNE_FIRST + 50 * HOUR, 20.0, 0.0, "01d"),
            sample(JUNE_FIRST + 2 * HOUR, 10.0, 0.0, "01n"),
            sample(JUNE_FIRST + 26 * HOUR, 14.0, 0.0, "01n"),
            sample(JUNE_FIRST + 14 * HOUR, 19.0, 0.0, "01d"),
        ]));

        let days = derive_daily_forecasts(&state, &Utc);
        let dates: Vec<NaiveDate> = days.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date(2024, 6, 1), date(2024, 6, 2), date(2024, 6, 3)]);
        assert_eq!(days[0].max_temp, 19.0);
        assert_eq!(days[0].min_temp, 10.0);
    }

    #[test]
    fn test_day_boundary_follows_time_zone() {
        // 22:00 UTC on June 1st is already June 2nd at UTC+3
        let items = vec![
            sample(JUNE_FIRST + 20 * HOUR, 20.0, 0.0, "01d"),
            sample(JUNE_FIRST + 22 * HOUR, 18.0, 0.0, "01n"),
        ];
        let plus_three = FixedOffset::east_opt(3 * 3600).unwrap();

        assert_eq!(daily_forecasts(&items, &Utc).len(), 1);
        let shifted = daily_forecasts(&items, &plus_three);
        assert_eq!(shifted.len(), 2);
        assert_eq!(shifted[1].date, date(2024, 6, 2));
    }

    #[test]
    fn test_local_hour_picks_representative() {
        // 10:00 UTC is 13:00 at UTC+3
        let items = vec![
            sample(JUNE_FIRST + 7 * HOUR, 20.0, 0.0, "03d"),
            sample(JUNE_FIRST + 10 * HOUR, 22.0, 0.0, "10d"),
        ];
        let plus_three = FixedOffset::east_opt(3 * 3600).unwrap();
        assert_eq!(daily_forecasts(&items, &plus_three)[0].icon, "10d");
    }

    #[test]
    fn test_empty_list() {
        let state = LoadingState::Success(response(vec![]));
        assert!(derive_daily_forecasts(&state, &Utc).is_empty());
    }

    #[test]
    fn test_non_success_states_are_empty() {
        let states: [LoadingState<ForecastResponse>; 3] = [
            LoadingState::Idle,
            LoadingState::Loading(0.7),
            LoadingState::Failure(WeatherError::InvalidData),
        ];
        for state in &states {
            assert!(derive_daily_forecasts(state, &Utc).is_empty());
        }
    }
}

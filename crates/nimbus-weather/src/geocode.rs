//! Direct geocoding: turn a place name into candidate coordinates.

use crate::cache::CacheStore;
use crate::client::WeatherClient;
use crate::endpoint::Endpoint;
use crate::types::GeocodingResult;
use nimbus_core::WeatherError;

/// Default number of matches requested per search
pub const DEFAULT_SEARCH_LIMIT: u32 = 5;

impl GeocodingResult {
    /// Human-readable place name (e.g. "Portland, Oregon, US").
    /// Parts equal to an earlier part are left out.
    pub fn display_name(&self) -> String {
        let mut parts: Vec<&str> = vec![self.name.as_str()];

        for part in [self.state.as_deref().unwrap_or_default(), self.country.as_str()] {
            if !part.is_empty() && !parts.iter().any(|p| p.eq_ignore_ascii_case(part)) {
                parts.push(part);
            }
        }

        parts.join(", ")
    }
}

/// Search for places matching `query`, consulting the cache first.
///
/// A blank query returns no results without touching the network.
pub async fn search_locations(
    client: &WeatherClient,
    cache: &CacheStore,
    query: &str,
    limit: u32,
) -> Result<Vec<GeocodingResult>, WeatherError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let endpoint = Endpoint::Geocoding {
        query: query.to_string(),
        limit,
    };
    let key = endpoint.cache_key();

    if let Some(cached) = cache.get::<Vec<GeocodingResult>>(&key) {
        return Ok(cached);
    }

    let results: Vec<GeocodingResult> = client.fetch(&endpoint).await?;
    tracing::info!("Geocoded {:?} to {} result(s)", query, results.len());
    cache.put(key, results.clone());
    Ok(results)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::client::ClientConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn result(name: &str, state: Option<&str>, country: &str) -> GeocodingResult {
        GeocodingResult {
            name: name.to_string(),
            lat: 0.0,
            lon: 0.0,
            country: country.to_string(),
            state: state.map(str::to_string),
        }
    }

    #[test]
    fn test_display_name_full() {
        let r = result("Portland", Some("Oregon"), "US");
        assert_eq!(r.display_name(), "Portland, Oregon, US");
    }

    #[test]
    fn test_display_name_skips_repeats() {
        let r = result("Singapore", Some("Singapore"), "SG");
        assert_eq!(r.display_name(), "Singapore, SG");
    }

    #[test]
    fn test_display_name_without_state() {
        let r = result("Reykjavik", None, "IS");
        assert_eq!(r.display_name(), "Reykjavik, IS");
    }

    #[tokio::test]
    async fn test_blank_query_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client =
            WeatherClient::new(ClientConfig::new("k").with_base_url(&server.uri())).unwrap();
        let cache = CacheStore::default();
        let results = search_locations(&client, &cache, "   ", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/direct"))
            .and(query_param("q", "Oslo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "Oslo", "lat": 59.91, "lon": 10.75, "country": "NO"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            WeatherClient::new(ClientConfig::new("k").with_base_url(&server.uri())).unwrap();
        let cache = CacheStore::default();

        let first = search_locations(&client, &cache, "Oslo", 5).await.unwrap();
        let second = search_locations(&client, &cache, " oslo ", 5).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].display_name(), "Oslo, NO");
    }
}

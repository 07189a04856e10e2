//! Coordinate resolution through a Nominatim-compatible geocoder
//!
//! Descriptions are resolved once per run; later lookups of the same exact
//! string are served from memory.

use std::collections::HashMap;

use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::core::config::ServiceConfig;
use crate::core::error::{Error, GeocodingFailure, Result, TransportError};
use crate::core::http::{build_client, get_json, retry_on_network_error};
use crate::core::model::Location;

/// One search candidate; only the coordinates are used
#[derive(Debug, Deserialize)]
struct Candidate {
    lon: String,
    lat: String,
}

/// Resolves descriptions to [`Location`]s, memoized by exact description
pub struct CoordinateResolver {
    client: Client,
    config: ServiceConfig,
    cache: HashMap<String, Location>,
    requests: usize,
    cache_hits: usize,
}

impl CoordinateResolver {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self::with_client(client, config))
    }

    /// Share an existing client (and its connection pool)
    pub fn with_client(client: Client, config: ServiceConfig) -> Self {
        Self {
            client,
            config,
            cache: HashMap::new(),
            requests: 0,
            cache_hits: 0,
        }
    }

    /// Resolve `description`, taking the first candidate returned by the service
    pub async fn resolve(&mut self, description: &str) -> Result<Location> {
        if let Some(location) = self.cache.get(description) {
            self.cache_hits += 1;
            debug!("Geocoding cache hit for '{description}'");
            return Ok(location.clone());
        }
        if description.trim().is_empty() {
            return Err(Error::InvalidInput(
                "cannot geocode an empty description".to_string(),
            ));
        }

        self.requests += 1;
        let url = self.config.search_url();
        let client = &self.client;
        let payload = retry_on_network_error(&self.config, || async {
            let (_, value) = get_json(client, &url, &[("q", description), ("format", "json")]).await?;
            Ok::<Value, TransportError>(value)
        })
        .await
        .map_err(|e| Error::geocoding(description, GeocodingFailure::Transport(e)))?;

        let location = parse_first_candidate(description, payload)?;
        debug!("Geocoded {location}");
        self.cache.insert(description.to_string(), location.clone());
        Ok(location)
    }

    /// Outbound requests issued so far
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Lookups answered from memory so far
    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }
}

fn parse_first_candidate(description: &str, payload: Value) -> Result<Location> {
    let candidates: Vec<Candidate> = serde_json::from_value(payload).map_err(|e| {
        Error::geocoding(
            description,
            GeocodingFailure::MalformedCoordinates(e.to_string()),
        )
    })?;
    let first = candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::geocoding(description, GeocodingFailure::NoCandidate))?;

    let malformed = |msg: String| Error::geocoding(description, GeocodingFailure::MalformedCoordinates(msg));
    let longitude: f64 = first
        .lon
        .trim()
        .parse()
        .map_err(|_| malformed(format!("lon = {:?}", first.lon)))?;
    let latitude: f64 = first
        .lat
        .trim()
        .parse()
        .map_err(|_| malformed(format!("lat = {:?}", first.lat)))?;

    Location::new(description, longitude, latitude)
        .map_err(|_| malformed(format!("out of range: ({longitude}, {latitude})")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ServiceConfig {
        ServiceConfig {
            geocoder_url: server.uri(),
            base_retry_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_takes_first_candidate() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Gare de Lyon, Paris"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"lon": "2.3734", "lat": "48.8443", "display_name": "Gare de Lyon"},
                {"lon": "4.8258", "lat": "45.7606", "display_name": "Elsewhere"}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut resolver = CoordinateResolver::new(config_for(&mock_server)).unwrap();
        let location = resolver.resolve("Gare de Lyon, Paris").await.unwrap();

        assert_eq!(location.description(), "Gare de Lyon, Paris");
        assert_eq!(location.longitude(), 2.3734);
        assert_eq!(location.latitude(), 48.8443);
    }

    #[tokio::test]
    async fn test_resolve_is_memoized_by_description() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"lon": "1.5", "lat": "43.6"}])),
            )
            .expect(2)
            .mount(&mock_server)
            .await;

        let mut resolver = CoordinateResolver::new(config_for(&mock_server)).unwrap();
        let first = resolver.resolve("Toulouse").await.unwrap();
        let again = resolver.resolve("Toulouse").await.unwrap();
        // Different spelling is a different key
        resolver.resolve("toulouse").await.unwrap();

        assert_eq!(first, again);
        assert_eq!(resolver.requests(), 2);
        assert_eq!(resolver.cache_hits(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_a_geocoding_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let mut resolver = CoordinateResolver::new(config_for(&mock_server)).unwrap();
        let err = resolver.resolve("Atlantis").await.unwrap_err();

        match err {
            Error::Geocoding { description, reason } => {
                assert_eq!(description, "Atlantis");
                assert_eq!(reason, GeocodingFailure::NoCandidate);
            }
            other => panic!("Expected geocoding error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparsable_coordinates() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"lon": "east", "lat": "1.0"}])),
            )
            .mount(&mock_server)
            .await;

        let mut resolver = CoordinateResolver::new(config_for(&mock_server)).unwrap();
        let err = resolver.resolve("Somewhere").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Geocoding {
                reason: GeocodingFailure::MalformedCoordinates(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_geocoding_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Access blocked"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut resolver = CoordinateResolver::new(config_for(&mock_server)).unwrap();
        let err = resolver.resolve("Paris").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Geocoding {
                reason: GeocodingFailure::Transport(TransportError::Http(_)),
                ..
            }
        ));
        // Failures are not cached
        assert_eq!(resolver.requests(), 1);
    }
}

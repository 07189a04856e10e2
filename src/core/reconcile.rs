//! Reconciliation workflows
//!
//! * Fill-missing: complete an explicit origin/destination table, computing
//!   only the cells that are empty on input.
//! * Order-then-route: geocode an unordered location list, build the full
//!   route matrix, order it greedily and return the legs of that order.

use log::{info, warn};

use crate::core::config::ServiceConfig;
use crate::core::error::{suggest_correction, Error, Result, RoutingFailure};
use crate::core::geocoder::CoordinateResolver;
use crate::core::http::build_client;
use crate::core::model::{Location, RouteEdge};
use crate::core::options::{EngineOptions, FailurePolicy};
use crate::core::router::RouteMatrixBuilder;
use crate::core::sequencer::{route_legs, sequence};
use crate::core::sheet::Cell;

/// One side of an explicit pair; coordinates may be missing
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub description: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

impl Endpoint {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            longitude: None,
            latitude: None,
        }
    }

    pub fn with_coordinates(description: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            description: description.into(),
            longitude: Some(longitude),
            latitude: Some(latitude),
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.longitude.is_some() && self.latitude.is_some()
    }

    /// Location for routing, if both coordinates are known
    fn location(&self) -> Option<Result<Location>> {
        match (self.longitude, self.latitude) {
            (Some(longitude), Some(latitude)) => {
                Some(Location::new(self.description.as_str(), longitude, latitude))
            }
            _ => None,
        }
    }
}

/// A row of the explicit origin/destination table
#[derive(Debug, Clone, PartialEq)]
pub struct PairRow {
    /// `Indice` cell as read, written back unchanged
    pub index: Option<Cell>,
    pub origin: Endpoint,
    pub destination: Endpoint,
    pub distance_km: Option<f64>,
    pub duration_s: Option<u64>,
}

impl PairRow {
    pub fn new(origin: Endpoint, destination: Endpoint) -> Self {
        Self {
            index: None,
            origin,
            destination,
            distance_km: None,
            duration_s: None,
        }
    }

    /// True when no field remains to be computed
    pub fn is_complete(&self) -> bool {
        self.origin.has_coordinates()
            && self.destination.has_coordinates()
            && self.distance_km.is_some()
            && self.duration_s.is_some()
    }
}

/// A row or location that could not be processed
#[derive(Debug)]
pub struct RowFailure {
    /// 0-based position in the input
    pub position: usize,
    /// Label of the row (its index cell or its description)
    pub label: String,
    pub error: Error,
}

/// Counters of external requests and cache hits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub geocoding_requests: usize,
    pub geocoding_cache_hits: usize,
    pub routing_requests: usize,
    pub routing_cache_hits: usize,
}

impl RunStats {
    pub fn external_requests(&self) -> usize {
        self.geocoding_requests + self.routing_requests
    }
}

/// Result of the fill-missing workflow
#[derive(Debug)]
pub struct FillReport {
    /// One output row per input row, in input order
    pub rows: Vec<PairRow>,
    pub failures: Vec<RowFailure>,
    pub stats: RunStats,
}

/// Result of the order-then-route workflow
#[derive(Debug)]
pub struct OrderedRoute {
    /// Visiting order, starting at the chosen start location
    pub order: Vec<Location>,
    /// Edges between consecutive locations of `order`
    pub legs: Vec<RouteEdge>,
    /// Locations left out because they could not be geocoded
    pub skipped: Vec<RowFailure>,
    pub stats: RunStats,
}

impl OrderedRoute {
    pub fn total_distance_km(&self) -> f64 {
        (self.legs.iter().map(|leg| leg.distance_km).sum::<f64>() * 100.0).round() / 100.0
    }

    pub fn total_duration_s(&self) -> u64 {
        self.legs.iter().map(|leg| leg.duration_s).sum()
    }
}

/// Drives the geocoder, the router and the sequencer for both workflows
pub struct ReconciliationDriver {
    resolver: CoordinateResolver,
    builder: RouteMatrixBuilder,
    options: EngineOptions,
}

impl ReconciliationDriver {
    pub fn new(config: ServiceConfig, options: EngineOptions) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            resolver: CoordinateResolver::with_client(client.clone(), config.clone()),
            builder: RouteMatrixBuilder::with_client(client, config),
            options,
        })
    }

    /// Requests and cache hits since the driver was created
    pub fn stats(&self) -> RunStats {
        RunStats {
            geocoding_requests: self.resolver.requests(),
            geocoding_cache_hits: self.resolver.cache_hits(),
            routing_requests: self.builder.requests(),
            routing_cache_hits: self.builder.cache_hits(),
        }
    }

    /// Compute the empty cells of every row, leaving populated cells untouched
    pub async fn fill_missing(&mut self, rows: &[PairRow]) -> Result<FillReport> {
        let before = self.stats();
        let total = rows.len() as u64;
        let mut filled = Vec::with_capacity(rows.len());
        let mut failures = Vec::new();

        self.options.report_progress(0, total);
        for (position, row) in rows.iter().enumerate() {
            match self.fill_row(row).await {
                Ok(output) => filled.push(output),
                Err((partial, error)) => {
                    if self.options.failure_policy == FailurePolicy::Abort {
                        return Err(error);
                    }
                    let label = row
                        .index
                        .as_ref()
                        .map(Cell::to_text)
                        .unwrap_or_else(|| (position + 1).to_string());
                    warn!("Row {label} left incomplete: {error}");
                    filled.push(partial);
                    failures.push(RowFailure {
                        position,
                        label,
                        error,
                    });
                }
            }
            self.options.report_progress(position as u64 + 1, total);
        }

        let stats = self.stats_since(before);
        info!(
            "Filled {} rows ({} failed) with {} geocoding and {} routing requests",
            rows.len(),
            failures.len(),
            stats.geocoding_requests,
            stats.routing_requests
        );
        Ok(FillReport {
            rows: filled,
            failures,
            stats,
        })
    }

    /// Output row for `row`; on failure, the partially filled row and the error
    async fn fill_row(&mut self, row: &PairRow) -> std::result::Result<PairRow, (PairRow, Error)> {
        let origin = match self.fill_endpoint(&row.origin).await {
            Ok(origin) => origin,
            Err(e) => return Err((row.clone(), e)),
        };
        let destination = match self.fill_endpoint(&row.destination).await {
            Ok(destination) => destination,
            Err(e) => {
                let partial = PairRow {
                    origin,
                    ..row.clone()
                };
                return Err((partial, e));
            }
        };

        let (distance_km, duration_s) = if row.distance_km.is_some() && row.duration_s.is_some() {
            (row.distance_km, row.duration_s)
        } else {
            match self.route(&origin, &destination).await {
                Ok(edge) => (
                    row.distance_km.or(Some(edge.distance_km)),
                    row.duration_s.or(Some(edge.duration_s)),
                ),
                Err(e) => {
                    let partial = PairRow {
                        origin,
                        destination,
                        ..row.clone()
                    };
                    return Err((partial, e));
                }
            }
        };

        Ok(PairRow {
            index: row.index.clone(),
            origin,
            destination,
            distance_km,
            duration_s,
        })
    }

    /// Endpoint with its missing coordinates filled from the geocoder
    async fn fill_endpoint(&mut self, endpoint: &Endpoint) -> Result<Endpoint> {
        if endpoint.has_coordinates() {
            return Ok(endpoint.clone());
        }
        let location = self.resolver.resolve(&endpoint.description).await?;
        Ok(Endpoint {
            description: endpoint.description.clone(),
            longitude: endpoint.longitude.or(Some(location.longitude())),
            latitude: endpoint.latitude.or(Some(location.latitude())),
        })
    }

    async fn route(&mut self, origin: &Endpoint, destination: &Endpoint) -> Result<RouteEdge> {
        let invalid = || {
            Error::routing(
                &origin.description,
                &destination.description,
                RoutingFailure::InvalidCoordinates,
            )
        };
        let from = origin.location().ok_or_else(invalid)?.map_err(|_| invalid())?;
        let to = destination.location().ok_or_else(invalid)?.map_err(|_| invalid())?;
        self.builder.edge(&from, &to).await
    }

    /// Geocode `descriptions`, build their route matrix and order them greedily
    ///
    /// `start` names the first location; the first description is used when it
    /// is `None`. Exact duplicate descriptions are visited once.
    pub async fn order_then_route(
        &mut self,
        descriptions: &[String],
        start: Option<&str>,
    ) -> Result<OrderedRoute> {
        let before = self.stats();

        let mut unique: Vec<&str> = Vec::with_capacity(descriptions.len());
        for description in descriptions {
            if unique.contains(&description.as_str()) {
                warn!("Duplicate location '{description}' ignored");
            } else {
                unique.push(description);
            }
        }
        if unique.is_empty() {
            return Err(Error::InvalidInput("no location to order".to_string()));
        }

        let total = unique.len() as u64;
        let mut locations = Vec::with_capacity(unique.len());
        let mut skipped = Vec::new();
        self.options.report_progress(0, total);
        for (position, description) in unique.iter().enumerate() {
            match self.resolver.resolve(description).await {
                Ok(location) => locations.push(location),
                Err(error) if self.options.failure_policy == FailurePolicy::Continue => {
                    warn!("Location '{description}' skipped: {error}");
                    skipped.push(RowFailure {
                        position,
                        label: description.to_string(),
                        error,
                    });
                }
                Err(error) => return Err(error),
            }
            self.options.report_progress(position as u64 + 1, total);
        }
        if locations.is_empty() {
            return Err(Error::InvalidInput(
                "none of the locations could be geocoded".to_string(),
            ));
        }

        let start = match start {
            Some(name) => Some(find_start(&locations, name)?),
            None => None,
        };

        let matrix = self
            .builder
            .build_matrix(&locations, self.options.progress.clone())
            .await?;
        let order = sequence(&matrix, &locations, start)?;
        let legs = route_legs(&matrix, &order)?;

        let stats = self.stats_since(before);
        info!(
            "Ordered {} locations with {} geocoding and {} routing requests",
            order.len(),
            stats.geocoding_requests,
            stats.routing_requests
        );
        Ok(OrderedRoute {
            order,
            legs,
            skipped,
            stats,
        })
    }

    fn stats_since(&self, before: RunStats) -> RunStats {
        let now = self.stats();
        RunStats {
            geocoding_requests: now.geocoding_requests - before.geocoding_requests,
            geocoding_cache_hits: now.geocoding_cache_hits - before.geocoding_cache_hits,
            routing_requests: now.routing_requests - before.routing_requests,
            routing_cache_hits: now.routing_cache_hits - before.routing_cache_hits,
        }
    }
}

fn find_start<'a>(locations: &'a [Location], name: &str) -> Result<&'a Location> {
    locations
        .iter()
        .find(|location| location.description() == name)
        .ok_or_else(|| {
            let known: Vec<String> = locations
                .iter()
                .map(|location| location.description().to_string())
                .collect();
            let hint = suggest_correction(name, &known)
                .map(|s| format!(". Did you mean '{s}'?"))
                .unwrap_or_default();
            Error::InvalidInput(format!("start location '{name}' is not in the list{hint}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ServiceConfig {
        ServiceConfig {
            geocoder_url: server.uri(),
            router_url: server.uri(),
            base_retry_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    async fn mount_place(server: &MockServer, name: &str, lon: &str, lat: &str) {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", name))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"lon": lon, "lat": lat}])))
            .mount(server)
            .await;
    }

    async fn mount_route(server: &MockServer, coords: &str, meters: f64, seconds: f64) {
        Mock::given(method("GET"))
            .and(path(format!("/route/v1/driving/{coords}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "Ok",
                "routes": [{"distance": meters, "duration": seconds}]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fill_keeps_coordinates_and_fills_route() {
        let mock_server = MockServer::start().await;
        mount_route(&mock_server, "2.35,48.85;4.83,45.76", 465_321.0, 16_271.6).await;

        let mut driver = ReconciliationDriver::new(config_for(&mock_server), EngineOptions::default()).unwrap();
        let row = PairRow::new(
            Endpoint::with_coordinates("Paris", 2.35, 48.85),
            Endpoint::with_coordinates("Lyon", 4.83, 45.76),
        );
        let report = driver.fill_missing(std::slice::from_ref(&row)).await.unwrap();

        let out = &report.rows[0];
        assert_eq!(out.origin, row.origin);
        assert_eq!(out.destination, row.destination);
        assert_eq!(out.distance_km, Some(465.32));
        assert_eq!(out.duration_s, Some(16_271));
        assert_eq!(report.stats.geocoding_requests, 0);
        assert_eq!(report.stats.routing_requests, 1);
    }

    #[tokio::test]
    async fn test_fill_never_overwrites_populated_cells() {
        let mock_server = MockServer::start().await;
        mount_place(&mock_server, "Lyon", "4.83", "45.76").await;
        mount_route(&mock_server, "2.35,48.85;4.83,45.76", 465_321.0, 16_271.0).await;

        let mut driver = ReconciliationDriver::new(config_for(&mock_server), EngineOptions::default()).unwrap();
        let row = PairRow {
            index: Some(Cell::Text("007".to_string())),
            origin: Endpoint::with_coordinates("Paris", 2.35, 48.85),
            destination: Endpoint {
                description: "Lyon".to_string(),
                longitude: None,
                latitude: Some(45.76),
            },
            distance_km: Some(999.0),
            duration_s: None,
        };
        let report = driver.fill_missing(&[row]).await.unwrap();

        let out = &report.rows[0];
        assert_eq!(out.index, Some(Cell::Text("007".to_string())));
        assert_eq!(out.destination.longitude, Some(4.83));
        assert_eq!(out.destination.latitude, Some(45.76));
        assert_eq!(out.distance_km, Some(999.0));
        assert_eq!(out.duration_s, Some(16_271));
    }

    #[tokio::test]
    async fn test_fill_is_idempotent() {
        let mock_server = MockServer::start().await;
        mount_place(&mock_server, "Paris", "2.35", "48.85").await;
        mount_place(&mock_server, "Lyon", "4.83", "45.76").await;
        mount_route(&mock_server, "2.35,48.85;4.83,45.76", 465_321.0, 16_271.0).await;
        mount_route(&mock_server, "4.83,45.76;2.35,48.85", 466_002.0, 16_390.0).await;

        let rows = vec![
            PairRow::new(Endpoint::new("Paris"), Endpoint::new("Lyon")),
            PairRow::new(Endpoint::new("Lyon"), Endpoint::new("Paris")),
            PairRow::new(Endpoint::new("Paris"), Endpoint::new("Lyon")),
        ];

        let mut driver = ReconciliationDriver::new(config_for(&mock_server), EngineOptions::default()).unwrap();
        let first = driver.fill_missing(&rows).await.unwrap();
        assert!(first.rows.iter().all(PairRow::is_complete));
        assert_eq!(first.stats.geocoding_requests, 2);
        assert_eq!(first.stats.routing_requests, 2);

        let mut fresh = ReconciliationDriver::new(config_for(&mock_server), EngineOptions::default()).unwrap();
        let second = fresh.fill_missing(&first.rows).await.unwrap();
        assert_eq!(second.rows, first.rows);
        assert_eq!(second.stats.external_requests(), 0);
    }

    #[tokio::test]
    async fn test_fill_aborts_by_default() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let mut driver = ReconciliationDriver::new(config_for(&mock_server), EngineOptions::default()).unwrap();
        let rows = vec![PairRow::new(Endpoint::new("Nowhere"), Endpoint::new("Elsewhere"))];
        let err = driver.fill_missing(&rows).await.unwrap_err();
        assert!(matches!(err, Error::Geocoding { .. }));
    }

    #[tokio::test]
    async fn test_fill_continue_collects_failures() {
        let mock_server = MockServer::start().await;
        mount_place(&mock_server, "Paris", "2.35", "48.85").await;
        mount_route(&mock_server, "2.35,48.85;4.83,45.76", 465_321.0, 16_271.0).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let options = EngineOptions {
            failure_policy: FailurePolicy::Continue,
            ..Default::default()
        };
        let mut driver = ReconciliationDriver::new(config_for(&mock_server), options).unwrap();
        let rows = vec![
            PairRow::new(Endpoint::new("Paris"), Endpoint::new("Atlantis")),
            PairRow::new(Endpoint::new("Paris"), Endpoint::with_coordinates("Lyon", 4.83, 45.76)),
        ];
        let report = driver.fill_missing(&rows).await.unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].position, 0);
        assert_eq!(report.failures[0].label, "1");
        // The origin was resolved before the destination failed
        assert_eq!(report.rows[0].origin.longitude, Some(2.35));
        assert_eq!(report.rows[0].destination.longitude, None);
        assert_eq!(report.rows[0].duration_s, None);
        assert!(report.rows[1].is_complete());
    }

    #[tokio::test]
    async fn test_invalid_row_coordinates_are_a_routing_error() {
        let mock_server = MockServer::start().await;
        let mut driver = ReconciliationDriver::new(config_for(&mock_server), EngineOptions::default()).unwrap();
        let rows = vec![PairRow::new(
            Endpoint::with_coordinates("Bad", 500.0, 0.0),
            Endpoint::with_coordinates("Good", 1.0, 1.0),
        )];

        let err = driver.fill_missing(&rows).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Routing {
                reason: RoutingFailure::InvalidCoordinates,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_order_then_route() {
        let mock_server = MockServer::start().await;
        mount_place(&mock_server, "A", "1", "1").await;
        mount_place(&mock_server, "B", "2", "2").await;
        mount_place(&mock_server, "C", "3", "3").await;
        mount_route(&mock_server, "1,1;2,2", 1000.0, 100.0).await;
        mount_route(&mock_server, "1,1;3,3", 5000.0, 500.0).await;
        mount_route(&mock_server, "2,2;1,1", 1000.0, 100.0).await;
        mount_route(&mock_server, "2,2;3,3", 500.0, 50.0).await;
        mount_route(&mock_server, "3,3;1,1", 5000.0, 500.0).await;
        mount_route(&mock_server, "3,3;2,2", 500.0, 50.0).await;

        let mut driver = ReconciliationDriver::new(config_for(&mock_server), EngineOptions::default()).unwrap();
        let names: Vec<String> = ["A", "B", "C", "B"].iter().map(|s| s.to_string()).collect();
        let route = driver.order_then_route(&names, None).await.unwrap();

        let order: Vec<&str> = route.order.iter().map(Location::description).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        let legs: Vec<u64> = route.legs.iter().map(|leg| leg.duration_s).collect();
        assert_eq!(legs, vec![100, 50]);
        assert_eq!(route.total_duration_s(), 150);
        assert_eq!(route.total_distance_km(), 1.5);
        assert_eq!(route.stats.geocoding_requests, 3);
        assert_eq!(route.stats.routing_requests, 6);

        let from_c = driver.order_then_route(&names, Some("C")).await.unwrap();
        let order: Vec<&str> = from_c.order.iter().map(Location::description).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
        assert_eq!(from_c.stats.external_requests(), 0);
    }

    #[tokio::test]
    async fn test_order_unknown_start() {
        let mock_server = MockServer::start().await;
        mount_place(&mock_server, "Nantes", "-1.55", "47.21").await;

        let mut driver = ReconciliationDriver::new(config_for(&mock_server), EngineOptions::default()).unwrap();
        let err = driver
            .order_then_route(&["Nantes".to_string()], Some("Nante"))
            .await
            .unwrap_err();
        match err {
            Error::InvalidInput(msg) => assert!(msg.contains("Did you mean 'Nantes'?"), "{msg}"),
            other => panic!("Expected invalid input, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_order_continue_skips_unknown_places() {
        let mock_server = MockServer::start().await;
        mount_place(&mock_server, "A", "1", "1").await;
        mount_place(&mock_server, "B", "2", "2").await;
        mount_route(&mock_server, "1,1;2,2", 1000.0, 100.0).await;
        mount_route(&mock_server, "2,2;1,1", 1000.0, 100.0).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/route/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let options = EngineOptions {
            failure_policy: FailurePolicy::Continue,
            ..Default::default()
        };
        let mut driver = ReconciliationDriver::new(config_for(&mock_server), options).unwrap();
        let names: Vec<String> = ["A", "Atlantis", "B"].iter().map(|s| s.to_string()).collect();
        let route = driver.order_then_route(&names, None).await.unwrap();

        assert_eq!(route.order.len(), 2);
        assert_eq!(route.legs.len(), 1);
        assert_eq!(route.skipped.len(), 1);
        assert_eq!(route.skipped[0].label, "Atlantis");
    }

    #[tokio::test]
    async fn test_order_empty_list() {
        let mock_server = MockServer::start().await;
        let mut driver = ReconciliationDriver::new(config_for(&mock_server), EngineOptions::default()).unwrap();
        assert!(matches!(
            driver.order_then_route(&[], None).await,
            Err(Error::InvalidInput(_))
        ));
    }
}

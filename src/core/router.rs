//! Route matrix construction through an OSRM-compatible router
//!
//! Every directed edge is memoized by its pair of coordinates, so asking for
//! the same pair twice in a run never reaches the network again. Matrix builds
//! fetch the missing edges concurrently and assemble them in a fixed order.

use std::collections::HashMap;

use futures::StreamExt;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::core::config::ServiceConfig;
use crate::core::error::{Error, Result, RoutingFailure, TransportError};
use crate::core::http::{build_client, get_json, retry_on_network_error};
use crate::core::model::{valid_coordinates, CoordKey, Location, RouteEdge, RouteMatrix};
use crate::core::options::ProgressCallback;

/// Message OSRM sends back for coordinates it cannot snap
pub const INVALID_COORDINATE_MESSAGE: &str = "Invalid coordinate value.";

#[derive(Debug, Deserialize)]
struct RouteResponse {
    message: Option<String>,
    routes: Option<Vec<RouteSummary>>,
}

#[derive(Debug, Deserialize)]
struct RouteSummary {
    distance: f64,
    duration: f64,
}

/// Builds directed route edges and complete route matrices
pub struct RouteMatrixBuilder {
    client: Client,
    config: ServiceConfig,
    cache: HashMap<(CoordKey, CoordKey), RouteEdge>,
    requests: usize,
    cache_hits: usize,
}

impl RouteMatrixBuilder {
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

    /// Route from `origin` to `destination`, reusing a known edge when possible
    pub async fn edge(&mut self, origin: &Location, destination: &Location) -> Result<RouteEdge> {
        if let Some(edge) = self.cached(origin, destination) {
            return Ok(edge);
        }

        self.requests += 1;
        let edge = fetch_edge(&self.client, &self.config, origin, destination).await?;
        self.cache.insert(
            (origin.coord_key(), destination.coord_key()),
            edge.clone(),
        );
        Ok(edge)
    }

    /// Edges between every ordered pair of distinct `locations`
    ///
    /// Edges are inserted origin-major in the order of `locations`, regardless
    /// of the order in which concurrent requests complete. When some requests
    /// fail, the successful ones are still cached and the error of the first
    /// failing pair (in that same order) is returned.
    pub async fn build_matrix(
        &mut self,
        locations: &[Location],
        progress: Option<ProgressCallback>,
    ) -> Result<RouteMatrix> {
        let pairs: Vec<(&Location, &Location)> = locations
            .iter()
            .flat_map(|origin| {
                locations
                    .iter()
                    .filter(move |destination| *destination != origin)
                    .map(move |destination| (origin, destination))
            })
            .collect();
        let total = pairs.len() as u64;

        let mut slots: Vec<Option<Result<RouteEdge>>> = pairs
            .iter()
            .map(|(origin, destination)| self.cached(origin, destination).map(Ok))
            .collect();
        let missing: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.is_none().then_some(idx))
            .collect();

        let mut completed = total - missing.len() as u64;
        if let Some(ref progress) = progress {
            progress(completed, total);
        }

        if !missing.is_empty() {
            let connections = calculate_optimal_concurrency(missing.len(), self.config.max_concurrency);
            info!(
                "Fetching {} of {} routes ({} concurrent requests)",
                missing.len(),
                total,
                connections
            );
            self.requests += missing.len();

            let client = &self.client;
            let config = &self.config;
            let mut stream = futures::stream::iter(missing.iter().copied())
                .map(|idx| {
                    let (origin, destination) = pairs[idx];
                    async move { (idx, fetch_edge(client, config, origin, destination).await) }
                })
                .buffer_unordered(connections);

            while let Some((idx, result)) = stream.next().await {
                slots[idx] = Some(result);
                completed += 1;
                if let Some(ref progress) = progress {
                    progress(completed, total);
                }
            }
        }

        let mut matrix = RouteMatrix::new();
        let mut first_error = None;
        for (idx, slot) in slots.into_iter().enumerate() {
            let (origin, destination) = pairs[idx];
            match slot {
                Some(Ok(edge)) => {
                    self.cache
                        .entry((origin.coord_key(), destination.coord_key()))
                        .or_insert_with(|| edge.clone());
                    matrix.insert(edge)?;
                }
                Some(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                None => {
                    return Err(Error::InternalConsistency(format!(
                        "no result for '{}' -> '{}'",
                        origin.description(),
                        destination.description()
                    )))
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(matrix),
        }
    }

    /// Outbound requests issued so far
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Edges answered from memory so far
    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    fn cached(&mut self, origin: &Location, destination: &Location) -> Option<RouteEdge> {
        let edge = self
            .cache
            .get(&(origin.coord_key(), destination.coord_key()))?
            .relabel(origin, destination);
        self.cache_hits += 1;
        debug!(
            "Route cache hit for '{}' -> '{}'",
            origin.description(),
            destination.description()
        );
        Some(edge)
    }
}

/// Number of simultaneous routing requests for a batch of `pending` edges
///
/// Bounded by the configured maximum, twice the CPU count and the batch size.
fn calculate_optimal_concurrency(pending: usize, max_concurrency: usize) -> usize {
    let cpu_count = num_cpus::get();
    pending.min(max_concurrency).min(cpu_count * 2).max(1)
}

/// One request to the router for a directed pair
async fn fetch_edge(
    client: &Client,
    config: &ServiceConfig,
    origin: &Location,
    destination: &Location,
) -> Result<RouteEdge> {
    let failure = |reason| Error::routing(origin.description(), destination.description(), reason);

    for location in [origin, destination] {
        if !valid_coordinates(location.longitude(), location.latitude()) {
            return Err(failure(RoutingFailure::InvalidCoordinates));
        }
    }

    let url = config.route_url(origin, destination);
    let payload = retry_on_network_error(config, || async {
        let (_, value) = get_json(client, &url, &[("overview", "false")]).await?;
        Ok::<Value, TransportError>(value)
    })
    .await
    .map_err(|e| failure(RoutingFailure::Transport(e)))?;

    let response: RouteResponse = serde_json::from_value(payload)
        .map_err(|e| failure(RoutingFailure::MalformedResponse(e.to_string())))?;

    if response.message.as_deref() == Some(INVALID_COORDINATE_MESSAGE) {
        return Err(failure(RoutingFailure::InvalidCoordinates));
    }

    let route = response
        .routes
        .and_then(|routes| routes.into_iter().next())
        .ok_or_else(|| failure(RoutingFailure::NoRoute))?;

    let edge = RouteEdge::from_measurements(
        origin.clone(),
        destination.clone(),
        route.distance,
        route.duration,
    );
    debug!("Routed {edge}");
    Ok(edge)
}

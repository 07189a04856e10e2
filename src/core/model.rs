//! Core data model: locations, directed route edges and the route matrix

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::core::duration::format_duration;
use crate::core::error::{Error, Result};

/// A named place with WGS84 coordinates
///
/// Equality and hashing cover all three fields. Coordinates are validated on
/// construction, so a `Location` is always routable.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    description: String,
    longitude: f64,
    latitude: f64,
}

impl Location {
    /// Create a location, rejecting empty descriptions and invalid coordinates
    pub fn new(description: impl Into<String>, longitude: f64, latitude: f64) -> Result<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(Error::InvalidInput(
                "location description must not be empty".to_string(),
            ));
        }
        if !valid_coordinates(longitude, latitude) {
            return Err(Error::InvalidInput(format!(
                "invalid coordinates for '{description}': ({longitude}, {latitude})"
            )));
        }

        // +0.0 folds -0.0 into 0.0 so that equality and bitwise hashing agree
        Ok(Self {
            description,
            longitude: longitude + 0.0,
            latitude: latitude + 0.0,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Hashable key of the coordinates alone, ignoring the description
    pub fn coord_key(&self) -> CoordKey {
        CoordKey(self.longitude.to_bits(), self.latitude.to_bits())
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.description.hash(state);
        self.coord_key().hash(state);
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.description, self.longitude, self.latitude
        )
    }
}

/// Bit pattern of a (longitude, latitude) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordKey(u64, u64);

/// Longitude in [-180, 180], latitude in [-90, 90], both finite
pub fn valid_coordinates(longitude: f64, latitude: f64) -> bool {
    longitude.is_finite()
        && latitude.is_finite()
        && (-180.0..=180.0).contains(&longitude)
        && (-90.0..=90.0).contains(&latitude)
}

/// Directed road route between two locations
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEdge {
    pub origin: Location,
    pub destination: Location,
    /// Kilometres, rounded to 2 decimals
    pub distance_km: f64,
    /// Whole seconds
    pub duration_s: u64,
}

impl RouteEdge {
    /// Build an edge from the raw metres/seconds reported by the router
    pub fn from_measurements(
        origin: Location,
        destination: Location,
        distance_m: f64,
        duration_s: f64,
    ) -> Self {
        Self {
            origin,
            destination,
            distance_km: round_km(distance_m),
            duration_s: duration_s.max(0.0).floor() as u64,
        }
    }

    /// Same measurements, relabelled with other endpoints sharing the coordinates
    pub fn relabel(&self, origin: &Location, destination: &Location) -> Self {
        Self {
            origin: origin.clone(),
            destination: destination.clone(),
            distance_km: self.distance_km,
            duration_s: self.duration_s,
        }
    }
}

impl fmt::Display for RouteEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} | {}km | {}",
            self.origin.description(),
            self.destination.description(),
            self.distance_km,
            format_duration(self.duration_s)
        )
    }
}

/// Metres to kilometres, rounded to 2 decimals
fn round_km(distance_m: f64) -> f64 {
    (distance_m / 1000.0 * 100.0).round() / 100.0
}

/// Outgoing edges per origin, kept in insertion order
///
/// A complete matrix over `n` locations holds `n * (n - 1)` edges. Self-edges
/// and duplicate (origin, destination) pairs are rejected.
#[derive(Debug, Clone, Default)]
pub struct RouteMatrix {
    origins: Vec<Location>,
    edges: HashMap<Location, Vec<RouteEdge>>,
    len: usize,
}

impl RouteMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an edge to its origin's list
    pub fn insert(&mut self, edge: RouteEdge) -> Result<()> {
        if edge.origin == edge.destination {
            return Err(Error::InternalConsistency(format!(
                "self-edge on '{}'",
                edge.origin.description()
            )));
        }
        if self.get(&edge.origin, &edge.destination).is_some() {
            return Err(Error::InternalConsistency(format!(
                "duplicate edge '{}' -> '{}'",
                edge.origin.description(),
                edge.destination.description()
            )));
        }

        if !self.edges.contains_key(&edge.origin) {
            self.origins.push(edge.origin.clone());
        }
        self.edges.entry(edge.origin.clone()).or_default().push(edge);
        self.len += 1;
        Ok(())
    }

    /// Edges leaving `origin`, in insertion order
    pub fn edges_from(&self, origin: &Location) -> &[RouteEdge] {
        self.edges.get(origin).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, origin: &Location, destination: &Location) -> Option<&RouteEdge> {
        self.edges_from(origin)
            .iter()
            .find(|edge| &edge.destination == destination)
    }

    /// Origins in the order their first edge was inserted
    pub fn origins(&self) -> &[Location] {
        &self.origins
    }

    /// All edges, origin-major, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &RouteEdge> {
        self.origins
            .iter()
            .flat_map(move |origin| self.edges_from(origin).iter())
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when every ordered pair of distinct `locations` has an edge
    pub fn is_complete_over(&self, locations: &[Location]) -> bool {
        locations.iter().all(|origin| {
            locations
                .iter()
                .filter(|destination| *destination != origin)
                .all(|destination| self.get(origin, destination).is_some())
        })
    }
}

//! Greedy nearest-neighbor sequencing over a route matrix
//!
//! Builds an open path: from the start, always move to the unvisited location
//! that is quickest to reach. O(n²) over a precomputed matrix, no backtracking
//! and no optimality guarantee.

use std::collections::HashSet;

use crate::core::error::{Error, Result};
use crate::core::model::{Location, RouteEdge, RouteMatrix};

/// Visiting order over `locations`, starting at `start` (first location if `None`)
///
/// Among the edges leaving the current location towards unvisited locations,
/// the one with the smallest `duration_s` wins. On equal durations the edge
/// inserted first in the matrix wins.
pub fn sequence(
    matrix: &RouteMatrix,
    locations: &[Location],
    start: Option<&Location>,
) -> Result<Vec<Location>> {
    let start = match start {
        Some(start) if !locations.contains(start) => {
            return Err(Error::InvalidInput(format!(
                "start location '{}' is not part of the location set",
                start.description()
            )))
        }
        Some(start) => start,
        None => locations.first().ok_or_else(|| {
            Error::InvalidInput("cannot sequence an empty location set".to_string())
        })?,
    };

    let mut remaining: HashSet<&Location> = locations.iter().collect();
    if remaining.len() != locations.len() {
        return Err(Error::InvalidInput(
            "location set contains duplicates".to_string(),
        ));
    }
    remaining.remove(start);

    let mut ordered = Vec::with_capacity(locations.len());
    ordered.push(start.clone());
    let mut current = start;

    while !remaining.is_empty() {
        let nearest = nearest_edge(matrix.edges_from(current), &remaining).ok_or_else(|| {
            Error::InternalConsistency(format!(
                "no edge from '{}' to any of the {} unvisited locations",
                current.description(),
                remaining.len()
            ))
        })?;

        remaining.remove(&nearest.destination);
        ordered.push(nearest.destination.clone());
        current = &nearest.destination;
    }

    Ok(ordered)
}

/// First edge with the minimum duration among those reaching `remaining`
fn nearest_edge<'a>(
    edges: &'a [RouteEdge],
    remaining: &HashSet<&Location>,
) -> Option<&'a RouteEdge> {
    edges
        .iter()
        .filter(|edge| remaining.contains(&edge.destination))
        .fold(None, |best: Option<&RouteEdge>, edge| match best {
            Some(best) if best.duration_s <= edge.duration_s => Some(best),
            _ => Some(edge),
        })
}

/// Edges along consecutive pairs of `order`
pub fn route_legs(matrix: &RouteMatrix, order: &[Location]) -> Result<Vec<RouteEdge>> {
    order
        .windows(2)
        .map(|pair| {
            matrix.get(&pair[0], &pair[1]).cloned().ok_or_else(|| {
                Error::InternalConsistency(format!(
                    "missing edge '{}' -> '{}'",
                    pair[0].description(),
                    pair[1].description()
                ))
            })
        })
        .collect()
}

// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

mod error;
pub mod instructions;
pub(crate) mod search;

use serde::{Deserialize, Serialize};

pub use error::{Endpoint, RouteError};
pub use instructions::{Instruction, Maneuver, TurnThresholds};

use crate::{earth_distance, polyline_length, Coordinate, RouteGraph};

/// Default max distance (in km) between a query coordinate and the nearest node.
pub const DEFAULT_COVERAGE_KM: f64 = 1.0;

/// Tunables of a single [query].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteOptions {
    /// Max distance (in km) between an endpoint and the node it snaps to.
    pub coverage_km: f64,

    pub turns: TurnThresholds,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            coverage_km: DEFAULT_COVERAGE_KM,
            turns: TurnThresholds::default(),
        }
    }
}

/// Outcome of a successful [query].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    /// Path polyline, from the node nearest to the start to the node nearest
    /// to the destination. Empty if both endpoints are the same.
    pub coordinates: Vec<Coordinate>,
    pub instructions: Vec<Instruction>,

    /// Length of the polyline, in meters.
    pub distance_m: f64,

    /// Expected travel time, in seconds.
    pub duration_s: f64,
}

impl RouteResult {
    /// Returns true if `position` is within `radius_m` meters of the end of the route.
    /// An empty route is always considered arrived.
    pub fn has_arrived(&self, position: Coordinate, radius_m: f64) -> bool {
        match self.coordinates.last() {
            Some(&end) => earth_distance(position, end) * 1000.0 <= radius_m,
            None => true,
        }
    }

    /// Returns the human-readable text of every instruction.
    pub fn instruction_texts(&self) -> Vec<String> {
        self.instructions.iter().map(ToString::to_string).collect()
    }
}

/// Finds the fastest route between two coordinates.
///
/// Both coordinates are snapped to their nearest node first; if that node
/// is further away than [RouteOptions::coverage_km], [RouteError::OutOfCoverage]
/// is returned. Identical endpoints produce an empty route.
pub fn query(
    g: &RouteGraph,
    start: Coordinate,
    destination: Coordinate,
    options: &RouteOptions,
) -> Result<RouteResult, RouteError> {
    query_interruptible(g, start, destination, options, || false)
}

/// Like [query], but gives up with [RouteError::Interrupted] as soon as
/// `interrupt` returns true. `interrupt` is polled periodically during the search.
pub fn query_interruptible<F: Fn() -> bool>(
    g: &RouteGraph,
    start: Coordinate,
    destination: Coordinate,
    options: &RouteOptions,
    interrupt: F,
) -> Result<RouteResult, RouteError> {
    if start == destination && start.is_valid() {
        return Ok(RouteResult::default());
    }

    let from = snap(g, start, Endpoint::Start, options.coverage_km)?;
    let to = snap(g, destination, Endpoint::Destination, options.coverage_km)?;
    if from == to {
        return Ok(RouteResult::default());
    }

    let path = search::shortest_path(g, from, to, &interrupt)?.ok_or(RouteError::NoRoute)?;

    let mut coordinates: Vec<Coordinate> = Vec::new();
    for &edge in &path.edges {
        let line = g.edge_polyline(edge);
        let skip = usize::from(!coordinates.is_empty());
        coordinates.extend_from_slice(&line[skip..]);
    }

    log::debug!(
        "route {from} → {to}: {} edges, {:.1} s",
        path.edges.len(),
        path.weight as f64 / 10.0,
    );

    Ok(RouteResult {
        distance_m: polyline_length(&coordinates) * 1000.0,
        duration_s: path.weight as f64 / 10.0,
        instructions: instructions::derive(g, &path.edges, &options.turns),
        coordinates,
    })
}

fn snap(
    g: &RouteGraph,
    at: Coordinate,
    endpoint: Endpoint,
    coverage_km: f64,
) -> Result<u32, RouteError> {
    let out_of_coverage = |distance_km| RouteError::OutOfCoverage {
        endpoint,
        distance_km,
    };

    if !at.is_valid() {
        return Err(out_of_coverage(f64::INFINITY));
    }

    match g.nearest_node(at) {
        Some((node, distance)) if distance <= coverage_km => Ok(node),
        Some((_, distance)) => Err(out_of_coverage(distance)),
        None => Err(out_of_coverage(f64::INFINITY)),
    }
}

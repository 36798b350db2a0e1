// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

/// Which end of a route query an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Start,
    Destination,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Destination => f.write_str("destination"),
        }
    }
}

/// Error conditions which may occur during [query](crate::route::query).
///
/// `NoRoute` and `OutOfCoverage` are expected outcomes of a well-formed query;
/// the remaining variants are only produced by the [Navigator](crate::Navigator)
/// and [Dispatcher](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    /// The start and destination lie in disconnected parts of the graph.
    #[error("no route between the given points")]
    NoRoute,

    /// The nearest road to an endpoint is further away than the coverage threshold
    /// (or the endpoint is not a valid coordinate).
    #[error("{endpoint} is {distance_km:.3} km away from the nearest road")]
    OutOfCoverage {
        endpoint: Endpoint,
        distance_km: f64,
    },

    /// No city has been loaded.
    #[error("no city is loaded")]
    NotLoaded,

    /// The search was stopped by its interrupt callback.
    #[error("query interrupted")]
    Interrupted,

    /// A newer query for the same destination was started; this result was discarded.
    #[error("query superseded by a newer one")]
    Superseded,
}

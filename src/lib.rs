// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Offline, per-city routing over precomputed
//! [contraction hierarchies](https://en.wikipedia.org/wiki/Contraction_hierarchies).
//!
//! Every supported city ships as a [bundle](catalog::CityBundle) of files:
//! a hierarchy graph, a geometry store, a tile store and a shared
//! point-of-interest database. Bundles are [integrity-checked](integrity) before
//! they are trusted, [loaded](RouteGraph::load) into memory one city at a time,
//! and [queried](route::query) for shortest paths with turn instructions.
//!
//! # Example
//!
//! ```no_run
//! let config = cityroute::Config::from_file("path/to/cityroute.json")
//!     .expect("failed to read configuration");
//! let navigator = cityroute::Navigator::new(config);
//!
//! navigator
//!     .resolve_and_load("San Francisco")
//!     .expect("bundle for San Francisco is not available");
//!
//! let route = navigator
//!     .query(
//!         cityroute::Coordinate::new(37.7749, -122.4194),
//!         cityroute::Coordinate::new(37.8199, -122.4783),
//!     )
//!     .expect("failed to find route");
//!
//! for instruction in &route.instructions {
//!     println!("{instruction}");
//! }
//! ```

pub mod c;
pub mod catalog;
pub mod config;
pub mod contract;
mod dispatch;
mod distance;
pub mod graph;
pub mod integrity;
mod kd;
mod navigator;
pub mod network;
pub mod poi;
pub mod route;

pub use catalog::{Catalog, CityBundle, Readiness, UnavailableError};
pub use config::Config;
pub use dispatch::Dispatcher;
pub use distance::{bearing_delta, earth_distance, initial_bearing, polyline_length};
pub use graph::{LoadError, RouteGraph};
pub use kd::KDTree;
pub use navigator::{ActiveCity, Navigator};
pub use poi::{Poi, PoiIndex};
pub use route::{RouteError, RouteOptions, RouteResult};

/// A position on Earth, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[repr(C)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns true if both components are finite and within the valid
    /// latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

#[cfg(test)]
pub(crate) mod testing;

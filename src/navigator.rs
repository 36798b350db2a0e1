// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::catalog::{Catalog, CityBundle, Readiness, UnavailableError};
use crate::poi::{Poi, PoiError, PoiIndex};
use crate::route::{self, RouteError, RouteOptions, RouteResult};
use crate::{Config, Coordinate, RouteGraph};

/// A city whose graph is loaded into memory.
///
/// Handles are reference-counted: a query holding one keeps routing on the same
/// graph even if the [Navigator] switches to a different city in the meantime.
/// The graph is freed once the last handle is dropped.
#[derive(Debug)]
pub struct ActiveCity {
    bundle: CityBundle,
    graph: RouteGraph,
}

impl ActiveCity {
    pub fn key(&self) -> &str {
        &self.bundle.key
    }

    pub fn bundle(&self) -> &CityBundle {
        &self.bundle
    }

    pub fn graph(&self) -> &RouteGraph {
        &self.graph
    }

    /// Finds a route in this city, see [route::query].
    pub fn query(
        &self,
        start: Coordinate,
        destination: Coordinate,
        options: &RouteOptions,
    ) -> Result<RouteResult, RouteError> {
        route::query(&self.graph, start, destination, options)
    }
}

/// Keeps track of the single active city, and answers route and POI queries.
///
/// City switches are serialized: at most one load is in flight at a time.
/// Queries never wait for a load; they run against a snapshot of the city
/// that was active when they started.
#[derive(Debug)]
pub struct Navigator {
    catalog: Catalog,
    options: RouteOptions,

    /// Held for the whole duration of a city switch.
    switch: Mutex<()>,
    active: RwLock<Option<Arc<ActiveCity>>>,
    pois: OnceCell<PoiIndex>,
}

impl Navigator {
    pub fn new(config: Config) -> Self {
        Self::with_catalog(Catalog::from_config(&config), config.route_options())
    }

    pub fn with_catalog(catalog: Catalog, options: RouteOptions) -> Self {
        Self {
            catalog,
            options,
            switch: Mutex::new(()),
            active: RwLock::new(None),
            pois: OnceCell::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn options(&self) -> &RouteOptions {
        &self.options
    }

    /// Makes the given city active, loading its graph if a different city
    /// (or none) is currently active.
    ///
    /// On any failure the previously active city stays active.
    pub fn resolve_and_load(&self, city: &str) -> Result<Arc<ActiveCity>, UnavailableError> {
        let bundle = self.catalog.resolve(city).inspect_err(|e| log::warn!("{e}"))?;

        let _guard = self.switch.lock();

        if let Some(active) = self.handle() {
            if active.key() == bundle.key {
                return Ok(active);
            }
        }

        bundle
            .readiness(self.catalog.min_file_size())
            .into_result(&bundle.key)
            .inspect_err(|e| log::warn!("refusing to switch city: {e}"))?;

        let graph = RouteGraph::load(bundle).map_err(|e| {
            let e = UnavailableError::from_load(&bundle.key, e);
            log::warn!("refusing to switch city: {e}");
            e
        })?;

        let city = Arc::new(ActiveCity {
            bundle: bundle.clone(),
            graph,
        });
        let previous = self.active.write().replace(city.clone());

        match previous {
            Some(previous) => log::info!("switched city: {} → {}", previous.key(), city.key()),
            None => log::info!("activated city: {}", city.key()),
        }

        Ok(city)
    }

    /// Returns a handle to the active city, if any.
    pub fn handle(&self) -> Option<Arc<ActiveCity>> {
        self.active.read().clone()
    }

    /// Returns the key of the active city, if any.
    pub fn active_city(&self) -> Option<String> {
        self.active.read().as_ref().map(|c| c.key().to_string())
    }

    /// Drops the active city. Returns false if no city was active.
    pub fn unload(&self) -> bool {
        let _guard = self.switch.lock();
        let previous = self.active.write().take();
        match previous {
            Some(previous) => {
                log::info!("unloaded city: {}", previous.key());
                true
            }
            None => false,
        }
    }

    /// Finds a route in the active city.
    pub fn query(&self, start: Coordinate, destination: Coordinate) -> Result<RouteResult, RouteError> {
        self.query_interruptible(start, destination, || false)
    }

    /// Finds a route in the active city, giving up once `interrupt` returns true.
    pub fn query_interruptible<F: Fn() -> bool>(
        &self,
        start: Coordinate,
        destination: Coordinate,
        interrupt: F,
    ) -> Result<RouteResult, RouteError> {
        let city = self.handle().ok_or(RouteError::NotLoaded)?;
        route::query_interruptible(city.graph(), start, destination, &self.options, interrupt)
    }

    /// Searches the POI store; see [PoiIndex::search].
    /// Doesn't require an active city. The store is opened on first use.
    pub fn search(&self, text: &str) -> Result<Vec<Poi>, PoiError> {
        let index = self.poi_index()?;
        Ok(index.search(text).into_iter().cloned().collect())
    }

    /// Returns POIs near a position; see [PoiIndex::nearby].
    pub fn nearby(
        &self,
        center: Coordinate,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<(Poi, f64)>, PoiError> {
        let index = self.poi_index()?;
        Ok(index
            .nearby(center, radius_km, limit)
            .into_iter()
            .map(|(p, d)| (p.clone(), d))
            .collect())
    }

    fn poi_index(&self) -> Result<&PoiIndex, PoiError> {
        self.pois.get_or_try_init(|| {
            PoiIndex::open_with_min_size(self.catalog.pois_path(), self.catalog.min_file_size())
        })
    }

    /// Checks all files of a city, see [Catalog::readiness].
    pub fn readiness(&self, city: &str) -> Result<Readiness, UnavailableError> {
        self.catalog.readiness(city)
    }
}

// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Named points of interest, searchable by text and by distance.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::integrity::{self, FileKind, IntegrityError};
use crate::{earth_distance, Coordinate};

/// Max number of results returned by [PoiIndex::search].
pub const MAX_RESULTS: usize = 50;

/// A named place, as stored in the `pois` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Poi {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub coordinate: Coordinate,
}

/// Error which can occur when opening or querying a [PoiIndex].
#[derive(Debug, thiserror::Error)]
pub enum PoiError {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("interrupted")]
    Interrupted,
}

/// In-memory index over the POI store.
///
/// All rows are read once when the index is opened, in id order;
/// queries never touch the database.
#[derive(Debug, Clone, Default)]
pub struct PoiIndex {
    pois: Vec<Poi>,

    /// Lowercase `(name, city)` of every POI, for case-insensitive matching.
    folded: Vec<(String, String)>,
}

impl PoiIndex {
    /// Loads all POIs from a SQLite database with a
    /// `pois(id, name, city, latitude, longitude)` table.
    ///
    /// The file must pass the [integrity checks](crate::integrity) first.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PoiError> {
        Self::open_with_min_size(path, integrity::MIN_FILE_SIZE)
    }

    pub fn open_with_min_size<P: AsRef<Path>>(path: P, min_size: u64) -> Result<Self, PoiError> {
        let path = path.as_ref();
        integrity::check_with_min_size(path, FileKind::Container, min_size)?;

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut stmt = conn
            .prepare("SELECT id, name, city, latitude, longitude FROM pois ORDER BY id")?;
        let pois = stmt
            .query_map([], |row| {
                Ok(Poi {
                    id: row.get(0)?,
                    name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    city: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    coordinate: Coordinate::new(row.get(3)?, row.get(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        log::info!("loaded {} POIs from {}", pois.len(), path.display());
        Ok(Self::from_pois(pois))
    }

    /// Builds an index from already-loaded POIs. Order of `pois` is preserved in results.
    pub fn from_pois(pois: Vec<Poi>) -> Self {
        let folded = pois
            .iter()
            .map(|p| (p.name.to_lowercase(), p.city.to_lowercase()))
            .collect();
        Self { pois, folded }
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }

    /// Returns up to [MAX_RESULTS] POIs whose name or city contains `query`,
    /// ignoring case. The query is matched as-is, surrounding whitespace included.
    /// A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<&Poi> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let query = query.to_lowercase();

        self.pois
            .iter()
            .zip(self.folded.iter())
            .filter(|(_, (name, city))| name.contains(&query) || city.contains(&query))
            .map(|(poi, _)| poi)
            .take(MAX_RESULTS)
            .collect()
    }

    /// Returns up to `limit` POIs within `radius_km` of `center`, nearest first.
    pub fn nearby(&self, center: Coordinate, radius_km: f64, limit: usize) -> Vec<(&Poi, f64)> {
        let mut found: Vec<(&Poi, f64)> = self
            .pois
            .iter()
            .map(|p| (p, earth_distance(center, p.coordinate)))
            .filter(|&(_, d)| d <= radius_km)
            .collect();

        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)));
        found.truncate(limit);
        found
    }
}

// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! The fixed set of supported cities and the data files each of them needs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::graph::LoadError;
use crate::integrity::{self, FileKind, IntegrityError};
use crate::Config;

/// Name of the POI store shared by all cities.
pub const POI_FILE: &str = "pois.sqlite";

/// Normalizes a human-readable city name into its canonical key:
/// trimmed, lowercase, with runs of whitespace replaced by a single underscore.
///
/// ```
/// assert_eq!(cityroute::catalog::canonical_key("  San   Francisco "), "san_francisco");
/// ```
pub fn canonical_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// All data files required to route in, and display, a single city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityBundle {
    /// Canonical key, see [canonical_key].
    pub key: String,

    /// Display name, as configured.
    pub name: String,

    /// Contraction hierarchy, `<key>.osrm.hsgr`.
    pub graph: PathBuf,

    /// Road segment geometry, `<key>.osrm.geometry`.
    pub geometry: PathBuf,

    /// Tile store, `<key>.mbtiles`.
    pub tiles: PathBuf,

    /// Shared POI store, `pois.sqlite`.
    pub pois: PathBuf,
}

impl CityBundle {
    /// Describes the bundle of a city with files in `dir`.
    pub fn new<P: AsRef<Path>>(dir: P, name: &str) -> Self {
        let dir = dir.as_ref();
        let key = canonical_key(name);
        Self {
            graph: dir.join(format!("{key}.osrm.hsgr")),
            geometry: dir.join(format!("{key}.osrm.geometry")),
            tiles: dir.join(format!("{key}.mbtiles")),
            pois: dir.join(POI_FILE),
            name: name.trim().to_string(),
            key,
        }
    }

    /// Returns every required file with the kind of check it needs.
    pub fn files(&self) -> [(&Path, FileKind); 4] {
        [
            (self.graph.as_path(), FileKind::Graph),
            (self.geometry.as_path(), FileKind::Graph),
            (self.tiles.as_path(), FileKind::Container),
            (self.pois.as_path(), FileKind::Container),
        ]
    }

    /// Runs the integrity checks on every file of the bundle.
    pub fn readiness(&self, min_file_size: u64) -> Readiness {
        let errors: Vec<IntegrityError> = self
            .files()
            .into_iter()
            .filter_map(|(path, kind)| {
                integrity::check_with_min_size(path, kind, min_file_size).err()
            })
            .collect();

        let missing: Vec<PathBuf> = errors
            .iter()
            .filter(|e| e.is_missing())
            .map(|e| e.path().to_path_buf())
            .collect();

        if !missing.is_empty() {
            Readiness::MissingFiles(missing)
        } else if !errors.is_empty() {
            Readiness::Corrupt(errors)
        } else {
            Readiness::Ready
        }
    }
}

/// Aggregated integrity status of a [CityBundle].
#[derive(Debug, Clone)]
pub enum Readiness {
    Ready,

    /// Some files don't exist. Takes precedence over [Readiness::Corrupt].
    MissingFiles(Vec<PathBuf>),

    /// All files exist, but some fail the size or magic checks.
    Corrupt(Vec<IntegrityError>),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Converts a not-ready status into the error returned when loading the city.
    pub fn into_result(self, city: &str) -> Result<(), UnavailableError> {
        match self {
            Self::Ready => Ok(()),
            Self::MissingFiles(files) => Err(UnavailableError::MissingFiles {
                city: city.to_string(),
                files,
            }),
            Self::Corrupt(errors) => Err(UnavailableError::Corrupt {
                city: city.to_string(),
                reason: errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::MissingFiles(files) => {
                f.write_str("missing files:")?;
                for file in files {
                    write!(f, " {}", file.display())?;
                }
                Ok(())
            }
            Self::Corrupt(errors) => {
                f.write_str("corrupt:")?;
                for e in errors {
                    write!(f, " {e};")?;
                }
                Ok(())
            }
        }
    }
}

/// Reason why a city can't be used.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UnavailableError {
    #[error("city not supported: {0:?}")]
    NotSupported(String),

    #[error("{city}: missing files: {}", display_paths(files))]
    MissingFiles { city: String, files: Vec<PathBuf> },

    #[error("{city}: corrupt data: {reason}")]
    Corrupt { city: String, reason: String },

    #[error("{city}: {source}")]
    Load {
        city: String,
        #[source]
        source: LoadError,
    },

    /// The request was abandoned before it completed, e.g. while shutting down.
    #[error("{city}: interrupted")]
    Interrupted { city: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl UnavailableError {
    /// Classifies a failed graph load: structural problems are reported as corrupt data.
    pub fn from_load(city: &str, e: LoadError) -> Self {
        match e {
            LoadError::CorruptGraph { .. } => Self::Corrupt {
                city: city.to_string(),
                reason: e.to_string(),
            },
            LoadError::Integrity(ref i) if i.is_missing() => Self::MissingFiles {
                city: city.to_string(),
                files: vec![i.path().to_path_buf()],
            },
            LoadError::Integrity(_) => Self::Corrupt {
                city: city.to_string(),
                reason: e.to_string(),
            },
            LoadError::Io { .. } => Self::Load {
                city: city.to_string(),
                source: e,
            },
        }
    }

    /// Short machine-readable reason, for the presentation layer.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotSupported(_) => "not_supported",
            Self::MissingFiles { .. } => "missing_files",
            Self::Corrupt { .. } => "corrupt",
            Self::Load { .. } => "load_failed",
            Self::Interrupted { .. } => "interrupted",
        }
    }
}

/// The fixed list of supported cities, with their bundles under a single data directory.
#[derive(Debug, Clone)]
pub struct Catalog {
    data_dir: PathBuf,
    bundles: Vec<CityBundle>,
    min_file_size: u64,
}

impl Catalog {
    /// Creates a catalog of the given cities. Duplicate canonical keys are ignored.
    pub fn new<P: AsRef<Path>, S: AsRef<str>>(data_dir: P, cities: &[S]) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        let mut seen = HashSet::new();
        let bundles = cities
            .iter()
            .map(|name| CityBundle::new(&data_dir, name.as_ref()))
            .filter(|b| !b.key.is_empty() && seen.insert(b.key.clone()))
            .collect();

        Self {
            data_dir,
            bundles,
            min_file_size: integrity::MIN_FILE_SIZE,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.data_dir, config.cities.as_slice()).with_min_file_size(config.min_file_size)
    }

    pub fn with_min_file_size(mut self, min_file_size: u64) -> Self {
        self.min_file_size = min_file_size;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn min_file_size(&self) -> u64 {
        self.min_file_size
    }

    /// Returns the canonical keys of all supported cities, in configured order.
    pub fn list_cities(&self) -> Vec<&str> {
        self.bundles.iter().map(|b| b.key.as_str()).collect()
    }

    /// Returns the bundle of a city, given its canonical key.
    pub fn bundle(&self, key: &str) -> Option<&CityBundle> {
        self.bundles.iter().find(|b| b.key == key)
    }

    /// Returns the bundle of a city, given its human-readable name.
    pub fn resolve(&self, name: &str) -> Result<&CityBundle, UnavailableError> {
        let key = canonical_key(name);
        self.bundle(&key)
            .ok_or_else(|| UnavailableError::NotSupported(name.trim().to_string()))
    }

    /// Checks all files of a city. The city may be given by its name or key.
    pub fn readiness(&self, city: &str) -> Result<Readiness, UnavailableError> {
        let bundle = self.resolve(city)?;
        let readiness = bundle.readiness(self.min_file_size);
        if !readiness.is_ready() {
            log::warn!("{}: {}", bundle.key, readiness);
        }
        Ok(readiness)
    }

    /// Checks all files of every city.
    pub fn status(&self) -> Vec<(&str, Readiness)> {
        self.bundles
            .iter()
            .map(|b| (b.key.as_str(), b.readiness(self.min_file_size)))
            .collect()
    }

    /// Path to the shared POI store.
    pub fn pois_path(&self) -> PathBuf {
        self.data_dir.join(POI_FILE)
    }
}

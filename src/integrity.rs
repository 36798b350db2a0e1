// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Cheap checks run against bundle files before anything tries to parse them.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files smaller than this are considered placeholders left behind by an
/// incomplete download or a failed build step.
pub const MIN_FILE_SIZE: u64 = 1024;

/// First 8 bytes of every SQLite database (`"SQLite format 3\0"`).
pub const SQLITE_MAGIC: &[u8; 8] = b"SQLite f";

/// What a bundle file is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Hierarchy and geometry files. Only existence and size are checked here;
    /// their structure is verified by the [graph loader](crate::RouteGraph::load).
    Graph,

    /// SQLite containers: tile stores and the POI database.
    Container,
}

/// Reason why a file failed the integrity checks.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrityError {
    #[error("{0}: file does not exist")]
    Missing(PathBuf),

    #[error("{0}: not a regular file")]
    NotAFile(PathBuf),

    #[error("{path}: {size} bytes is below the minimum of {min} bytes")]
    Undersized { path: PathBuf, size: u64, min: u64 },

    #[error("{path}: unexpected format magic {found:?}")]
    BadMagic { path: PathBuf, found: Vec<u8> },

    #[error("{path}: io: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl IntegrityError {
    /// Returns the file this error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Missing(path) | Self::NotAFile(path) => path,
            Self::Undersized { path, .. } | Self::BadMagic { path, .. } | Self::Io { path, .. } => {
                path
            }
        }
    }

    /// Returns true if the file is absent (as opposed to present but unusable).
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_))
    }
}

/// Returns true if the file at `path` passes all checks for the expected [FileKind].
///
/// Never fails; any problem (including IO errors) results in `false`.
pub fn validate<P: AsRef<Path>>(path: P, kind: FileKind) -> bool {
    check(path, kind).is_ok()
}

/// Runs the integrity checks with the default [MIN_FILE_SIZE], reporting why it failed.
pub fn check<P: AsRef<Path>>(path: P, kind: FileKind) -> Result<(), IntegrityError> {
    check_with_min_size(path, kind, MIN_FILE_SIZE)
}

/// Runs the integrity checks: (a) the file exists, is a regular file and can be opened
/// for reading, (b) it has at least `min_size` bytes, and (c) for [FileKind::Container],
/// it starts with [SQLITE_MAGIC].
pub fn check_with_min_size<P: AsRef<Path>>(
    path: P,
    kind: FileKind,
    min_size: u64,
) -> Result<(), IntegrityError> {
    let path = path.as_ref();
    let io_error = |e: io::Error| IntegrityError::Io {
        path: path.to_path_buf(),
        source: Arc::new(e),
    };

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(IntegrityError::Missing(path.to_path_buf()))
        }
        Err(e) => return Err(io_error(e)),
    };

    if !metadata.is_file() {
        return Err(IntegrityError::NotAFile(path.to_path_buf()));
    }

    if metadata.len() < min_size {
        return Err(IntegrityError::Undersized {
            path: path.to_path_buf(),
            size: metadata.len(),
            min: min_size,
        });
    }

    let mut f = File::open(path).map_err(io_error)?;

    if kind == FileKind::Container {
        let mut magic = [0u8; 8];
        let n = read_up_to(&mut f, &mut magic).map_err(io_error)?;
        if &magic[..n] != SQLITE_MAGIC.as_slice() {
            return Err(IntegrityError::BadMagic {
                path: path.to_path_buf(),
                found: magic[..n].to_vec(),
            });
        }
    }

    Ok(())
}

/// Like [Read::read_exact], but returns the number of bytes read on a short file.
fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

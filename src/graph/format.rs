// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! On-disk layout of the `.osrm.hsgr` (hierarchy) and `.osrm.geometry` files.
//!
//! Both files are little-endian and end with a CRC-64 of everything before it.
//!
//! Hierarchy:
//!
//! | field      | type                                                     |
//! |------------|----------------------------------------------------------|
//! | magic      | `b"HSGR"`                                                |
//! | version    | u16                                                      |
//! | reserved   | u16                                                      |
//! | node count | u32                                                      |
//! | arc count  | u32                                                      |
//! | nodes      | (lat f64, lon f64, rank u32) × node count                |
//! | arcs       | (source u32, target u32, weight u32, shortcut u8, 3 × pad, a u32, b u32) × arc count |
//! | checksum   | u64                                                      |
//!
//! Geometry:
//!
//! | field            | type                                                  |
//! |------------------|-------------------------------------------------------|
//! | magic            | `b"GEOM"`                                             |
//! | version          | u16                                                   |
//! | reserved         | u16                                                   |
//! | edge count       | u32                                                   |
//! | point count      | u32                                                   |
//! | name count       | u32                                                   |
//! | name byte length | u32                                                   |
//! | edges            | (from u32, to u32, weight u32, kind u8, 3 × pad, name u32, first point u32, point count u32) × edge count |
//! | points           | (lat f64, lon f64) × point count                      |
//! | name offsets     | u32 × (name count + 1)                                |
//! | names            | UTF-8 bytes                                           |
//! | checksum         | u64                                                   |

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crc::{Crc, CRC_64_GO_ISO};

use super::{ArcKind, Edge, EdgeKind, Geometry, Hierarchy, HierarchyArc, Node};
use crate::Coordinate;

pub const HIERARCHY_MAGIC: [u8; 4] = *b"HSGR";
pub const GEOMETRY_MAGIC: [u8; 4] = *b"GEOM";
pub const VERSION: u16 = 1;

/// Marks absent `u32` references (unnamed edges, unused arc fields).
pub const NONE: u32 = u32::MAX;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

const HIERARCHY_HEADER_SIZE: u64 = 16;
const GEOMETRY_HEADER_SIZE: u64 = 24;
const NODE_SIZE: u64 = 20;
const ARC_SIZE: u64 = 24;
const EDGE_SIZE: u64 = 28;
const POINT_SIZE: u64 = 16;
const FOOTER_SIZE: usize = 8;

const ARC_ORIGINAL: u8 = 0;
const ARC_SHORTCUT: u8 = 1;

/// Error which can occur when reading a hierarchy or geometry file.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Corrupt(String),
}

macro_rules! corrupt {
    ($($arg:tt)*) => {
        FormatError::Corrupt(format!($($arg)*))
    };
}

/// Sequential little-endian reader over an in-memory buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let end = self.pos + N;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| corrupt!("truncated at byte {}", self.pos))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let buf = self.buf;
        let end = self.pos + n;
        let bytes = buf
            .get(self.pos..end)
            .ok_or_else(|| corrupt!("truncated at byte {}", self.pos))?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn f64(&mut self) -> Result<f64, FormatError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    fn coordinate(&mut self) -> Result<Coordinate, FormatError> {
        let lat = self.f64()?;
        let lon = self.f64()?;
        Ok(Coordinate { lat, lon })
    }
}

/// Checks the magic and the version, then verifies the trailing checksum.
/// Returns the data without the footer.
fn open_envelope<'a>(
    data: &'a [u8],
    magic: [u8; 4],
    header_size: u64,
) -> Result<&'a [u8], FormatError> {
    if (data.len() as u64) < header_size + FOOTER_SIZE as u64 {
        return Err(corrupt!("truncated header ({} bytes)", data.len()));
    }

    if data[0..4] != magic {
        return Err(corrupt!(
            "invalid magic: expected {:?}, got {:?}",
            magic,
            &data[0..4]
        ));
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != VERSION {
        return Err(corrupt!(
            "unsupported version: expected {VERSION}, got {version}"
        ));
    }

    let (body, footer) = data.split_at(data.len() - FOOTER_SIZE);
    let mut stored = [0u8; FOOTER_SIZE];
    stored.copy_from_slice(footer);
    let stored = u64::from_le_bytes(stored);
    let computed = CRC64.checksum(body);
    if stored != computed {
        return Err(corrupt!(
            "checksum mismatch: stored {stored:016x}, computed {computed:016x}"
        ));
    }

    Ok(body)
}

fn expect_len(body: &[u8], sections: &[(u64, u64)], header_size: u64) -> Result<(), FormatError> {
    let expected = sections
        .iter()
        .try_fold(header_size, |acc, &(count, size)| {
            count.checked_mul(size).and_then(|s| acc.checked_add(s))
        })
        .ok_or_else(|| corrupt!("section sizes overflow"))?;

    if body.len() as u64 != expected {
        return Err(corrupt!(
            "expected {expected} bytes of data, found {}",
            body.len()
        ));
    }
    Ok(())
}

fn seal(mut body: Vec<u8>) -> Vec<u8> {
    let checksum = CRC64.checksum(&body);
    body.extend_from_slice(&checksum.to_le_bytes());
    body
}

fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(data)?;
    w.flush()
}

/// Parses the contents of a `.osrm.hsgr` file.
///
/// Only the binary layout is checked here;
/// see [RouteGraph::from_parts](super::RouteGraph::from_parts) for structural checks.
pub fn decode_hierarchy(data: &[u8]) -> Result<Hierarchy, FormatError> {
    let body = open_envelope(data, HIERARCHY_MAGIC, HIERARCHY_HEADER_SIZE)?;
    let mut r = Reader::new(body);
    r.bytes(8)?; // magic, version, reserved
    let node_count = r.u32()?;
    let arc_count = r.u32()?;

    expect_len(
        body,
        &[(node_count as u64, NODE_SIZE), (arc_count as u64, ARC_SIZE)],
        HIERARCHY_HEADER_SIZE,
    )?;

    let mut nodes = Vec::with_capacity(node_count as usize);
    for _ in 0..node_count {
        let coordinate = r.coordinate()?;
        let rank = r.u32()?;
        nodes.push(Node { coordinate, rank });
    }

    let mut arcs = Vec::with_capacity(arc_count as usize);
    for i in 0..arc_count {
        let source = r.u32()?;
        let target = r.u32()?;
        let weight = r.u32()?;
        let type_ = r.u8()?;
        r.bytes(3)?;
        let a = r.u32()?;
        let b = r.u32()?;

        let kind = match type_ {
            ARC_ORIGINAL => ArcKind::Original { edge: a },
            ARC_SHORTCUT => ArcKind::Shortcut {
                first: a,
                second: b,
            },
            other => return Err(corrupt!("arc {i}: unknown arc type {other}")),
        };

        arcs.push(HierarchyArc {
            source,
            target,
            weight,
            kind,
        });
    }

    Ok(Hierarchy { nodes, arcs })
}

/// Serializes a [Hierarchy] into the `.osrm.hsgr` layout.
pub fn encode_hierarchy(h: &Hierarchy) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        (HIERARCHY_HEADER_SIZE
            + NODE_SIZE * h.nodes.len() as u64
            + ARC_SIZE * h.arcs.len() as u64) as usize
            + FOOTER_SIZE,
    );

    out.extend_from_slice(&HIERARCHY_MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(h.nodes.len() as u32).to_le_bytes());
    out.extend_from_slice(&(h.arcs.len() as u32).to_le_bytes());

    for node in &h.nodes {
        out.extend_from_slice(&node.coordinate.lat.to_le_bytes());
        out.extend_from_slice(&node.coordinate.lon.to_le_bytes());
        out.extend_from_slice(&node.rank.to_le_bytes());
    }

    for arc in &h.arcs {
        let (type_, a, b) = match arc.kind {
            ArcKind::Original { edge } => (ARC_ORIGINAL, edge, NONE),
            ArcKind::Shortcut { first, second } => (ARC_SHORTCUT, first, second),
        };
        out.extend_from_slice(&arc.source.to_le_bytes());
        out.extend_from_slice(&arc.target.to_le_bytes());
        out.extend_from_slice(&arc.weight.to_le_bytes());
        out.push(type_);
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&a.to_le_bytes());
        out.extend_from_slice(&b.to_le_bytes());
    }

    seal(out)
}

/// Parses the contents of a `.osrm.geometry` file.
pub fn decode_geometry(data: &[u8]) -> Result<Geometry, FormatError> {
    let body = open_envelope(data, GEOMETRY_MAGIC, GEOMETRY_HEADER_SIZE)?;
    let mut r = Reader::new(body);
    r.bytes(8)?; // magic, version, reserved
    let edge_count = r.u32()?;
    let point_count = r.u32()?;
    let name_count = r.u32()?;
    let name_bytes = r.u32()?;

    expect_len(
        body,
        &[
            (edge_count as u64, EDGE_SIZE),
            (point_count as u64, POINT_SIZE),
            (name_count as u64 + 1, 4),
            (name_bytes as u64, 1),
        ],
        GEOMETRY_HEADER_SIZE,
    )?;

    let mut edges = Vec::with_capacity(edge_count as usize);
    for i in 0..edge_count {
        let from = r.u32()?;
        let to = r.u32()?;
        let weight = r.u32()?;
        let kind = r.u8()?;
        r.bytes(3)?;
        let name = r.u32()?;
        let first_point = r.u32()?;
        let point_count = r.u32()?;

        let kind = EdgeKind::from_u8(kind).ok_or_else(|| corrupt!("edge {i}: unknown kind {kind}"))?;

        edges.push(Edge {
            from,
            to,
            weight,
            kind,
            name: if name == NONE { None } else { Some(name) },
            first_point,
            point_count,
        });
    }

    let mut points = Vec::with_capacity(point_count as usize);
    for _ in 0..point_count {
        points.push(r.coordinate()?);
    }

    let mut offsets = Vec::with_capacity(name_count as usize + 1);
    for _ in 0..=name_count {
        offsets.push(r.u32()?);
    }

    let blob = r.bytes(name_bytes as usize)?;
    let mut names = Vec::with_capacity(name_count as usize);
    for (i, pair) in offsets.windows(2).enumerate() {
        let (start, end) = (pair[0] as usize, pair[1] as usize);
        let raw = blob
            .get(start..end)
            .ok_or_else(|| corrupt!("name {i}: offsets {start}..{end} out of range"))?;
        let name = std::str::from_utf8(raw).map_err(|e| corrupt!("name {i}: {e}"))?;
        names.push(name.to_string());
    }

    Ok(Geometry {
        edges,
        points,
        names,
    })
}

/// Serializes a [Geometry] into the `.osrm.geometry` layout.
pub fn encode_geometry(g: &Geometry) -> Vec<u8> {
    let name_bytes: usize = g.names.iter().map(String::len).sum();
    let mut out = Vec::with_capacity(
        (GEOMETRY_HEADER_SIZE
            + EDGE_SIZE * g.edges.len() as u64
            + POINT_SIZE * g.points.len() as u64
            + 4 * (g.names.len() as u64 + 1)) as usize
            + name_bytes
            + FOOTER_SIZE,
    );

    out.extend_from_slice(&GEOMETRY_MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(g.edges.len() as u32).to_le_bytes());
    out.extend_from_slice(&(g.points.len() as u32).to_le_bytes());
    out.extend_from_slice(&(g.names.len() as u32).to_le_bytes());
    out.extend_from_slice(&(name_bytes as u32).to_le_bytes());

    for edge in &g.edges {
        out.extend_from_slice(&edge.from.to_le_bytes());
        out.extend_from_slice(&edge.to.to_le_bytes());
        out.extend_from_slice(&edge.weight.to_le_bytes());
        out.push(edge.kind.to_u8());
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&edge.name.unwrap_or(NONE).to_le_bytes());
        out.extend_from_slice(&edge.first_point.to_le_bytes());
        out.extend_from_slice(&edge.point_count.to_le_bytes());
    }

    for point in &g.points {
        out.extend_from_slice(&point.lat.to_le_bytes());
        out.extend_from_slice(&point.lon.to_le_bytes());
    }

    let mut offset = 0u32;
    out.extend_from_slice(&offset.to_le_bytes());
    for name in &g.names {
        offset += name.len() as u32;
        out.extend_from_slice(&offset.to_le_bytes());
    }
    for name in &g.names {
        out.extend_from_slice(name.as_bytes());
    }

    seal(out)
}

/// Reads and parses a `.osrm.hsgr` file.
pub fn read_hierarchy_file<P: AsRef<Path>>(path: P) -> Result<Hierarchy, FormatError> {
    let data = std::fs::read(path)?;
    decode_hierarchy(&data)
}

/// Reads and parses a `.osrm.geometry` file.
pub fn read_geometry_file<P: AsRef<Path>>(path: P) -> Result<Geometry, FormatError> {
    let data = std::fs::read(path)?;
    decode_geometry(&data)
}

/// Writes a [Hierarchy] to a `.osrm.hsgr` file.
pub fn write_hierarchy_file<P: AsRef<Path>>(path: P, h: &Hierarchy) -> io::Result<()> {
    write_file(path.as_ref(), &encode_hierarchy(h))
}

/// Writes a [Geometry] to a `.osrm.geometry` file.
pub fn write_geometry_file<P: AsRef<Path>>(path: P, g: &Geometry) -> io::Result<()> {
    write_file(path.as_ref(), &encode_geometry(g))
}

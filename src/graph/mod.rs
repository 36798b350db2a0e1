// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

pub mod format;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::CityBundle;
use crate::integrity::IntegrityError;
use crate::{Coordinate, KDTree};

pub use format::FormatError;

/// Classification of a road segment, used when describing maneuvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    #[default]
    Road,
    Roundabout,
    Ramp,
    Ferry,
}

impl EdgeKind {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Road => 0,
            Self::Roundabout => 1,
            Self::Ramp => 2,
            Self::Ferry => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Road),
            1 => Some(Self::Roundabout),
            2 => Some(Self::Ramp),
            3 => Some(Self::Ferry),
            _ => None,
        }
    }
}

/// A node of the hierarchy. Nodes are identified by their index.
///
/// `rank` is the contraction order: the search only ever moves towards
/// nodes with higher ranks. Ranks of all nodes form a permutation of `0..n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub coordinate: Coordinate,
    pub rank: u32,
}

/// What a [HierarchyArc] stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcKind {
    /// A road segment, described by the [Edge] with the given index.
    Original { edge: u32 },

    /// A shortcut over two other arcs, `first` (`source → middle`) and
    /// `second` (`middle → target`). Both must precede the shortcut in
    /// [Hierarchy::arcs], and `middle` must rank below both endpoints.
    Shortcut { first: u32, second: u32 },
}

/// A directed, weighted arc of the hierarchy.
///
/// `weight` is the travel time in tenths of a second and must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyArc {
    pub source: u32,
    pub target: u32,
    pub weight: u32,
    pub kind: ArcKind,
}

/// Raw contents of a `.osrm.hsgr` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hierarchy {
    pub nodes: Vec<Node>,
    pub arcs: Vec<HierarchyArc>,
}

/// A directed road segment between two nodes.
///
/// Shape points between `from` and `to` are stored in
/// `Geometry::points[first_point..first_point + point_count]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: u32,
    pub to: u32,
    pub weight: u32,
    pub kind: EdgeKind,
    pub name: Option<u32>,
    pub first_point: u32,
    pub point_count: u32,
}

/// Raw contents of a `.osrm.geometry` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub edges: Vec<Edge>,
    pub points: Vec<Coordinate>,
    pub names: Vec<String>,
}

/// Structural inconsistency between, or within, a [Hierarchy] and a [Geometry].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Inconsistency(pub String);

macro_rules! inconsistent {
    ($($arg:tt)*) => {
        return Err(Inconsistency(format!($($arg)*)))
    };
}

/// Error which can occur when loading a [RouteGraph] from disk.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("{path}: corrupt graph: {reason}")]
    CorruptGraph { path: PathBuf, reason: String },

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("{path}: io: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl LoadError {
    fn from_format(path: &Path, e: FormatError) -> Self {
        match e {
            FormatError::Io(e) => Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(e),
            },
            FormatError::Corrupt(reason) => Self::CorruptGraph {
                path: path.to_path_buf(),
                reason,
            },
        }
    }
}

/// Compressed adjacency: arc indices grouped by node.
#[derive(Debug, Clone, Default)]
struct Adjacency {
    offsets: Vec<u32>,
    arcs: Vec<u32>,
}

impl Adjacency {
    fn build(node_count: usize, pairs: &[(u32, u32)]) -> Self {
        let mut offsets = vec![0u32; node_count + 1];
        for &(node, _) in pairs {
            offsets[node as usize + 1] += 1;
        }
        for i in 0..node_count {
            offsets[i + 1] += offsets[i];
        }

        let mut cursor = offsets.clone();
        let mut arcs = vec![0u32; pairs.len()];
        for &(node, arc) in pairs {
            arcs[cursor[node as usize] as usize] = arc;
            cursor[node as usize] += 1;
        }

        Self { offsets, arcs }
    }

    fn get(&self, node: u32) -> &[u32] {
        let start = self.offsets[node as usize] as usize;
        let end = self.offsets[node as usize + 1] as usize;
        &self.arcs[start..end]
    }
}

/// An immutable, in-memory contraction hierarchy of a single city.
///
/// Constructed with [RouteGraph::load] (or [RouteGraph::from_parts]) after every
/// structural invariant has been verified, and never modified afterwards.
/// Replacing the active city drops the whole graph.
#[derive(Debug, Clone)]
pub struct RouteGraph {
    nodes: Vec<Node>,
    arcs: Vec<HierarchyArc>,

    /// Arcs leaving a node towards a higher-ranked node (forward search).
    up: Adjacency,

    /// Arcs entering a node from a higher-ranked node (backward search).
    down: Adjacency,

    geometry: Geometry,
    junctions: Vec<bool>,
    kd: Option<KDTree>,
}

impl RouteGraph {
    /// Loads the hierarchy and geometry files of a [CityBundle].
    ///
    /// The bundle should have passed the [integrity checks](crate::integrity) first.
    pub fn load(bundle: &CityBundle) -> Result<Self, LoadError> {
        Self::from_files(&bundle.graph, &bundle.geometry)
    }

    /// Loads a graph from a `.osrm.hsgr` and a `.osrm.geometry` file.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        hierarchy_path: P,
        geometry_path: Q,
    ) -> Result<Self, LoadError> {
        let hierarchy_path = hierarchy_path.as_ref();
        let geometry_path = geometry_path.as_ref();

        let hierarchy = format::read_hierarchy_file(hierarchy_path)
            .map_err(|e| LoadError::from_format(hierarchy_path, e))?;
        let geometry = format::read_geometry_file(geometry_path)
            .map_err(|e| LoadError::from_format(geometry_path, e))?;

        let g = Self::from_parts(hierarchy, geometry).map_err(|e| LoadError::CorruptGraph {
            path: hierarchy_path.to_path_buf(),
            reason: e.0,
        })?;

        log::info!(
            "loaded {}: {} nodes, {} arcs, {} edges",
            hierarchy_path.display(),
            g.node_count(),
            g.arc_count(),
            g.geometry.edges.len(),
        );
        Ok(g)
    }

    /// Builds a graph from already-parsed parts, verifying that:
    /// - every node, arc, edge, shape point and name reference is in range,
    /// - ranks form a permutation of `0..n`,
    /// - all weights are positive and all coordinates are finite,
    /// - original arcs agree with their [Edge] on endpoints and weight,
    /// - shortcuts chain their two (preceding) children, sum their weights,
    ///   and bypass a node ranked below both endpoints.
    pub fn from_parts(hierarchy: Hierarchy, geometry: Geometry) -> Result<Self, Inconsistency> {
        let Hierarchy { nodes, arcs } = hierarchy;
        let n = nodes.len();

        Self::check_geometry(&geometry, n)?;

        let mut rank_seen = vec![false; n];
        for (i, node) in nodes.iter().enumerate() {
            if !node.coordinate.lat.is_finite() || !node.coordinate.lon.is_finite() {
                inconsistent!("node {i}: non-finite coordinate");
            }
            match rank_seen.get_mut(node.rank as usize) {
                Some(seen) if !*seen => *seen = true,
                Some(_) => inconsistent!("node {i}: duplicate rank {}", node.rank),
                None => inconsistent!("node {i}: rank {} out of range", node.rank),
            }
        }

        let mut up_pairs = Vec::new();
        let mut down_pairs = Vec::new();

        for (i, arc) in arcs.iter().enumerate() {
            if arc.source as usize >= n || arc.target as usize >= n {
                inconsistent!("arc {i}: node index out of range");
            }
            if arc.source == arc.target {
                inconsistent!("arc {i}: self-loop on node {}", arc.source);
            }
            if arc.weight == 0 {
                inconsistent!("arc {i}: zero weight");
            }

            match arc.kind {
                ArcKind::Original { edge } => {
                    let Some(e) = geometry.edges.get(edge as usize) else {
                        inconsistent!("arc {i}: edge {edge} out of range");
                    };
                    if e.from != arc.source || e.to != arc.target || e.weight != arc.weight {
                        inconsistent!("arc {i}: disagrees with edge {edge}");
                    }
                }

                ArcKind::Shortcut { first, second } => {
                    if first as usize >= i || second as usize >= i {
                        inconsistent!("arc {i}: shortcut refers to a later arc");
                    }
                    let a = &arcs[first as usize];
                    let b = &arcs[second as usize];
                    if a.source != arc.source || a.target != b.source || b.target != arc.target {
                        inconsistent!("arc {i}: shortcut children do not chain");
                    }
                    let middle = a.target as usize;
                    let rank = |x: u32| nodes[x as usize].rank;
                    if nodes[middle].rank >= rank(arc.source)
                        || nodes[middle].rank >= rank(arc.target)
                    {
                        inconsistent!(
                            "arc {i}: shortcut bypasses node {middle} ranked above its endpoints"
                        );
                    }
                    if a.weight as u64 + b.weight as u64 != arc.weight as u64 {
                        inconsistent!("arc {i}: shortcut weight differs from its children");
                    }
                }
            }

            let i = i as u32;
            if nodes[arc.source as usize].rank < nodes[arc.target as usize].rank {
                up_pairs.push((arc.source, i));
            } else {
                down_pairs.push((arc.target, i));
            }
        }

        let junctions = Self::find_junctions(&geometry, n);
        let kd = KDTree::from_iter(
            nodes
                .iter()
                .enumerate()
                .map(|(i, node)| (i as u32, node.coordinate)),
        );

        Ok(Self {
            up: Adjacency::build(n, &up_pairs),
            down: Adjacency::build(n, &down_pairs),
            nodes,
            arcs,
            geometry,
            junctions,
            kd,
        })
    }

    fn check_geometry(g: &Geometry, node_count: usize) -> Result<(), Inconsistency> {
        for (i, p) in g.points.iter().enumerate() {
            if !p.lat.is_finite() || !p.lon.is_finite() {
                inconsistent!("shape point {i}: non-finite coordinate");
            }
        }

        for (i, e) in g.edges.iter().enumerate() {
            if e.from as usize >= node_count || e.to as usize >= node_count {
                inconsistent!("edge {i}: node index out of range");
            }
            if e.weight == 0 {
                inconsistent!("edge {i}: zero weight");
            }
            if let Some(name) = e.name {
                if name as usize >= g.names.len() {
                    inconsistent!("edge {i}: name {name} out of range");
                }
            }
            let end = e.first_point as u64 + e.point_count as u64;
            if end > g.points.len() as u64 {
                inconsistent!("edge {i}: shape points out of range");
            }
        }

        Ok(())
    }

    /// A junction is a node with more than two distinct neighbours.
    fn find_junctions(g: &Geometry, node_count: usize) -> Vec<bool> {
        let mut neighbours: Vec<Vec<u32>> = vec![Vec::new(); node_count];
        for e in &g.edges {
            neighbours[e.from as usize].push(e.to);
            neighbours[e.to as usize].push(e.from);
        }
        neighbours
            .into_iter()
            .map(|mut list| {
                list.sort_unstable();
                list.dedup();
                list.len() > 2
            })
            .collect()
    }

    /// Returns the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of hierarchy arcs (original arcs and shortcuts).
    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    /// Returns the number of road segments.
    pub fn edge_count(&self) -> usize {
        self.geometry.edges.len()
    }

    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    pub(crate) fn coordinate(&self, id: u32) -> Coordinate {
        self.nodes[id as usize].coordinate
    }

    pub(crate) fn arc(&self, id: u32) -> &HierarchyArc {
        &self.arcs[id as usize]
    }

    pub(crate) fn up_arcs(&self, node: u32) -> &[u32] {
        self.up.get(node)
    }

    pub(crate) fn down_arcs(&self, node: u32) -> &[u32] {
        self.down.get(node)
    }

    pub fn edge(&self, id: u32) -> Option<&Edge> {
        self.geometry.edges.get(id as usize)
    }

    /// Returns the street name of an edge, if it has one.
    pub fn edge_name(&self, id: u32) -> Option<&str> {
        self.edge(id)
            .and_then(|e| e.name)
            .map(|name| self.geometry.names[name as usize].as_str())
    }

    /// Returns the full polyline of an edge: `from`, shape points, `to`.
    pub fn edge_polyline(&self, id: u32) -> Vec<Coordinate> {
        let e = &self.geometry.edges[id as usize];
        let start = e.first_point as usize;
        let end = start + e.point_count as usize;

        let mut line = Vec::with_capacity(e.point_count as usize + 2);
        line.push(self.coordinate(e.from));
        line.extend_from_slice(&self.geometry.points[start..end]);
        line.push(self.coordinate(e.to));
        line
    }

    /// Returns true if more than two roads meet at the node.
    pub fn is_junction(&self, node: u32) -> bool {
        self.junctions.get(node as usize).copied().unwrap_or(false)
    }

    /// Finds the node closest to the given position.
    /// Returns its id and the distance to it, in kilometers.
    pub fn nearest_node(&self, at: Coordinate) -> Option<(u32, f64)> {
        self.kd.as_ref().map(|kd| kd.find_nearest(at))
    }

    /// Expands a hierarchy arc into the sequence of [Edge] ids it stands for.
    pub(crate) fn unpack_into(&self, arc: u32, out: &mut Vec<u32>) {
        let mut stack = vec![arc];
        while let Some(a) = stack.pop() {
            match self.arcs[a as usize].kind {
                ArcKind::Original { edge } => out.push(edge),
                ArcKind::Shortcut { first, second } => {
                    stack.push(second);
                    stack.push(first);
                }
            }
        }
    }
}

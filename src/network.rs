// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Plain road network, the input of [contract](crate::contract::contract).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::graph::EdgeKind;
use crate::Coordinate;

/// A road segment between two nodes of a [Network].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub from: u32,
    pub to: u32,

    /// Travel time, in seconds. Must be positive and finite.
    pub seconds: f64,

    #[serde(default)]
    pub kind: EdgeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Shape points between `from` and `to` (exclusive), in travel direction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<Coordinate>,

    /// If false, the segment can also be travelled from `to` to `from`.
    #[serde(default)]
    pub oneway: bool,
}

impl NetworkEdge {
    pub fn new(from: u32, to: u32, seconds: f64) -> Self {
        Self {
            from,
            to,
            seconds,
            kind: EdgeKind::Road,
            name: None,
            shape: Vec::new(),
            oneway: false,
        }
    }

    pub fn oneway(mut self) -> Self {
        self.oneway = true;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A road network: nodes identified by their index, and edges between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub nodes: Vec<Coordinate>,
    pub edges: Vec<NetworkEdge>,
}

/// Error which can occur when reading or validating a [Network].
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("node {0}: invalid coordinate")]
    InvalidNode(usize),

    #[error("edge {0}: node reference out of range")]
    InvalidReference(usize),

    #[error("edge {0}: travel time must be positive and finite")]
    InvalidTime(usize),

    #[error("edge {0}: invalid shape point")]
    InvalidShape(usize),

    #[error("too many nodes: {0}")]
    TooLarge(usize),
}

impl Network {
    /// Reads a network from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, NetworkError> {
        let reader = BufReader::new(File::open(path)?);
        let network: Self = serde_json::from_reader(reader)?;
        network.validate()?;
        Ok(network)
    }

    /// Checks that all coordinates are valid, all references in range
    /// and all travel times positive.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.nodes.len() >= u32::MAX as usize {
            return Err(NetworkError::TooLarge(self.nodes.len()));
        }

        if let Some(i) = self.nodes.iter().position(|c| !c.is_valid()) {
            return Err(NetworkError::InvalidNode(i));
        }

        for (i, e) in self.edges.iter().enumerate() {
            if e.from as usize >= self.nodes.len() || e.to as usize >= self.nodes.len() {
                return Err(NetworkError::InvalidReference(i));
            }
            if !e.seconds.is_finite() || e.seconds <= 0.0 {
                return Err(NetworkError::InvalidTime(i));
            }
            if e.shape.iter().any(|c| !c.is_valid()) {
                return Err(NetworkError::InvalidShape(i));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_with_defaults() {
        let network: Network = serde_json::from_str(
            r#"{
                "nodes": [{"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 0.001}],
                "edges": [
                    {"from": 0, "to": 1, "seconds": 7.5, "name": "Main Street"},
                    {"from": 1, "to": 0, "seconds": 9.0, "kind": "ramp", "oneway": true}
                ]
            }"#,
        )
        .unwrap();

        assert!(network.validate().is_ok());
        assert_eq!(network.edges[0].kind, EdgeKind::Road);
        assert!(!network.edges[0].oneway);
        assert_eq!(network.edges[1].kind, EdgeKind::Ramp);
        assert!(network.edges[1].oneway);
    }

    #[test]
    fn rejects_bad_references_and_times() {
        let mut network = Network {
            nodes: vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.001)],
            edges: vec![NetworkEdge::new(0, 2, 1.0)],
        };
        assert!(matches!(
            network.validate(),
            Err(NetworkError::InvalidReference(0))
        ));

        network.edges[0] = NetworkEdge::new(0, 1, 0.0);
        assert!(matches!(network.validate(), Err(NetworkError::InvalidTime(0))));

        network.edges[0] = NetworkEdge::new(0, 1, f64::NAN);
        assert!(matches!(network.validate(), Err(NetworkError::InvalidTime(0))));
    }

    #[test]
    fn rejects_invalid_coordinates() {
        let network = Network {
            nodes: vec![Coordinate::new(91.0, 0.0)],
            edges: vec![],
        };
        assert!(matches!(network.validate(), Err(NetworkError::InvalidNode(0))));
    }
}

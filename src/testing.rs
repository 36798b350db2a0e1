// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Fixtures shared by unit tests.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;

use rusqlite::Connection;

use crate::catalog::CityBundle;
use crate::contract::contract;
use crate::graph::{format, Geometry};
use crate::network::{Network, NetworkEdge};
use crate::Coordinate;

/// A `width × height` grid of streets near Warsaw, with uneven travel times.
/// Horizontal streets in odd rows are one-way eastbound; the network stays
/// strongly connected through row 0 and the (two-way) vertical streets.
pub fn grid_network(width: u32, height: u32) -> Network {
    let id = |row: u32, col: u32| row * width + col;
    let mut network = Network::default();

    for row in 0..height {
        for col in 0..width {
            network.nodes.push(Coordinate::new(
                52.0 + row as f64 * 0.001,
                21.0 + col as f64 * 0.0015,
            ));
        }
    }

    for row in 0..height {
        for col in 0..width {
            let seconds = 5.0 + ((row * 7 + col * 3) % 5) as f64;
            if col + 1 < width {
                let mut e = NetworkEdge::new(id(row, col), id(row, col + 1), seconds)
                    .named(&format!("Row {row}"));
                e.oneway = row % 2 == 1;
                network.edges.push(e);
            }
            if row + 1 < height {
                network.edges.push(
                    NetworkEdge::new(id(row, col), id(row + 1, col), seconds + 1.5)
                        .named(&format!("Column {col}")),
                );
            }
        }
    }

    network
}

/// A(0,0) B(1,0) C(2,0) D(1,1), with one-way 1-second edges
/// A→B, B→C, A→D and D→C.
pub fn diamond_network() -> Network {
    Network {
        nodes: vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(2.0, 0.0),
            Coordinate::new(1.0, 1.0),
        ],
        edges: vec![
            NetworkEdge::new(0, 1, 1.0).oneway(),
            NetworkEdge::new(1, 2, 1.0).oneway(),
            NetworkEdge::new(0, 3, 1.0).oneway(),
            NetworkEdge::new(3, 2, 1.0).oneway(),
        ],
    }
}

/// Plain Dijkstra over geometry edges, for checking hierarchy queries.
pub fn dijkstra(g: &Geometry, node_count: usize, from: u32, to: u32) -> Option<u64> {
    let mut dist = vec![u64::MAX; node_count];
    let mut queue = BinaryHeap::new();
    dist[from as usize] = 0;
    queue.push(Reverse((0u64, from)));

    while let Some(Reverse((d, at))) = queue.pop() {
        if at == to {
            return Some(d);
        }
        if d > dist[at as usize] {
            continue;
        }
        for e in g.edges.iter().filter(|e| e.from == at) {
            let nd = d + e.weight as u64;
            if nd < dist[e.to as usize] {
                dist[e.to as usize] = nd;
                queue.push(Reverse((nd, e.to)));
            }
        }
    }

    None
}

/// Creates a SQLite POI store with the given `(id, name, city, lat, lon)` rows.
pub fn write_pois(path: &Path, rows: &[(i64, Option<&str>, Option<&str>, f64, f64)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE pois (id INTEGER PRIMARY KEY, name TEXT, city TEXT, latitude REAL, longitude REAL);
         CREATE INDEX idx_pois_name ON pois(name);
         CREATE INDEX idx_pois_city ON pois(city);",
    )
    .unwrap();
    for row in rows {
        conn.execute(
            "INSERT INTO pois (id, name, city, latitude, longitude) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![row.0, row.1, row.2, row.3, row.4],
        )
        .unwrap();
    }
}

/// Creates an empty SQLite tile store.
pub fn write_tiles(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE metadata (name TEXT, value TEXT);
         CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);",
    )
    .unwrap();
}

/// Writes a complete, valid bundle of a city into `dir`.
/// The POI store is only created if it doesn't exist yet.
pub fn write_bundle(dir: &Path, name: &str, network: &Network) -> CityBundle {
    let bundle = CityBundle::new(dir, name);
    let (h, g) = contract(network).unwrap();

    format::write_hierarchy_file(&bundle.graph, &h).unwrap();
    format::write_geometry_file(&bundle.geometry, &g).unwrap();
    write_tiles(&bundle.tiles);

    if !bundle.pois.exists() {
        write_pois(
            &bundle.pois,
            &[
                (1, Some("Palace of Culture"), Some("Warsaw"), 52.2318, 21.0060),
                (2, Some("Golden Gate Bridge"), Some("San Francisco"), 37.8199, -122.4783),
                (3, Some("Eiffel Tower"), Some("Paris"), 48.8584, 2.2945),
                (4, Some("Tokyo Tower"), Some("Tokyo"), 35.6586, 139.7454),
            ],
        );
    }

    bundle
}

// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::path::Path;
use std::sync::Arc;

use cityroute::contract::contract;
use cityroute::graph::format;
use cityroute::network::{Network, NetworkEdge};
use cityroute::route::Maneuver;
use cityroute::{CityBundle, Config, Coordinate, Dispatcher, Navigator, RouteError};

/// A small town: a main street running east with a side street branching north.
///
/// ```text
///           5
///           |
///           4
///           |
/// 0 ─ 1 ─ 2 ─ 3          6 ─ 7 (disconnected)
/// ```
fn town() -> Network {
    let c = |lat: f64, lon: f64| Coordinate::new(37.77 + lat * 0.001, -122.42 + lon * 0.001);
    Network {
        nodes: vec![
            c(0.0, 0.0),
            c(0.0, 1.0),
            c(0.0, 2.0),
            c(0.0, 3.0),
            c(1.0, 2.0),
            c(2.0, 2.0),
            c(0.0, 8.0),
            c(0.0, 9.0),
        ],
        edges: vec![
            NetworkEdge::new(0, 1, 8.0).named("Market Street"),
            NetworkEdge::new(1, 2, 8.0).named("Market Street"),
            NetworkEdge::new(2, 3, 8.0).named("Market Street"),
            NetworkEdge::new(2, 4, 9.0).named("Valencia Street"),
            NetworkEdge::new(4, 5, 9.0).named("Valencia Street"),
            NetworkEdge::new(6, 7, 8.0).named("Island Road"),
        ],
    }
}

/// Pads a network with a far-away ladder of streets, so that graph files
/// are comfortably above the minimum file size.
fn padded(mut network: Network) -> Network {
    let base = network.nodes.len() as u32;
    for i in 0..40 {
        network.nodes.push(Coordinate::new(38.5 + i as f64 * 0.001, -121.0));
        network.nodes.push(Coordinate::new(38.5 + i as f64 * 0.001, -120.999));
        let (a, b) = (base + 2 * i, base + 2 * i + 1);
        network.edges.push(NetworkEdge::new(a, b, 5.0));
        if i > 0 {
            network.edges.push(NetworkEdge::new(a - 2, a, 5.0));
            network.edges.push(NetworkEdge::new(b - 2, b, 5.0));
        }
    }
    network
}

fn write_bundle(dir: &Path, city: &str, network: &Network) {
    let bundle = CityBundle::new(dir, city);
    let (h, g) = contract(network).unwrap();
    format::write_hierarchy_file(&bundle.graph, &h).unwrap();
    format::write_geometry_file(&bundle.geometry, &g).unwrap();

    let tiles = rusqlite::Connection::open(&bundle.tiles).unwrap();
    tiles
        .execute_batch("CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);")
        .unwrap();

    if !bundle.pois.exists() {
        let pois = rusqlite::Connection::open(&bundle.pois).unwrap();
        pois.execute_batch(
            "CREATE TABLE pois (id INTEGER PRIMARY KEY, name TEXT, city TEXT, latitude REAL, longitude REAL);
             INSERT INTO pois VALUES (1, 'Ferry Building', 'San Francisco', 37.7955, -122.3937);
             INSERT INTO pois VALUES (2, 'Coit Tower', 'San Francisco', 37.8024, -122.4058);
             INSERT INTO pois VALUES (3, 'Louvre', 'Paris', 48.8606, 2.3376);",
        )
        .unwrap();
    }
}

fn setup() -> (tempfile::TempDir, Navigator) {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(dir.path(), "San Francisco", &padded(town()));

    let config_path = dir.path().join("cityroute.json");
    std::fs::write(
        &config_path,
        r#"{"cities": ["San Francisco", "Paris"], "coverage_km": 0.5}"#,
    )
    .unwrap();

    let config = Config::from_file(&config_path).unwrap();
    (dir, Navigator::new(config))
}

#[test]
fn full_flow() {
    let (_dir, navigator) = setup();
    let network = town();

    assert!(navigator.readiness("San Francisco").unwrap().is_ready());
    assert!(!navigator.readiness("Paris").unwrap().is_ready());

    navigator.resolve_and_load("san francisco").unwrap();

    // Straight along Market Street
    let route = navigator.query(network.nodes[0], network.nodes[3]).unwrap();
    assert_eq!(route.coordinates.len(), 4);
    assert_eq!(route.duration_s, 24.0);
    assert_eq!(route.instructions.len(), 1);
    assert_eq!(
        route.instructions[0].to_string(),
        "Continue straight on Market Street"
    );

    // Left onto Valencia Street
    let route = navigator.query(network.nodes[0], network.nodes[5]).unwrap();
    assert_eq!(route.duration_s, 34.0);
    let maneuvers: Vec<Maneuver> = route.instructions.iter().map(|i| i.maneuver).collect();
    assert_eq!(maneuvers, vec![Maneuver::Straight, Maneuver::Left]);
    assert_eq!(route.instruction_texts()[1], "Turn left onto Valencia Street");
    assert!(route.has_arrived(network.nodes[5], 5.0));

    // Start equals destination
    let route = navigator.query(network.nodes[2], network.nodes[2]).unwrap();
    assert!(route.coordinates.is_empty() && route.instructions.is_empty());

    // Disconnected island
    assert_eq!(
        navigator.query(network.nodes[0], network.nodes[7]),
        Err(RouteError::NoRoute)
    );

    // Too far from any road
    assert!(matches!(
        navigator.query(network.nodes[0], Coordinate::new(37.9, -122.42)),
        Err(RouteError::OutOfCoverage { .. })
    ));
}

#[test]
fn failed_switch_keeps_city() {
    let (_dir, navigator) = setup();
    navigator.resolve_and_load("San Francisco").unwrap();

    let err = navigator.resolve_and_load("Paris").unwrap_err();
    assert_eq!(err.reason(), "missing_files");
    assert_eq!(navigator.active_city().as_deref(), Some("san_francisco"));

    let err = navigator.resolve_and_load("Atlantis").unwrap_err();
    assert_eq!(err.reason(), "not_supported");
    assert_eq!(navigator.active_city().as_deref(), Some("san_francisco"));
}

#[test]
fn poi_search() {
    let (_dir, navigator) = setup();
    let names = |q: &str| {
        navigator
            .search(q)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect::<Vec<_>>()
    };

    assert_eq!(names("SAN FRAN"), vec!["Ferry Building", "Coit Tower"]);
    assert_eq!(names("tower"), vec!["Coit Tower"]);
    assert!(names("").is_empty());
}

#[tokio::test]
async fn async_dispatch() {
    let (_dir, navigator) = setup();
    let network = town();
    let dispatcher = Dispatcher::new(Arc::new(navigator));

    dispatcher.resolve_and_load("San Francisco").await.unwrap();
    let route = dispatcher
        .route(network.nodes[3], network.nodes[0])
        .await
        .unwrap();
    assert_eq!(route.coordinates.first(), Some(&network.nodes[3]));
    assert_eq!(route.coordinates.last(), Some(&network.nodes[0]));

    let found = dispatcher.search("louvre").await.unwrap();
    assert_eq!(found.len(), 1);
}

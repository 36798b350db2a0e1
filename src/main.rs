use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cityroute::{contract, graph, network, Config, Coordinate, Dispatcher, Navigator};

#[derive(Parser)]
struct Cli {
    /// The path to the JSON config file (defaults are used if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v: info, -vv: debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print readiness of every supported city
    Status,

    /// Find a route and print it as GeoJSON
    Route {
        /// Name of the city
        city: String,

        /// Latitude of the start point
        start_lat: f64,

        /// Longitude of the start point
        start_lon: f64,

        /// Latitude of the end point
        end_lat: f64,

        /// Longitude of the end point
        end_lon: f64,
    },

    /// Search points of interest by name or city
    Search { text: String },

    /// Contract a JSON road network into a city's graph files
    Build {
        /// The path to the JSON network
        network: PathBuf,

        /// Name of the city
        city: String,

        /// Output directory (defaults to the configured data directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    colog::default_builder()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Status => {
            let navigator = Navigator::new(config);
            for (city, readiness) in navigator.catalog().status() {
                println!("{city}: {readiness}");
            }
        }

        Command::Route {
            city,
            start_lat,
            start_lon,
            end_lat,
            end_lon,
        } => {
            let dispatcher = Dispatcher::new(Arc::new(Navigator::new(config)));
            dispatcher.resolve_and_load(&city).await?;

            let route = dispatcher
                .route(
                    Coordinate::new(start_lat, start_lon),
                    Coordinate::new(end_lat, end_lon),
                )
                .await?;

            let coordinates: Vec<[f64; 2]> =
                route.coordinates.iter().map(|c| [c.lon, c.lat]).collect();
            let geojson = serde_json::json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": {
                        "distance_m": route.distance_m,
                        "duration_s": route.duration_s,
                        "instructions": route.instruction_texts(),
                    },
                    "geometry": {
                        "type": "LineString",
                        "coordinates": coordinates,
                    },
                }],
            });
            println!("{}", serde_json::to_string_pretty(&geojson)?);
        }

        Command::Search { text } => {
            let navigator = Navigator::new(config);
            let pois = navigator.search(&text)?;
            println!("{}", serde_json::to_string_pretty(&pois)?);
        }

        Command::Build {
            network,
            city,
            out_dir,
        } => {
            let out_dir = out_dir.unwrap_or(config.data_dir);
            build(&network, &out_dir, &city)?;
        }
    }

    Ok(())
}

fn build(network_path: &Path, out_dir: &Path, city: &str) -> Result<(), Box<dyn Error>> {
    let network = network::Network::from_file(network_path)?;
    let (hierarchy, geometry) = contract::contract(&network)?;

    let bundle = cityroute::CityBundle::new(out_dir, city);
    graph::format::write_hierarchy_file(&bundle.graph, &hierarchy)?;
    graph::format::write_geometry_file(&bundle.geometry, &geometry)?;

    log::info!(
        "wrote {} and {}: {} nodes, {} arcs",
        bundle.graph.display(),
        bundle.geometry.display(),
        hierarchy.nodes.len(),
        hierarchy.arcs.len(),
    );
    Ok(())
}

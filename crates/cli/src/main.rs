//! Terminal front-end for the satellite dashboard pipeline: fetches the tile
//! grid and satellite catalog around an observer, clusters the active
//! intersection points, and prints the upcoming pass timeline.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use satwatch_client::api::VisibilityKey;
use satwatch_client::stores::satellites::SatelliteStore;
use satwatch_client::stores::tiles::TileStore;
use satwatch_client::transport::HttpGateway;
use satwatch_client::view::{self, ClusterView};
use satwatch_client::visibility::VisibilityFeed;
use satwatch_shared::cluster::ClusterPoint;
use satwatch_shared::models::{BBox, ObserverLocation};

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const USAGE: &str = "Usage: satwatch-cli --lat <deg> --lon <deg> \
    [--url <base-url>] [--radius <km>] [--horizon <deg>] [--hours <n>] \
    [--span <deg>] [--zoom <z>] [--satellite <catalog-id>]";

fn get_arg(flag: &str) -> Option<String> {
    std::env::args().skip_while(|a| a != flag).nth(1)
}

fn required_f64(flag: &str) -> f64 {
    let raw = get_arg(flag).unwrap_or_else(|| {
        eprintln!("Error: {flag} <value> is required");
        eprintln!("{USAGE}");
        std::process::exit(1);
    });
    parse_f64(flag, &raw)
}

fn optional_f64(flag: &str, default: f64) -> f64 {
    match get_arg(flag) {
        Some(raw) => parse_f64(flag, &raw),
        None => default,
    }
}

fn parse_f64(flag: &str, raw: &str) -> f64 {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Error: {flag} expects a number, got '{raw}'");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let latitude = required_f64("--lat");
    let longitude = required_f64("--lon");
    let radius = optional_f64("--radius", 2000.0);
    let horizon = optional_f64("--horizon", 10.0);
    let hours = optional_f64("--hours", 24.0) as i64;
    let span = optional_f64("--span", 5.0);
    let zoom = optional_f64("--zoom", 6.0);
    let base_url = get_arg("--url").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let gateway = Arc::new(HttpGateway::new(&base_url));
    let tiles = TileStore::new(Arc::clone(&gateway));
    let satellites = SatelliteStore::new(Arc::clone(&gateway));
    let feed = VisibilityFeed::new(Arc::clone(&gateway));

    let bbox = BBox {
        min_lat: latitude - span,
        min_lon: longitude - span,
        max_lat: latitude + span,
        max_lon: longitude + span,
    };

    // Tile grid around the observer
    let fetched_tiles = tiles.fetch_tiles_for_bbox(bbox).await;
    let polygons = view::tile_polygons(&fetched_tiles);
    println!("Tiles in view: {} ({} drawable)", fetched_tiles.len(), polygons.len());

    let mappings = tiles.fetch_tile_mappings(0, 100, "").await;
    println!("Active tile-satellite mappings: {}", mappings.total_records);

    // Cluster the intersection points the way the map view would
    let points: Arc<Vec<ClusterPoint>> = Arc::new(
        mappings
            .rows
            .iter()
            .map(|m| ClusterPoint {
                id: m.satellite_id.clone(),
                lon: m.intersection.lon,
                lat: m.intersection.lat,
            })
            .collect(),
    );
    let mut cluster_view = ClusterView::default();
    let features = cluster_view.clusters(&points, &bbox, zoom);
    for f in &features {
        println!(
            "  cluster of {} at ({:.3}, {:.3}): {}",
            f.point_count,
            f.lat,
            f.lon,
            f.member_ids.join(", ")
        );
    }

    // Satellite catalog
    let catalog = satellites.fetch_satellites(0, 50, "").await;
    println!("Tracked satellites: {}", catalog.total_records);

    let now = Utc::now();
    let end = now + Duration::hours(hours);

    // Optional ground track for one satellite
    if let Some(satellite_id) = get_arg("--satellite") {
        let track = satellites.fetch_orbit(&satellite_id, now, end).await;
        let segments = view::orbit_track(&track);
        println!(
            "Ground track for {}: {} samples in {} segment(s)",
            satellite_id,
            track.len(),
            segments.len()
        );
    }

    // Visibility pass: trigger, query, render
    let key = VisibilityKey {
        uid: Uuid::new_v4(),
        location: ObserverLocation { latitude, longitude, radius, horizon },
        start_utc: now,
        end_utc: end,
    };
    info!(%key.uid, latitude, longitude, "requesting visibility windows");
    feed.set_key(key).await;

    let visibility = feed.view();
    if let Some(error) = &visibility.error {
        eprintln!("Warning: visibility feed degraded: {error}");
    }
    let rows = view::timeline_rows(&visibility);
    println!("Upcoming passes ({}):", rows.len());
    for row in &rows {
        println!(
            "  {}  {}  (AOS {} .. LOS {}, {} min)",
            row.satellite_id, row.satellite_name, row.aos_label, row.los_label, row.duration_min
        );
    }
}

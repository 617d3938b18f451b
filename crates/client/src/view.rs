//! Thin adapters from store/feed state to render-ready shapes. Everything
//! here is pure except [`ClusterView`], which memoizes its index.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use satwatch_shared::cluster::{ClusterIndex, ClusterOptions, ClusterPoint};
use satwatch_shared::mercator;
use satwatch_shared::models::{BBox, ClusterFeature, Polygon, SatellitePosition, Tile};

use crate::visibility::VisibilityView;

/// Footprint polygons for the fetched tiles, paired with the tile id for
/// hit-testing. Tiles whose geometry cannot be derived are skipped.
pub fn tile_polygons(tiles: &[Tile]) -> Vec<(String, Polygon)> {
    tiles
        .iter()
        .filter_map(|t| {
            match mercator::tile_footprint(t.center_lat, t.center_lon, t.radius_meters) {
                Some(polygon) => Some((t.id.clone(), polygon)),
                None => {
                    debug!(tile_id = %t.id, "skipping tile with degenerate geometry");
                    None
                }
            }
        })
        .collect()
}

/// Latest known ground point per satellite, as cluster input. Positions are
/// assumed sorted by timestamp within each satellite, which the satellite
/// store guarantees.
pub fn latest_ground_points(positions: &[SatellitePosition]) -> Vec<ClusterPoint> {
    let mut latest: Vec<&SatellitePosition> = Vec::new();
    for p in positions {
        match latest.iter_mut().find(|l| l.satellite_id == p.satellite_id) {
            Some(slot) if slot.timestamp_utc <= p.timestamp_utc => *slot = p,
            Some(_) => {}
            None => latest.push(p),
        }
    }
    latest
        .into_iter()
        .map(|p| ClusterPoint { id: p.satellite_id.clone(), lon: p.lon, lat: p.lat })
        .collect()
}

/// Memoizing wrapper around [`ClusterIndex`]: the index is rebuilt only when
/// the point set allocation changes, so pan/zoom queries against an
/// unchanged set reuse the existing hierarchy.
pub struct ClusterView {
    opts: ClusterOptions,
    index: Option<ClusterIndex>,
}

impl ClusterView {
    pub fn new(opts: ClusterOptions) -> Self {
        ClusterView { opts, index: None }
    }

    pub fn clusters(
        &mut self,
        points: &Arc<Vec<ClusterPoint>>,
        bbox: &BBox,
        zoom: f64,
    ) -> Vec<ClusterFeature> {
        let rebuild = match &self.index {
            Some(index) => !index.same_points(points),
            None => true,
        };
        if rebuild {
            debug!(count = points.len(), "rebuilding cluster index");
            self.index = Some(ClusterIndex::build(Arc::clone(points), self.opts));
        }
        self.index
            .as_ref()
            .map(|index| index.clusters(bbox, zoom))
            .unwrap_or_default()
    }
}

impl Default for ClusterView {
    fn default() -> Self {
        ClusterView::new(ClusterOptions::default())
    }
}

/// Ground-track polyline segments in `(lon, lat)`, split wherever the track
/// crosses the antimeridian so no segment draws a spurious line across the
/// whole map.
pub fn orbit_track(positions: &[SatellitePosition]) -> Vec<Vec<(f64, f64)>> {
    let mut segments: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    for p in positions {
        if let Some(&(prev_lon, _)) = current.last() {
            if (p.lon - prev_lon).abs() > 180.0 {
                segments.push(std::mem::take(&mut current));
            }
        }
        current.push((p.lon, p.lat));
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// One rendered timeline entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRow {
    pub satellite_id: String,
    pub satellite_name: String,
    pub aos_utc: DateTime<Utc>,
    pub los_utc: DateTime<Utc>,
    pub aos_label: String,
    pub los_label: String,
    pub duration_min: i64,
}

/// Rows for the pass timeline, in the feed's merged order (ascending AOS).
pub fn timeline_rows(view: &VisibilityView) -> Vec<TimelineRow> {
    view.windows
        .iter()
        .map(|w| TimelineRow {
            satellite_id: w.satellite_id.clone(),
            satellite_name: w.satellite_name.clone(),
            aos_utc: w.aos_utc,
            los_utc: w.los_utc,
            aos_label: w.aos_utc.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            los_label: w.los_utc.format("%H:%M:%S UTC").to_string(),
            duration_min: (w.los_utc - w.aos_utc).num_minutes(),
        })
        .collect()
}

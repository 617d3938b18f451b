//! Viewport clustering for dense point sets.
//!
//! A [`ClusterIndex`] is a static hierarchy built once per point set: the
//! full set is greedily merged at every integer zoom level, from `max_zoom`
//! down to 0, in normalized Web-Mercator world space. Queries then pick the
//! precomputed level for the current zoom and range-scan it by bounding box,
//! so a rebuild costs O(n log n) and a query stays sub-linear.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::mercator::MAX_MERCATOR_LAT;
use crate::models::{BBox, ClusterFeature};

/// World tile extent in screen pixels; neighborhood radii are expressed in
/// pixels at a zoom and divided down to world units.
const TILE_EXTENT_PX: f64 = 512.0;

/// A point eligible for clustering, e.g. a live satellite sub-point.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPoint {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterOptions {
    /// Neighborhood radius in pixels at any zoom.
    pub radius_px: f64,
    /// Deepest zoom level the index precomputes; queries clamp here.
    pub max_zoom: u8,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        ClusterOptions { radius_px: 60.0, max_zoom: 16 }
    }
}

/// One merged entry at a given level, positioned in world space.
#[derive(Debug, Clone)]
struct Entry {
    x: f64,
    y: f64,
    /// Indices into the source point set.
    members: Vec<usize>,
}

/// Static cluster hierarchy over one point set.
pub struct ClusterIndex {
    points: Arc<Vec<ClusterPoint>>,
    opts: ClusterOptions,
    /// `levels[z]` holds the entries for integer zoom `z`, sorted by world x.
    levels: Vec<Vec<Entry>>,
}

impl ClusterIndex {
    /// Build the hierarchy. Points with non-finite coordinates are skipped so
    /// one bad sample never poisons the index.
    pub fn build(points: Arc<Vec<ClusterPoint>>, opts: ClusterOptions) -> Self {
        let mut base: Vec<Entry> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.lon.is_finite() && p.lat.is_finite())
            .map(|(i, p)| {
                let (x, y) = world_xy(p.lon, p.lat);
                Entry { x, y, members: vec![i] }
            })
            .collect();
        base.sort_by(|a, b| a.x.total_cmp(&b.x));

        let max_zoom = opts.max_zoom as usize;
        let mut levels: Vec<Vec<Entry>> = Vec::with_capacity(max_zoom + 1);
        levels.resize_with(max_zoom + 1, Vec::new);

        let mut prev = base;
        for z in (0..=max_zoom).rev() {
            let radius = neighborhood_radius(opts.radius_px, z as u8);
            let level = cluster_level(&prev, radius);
            prev = level.clone();
            levels[z] = level;
        }

        ClusterIndex { points, opts, levels }
    }

    /// Referential memoization hook: true when `other` is the same allocation
    /// this index was built from, meaning a rebuild can be skipped.
    pub fn same_points(&self, other: &Arc<Vec<ClusterPoint>>) -> bool {
        Arc::ptr_eq(&self.points, other)
    }

    pub fn options(&self) -> ClusterOptions {
        self.opts
    }

    /// Cluster features intersecting `bbox` at the given (continuous) zoom.
    /// Empty point set or a bbox outside the data extent yields an empty vec.
    pub fn clusters(&self, bbox: &BBox, zoom: f64) -> Vec<ClusterFeature> {
        if self.points.is_empty() {
            return Vec::new();
        }
        let z = crate::mercator::integer_zoom(zoom, self.opts.max_zoom) as usize;
        let level = &self.levels[z];

        // World y grows southward, so max_lat maps to the smaller y.
        let (min_x, max_y) = world_xy(bbox.min_lon, bbox.min_lat);
        let (max_x, min_y) = world_xy(bbox.max_lon, bbox.max_lat);

        let lo = level.partition_point(|e| e.x < min_x);
        let hi = level.partition_point(|e| e.x <= max_x);
        if hi <= lo {
            return Vec::new();
        }

        level[lo..hi]
            .iter()
            .filter(|e| e.y >= min_y && e.y <= max_y)
            .map(|e| self.to_feature(e))
            .collect()
    }

    fn to_feature(&self, entry: &Entry) -> ClusterFeature {
        let (lon, lat) = world_to_lon_lat(entry.x, entry.y);
        ClusterFeature {
            lon,
            lat,
            point_count: entry.members.len(),
            member_ids: entry
                .members
                .iter()
                .map(|&i| self.points[i].id.clone())
                .collect(),
        }
    }
}

/// Neighborhood radius in world units at an integer zoom.
fn neighborhood_radius(radius_px: f64, zoom: u8) -> f64 {
    radius_px / (TILE_EXTENT_PX * f64::powi(2.0, zoom as i32))
}

/// Greedy radius clustering of one level into the next-coarser one. Entries
/// are sorted by x, so the neighbor scan is bounded by a binary-searched
/// window instead of the whole slice.
fn cluster_level(prev: &[Entry], radius: f64) -> Vec<Entry> {
    let mut used = vec![false; prev.len()];
    let mut out: Vec<Entry> = Vec::new();
    let r2 = radius * radius;

    for i in 0..prev.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let seed = &prev[i];

        let mut weight = seed.members.len() as f64;
        let mut sum_x = seed.x * weight;
        let mut sum_y = seed.y * weight;
        let mut members = seed.members.clone();

        let lo = prev.partition_point(|e| e.x < seed.x - radius);
        let hi = prev.partition_point(|e| e.x <= seed.x + radius);
        for j in lo..hi {
            if used[j] {
                continue;
            }
            let dx = prev[j].x - seed.x;
            let dy = prev[j].y - seed.y;
            if dx * dx + dy * dy <= r2 {
                used[j] = true;
                let w = prev[j].members.len() as f64;
                sum_x += prev[j].x * w;
                sum_y += prev[j].y * w;
                weight += w;
                members.extend_from_slice(&prev[j].members);
            }
        }

        out.push(Entry { x: sum_x / weight, y: sum_y / weight, members });
    }

    out.sort_by(|a, b| a.x.total_cmp(&b.x));
    out
}

/// Project degrees to the normalized [0, 1] Web-Mercator world square.
fn world_xy(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon / 360.0 + 0.5;
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let y = (1.0 - lat.to_radians().tan().asinh() / PI) / 2.0;
    (x, y)
}

fn world_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x - 0.5) * 360.0;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, lon: f64, lat: f64) -> ClusterPoint {
        ClusterPoint { id: id.to_string(), lon, lat }
    }

    fn world_bbox() -> BBox {
        BBox { min_lat: -85.0, min_lon: -180.0, max_lat: 85.0, max_lon: 180.0 }
    }

    #[test]
    fn test_world_xy_roundtrip() {
        let (x, y) = world_xy(6.1319, 49.6117);
        let (lon, lat) = world_to_lon_lat(x, y);
        assert!((lon - 6.1319).abs() < 1e-9);
        assert!((lat - 49.6117).abs() < 1e-9);
    }

    #[test]
    fn test_empty_point_set_yields_no_clusters() {
        let index = ClusterIndex::build(Arc::new(Vec::new()), ClusterOptions::default());
        assert!(index.clusters(&world_bbox(), 3.0).is_empty());
    }

    #[test]
    fn test_single_point_survives_as_count_one_feature() {
        let points = Arc::new(vec![point("25544", 6.0, 49.0)]);
        let index = ClusterIndex::build(points, ClusterOptions::default());
        let features = index.clusters(&world_bbox(), 0.0);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].point_count, 1);
        assert_eq!(features[0].member_ids, vec!["25544".to_string()]);
        assert!((features[0].lon - 6.0).abs() < 1e-6);
        assert!((features[0].lat - 49.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearby_points_merge_at_low_zoom_split_at_high_zoom() {
        let points = Arc::new(vec![point("a", 6.0, 49.0), point("b", 6.1, 49.05)]);
        let index = ClusterIndex::build(points, ClusterOptions::default());

        let low = index.clusters(&world_bbox(), 0.0);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].point_count, 2);
        let mut ids = low[0].member_ids.clone();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        let high = index.clusters(&world_bbox(), 16.0);
        assert_eq!(high.len(), 2);
        assert!(high.iter().all(|f| f.point_count == 1));
    }

    #[test]
    fn test_cluster_centroid_is_between_members() {
        let points = Arc::new(vec![point("a", 0.0, 0.0), point("b", 1.0, 0.0)]);
        let index = ClusterIndex::build(points, ClusterOptions::default());
        let low = index.clusters(&world_bbox(), 0.0);
        assert_eq!(low.len(), 1);
        assert!((low[0].lon - 0.5).abs() < 1e-6);
        assert!(low[0].lat.abs() < 1e-6);
    }

    #[test]
    fn test_clustering_is_idempotent_for_fixed_inputs() {
        let points = Arc::new(vec![
            point("a", 6.0, 49.0),
            point("b", 6.2, 49.1),
            point("c", -70.0, -30.0),
        ]);
        let index = ClusterIndex::build(points, ClusterOptions::default());
        let bbox = world_bbox();
        let first = index.clusters(&bbox, 4.0);
        let second = index.clusters(&bbox, 4.0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_bbox_outside_data_extent_yields_empty() {
        let points = Arc::new(vec![point("a", 6.0, 49.0)]);
        let index = ClusterIndex::build(points, ClusterOptions::default());
        let far = BBox { min_lat: -50.0, min_lon: -120.0, max_lat: -40.0, max_lon: -110.0 };
        assert!(index.clusters(&far, 5.0).is_empty());
    }

    #[test]
    fn test_bbox_filters_on_both_axes() {
        let points = Arc::new(vec![point("a", 6.0, 49.0), point("b", 6.0, -49.0)]);
        let index = ClusterIndex::build(points, ClusterOptions::default());
        let north = BBox { min_lat: 0.0, min_lon: 0.0, max_lat: 60.0, max_lon: 10.0 };
        let features = index.clusters(&north, 10.0);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].member_ids, vec!["a".to_string()]);
    }

    #[test]
    fn test_non_finite_points_are_skipped() {
        let points = Arc::new(vec![point("ok", 6.0, 49.0), point("bad", f64::NAN, 49.0)]);
        let index = ClusterIndex::build(points, ClusterOptions::default());
        let features = index.clusters(&world_bbox(), 0.0);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].member_ids, vec!["ok".to_string()]);
    }

    #[test]
    fn test_same_points_is_referential_not_structural() {
        let points = Arc::new(vec![point("a", 6.0, 49.0)]);
        let index = ClusterIndex::build(Arc::clone(&points), ClusterOptions::default());
        assert!(index.same_points(&points));

        let equal_copy = Arc::new(vec![point("a", 6.0, 49.0)]);
        assert!(!index.same_points(&equal_copy));
    }

    #[test]
    fn test_zoom_clamped_to_max_zoom() {
        let points = Arc::new(vec![point("a", 6.0, 49.0), point("b", 6.1, 49.05)]);
        let opts = ClusterOptions { radius_px: 60.0, max_zoom: 8 };
        let index = ClusterIndex::build(points, opts);
        let at_max = index.clusters(&world_bbox(), 8.0);
        let beyond = index.clusters(&world_bbox(), 20.0);
        assert_eq!(at_max, beyond);
    }
}

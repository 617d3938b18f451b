use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fixed geographic cell used to index satellite-ground intersections.
/// Immutable once fetched; identified by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub id: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_meters: f64,
    pub zoom_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quadkey: Option<String>,
}

/// Ground point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Many-to-many edge between a satellite and a tile. Created and refreshed
/// by the server, read-only on this side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSatelliteMapping {
    pub mapping_id: String,
    pub tile_id: String,
    pub satellite_id: String,
    pub intersection: GroundPoint,
}

/// Catalog entry for a tracked satellite. The identifier is an opaque
/// catalog id (NORAD-style) and is never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatelliteInfo {
    pub satellite_id: String,
    pub name: String,
}

/// One sample of a satellite trajectory. A trajectory is a finite sequence
/// of these, ordered by `timestamp_utc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatellitePosition {
    pub satellite_id: String,
    pub lat: f64,
    pub lon: f64,
    pub altitude_km: f64,
    pub timestamp_utc: DateTime<Utc>,
}

/// One visibility interval for an observer: AOS (acquisition of signal)
/// through LOS (loss of signal). Uniqueness key is
/// `(satellite_id, aos_utc, los_utc)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityWindow {
    pub satellite_id: String,
    pub satellite_name: String,
    pub aos_utc: DateTime<Utc>,
    pub los_utc: DateTime<Utc>,
}

impl VisibilityWindow {
    /// AOS must not be after LOS.
    pub fn is_valid(&self) -> bool {
        self.aos_utc <= self.los_utc
    }

    pub fn dedup_key(&self) -> (&str, DateTime<Utc>, DateTime<Utc>) {
        (&self.satellite_id, self.aos_utc, self.los_utc)
    }
}

/// Observer location plus reception parameters, as consumed by the
/// visibility endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Reception radius in kilometers.
    pub radius: f64,
    /// Minimum elevation above the horizon in degrees.
    pub horizon: f64,
}

/// Geographic bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Closed ring of `(lon, lat)` vertices, first == last. Derived from a tile,
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub ring: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn is_closed(&self) -> bool {
        match (self.ring.first(), self.ring.last()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.ring.len()
    }
}

/// Aggregated representation of nearby points at a given zoom. Recomputed
/// whenever the source point set or the zoom changes, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFeature {
    pub lon: f64,
    pub lat: f64,
    pub point_count: usize,
    pub member_ids: Vec<String>,
}

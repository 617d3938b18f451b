//! Spherical Web-Mercator math and tile footprint generation.
//!
//! Forward transform: `x = R·λ`, `y = R·ln(tan(π/4 + φ/2))` on the WGS 84
//! sphere. Footprints are squares of a given half-extent in planar meters,
//! inverse-projected back to angular coordinates.

use std::f64::consts::{FRAC_PI_4, PI};

use crate::models::Polygon;

/// WGS 84 equatorial radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude limit of the square Web-Mercator world. Input latitudes are
/// clamped here to stay clear of the `tan` singularity at the poles.
pub const MAX_MERCATOR_LAT: f64 = 85.051129;

/// Upper bound on footprint half-extents. Larger radii produce degenerate or
/// self-intersecting rings near the poles, so they are clamped.
pub const MAX_FOOTPRINT_RADIUS_M: f64 = 1_000_000.0;

/// Forward-project `(lon, lat)` degrees to planar meters.
pub fn project(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Inverse-project planar meters back to `(lon, lat)` degrees.
pub fn unproject(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Build the closed footprint ring for a tile: a square of half-extent
/// `radius_meters` centered on `(center_lat, center_lon)`, projected to
/// planar space, offset, and inverse-projected corner by corner. The ring
/// has exactly five vertices (four corners plus the closing repeat).
///
/// Latitudes at or beyond the Mercator limit are clamped rather than
/// rejected; radii above [`MAX_FOOTPRINT_RADIUS_M`] are clamped. Returns
/// `None` for NaN/non-finite input, longitudes outside [-180, 180], or a
/// non-positive radius, so one bad tile never aborts a batch.
///
/// Known limitation: a footprint straddling the antimeridian is emitted with
/// corner longitudes outside [-180, 180] instead of being split in two.
/// Consumers that need wrapped coordinates must normalize or split the ring.
pub fn tile_footprint(center_lat: f64, center_lon: f64, radius_meters: f64) -> Option<Polygon> {
    if !center_lat.is_finite() || !center_lon.is_finite() || !radius_meters.is_finite() {
        return None;
    }
    if !(-180.0..=180.0).contains(&center_lon) {
        return None;
    }
    if radius_meters <= 0.0 {
        return None;
    }

    let half = radius_meters.min(MAX_FOOTPRINT_RADIUS_M);
    let (cx, cy) = project(center_lon, center_lat);

    // Counter-clockwise from the south-west corner.
    let corners = [
        (cx - half, cy - half),
        (cx + half, cy - half),
        (cx + half, cy + half),
        (cx - half, cy + half),
    ];

    let mut ring: Vec<(f64, f64)> = corners.iter().map(|&(x, y)| unproject(x, y)).collect();
    ring.push(ring[0]);
    Some(Polygon { ring })
}

/// Floor a continuous viewport zoom to the integer level used for cluster
/// queries, clamped to `[0, max_zoom]`.
pub fn integer_zoom(zoom: f64, max_zoom: u8) -> u8 {
    if !zoom.is_finite() {
        return 0;
    }
    zoom.floor().clamp(0.0, max_zoom as f64) as u8
}

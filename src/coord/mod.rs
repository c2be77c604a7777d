//! Projection and coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude),
//! Web Mercator world points, and slippy-map tile coordinates, plus the
//! distance and containment primitives used by the hit-test engine.
//!
//! All functions here are pure and never panic: malformed inputs yield
//! infinite distances, `false` containment or zero points.

pub mod geometry;
mod types;


pub use types::{
    LatLng, ParseTileKeyError, PixelPoint, TileBounds, TileKey, TilePoint, WorldPoint,
    MAX_LAT, MAX_LON, MERCATOR_SIN_CLAMP, MIN_LAT, MIN_LON, WORLD_SIZE,
};

use std::f64::consts::PI;

/// Converts a geographic position to Web Mercator world units.
///
/// The world is a single 256-unit square at zoom 0. `sin(lat)` is clamped
/// to `[-0.9999, 0.9999]` so polar inputs stay finite.
///
/// # Arguments
///
/// * `p` - Geographic position in degrees
///
/// # Returns
///
/// The corresponding world point; non-finite inputs map to `(0, 0)`.
#[inline]
pub fn lat_lng_to_world(p: &LatLng) -> WorldPoint {
    if !p.lat.is_finite() || !p.lng.is_finite() {
        return WorldPoint::default();
    }

    let siny = (p.lat * PI / 180.0)
        .sin()
        .clamp(-MERCATOR_SIN_CLAMP, MERCATOR_SIN_CLAMP);

    WorldPoint {
        x: WORLD_SIZE * (0.5 + p.lng / 360.0),
        y: WORLD_SIZE * (0.5 - ((1.0 + siny) / (1.0 - siny)).ln() / (4.0 * PI)),
    }
}

/// Converts a Web Mercator world point back to a geographic position.
///
/// Exact inverse of [`lat_lng_to_world`] for latitudes inside the clamp
/// range.
#[inline]
pub fn world_to_lat_lng(p: &WorldPoint) -> LatLng {
    if !p.x.is_finite() || !p.y.is_finite() {
        return LatLng::default();
    }

    let n = PI - 2.0 * PI * p.y / WORLD_SIZE;

    LatLng {
        lat: 180.0 / PI * (0.5 * (n.exp() - (-n).exp())).atan(),
        lng: (p.x / WORLD_SIZE - 0.5) * 360.0,
    }
}

/// Returns the tile containing a geographic position at the given zoom.
///
/// World coordinates are divided by the tile span `256 / 2^z` and floored
/// on each axis.
#[inline]
pub fn tile_at_lat_lng(p: &LatLng, zoom: u8) -> TileKey {
    let world = lat_lng_to_world(p);
    let span = WORLD_SIZE / (1u64 << zoom) as f64;

    TileKey {
        z: zoom,
        x: (world.x / span).floor().max(0.0) as u32,
        y: (world.y / span).floor().max(0.0) as u32,
    }
}

/// Returns the geographic corners of a tile.
#[inline]
pub fn tile_bounds(key: &TileKey) -> TileBounds {
    let span = WORLD_SIZE / (1u64 << key.z) as f64;
    let nw = world_to_lat_lng(&WorldPoint {
        x: key.x as f64 * span,
        y: key.y as f64 * span,
    });
    let se = world_to_lat_lng(&WorldPoint {
        x: (key.x + 1) as f64 * span,
        y: (key.y + 1) as f64 * span,
    });

    TileBounds {
        ne: LatLng::new(nw.lat, se.lng),
        sw: LatLng::new(se.lat, nw.lng),
    }
}

/// Wraps tile coordinates modulo the grid width `2^z`.
///
/// Accepts signed input so callers can pass coordinates that have run off
/// either edge of the antimeridian.
#[inline]
pub fn normalize_tile(x: i64, y: i64, zoom: u8) -> (u32, u32) {
    let n = 1i64 << zoom;
    (x.rem_euclid(n) as u32, y.rem_euclid(n) as u32)
}

/// Converts an integer tile-frame coordinate back to a geographic position.
///
/// Used by the polygon merger to lift ring fragments out of their tile
/// frames: `pixel = pbf / divisor`, `global = tile + pixel / tile_size`,
/// then the inverse Mercator transform.
#[inline]
pub fn tile_point_to_lat_lng(key: &TileKey, p: &TilePoint, tile_size: f64) -> LatLng {
    let n = (1u64 << key.z) as f64;
    let global_x = key.x as f64 + p.x / tile_size;
    let global_y = key.y as f64 + p.y / tile_size;

    LatLng {
        lat: (PI * (1.0 - 2.0 * global_y / n)).sinh().atan() * 180.0 / PI,
        lng: global_x / n * 360.0 - 180.0,
    }
}

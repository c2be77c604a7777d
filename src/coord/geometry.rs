//! Distance and containment primitives for hit testing.
//!
//! All functions operate on tile-local canvas coordinates and degrade
//! gracefully: degenerate or non-finite inputs produce `false` containment
//! or infinite distance rather than errors.

use super::TilePoint;

/// Even-odd ray cast point-in-polygon test.
///
/// A point exactly on an edge counts as inside. Rings with fewer than
/// three vertices contain nothing.
pub fn point_in_polygon(p: &TilePoint, ring: &[TilePoint]) -> bool {
    if ring.len() < 3 || !p.x.is_finite() || !p.y.is_finite() {
        return false;
    }

    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (a, b) = (&ring[i], &ring[j]);
        if !a.x.is_finite() || !a.y.is_finite() {
            j = i;
            continue;
        }
        // Edge inclusion: zero distance to any segment is a hit.
        if point_to_segment_distance(p, a, b) == 0.0 {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Squared-distance circle containment test.
pub fn in_circle(cx: f64, cy: f64, radius: f64, x: f64, y: f64) -> bool {
    let dx = cx - x;
    let dy = cy - y;
    let d2 = dx * dx + dy * dy;
    d2.is_finite() && d2 <= radius * radius
}

/// Distance from a point to the segment `[a, b]`.
///
/// Projects onto the segment, clamps the parameter to `[0, 1]`, and
/// returns the Euclidean distance to the clamped projection.
pub fn point_to_segment_distance(p: &TilePoint, a: &TilePoint, b: &TilePoint) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;

    let t = if len2 > 0.0 {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let (ex, ey) = (p.x - (a.x + t * dx), p.y - (a.y + t * dy));
    let d = (ex * ex + ey * ey).sqrt();
    if d.is_finite() {
        d
    } else {
        f64::INFINITY
    }
}

/// Minimum distance from a point to any segment of a polyline.
///
/// Polylines with fewer than two points are infinitely far away.
pub fn distance_from_polyline(p: &TilePoint, pts: &[TilePoint]) -> f64 {
    if pts.len() < 2 {
        return f64::INFINITY;
    }
    pts.windows(2)
        .map(|w| point_to_segment_distance(p, &w[0], &w[1]))
        .fold(f64::INFINITY, f64::min)
}

//! Pointer hit testing.
//!
//! Maps a tile-local pointer position to the topmost eligible feature of
//! a layer's draw list. Selected features are examined first so they win
//! even when visually obscured; everything else is scanned in reverse
//! draw order (topmost first). Per-geometry rules: polygons by even-odd
//! containment, points by a radius circle, lines by perpendicular
//! distance against half the stroke width plus a fixed tolerance.

use crate::coord::geometry::{distance_from_polyline, in_circle, point_in_polygon};
use crate::coord::TilePoint;
use crate::feature::{FeatureId, FeatureRegistry};
use crate::mvt::GeomType;
use crate::render::{feature_draw_info, FeatureDrawInfo};
use crate::style::StyleSource;
use crate::tile::TileContext;

/// Extra pixels of grace around line strokes.
const LINE_TOLERANCE: f64 = 2.0;

/// Result of a layer hit test.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub feature_id: FeatureId,
    /// Distance from the pointer; zero for containment hits
    pub distance: f64,
}

/// Distance-based test of one feature against the pointer.
///
/// `Some(distance)` when the feature is hit; containment (polygon,
/// point circle) reports distance zero.
fn test_feature(info: &FeatureDrawInfo, point: &TilePoint) -> Option<f64> {
    match info.geom_type {
        GeomType::Polygon => {
            // Even-odd across rings: holes exclude, islands include.
            let inside = info
                .geometry
                .raw_points
                .iter()
                .fold(false, |acc, ring| acc ^ point_in_polygon(point, ring));
            inside.then_some(0.0)
        }
        GeomType::Point => {
            let radius = info.style.radius_or_default() as f64;
            let hit = info
                .geometry
                .raw_points
                .iter()
                .flat_map(|part| part.iter())
                .any(|p| in_circle(p.x, p.y, radius, point.x, point.y));
            hit.then_some(0.0)
        }
        GeomType::LineString => {
            let threshold = info.style.line_width_or_default() as f64 / 2.0 + LINE_TOLERANCE;
            let distance = info
                .geometry
                .raw_points
                .iter()
                .map(|part| distance_from_polyline(point, part))
                .fold(f64::INFINITY, f64::min);
            (distance < threshold).then_some(distance)
        }
        GeomType::Unknown => None,
    }
}

/// Hit-test a tile's draw list.
///
/// First pass walks selected features in draw order; any hit there wins.
/// Second pass walks the whole list in reverse, keeping the strictly
/// closest hit. A zero-distance hit short-circuits either scan.
pub fn hit_test(
    draw_list: &[FeatureId],
    registry: &FeatureRegistry,
    style_source: &StyleSource,
    ctx: &TileContext,
    point: &TilePoint,
) -> Option<Hit> {
    let mut best: Option<Hit> = None;

    let mut consider = |id: &FeatureId, best: &mut Option<Hit>| -> bool {
        let Some(info) = feature_draw_info(registry, id, ctx, style_source) else {
            return false;
        };
        if let Some(distance) = test_feature(&info, point) {
            let closer = best.as_ref().map(|b| distance < b.distance).unwrap_or(true);
            if closer {
                *best = Some(Hit {
                    feature_id: id.clone(),
                    distance,
                });
            }
            return distance == 0.0;
        }
        false
    };

    // Selected features first: priority even when obscured.
    for id in draw_list.iter().filter(|id| registry.is_selected(id)) {
        if consider(id, &mut best) {
            return best;
        }
    }
    if best.is_some() {
        return best;
    }

    // Everything, topmost (last drawn) first.
    for id in draw_list.iter().rev() {
        if consider(id, &mut best) {
            return best;
        }
    }
    best
}

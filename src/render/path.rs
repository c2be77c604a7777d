//! Canvas-space geometry construction.
//!
//! Transforms a feature's integer tile-frame geometry into the canvas
//! frame of the tile being drawn. For overzoomed tiles the decoded
//! geometry lives in an ancestor's frame: points scale by `2^delta` and
//! shift by the child's offset within the ancestor, which routinely
//! produces off-canvas coordinates (valid off-tile strokes).

use std::sync::Arc;

use tiny_skia::PathBuilder;

use crate::coord::TilePoint;
use crate::feature::{geometry_hash, CachedGeometry};
use crate::mvt::{GeomType, VectorTileFeature};

/// Transform parameters from a decoded frame to a tile canvas frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameTransform {
    /// `extent / tile_size` of the decoded layer
    pub divisor: f64,
    /// Zoom levels between the drawn tile and the decoded ancestor
    pub zoom_delta: u8,
    /// Child offset within the ancestor, in tile units
    pub offset: (u32, u32),
    /// Canvas edge length in pixels
    pub tile_size: f64,
}

impl FrameTransform {
    /// Identity transform for a tile drawn from its own decoded data.
    pub fn direct(divisor: f64, tile_size: f64) -> Self {
        Self {
            divisor,
            zoom_delta: 0,
            offset: (0, 0),
            tile_size,
        }
    }

    /// Map one integer vertex into the canvas frame.
    #[inline]
    pub fn apply(&self, x: i32, y: i32) -> TilePoint {
        let scale = (1u64 << self.zoom_delta) as f64;
        TilePoint {
            x: (x as f64 / self.divisor) * scale - self.offset.0 as f64 * self.tile_size,
            y: (y as f64 / self.divisor) * scale - self.offset.1 as f64 * self.tile_size,
        }
    }
}

/// Build the canvas-space geometry for one feature in one tile.
///
/// Produces both the drawable path aggregate (one sub-path per ring or
/// line part; absent for point features, whose radius is style-dependent)
/// and the raw point arrays the hit-test engine consumes. `NaN` vertices
/// are skipped; parts left with no valid vertex contribute nothing.
pub fn build_geometry(feature: &VectorTileFeature, transform: &FrameTransform) -> CachedGeometry {
    let parts = feature.load_geometry();

    let mut raw: Vec<Vec<TilePoint>> = Vec::with_capacity(parts.len());
    for part in parts {
        let points: Vec<TilePoint> = part
            .iter()
            .map(|p| transform.apply(p.x, p.y))
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .collect();
        if !points.is_empty() {
            raw.push(points);
        }
    }

    let path = match feature.geom_type {
        GeomType::Point | GeomType::Unknown => None,
        GeomType::LineString | GeomType::Polygon => {
            let close = feature.geom_type == GeomType::Polygon;
            let mut builder = PathBuilder::new();
            for points in &raw {
                if points.len() < 2 {
                    continue;
                }
                builder.move_to(points[0].x as f32, points[0].y as f32);
                for p in &points[1..] {
                    builder.line_to(p.x as f32, p.y as f32);
                }
                if close {
                    builder.close();
                }
            }
            builder.finish()
        }
    };

    let vertex_count = raw.iter().map(Vec::len).sum();
    CachedGeometry {
        path,
        geometry_hash: geometry_hash(parts),
        raw_points: Arc::new(raw),
        vertex_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::testutil::{command, square_commands, zigzag};
    use serde_json::Map;

    fn line_feature(points: &[(i32, i32)]) -> VectorTileFeature {
        let mut commands = vec![command(1, 1), zigzag(points[0].0), zigzag(points[0].1)];
        commands.push(command(2, (points.len() - 1) as u32));
        for w in points.windows(2) {
            commands.push(zigzag(w[1].0 - w[0].0));
            commands.push(zigzag(w[1].1 - w[0].1));
        }
        VectorTileFeature::from_parts(None, GeomType::LineString, 4096, Map::new(), commands)
    }

    #[test]
    fn direct_transform_divides_by_divisor() {
        let t = FrameTransform::direct(16.0, 256.0);
        let p = t.apply(64, 128);
        assert_eq!((p.x, p.y), (4.0, 8.0));
    }

    #[test]
    fn overzoom_transform_scales_and_offsets() {
        // Child (12, 5, 3) drawn from ancestor at zoom 10: delta 2,
        // offset (5 mod 4, 3 mod 4) = (1, 3).
        let t = FrameTransform {
            divisor: 16.0,
            zoom_delta: 2,
            offset: (1, 3),
            tile_size: 256.0,
        };
        let p = t.apply(64, 128);
        assert_eq!(p.x, (64.0 / 16.0) * 4.0 - 256.0);
        assert_eq!(p.y, (128.0 / 16.0) * 4.0 - 768.0);
        assert_eq!((p.x, p.y), (-240.0, -736.0));
    }

    #[test]
    fn line_geometry_builds_path_and_raw_points() {
        let feature = line_feature(&[(0, 0), (160, 0), (160, 160)]);
        let geometry = build_geometry(&feature, &FrameTransform::direct(16.0, 256.0));

        assert!(geometry.path.is_some());
        assert_eq!(geometry.raw_points.len(), 1);
        assert_eq!(geometry.raw_points[0].len(), 3);
        assert_eq!(geometry.raw_points[0][1], TilePoint::new(10.0, 0.0));
        assert_eq!(geometry.vertex_count, 3);
    }

    #[test]
    fn polygon_geometry_closes_subpaths() {
        let feature = VectorTileFeature::from_parts(
            None,
            GeomType::Polygon,
            4096,
            Map::new(),
            square_commands(0, 0, 160),
        );
        let geometry = build_geometry(&feature, &FrameTransform::direct(16.0, 256.0));
        assert!(geometry.path.is_some());
        // Ring closed by the decoder: first equals last.
        let ring = &geometry.raw_points[0];
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn point_geometry_has_no_path() {
        let feature = VectorTileFeature::from_parts(
            None,
            GeomType::Point,
            4096,
            Map::new(),
            vec![command(1, 1), zigzag(160), zigzag(320)],
        );
        let geometry = build_geometry(&feature, &FrameTransform::direct(16.0, 256.0));
        assert!(geometry.path.is_none());
        assert_eq!(geometry.raw_points[0][0], TilePoint::new(10.0, 20.0));
    }

    #[test]
    fn empty_geometry_builds_empty_cache() {
        let feature =
            VectorTileFeature::from_parts(None, GeomType::Polygon, 4096, Map::new(), vec![]);
        let geometry = build_geometry(&feature, &FrameTransform::direct(16.0, 256.0));
        assert!(geometry.path.is_none());
        assert!(geometry.raw_points.is_empty());
        assert_eq!(geometry.vertex_count, 0);
    }

    #[test]
    fn off_canvas_coordinates_are_kept() {
        let t = FrameTransform {
            divisor: 16.0,
            zoom_delta: 2,
            offset: (3, 3),
            tile_size: 256.0,
        };
        let feature = line_feature(&[(0, 0), (160, 0)]);
        let geometry = build_geometry(&feature, &t);
        // Negative coordinates are valid off-tile strokes.
        assert!(geometry.path.is_some());
        assert!(geometry.raw_points[0][0].x < 0.0);
    }
}

//! Multi-tile polygon reassembly.
//!
//! When a selected feature needs a high-detail overlay and the
//! application supplies none, its ring fragments from every loaded tile
//! are lifted back to geographic coordinates and merged: rings that share
//! a vertex (or geometrically intersect) are grouped with union-find and
//! dissolved with a polygon union; disjoint groups stay separate. The
//! result is a single `Polygon` or a `MultiPolygon`.

mod union_find;

pub use union_find::UnionFind;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use geo::{Area, BooleanOps, Intersects};
use geo_types::{LineString, MultiPolygon, Polygon};

use crate::coord::{tile_point_to_lat_lng, TileKey, TilePoint};
use crate::log::Logger;
use crate::log_warn;
use crate::mvt::GeomPoint;

/// Ring fragments contributed by one tile, in that tile's integer frame.
#[derive(Debug, Clone)]
pub struct TileRings {
    /// Frame the coordinates live in (the fetched tile for overzoom)
    pub key: TileKey,
    /// `extent / tile_size` of the decoded layer
    pub divisor: f64,
    /// Polygon rings in integer tile coordinates
    pub rings: Vec<Vec<GeomPoint>>,
}

/// A ring lifted to geographic coordinates, `(lng, lat)` pairs.
type GeoRing = Vec<(f64, f64)>;

/// Merge a feature's rings from every tile into one geometry.
///
/// Returns `None` only when no usable ring exists. Union failures degrade
/// per group; a total failure falls back to emitting all rings as a
/// single polygon sorted by descending absolute area.
pub fn merge_feature_rings(
    tiles: &[TileRings],
    tile_size: f64,
    logger: &Arc<dyn Logger>,
) -> Option<geojson::Geometry> {
    let rings = collect_geographic_rings(tiles, tile_size);
    if rings.is_empty() {
        return None;
    }

    match merge_rings(&rings, logger) {
        Some(geometry) => Some(geometry),
        None => {
            log_warn!(
                logger,
                "polygon merge failed for {} rings, falling back to area-sorted polygon",
                rings.len()
            );
            Some(area_sorted_fallback(rings))
        }
    }
}

/// Lift every ring to geographic coordinates and close open rings.
fn collect_geographic_rings(tiles: &[TileRings], tile_size: f64) -> Vec<GeoRing> {
    let mut out = Vec::new();
    for tile in tiles {
        for ring in &tile.rings {
            if ring.len() < 3 {
                continue;
            }
            let mut geo_ring: GeoRing = ring
                .iter()
                .map(|p| {
                    let pixel = TilePoint::new(p.x as f64 / tile.divisor, p.y as f64 / tile.divisor);
                    let ll = tile_point_to_lat_lng(&tile.key, &pixel, tile_size);
                    (ll.lng, ll.lat)
                })
                .collect();
            if geo_ring.first() != geo_ring.last() {
                geo_ring.push(geo_ring[0]);
            }
            out.push(geo_ring);
        }
    }
    out
}

fn ring_to_polygon(ring: &GeoRing) -> Polygon<f64> {
    Polygon::new(LineString::from(ring.clone()), vec![])
}

/// Group rings by adjacency and union each group.
fn merge_rings(rings: &[GeoRing], logger: &Arc<dyn Logger>) -> Option<geojson::Geometry> {
    let polygons: Vec<Polygon<f64>> = rings.iter().map(ring_to_polygon).collect();

    // Exact shared-vertex adjacency: two rings touch when any vertex is
    // bit-identical. Bit patterns stand in for the coordinate strings the
    // wire format would compare.
    let vertex_sets: Vec<std::collections::HashSet<(u64, u64)>> = rings
        .iter()
        .map(|ring| {
            ring.iter()
                .map(|&(lng, lat)| (lng.to_bits(), lat.to_bits()))
                .collect()
        })
        .collect();

    let mut groups = UnionFind::new(rings.len());
    for i in 0..rings.len() {
        for j in (i + 1)..rings.len() {
            let shares_vertex = vertex_sets[i].intersection(&vertex_sets[j]).next().is_some();
            if shares_vertex || polygons[i].intersects(&polygons[j]) {
                groups.union(i, j);
            }
        }
    }

    // Dissolve each group into one multipolygon.
    let mut merged: Vec<MultiPolygon<f64>> = Vec::new();
    for group in groups.groups() {
        if group.len() == 1 {
            merged.push(MultiPolygon(vec![polygons[group[0]].clone()]));
            continue;
        }

        let mut result = MultiPolygon(vec![polygons[group[0]].clone()]);
        for &index in &group[1..] {
            let next = MultiPolygon(vec![polygons[index].clone()]);
            let unioned = catch_unwind(AssertUnwindSafe(|| result.union(&next)));
            match unioned {
                Ok(u) if !u.0.is_empty() => result = u,
                _ => {
                    log_warn!(
                        logger,
                        "polygon union failed for ring {}, keeping prior result",
                        index
                    );
                }
            }
        }
        merged.push(result);
    }

    if merged.is_empty() {
        return None;
    }

    // One disjoint group with one polygon stays a Polygon; anything more
    // becomes a MultiPolygon.
    let all: Vec<Polygon<f64>> = merged.into_iter().flat_map(|mp| mp.0).collect();
    match all.len() {
        0 => None,
        1 => Some(geojson::Geometry::new(polygon_value(&all[0]))),
        _ => {
            let polys: Vec<Vec<Vec<Vec<f64>>>> = all.iter().map(polygon_positions).collect();
            Some(geojson::Geometry::new(geojson::Value::MultiPolygon(polys)))
        }
    }
}

/// Emit every ring as one polygon, largest first, no hole inference.
fn area_sorted_fallback(mut rings: Vec<GeoRing>) -> geojson::Geometry {
    rings.sort_by(|a, b| {
        let area_a = ring_to_polygon(a).unsigned_area();
        let area_b = ring_to_polygon(b).unsigned_area();
        area_b
            .partial_cmp(&area_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let positions: Vec<Vec<Vec<f64>>> = rings
        .iter()
        .map(|ring| ring.iter().map(|&(lng, lat)| vec![lng, lat]).collect())
        .collect();
    geojson::Geometry::new(geojson::Value::Polygon(positions))
}

fn line_positions(line: &LineString<f64>) -> Vec<Vec<f64>> {
    line.coords().map(|c| vec![c.x, c.y]).collect()
}

fn polygon_positions(polygon: &Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    let mut rings = vec![line_positions(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(line_positions));
    rings
}

fn polygon_value(polygon: &Polygon<f64>) -> geojson::Value {
    geojson::Value::Polygon(polygon_positions(polygon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NoOpLogger;

    fn logger() -> Arc<dyn Logger> {
        Arc::new(NoOpLogger)
    }

    /// A square ring in integer tile coordinates.
    fn square(x0: i32, y0: i32, size: i32) -> Vec<GeomPoint> {
        vec![
            GeomPoint::new(x0, y0),
            GeomPoint::new(x0 + size, y0),
            GeomPoint::new(x0 + size, y0 + size),
            GeomPoint::new(x0, y0 + size),
            GeomPoint::new(x0, y0),
        ]
    }

    fn tile(key: TileKey, rings: Vec<Vec<GeomPoint>>) -> TileRings {
        TileRings {
            key,
            divisor: 16.0,
            rings,
        }
    }

    fn geometry_kind(geometry: &geojson::Geometry) -> &'static str {
        match geometry.value {
            geojson::Value::Polygon(_) => "Polygon",
            geojson::Value::MultiPolygon(_) => "MultiPolygon",
            _ => "other",
        }
    }

    #[test]
    fn single_ring_emits_polygon() {
        let tiles = [tile(TileKey::new(9, 260, 170), vec![square(100, 100, 800)])];
        let geometry = merge_feature_rings(&tiles, 256.0, &logger()).unwrap();
        assert_eq!(geometry_kind(&geometry), "Polygon");
    }

    #[test]
    fn no_usable_rings_yields_none() {
        let tiles = [tile(
            TileKey::new(9, 260, 170),
            vec![vec![GeomPoint::new(0, 0), GeomPoint::new(1, 1)]],
        )];
        assert!(merge_feature_rings(&tiles, 256.0, &logger()).is_none());
    }

    #[test]
    fn adjacent_rings_in_one_tile_merge_to_one_polygon() {
        // Two squares sharing the vertex column x=900.
        let tiles = [tile(
            TileKey::new(9, 260, 170),
            vec![square(100, 100, 800), square(900, 100, 800)],
        )];
        let geometry = merge_feature_rings(&tiles, 256.0, &logger()).unwrap();
        // They share edge vertices, union dissolves them.
        assert_eq!(geometry_kind(&geometry), "Polygon");
    }

    #[test]
    fn shared_vertex_across_tiles_groups_rings() {
        // Tile A's east edge vertex (4096, y) equals tile B's west edge
        // vertex (0, y) once both are lifted to geographic coordinates.
        let a = TileKey::new(9, 260, 170);
        let b = TileKey::new(9, 261, 170);
        let tiles = [
            tile(a, vec![square(2048, 1024, 2048)]),
            tile(b, vec![square(0, 1024, 2048)]),
        ];
        let geometry = merge_feature_rings(&tiles, 256.0, &logger()).unwrap();
        assert_eq!(geometry_kind(&geometry), "Polygon");
    }

    #[test]
    fn disjoint_groups_emit_multipolygon() {
        // Two joined squares plus one far-away singleton.
        let key = TileKey::new(9, 260, 170);
        let tiles = [tile(
            key,
            vec![
                square(100, 100, 800),
                square(900, 100, 800),
                square(3000, 3000, 500),
            ],
        )];
        let geometry = merge_feature_rings(&tiles, 256.0, &logger()).unwrap();
        match &geometry.value {
            geojson::Value::MultiPolygon(polys) => assert_eq!(polys.len(), 2),
            other => panic!("expected MultiPolygon, got {:?}", other),
        }
    }

    #[test]
    fn merged_output_is_closed() {
        let tiles = [tile(TileKey::new(9, 260, 170), vec![square(100, 100, 800)])];
        let geometry = merge_feature_rings(&tiles, 256.0, &logger()).unwrap();
        if let geojson::Value::Polygon(rings) = &geometry.value {
            assert_eq!(rings[0].first(), rings[0].last());
        } else {
            panic!("expected polygon");
        }
    }

    #[test]
    fn area_fallback_sorts_largest_first() {
        let rings: Vec<GeoRing> = vec![
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)],
            vec![(0.0, 0.0), (5.0, 0.0), (5.0, 5.0), (0.0, 5.0), (0.0, 0.0)],
        ];
        let geometry = area_sorted_fallback(rings);
        if let geojson::Value::Polygon(out) = geometry.value {
            assert_eq!(out.len(), 2);
            // Largest ring first.
            assert_eq!(out[0][1], vec![5.0, 0.0]);
        } else {
            panic!("expected polygon");
        }
    }

    #[test]
    fn empty_input_is_none() {
        assert!(merge_feature_rings(&[], 256.0, &logger()).is_none());
    }
}

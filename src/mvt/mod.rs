//! Decoded Mapbox Vector Tile object model.
//!
//! Protobuf decoding is delegated to `geozero`'s generated MVT types; this
//! module lifts the raw prost structs into the object model the engine
//! consumes: named layers, features with a property bag, and a lazy
//! integer-coordinate geometry loader.

mod geometry;
mod value;

pub use geometry::GeomPoint;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use geozero::mvt::{tile, Message, Tile};
use serde_json::Map;

use crate::coord::{tile_point_to_lat_lng, TileKey, TilePoint};

/// Default MVT extent when a layer omits one.
const DEFAULT_EXTENT: u32 = 4096;

/// Errors produced while lifting tile bytes into the object model.
#[derive(Debug, Clone)]
pub enum MvtError {
    /// The protobuf payload could not be decoded.
    Decode(String),
}

impl fmt::Display for MvtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MvtError::Decode(msg) => write!(f, "vector tile decode failed: {}", msg),
        }
    }
}

impl std::error::Error for MvtError {}

/// Geometry type of a vector tile feature.
///
/// Wire values follow the MVT specification: Point=1, LineString=2,
/// Polygon=3. Unknown values decode but draw nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeomType {
    Point,
    LineString,
    Polygon,
    Unknown,
}

impl GeomType {
    fn from_wire(value: i32) -> Self {
        match value {
            1 => GeomType::Point,
            2 => GeomType::LineString,
            3 => GeomType::Polygon,
            _ => GeomType::Unknown,
        }
    }
}

/// A decoded vector tile: a map of named layers.
#[derive(Debug, Default)]
pub struct VectorTile {
    layers: HashMap<String, VectorLayer>,
}

impl VectorTile {
    /// Decode a tile from protobuf bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MvtError::Decode`] when the payload is not a valid MVT
    /// protobuf. Per-feature anomalies never fail the tile.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MvtError> {
        let raw = Tile::decode(bytes).map_err(|e| MvtError::Decode(e.to_string()))?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: Tile) -> Self {
        let mut layers = HashMap::with_capacity(raw.layers.len());
        for layer in raw.layers {
            let parsed = VectorLayer::from_raw(layer);
            layers.insert(parsed.name.clone(), parsed);
        }
        Self { layers }
    }

    /// The tile's layers, keyed by layer name.
    pub fn layers(&self) -> &HashMap<String, VectorLayer> {
        &self.layers
    }

    /// Look up a single layer by name.
    pub fn layer(&self, name: &str) -> Option<&VectorLayer> {
        self.layers.get(name)
    }
}

/// A single named layer within a decoded tile.
#[derive(Debug)]
pub struct VectorLayer {
    /// Layer name as written by the tiler
    pub name: String,
    /// MVT format version
    pub version: u32,
    /// Integer coordinate range of the layer's local frame
    pub extent: u32,
    features: Vec<Arc<VectorTileFeature>>,
}

impl VectorLayer {
    fn from_raw(raw: tile::Layer) -> Self {
        let extent = raw.extent.unwrap_or(DEFAULT_EXTENT).max(1);
        let features = raw
            .features
            .iter()
            .map(|f| Arc::new(VectorTileFeature::from_raw(f, &raw.keys, &raw.values, extent)))
            .collect();
        Self {
            name: raw.name,
            version: raw.version,
            extent,
            features,
        }
    }

    /// Number of features in the layer.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Access a feature by index.
    pub fn feature(&self, index: usize) -> Option<&Arc<VectorTileFeature>> {
        self.features.get(index)
    }

    /// Iterate the layer's features in encoding order.
    pub fn features(&self) -> impl Iterator<Item = &Arc<VectorTileFeature>> {
        self.features.iter()
    }
}

/// A single feature within a layer.
///
/// Geometry stays in the MVT command-stream form until first use;
/// [`load_geometry`](Self::load_geometry) interprets it once and caches the
/// integer rings.
#[derive(Debug)]
pub struct VectorTileFeature {
    /// Wire-level feature id, when the tiler wrote one
    pub id: Option<u64>,
    /// Geometry type
    pub geom_type: GeomType,
    /// Integer coordinate range of the parent layer's frame
    pub extent: u32,
    /// Decoded key/value property bag
    pub properties: Map<String, serde_json::Value>,
    commands: Vec<u32>,
    decoded: OnceLock<Vec<Vec<GeomPoint>>>,
}

impl VectorTileFeature {
    fn from_raw(raw: &tile::Feature, keys: &[String], values: &[tile::Value], extent: u32) -> Self {
        Self {
            id: raw.id,
            geom_type: GeomType::from_wire(raw.r#type.unwrap_or(0)),
            extent,
            properties: value::decode_tags(&raw.tags, keys, values),
            commands: raw.geometry.clone(),
            decoded: OnceLock::new(),
        }
    }

    /// Build a feature directly from its parts.
    ///
    /// Intended for tests and for hosts that synthesize features outside
    /// the protobuf path.
    pub fn from_parts(
        id: Option<u64>,
        geom_type: GeomType,
        extent: u32,
        properties: Map<String, serde_json::Value>,
        commands: Vec<u32>,
    ) -> Self {
        Self {
            id,
            geom_type,
            extent: extent.max(1),
            properties,
            commands,
            decoded: OnceLock::new(),
        }
    }

    /// Interpret the geometry command stream into integer rings/parts.
    ///
    /// The result is computed once and cached. Empty or malformed command
    /// streams yield an empty slice, never an error.
    pub fn load_geometry(&self) -> &[Vec<GeomPoint>] {
        self.decoded
            .get_or_init(|| geometry::decode_commands(&self.commands, self.geom_type))
    }

    /// Axis-aligned bounds over every decoded vertex, `(min_x, min_y,
    /// max_x, max_y)` in tile-frame integers. `None` for empty geometry.
    pub fn bbox(&self) -> Option<(i32, i32, i32, i32)> {
        let mut bounds: Option<(i32, i32, i32, i32)> = None;
        for part in self.load_geometry() {
            for p in part {
                bounds = Some(match bounds {
                    None => (p.x, p.y, p.x, p.y),
                    Some((x0, y0, x1, y1)) => {
                        (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y))
                    }
                });
            }
        }
        bounds
    }

    /// Convert to a GeoJSON geometry in geographic coordinates.
    ///
    /// Rings keep their encoding order; no outer/inner classification is
    /// attempted. Returns `None` for empty or unknown geometry.
    pub fn to_geojson(&self, key: &TileKey, tile_size: f64) -> Option<geojson::Geometry> {
        let divisor = self.extent as f64 / tile_size;
        let parts = self.load_geometry();
        if parts.is_empty() {
            return None;
        }

        let to_position = |p: &GeomPoint| -> Vec<f64> {
            let tile_point = TilePoint::new(p.x as f64 / divisor, p.y as f64 / divisor);
            let ll = tile_point_to_lat_lng(key, &tile_point, tile_size);
            vec![ll.lng, ll.lat]
        };

        let value = match self.geom_type {
            GeomType::Point => {
                let first = parts.iter().flat_map(|p| p.iter()).next()?;
                geojson::Value::Point(to_position(first))
            }
            GeomType::LineString => {
                let lines: Vec<Vec<Vec<f64>>> = parts
                    .iter()
                    .filter(|part| part.len() >= 2)
                    .map(|part| part.iter().map(to_position).collect())
                    .collect();
                match lines.len() {
                    0 => return None,
                    1 => geojson::Value::LineString(lines.into_iter().next().unwrap()),
                    _ => geojson::Value::MultiLineString(lines),
                }
            }
            GeomType::Polygon => {
                let rings: Vec<Vec<Vec<f64>>> = parts
                    .iter()
                    .filter(|part| part.len() >= 3)
                    .map(|part| {
                        let mut ring: Vec<Vec<f64>> = part.iter().map(to_position).collect();
                        if ring.first() != ring.last() {
                            ring.push(ring[0].clone());
                        }
                        ring
                    })
                    .collect();
                if rings.is_empty() {
                    return None;
                }
                geojson::Value::Polygon(rings)
            }
            GeomType::Unknown => return None,
        };

        Some(geojson::Geometry::new(value))
    }

    /// Total vertex count across all parts.
    pub fn vertex_count(&self) -> usize {
        self.load_geometry().iter().map(Vec::len).sum()
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use geozero::mvt::tile;

    fn polygon_feature(id: Option<u64>) -> tile::Feature {
        tile::Feature {
            id,
            tags: vec![0, 0],
            r#type: Some(3),
            geometry: square_commands(10, 10, 100),
        }
    }

    fn encode(t: Tile) -> Vec<u8> {
        t.encode_to_vec()
    }

    #[test]
    fn decodes_layers_and_features() {
        let tile = tile_with_layer(
            "water",
            4096,
            vec![polygon_feature(Some(7))],
            vec!["name".to_string()],
            vec![string_value("lake")],
        );
        let decoded = VectorTile::from_bytes(&encode(tile)).unwrap();

        let layer = decoded.layer("water").expect("layer present");
        assert_eq!(layer.extent, 4096);
        assert_eq!(layer.len(), 1);

        let feature = layer.feature(0).unwrap();
        assert_eq!(feature.id, Some(7));
        assert_eq!(feature.geom_type, GeomType::Polygon);
        assert_eq!(
            feature.properties.get("name").and_then(|v| v.as_str()),
            Some("lake")
        );
    }

    #[test]
    fn malformed_bytes_are_a_decode_error() {
        let result = VectorTile::from_bytes(&[0xff, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(MvtError::Decode(_))));
    }

    #[test]
    fn load_geometry_closes_polygon_ring() {
        let feature = VectorTileFeature::from_parts(
            None,
            GeomType::Polygon,
            4096,
            Map::new(),
            square_commands(0, 0, 50),
        );
        let parts = feature.load_geometry();
        assert_eq!(parts.len(), 1);
        let ring = &parts[0];
        assert_eq!(ring.first(), ring.last());
        assert_eq!(ring.len(), 5);
    }

    #[test]
    fn empty_commands_yield_empty_geometry() {
        let feature =
            VectorTileFeature::from_parts(None, GeomType::LineString, 4096, Map::new(), vec![]);
        assert!(feature.load_geometry().is_empty());
        assert_eq!(feature.bbox(), None);
        assert_eq!(feature.vertex_count(), 0);
    }

    #[test]
    fn bbox_covers_all_vertices() {
        let feature = VectorTileFeature::from_parts(
            None,
            GeomType::Polygon,
            4096,
            Map::new(),
            square_commands(10, 20, 100),
        );
        assert_eq!(feature.bbox(), Some((10, 20, 110, 120)));
    }

    #[test]
    fn to_geojson_emits_closed_polygon() {
        let feature = VectorTileFeature::from_parts(
            None,
            GeomType::Polygon,
            4096,
            Map::new(),
            square_commands(0, 0, 4096),
        );
        let geometry = feature
            .to_geojson(&TileKey::new(1, 0, 0), 256.0)
            .expect("geometry");
        match geometry.value {
            geojson::Value::Polygon(rings) => {
                assert_eq!(rings.len(), 1);
                assert_eq!(rings[0].first(), rings[0].last());
                // Tile (1,0,0) spans the northwest world quadrant.
                let lng_range: Vec<f64> = rings[0].iter().map(|p| p[0]).collect();
                assert!(lng_range.iter().all(|l| (-180.01..=0.01).contains(l)));
            }
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn unknown_geometry_type_draws_nothing() {
        let feature = VectorTileFeature::from_parts(
            None,
            GeomType::Unknown,
            4096,
            Map::new(),
            square_commands(0, 0, 10),
        );
        assert!(feature.to_geojson(&TileKey::new(0, 0, 0), 256.0).is_none());
    }
}

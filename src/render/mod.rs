//! Layer rendering.
//!
//! A freshly decoded tile is parsed layer by layer: each feature passes
//! the layer filter, gets a stable identity, and is reconciled into the
//! registry. Drawing happens in three z-ordered passes per tile so that
//! hovered features paint over regular ones and selected features paint
//! over everything.

mod debug;
mod path;

pub use debug::draw_annotation;
pub use path::{build_geometry, FrameTransform};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Shader, Stroke, Transform};

use crate::color::ColorParser;
use crate::coord::TileKey;
use crate::feature::{CachedGeometry, Feature, FeatureId, FeatureRegistry, TileFragment};
use crate::feature::geometry_hash;
use crate::mvt::{GeomType, VectorLayer, VectorTileFeature};
use crate::style::{self, DrawStyle, StyleSource};
use crate::tile::TileContext;

/// Fill used for polygons whose style sets none.
const DEFAULT_POLYGON_FILL: &str = "rgba(100, 100, 100, 0.5)";

/// Stroke used for lines whose style sets none.
const DEFAULT_STROKE: &str = "rgb(60, 60, 60)";

/// Per-feature filter; `false` rejects the feature for this layer.
pub type FeatureFilter = Arc<dyn Fn(&VectorTileFeature) -> bool + Send + Sync>;

/// Configured identity extractor: `(layer_name, feature) -> id`.
///
/// Returning `None` falls through to the built-in fallbacks.
pub type IdExtractor = Arc<dyn Fn(&str, &VectorTileFeature) -> Option<String> + Send + Sync>;

/// Application-supplied draw override: `(canvas, geometry, style)`.
pub type CustomDraw = Arc<dyn Fn(&mut Pixmap, &CachedGeometry, &DrawStyle) + Send + Sync>;

/// A named layer's per-tile draw lists.
///
/// Features themselves live in the registry; the layer tracks which
/// feature ids each tile draws, in parse order.
#[derive(Debug, Default)]
pub struct Layer {
    /// Layer name as it appears in decoded tiles
    pub name: String,
    tiles: HashMap<TileKey, Vec<FeatureId>>,
}

impl Layer {
    /// Create an empty layer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tiles: HashMap::new(),
        }
    }

    /// Replace the draw list for a tile.
    pub fn set_tile_features(&mut self, key: TileKey, ids: Vec<FeatureId>) {
        self.tiles.insert(key, ids);
    }

    /// The draw list for a tile, in parse order.
    pub fn tile_features(&self, key: &TileKey) -> &[FeatureId] {
        self.tiles.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop a tile's draw list.
    pub fn remove_tile(&mut self, key: &TileKey) {
        self.tiles.remove(key);
    }

    /// Every feature id the layer references, across tiles.
    pub fn all_feature_ids(&self) -> Vec<FeatureId> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for ids in self.tiles.values() {
            for id in ids {
                if seen.insert(id.clone()) {
                    out.push(id.clone());
                }
            }
        }
        out
    }
}

/// Feature identity resolution with the configured and built-in fallbacks.
#[derive(Default)]
pub struct IdResolver {
    /// Configured extractor, tried first
    pub extractor: Option<IdExtractor>,
    /// Property consulted after the wire id
    pub default_property: Option<String>,
    generated: AtomicU64,
}

impl IdResolver {
    /// Create a resolver with the given configuration.
    pub fn new(extractor: Option<IdExtractor>, default_property: Option<String>) -> Self {
        Self {
            extractor,
            default_property,
            generated: AtomicU64::new(0),
        }
    }

    /// Resolve the stable identity for a feature.
    ///
    /// Order: configured extractor, wire-level `feature.id`, configured
    /// default property, the common `id`/`Id`/`ID` property names, then a
    /// generated per-source id.
    pub fn resolve(&self, layer_name: &str, feature: &VectorTileFeature) -> FeatureId {
        if let Some(extractor) = &self.extractor {
            if let Some(id) = extractor(layer_name, feature) {
                return id;
            }
        }
        if let Some(id) = feature.id {
            return id.to_string();
        }
        if let Some(prop) = &self.default_property {
            if let Some(id) = feature.properties.get(prop).and_then(json_id) {
                return id;
            }
        }
        for name in ["id", "Id", "ID"] {
            if let Some(id) = feature.properties.get(name).and_then(json_id) {
                return id;
            }
        }
        let n = self.generated.fetch_add(1, Ordering::Relaxed);
        format!("{}#{}", layer_name, n)
    }
}

fn json_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse one decoded layer of a tile into the registry.
///
/// Returns the tile's draw list in iteration order. Filter rejections and
/// features the filter cannot judge are skipped; nothing here fails the
/// tile.
pub fn parse_layer(
    vlayer: &VectorLayer,
    ctx: &TileContext,
    registry: &FeatureRegistry,
    style_source: &StyleSource,
    filter: Option<&FeatureFilter>,
    resolver: &IdResolver,
) -> Vec<FeatureId> {
    let divisor = vlayer.extent as f64 / ctx.tile_size as f64;
    let mut draw_list: Vec<FeatureId> = Vec::new();

    for source in vlayer.features() {
        if let Some(filter) = filter {
            if !filter(source) {
                continue;
            }
        }

        let id = resolver.resolve(&vlayer.name, source);
        let fragment = TileFragment::new(
            Arc::clone(source),
            divisor,
            geometry_hash(source.load_geometry()),
        );
        let base_style = style::resolve(style_source, source, false, false);

        if registry.contains(&id) {
            let selected = registry.is_selected(&id);
            let hovered = registry.is_hovered(&id);
            registry.with_feature_mut(&id, |feature| {
                feature.properties = source.properties.clone();
                feature.style = base_style;
                feature.upsert_fragment(ctx.key, fragment);
                feature.selected = selected;
                feature.hovered = hovered;
            });
        } else {
            let mut feature = Feature::new(id.clone(), source.geom_type, source.properties.clone());
            feature.style = base_style;
            feature.upsert_fragment(ctx.key, fragment);
            registry.register(feature);
        }

        if !draw_list.contains(&id) {
            draw_list.push(id);
        }
    }

    draw_list
}

/// Everything needed to draw or hit-test one feature in one tile.
pub struct FeatureDrawInfo {
    pub geometry: CachedGeometry,
    pub style: DrawStyle,
    pub geom_type: GeomType,
    pub selected: bool,
    pub hovered: bool,
}

/// Fetch (building and caching if needed) a feature's canvas geometry for
/// a tile, along with its currently resolved style.
pub fn feature_draw_info(
    registry: &FeatureRegistry,
    id: &FeatureId,
    ctx: &TileContext,
    style_source: &StyleSource,
) -> Option<FeatureDrawInfo> {
    registry.with_feature_mut(id, |feature| {
        let fragment = feature.fragment(&ctx.key)?.clone();
        let selected = feature.selected;
        let hovered = feature.hovered;
        let geom_type = feature.geom_type;

        let geometry = match feature.cached_geometry(&ctx.key) {
            Some(cached) => cached,
            None => {
                let transform = FrameTransform {
                    divisor: fragment.divisor,
                    zoom_delta: ctx.zoom_delta,
                    offset: ctx.key.offset_in_ancestor(ctx.zoom_delta),
                    tile_size: ctx.tile_size as f64,
                };
                let built = build_geometry(&fragment.source, &transform);
                feature.store_cached_geometry(&ctx.key, built.clone());
                built
            }
        };

        let style = style::resolve(style_source, &fragment.source, selected, hovered);
        Some(FeatureDrawInfo {
            geometry,
            style,
            geom_type,
            selected,
            hovered,
        })
    })?
}

/// Draw one tile's layer in three z-ordered passes.
///
/// Pass order: regular features, then hovered, then selected; within a
/// pass, the draw list's iteration order.
pub fn draw_layer_tile(
    ctx: &TileContext,
    draw_list: &[FeatureId],
    registry: &FeatureRegistry,
    style_source: &StyleSource,
    color: &ColorParser,
    custom_draw: Option<&CustomDraw>,
) {
    #[derive(Clone, Copy, PartialEq)]
    enum Pass {
        Regular,
        Hovered,
        Selected,
    }

    let infos: Vec<FeatureDrawInfo> = draw_list
        .iter()
        .filter_map(|id| feature_draw_info(registry, id, ctx, style_source))
        .collect();

    for pass in [Pass::Regular, Pass::Hovered, Pass::Selected] {
        for info in &infos {
            let wanted = if info.selected {
                Pass::Selected
            } else if info.hovered {
                Pass::Hovered
            } else {
                Pass::Regular
            };
            if wanted != pass {
                continue;
            }

            ctx.with_canvas(|canvas| match custom_draw {
                Some(custom) => custom(canvas, &info.geometry, &info.style),
                None => paint_feature(canvas, info, color),
            });
        }
    }
}

fn solid_paint(color: tiny_skia::Color) -> Paint<'static> {
    Paint {
        shader: Shader::SolidColor(color),
        anti_alias: true,
        ..Default::default()
    }
}

fn paint_feature(canvas: &mut Pixmap, info: &FeatureDrawInfo, color: &ColorParser) {
    let style = &info.style;
    let fill_opacity = style.fill_opacity.unwrap_or(1.0);

    match info.geom_type {
        GeomType::Polygon => {
            if let Some(path) = &info.geometry.path {
                let fill = style.fill.as_deref().unwrap_or(DEFAULT_POLYGON_FILL);
                if let Some(rgba) = color.parse(fill) {
                    canvas.fill_path(
                        path,
                        &solid_paint(rgba.to_skia(fill_opacity)),
                        FillRule::EvenOdd,
                        Transform::identity(),
                        None,
                    );
                }
                if let Some(rgba) = style.stroke.as_deref().and_then(|s| color.parse(s)) {
                    canvas.stroke_path(
                        path,
                        &solid_paint(rgba.to_skia(1.0)),
                        &Stroke {
                            width: style.line_width_or_default(),
                            ..Default::default()
                        },
                        Transform::identity(),
                        None,
                    );
                }
            }
        }
        GeomType::LineString => {
            if let Some(path) = &info.geometry.path {
                let stroke = style.stroke.as_deref().unwrap_or(DEFAULT_STROKE);
                if let Some(rgba) = color.parse(stroke) {
                    canvas.stroke_path(
                        path,
                        &solid_paint(rgba.to_skia(1.0)),
                        &Stroke {
                            width: style.line_width_or_default(),
                            ..Default::default()
                        },
                        Transform::identity(),
                        None,
                    );
                }
            }
        }
        GeomType::Point => {
            let fill = style.fill.as_deref().unwrap_or(DEFAULT_POLYGON_FILL);
            let Some(rgba) = color.parse(fill) else {
                return;
            };
            let radius = style.radius_or_default();
            let mut builder = PathBuilder::new();
            for part in info.geometry.raw_points.iter() {
                for p in part {
                    builder.push_circle(p.x as f32, p.y as f32, radius);
                }
            }
            if let Some(path) = builder.finish() {
                canvas.fill_path(
                    &path,
                    &solid_paint(rgba.to_skia(fill_opacity)),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
            }
        }
        GeomType::Unknown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::testutil::{command, square_commands, zigzag};
    use serde_json::{json, Map};

    fn polygon_source(id: Option<u64>, props: Map<String, serde_json::Value>) -> Arc<VectorTileFeature> {
        Arc::new(VectorTileFeature::from_parts(
            id,
            GeomType::Polygon,
            4096,
            props,
            square_commands(0, 0, 2048),
        ))
    }

    #[test]
    fn id_resolver_prefers_configured_extractor() {
        let resolver = IdResolver::new(
            Some(Arc::new(|layer: &str, _f: &VectorTileFeature| {
                Some(format!("{}::custom", layer))
            })),
            None,
        );
        let feature = polygon_source(Some(9), Map::new());
        assert_eq!(resolver.resolve("roads", &feature), "roads::custom");
    }

    #[test]
    fn id_resolver_falls_back_to_wire_id() {
        let resolver = IdResolver::default();
        let feature = polygon_source(Some(9), Map::new());
        assert_eq!(resolver.resolve("roads", &feature), "9");
    }

    #[test]
    fn id_resolver_uses_default_property() {
        let mut props = Map::new();
        props.insert("osm_id".to_string(), json!(1234));
        let resolver = IdResolver::new(None, Some("osm_id".to_string()));
        let feature = polygon_source(None, props);
        assert_eq!(resolver.resolve("roads", &feature), "1234");
    }

    #[test]
    fn id_resolver_tries_common_property_names() {
        for name in ["id", "Id", "ID"] {
            let mut props = Map::new();
            props.insert(name.to_string(), json!("abc"));
            let resolver = IdResolver::default();
            let feature = polygon_source(None, props);
            assert_eq!(resolver.resolve("roads", &feature), "abc");
        }
    }

    #[test]
    fn id_resolver_generates_unique_fallbacks() {
        let resolver = IdResolver::default();
        let a = resolver.resolve("roads", &polygon_source(None, Map::new()));
        let b = resolver.resolve("roads", &polygon_source(None, Map::new()));
        assert_ne!(a, b);
        assert!(a.starts_with("roads#"));
    }

    #[test]
    fn extractor_returning_none_falls_through() {
        let resolver = IdResolver::new(
            Some(Arc::new(|_: &str, _: &VectorTileFeature| None)),
            None,
        );
        let feature = polygon_source(Some(3), Map::new());
        assert_eq!(resolver.resolve("roads", &feature), "3");
    }

    use crate::mvt::VectorTile;
    use geozero::mvt::{tile, Message};

    fn decoded_layer(features: Vec<tile::Feature>) -> VectorTile {
        let raw = crate::mvt::testutil::tile_with_layer("roads", 4096, features, vec![], vec![]);
        VectorTile::from_bytes(&raw.encode_to_vec()).unwrap()
    }

    fn wire_polygon(id: u64) -> tile::Feature {
        tile::Feature {
            id: Some(id),
            tags: vec![],
            r#type: Some(3),
            geometry: square_commands(256, 256, 2048),
        }
    }

    fn wire_line(id: u64) -> tile::Feature {
        tile::Feature {
            id: Some(id),
            tags: vec![],
            r#type: Some(2),
            geometry: vec![
                command(1, 1),
                zigzag(0),
                zigzag(0),
                command(2, 1),
                zigzag(4095),
                zigzag(4095),
            ],
        }
    }

    fn context() -> Arc<TileContext> {
        TileContext::new(crate::coord::TileKey::new(5, 1, 1), 5, None, 256).unwrap()
    }

    #[test]
    fn parse_layer_registers_features() {
        let decoded = decoded_layer(vec![wire_polygon(1), wire_line(2)]);
        let registry = FeatureRegistry::new();
        let ctx = context();

        let draw_list = parse_layer(
            decoded.layer("roads").unwrap(),
            &ctx,
            &registry,
            &StyleSource::default(),
            None,
            &IdResolver::default(),
        );

        assert_eq!(draw_list, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(registry.len(), 2);
        let divisor = registry
            .with_feature(&"1".to_string(), |f| f.fragment(&ctx.key).unwrap().divisor)
            .unwrap();
        assert_eq!(divisor, 4096.0 / 256.0);
    }

    #[test]
    fn parse_layer_applies_filter() {
        let decoded = decoded_layer(vec![wire_polygon(1), wire_line(2)]);
        let registry = FeatureRegistry::new();
        let filter: FeatureFilter =
            Arc::new(|f: &VectorTileFeature| f.geom_type == GeomType::Polygon);

        let draw_list = parse_layer(
            decoded.layer("roads").unwrap(),
            &context(),
            &registry,
            &StyleSource::default(),
            Some(&filter),
            &IdResolver::default(),
        );

        assert_eq!(draw_list, vec!["1".to_string()]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn parse_layer_merges_fragments_across_tiles() {
        let decoded = decoded_layer(vec![wire_polygon(1)]);
        let registry = FeatureRegistry::new();
        let ctx_a = TileContext::new(crate::coord::TileKey::new(5, 1, 1), 5, None, 256).unwrap();
        let ctx_b = TileContext::new(crate::coord::TileKey::new(5, 2, 1), 5, None, 256).unwrap();

        for ctx in [&ctx_a, &ctx_b] {
            parse_layer(
                decoded.layer("roads").unwrap(),
                ctx,
                &registry,
                &StyleSource::default(),
                None,
                &IdResolver::default(),
            );
        }

        let tiles = registry
            .with_feature(&"1".to_string(), |f| f.tile_count())
            .unwrap();
        assert_eq!(tiles, 2);
    }

    #[test]
    fn parse_layer_inherits_selection_for_new_features() {
        let decoded = decoded_layer(vec![wire_polygon(1)]);
        let registry = FeatureRegistry::new();
        registry.mark_selected(&"1".to_string(), true);

        parse_layer(
            decoded.layer("roads").unwrap(),
            &context(),
            &registry,
            &StyleSource::default(),
            None,
            &IdResolver::default(),
        );

        assert!(registry
            .with_feature(&"1".to_string(), |f| f.selected)
            .unwrap());
    }

    #[test]
    fn draw_layer_tile_paints_pixels() {
        let decoded = decoded_layer(vec![wire_polygon(1)]);
        let registry = FeatureRegistry::new();
        let ctx = context();
        let style = StyleSource::Static(DrawStyle {
            fill: Some("#ff0000".to_string()),
            ..Default::default()
        });

        let draw_list = parse_layer(
            decoded.layer("roads").unwrap(),
            &ctx,
            &registry,
            &style,
            None,
            &IdResolver::default(),
        );

        draw_layer_tile(&ctx, &draw_list, &registry, &style, &ColorParser::new(), None);
        assert!(ctx.canvas_data().iter().any(|&b| b != 0));
    }

    #[test]
    fn draw_is_deterministic_for_identical_state() {
        let decoded = decoded_layer(vec![wire_polygon(1), wire_line(2)]);
        let registry = FeatureRegistry::new();
        let ctx = context();
        let style = StyleSource::default();
        let color = ColorParser::new();

        let draw_list = parse_layer(
            decoded.layer("roads").unwrap(),
            &ctx,
            &registry,
            &style,
            None,
            &IdResolver::default(),
        );

        draw_layer_tile(&ctx, &draw_list, &registry, &style, &color, None);
        let first = ctx.canvas_data();
        ctx.clear_canvas();
        draw_layer_tile(&ctx, &draw_list, &registry, &style, &color, None);
        assert_eq!(first, ctx.canvas_data());
    }

    #[test]
    fn custom_draw_overrides_builtin_painting() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let decoded = decoded_layer(vec![wire_polygon(1)]);
        let registry = FeatureRegistry::new();
        let ctx = context();
        let style = StyleSource::default();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_draw = Arc::clone(&calls);
        let custom: CustomDraw = Arc::new(move |_c, _g, _s| {
            calls_in_draw.fetch_add(1, Ordering::SeqCst);
        });

        let draw_list = parse_layer(
            decoded.layer("roads").unwrap(),
            &ctx,
            &registry,
            &style,
            None,
            &IdResolver::default(),
        );
        draw_layer_tile(
            &ctx,
            &draw_list,
            &registry,
            &style,
            &ColorParser::new(),
            Some(&custom),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ctx.canvas_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_geometry_feature_registers_but_draws_nothing() {
        let empty = tile::Feature {
            id: Some(5),
            tags: vec![],
            r#type: Some(2),
            geometry: vec![],
        };
        let decoded = decoded_layer(vec![empty]);
        let registry = FeatureRegistry::new();
        let ctx = context();
        let style = StyleSource::default();

        let draw_list = parse_layer(
            decoded.layer("roads").unwrap(),
            &ctx,
            &registry,
            &style,
            None,
            &IdResolver::default(),
        );
        assert_eq!(draw_list, vec!["5".to_string()]);
        assert!(registry.contains(&"5".to_string()));

        draw_layer_tile(&ctx, &draw_list, &registry, &style, &ColorParser::new(), None);
        assert!(ctx.canvas_data().iter().all(|&b| b == 0));
    }
}

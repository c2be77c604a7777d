//! Source configuration.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Map;

use crate::coord::{LatLng, PixelPoint, TileKey, TilePoint};
use crate::feature::FeatureId;
use crate::manifest::ManifestSource;
use crate::render::{CustomDraw, FeatureFilter, IdExtractor};
use crate::style::StyleSource;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Async provider of high-detail replacement geometry for a feature.
///
/// `None` (including on provider failure) falls back to the local polygon
/// merger.
pub type ReplacementProvider = Arc<
    dyn Fn(FeatureId) -> Pin<Box<dyn Future<Output = Option<geojson::Geometry>> + Send>>
        + Send
        + Sync,
>;

/// Selection transition callback: `(feature_id, properties, selected)`.
pub type SelectionCallback =
    Arc<dyn Fn(&FeatureId, &Map<String, serde_json::Value>, bool) + Send + Sync>;

/// Pointer interaction callback.
pub type InteractionCallback = Arc<dyn Fn(&InteractionEvent) + Send + Sync>;

/// Payload delivered to click and hover callbacks.
#[derive(Debug, Clone)]
pub struct InteractionEvent {
    /// The hit feature, if any
    pub feature_id: Option<FeatureId>,
    /// Geographic position of the pointer
    pub lat_lng: LatLng,
    /// Viewport pixel position; `(0, 0)` when the host projection is gone
    pub pixel: PixelPoint,
    /// Tile under the pointer at the current zoom
    pub tile_key: Option<TileKey>,
    /// Pointer position in that tile's canvas frame
    pub tile_point: Option<TilePoint>,
    /// Whether this interaction changed the selection set
    pub selection_changed: bool,
    /// Selection state of the hit feature after the interaction
    pub is_selected: bool,
}

/// Everything a source can be configured with.
///
/// `new` applies the defaults of the public contract; the rest is plain
/// field assignment or the builder-style `with_*` helpers sprinkled where
/// closures make struct literals awkward.
#[derive(Clone)]
pub struct SourceConfig {
    /// Tile URL template with `{z}/{x}/{y}` placeholders
    pub url: String,
    /// Zoom cap of the tile pyramid; requests above it overzoom
    pub source_max_zoom: Option<u8>,
    /// Draw per-tile debug annotation
    pub debug: bool,
    /// Configured feature-identity extractor
    pub get_id_for_layer_feature: Option<IdExtractor>,
    /// Property consulted for identity after the wire id
    pub default_feature_id: Option<String>,
    /// Layers to parse and draw; `None` draws all
    pub visible_layers: Option<Vec<String>>,
    /// Extra request headers for tile fetches
    pub xhr_headers: HashMap<String, String>,
    /// Layers examined by the hit test; `None` examines all
    pub clickable_layers: Option<Vec<String>>,
    /// Per-feature layer filter
    pub filter: Option<FeatureFilter>,
    /// Keep layers and features across zoom changes
    pub cache: bool,
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Base style
    pub style: StyleSource,
    /// Ids selected at construction
    pub selected_features: Vec<FeatureId>,
    /// Draw override replacing the built-in painter
    pub custom_draw: Option<CustomDraw>,
    /// High-detail replacement provider
    pub get_replacement_feature: Option<ReplacementProvider>,
    /// Selection transition callback
    pub feature_selection_callback: Option<SelectionCallback>,
    /// Availability manifest source
    pub tile_availability_manifest: Option<ManifestSource>,
    /// Click callback
    pub on_click: Option<InteractionCallback>,
    /// Hover callback
    pub on_mouse_hover: Option<InteractionCallback>,
    /// Allow more than one selected feature
    pub multiple_selection: bool,
    /// Clicking a selected feature deselects it
    pub toggle_selection: bool,
    /// Clicks update the selection set
    pub set_selected_on_click: bool,
    /// Stop the click scan at the first layer that yields a hit
    pub limit_to_first_visible_layer: bool,
    /// Debounce applied to pointer-move hover processing
    pub hover_delay: Duration,
}

impl SourceConfig {
    /// A configuration with the contract's defaults.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_max_zoom: None,
            debug: false,
            get_id_for_layer_feature: None,
            default_feature_id: None,
            visible_layers: None,
            xhr_headers: HashMap::new(),
            clickable_layers: None,
            filter: None,
            cache: false,
            tile_size: DEFAULT_TILE_SIZE,
            style: StyleSource::default(),
            selected_features: Vec::new(),
            custom_draw: None,
            get_replacement_feature: None,
            feature_selection_callback: None,
            tile_availability_manifest: None,
            on_click: None,
            on_mouse_hover: None,
            multiple_selection: false,
            toggle_selection: false,
            set_selected_on_click: true,
            limit_to_first_visible_layer: false,
            hover_delay: Duration::ZERO,
        }
    }

    /// Set the base style.
    pub fn with_style(mut self, style: StyleSource) -> Self {
        self.style = style;
        self
    }

    /// Cap the tile pyramid zoom.
    pub fn with_source_max_zoom(mut self, zoom: u8) -> Self {
        self.source_max_zoom = Some(zoom);
        self
    }

    /// Install a replacement provider.
    pub fn with_replacement(mut self, provider: ReplacementProvider) -> Self {
        self.get_replacement_feature = Some(provider);
        self
    }

    /// Install a selection callback.
    pub fn with_selection_callback(mut self, callback: SelectionCallback) -> Self {
        self.feature_selection_callback = Some(callback);
        self
    }

    /// Install a click callback.
    pub fn with_on_click(mut self, callback: InteractionCallback) -> Self {
        self.on_click = Some(callback);
        self
    }

    /// Install a hover callback.
    pub fn with_on_hover(mut self, callback: InteractionCallback) -> Self {
        self.on_mouse_hover = Some(callback);
        self
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("url", &self.url)
            .field("source_max_zoom", &self.source_max_zoom)
            .field("debug", &self.debug)
            .field("visible_layers", &self.visible_layers)
            .field("clickable_layers", &self.clickable_layers)
            .field("cache", &self.cache)
            .field("tile_size", &self.tile_size)
            .field("multiple_selection", &self.multiple_selection)
            .field("toggle_selection", &self.toggle_selection)
            .field("set_selected_on_click", &self.set_selected_on_click)
            .field("hover_delay", &self.hover_delay)
            .finish_non_exhaustive()
    }
}

//! Style resolution.
//!
//! A layer's configured style is either a static value or a function of
//! the decoded feature. The resolver composes the base style with the
//! feature's interaction state: a `selected` override block (or
//! per-geometry defaults) when selected, a `hover` block (or an opacity
//! nudge) when hovered.

use std::fmt;
use std::sync::Arc;

use crate::mvt::{GeomType, VectorTileFeature};

/// Accent color used by the default selected styles.
const ACCENT: &str = "#3388ff";

/// Translucent accent fill for selected polygons.
const ACCENT_FILL: &str = "rgba(51, 136, 255, 0.4)";

/// Fill-opacity increment applied to hovered features with no hover block.
const HOVER_OPACITY_NUDGE: f32 = 0.15;

/// Default point radius in pixels.
pub const DEFAULT_POINT_RADIUS: f32 = 3.0;

/// A concrete draw style for one feature.
///
/// Unset fields fall back to renderer defaults at draw time. The nested
/// `selected` and `hover` blocks are override templates, not draw state;
/// the resolver strips them from its output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawStyle {
    /// Fill color string
    pub fill: Option<String>,
    /// Stroke color string
    pub stroke: Option<String>,
    /// Stroke width in pixels
    pub line_width: Option<f32>,
    /// Fill opacity multiplier in `[0, 1]`
    pub fill_opacity: Option<f32>,
    /// Point radius in pixels
    pub radius: Option<f32>,
    /// Override block applied while the feature is selected
    pub selected: Option<Box<DrawStyle>>,
    /// Override block applied while the feature is hovered
    pub hover: Option<Box<DrawStyle>>,
}

impl DrawStyle {
    /// A style with every field unset.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge `over` on top of `self`: set fields of `over` win.
    ///
    /// Nested override blocks of `over` are ignored; composition happens
    /// on flattened styles only.
    fn merged_with(&self, over: &DrawStyle) -> DrawStyle {
        DrawStyle {
            fill: over.fill.clone().or_else(|| self.fill.clone()),
            stroke: over.stroke.clone().or_else(|| self.stroke.clone()),
            line_width: over.line_width.or(self.line_width),
            fill_opacity: over.fill_opacity.or(self.fill_opacity),
            radius: over.radius.or(self.radius),
            selected: None,
            hover: None,
        }
    }

    /// Copy of `self` with the nested override blocks removed.
    fn flattened(&self) -> DrawStyle {
        DrawStyle {
            fill: self.fill.clone(),
            stroke: self.stroke.clone(),
            line_width: self.line_width,
            fill_opacity: self.fill_opacity,
            radius: self.radius,
            selected: None,
            hover: None,
        }
    }

    /// Effective stroke width, defaulting to 1.
    pub fn line_width_or_default(&self) -> f32 {
        self.line_width.unwrap_or(1.0)
    }

    /// Effective point radius, defaulting to [`DEFAULT_POINT_RADIUS`].
    pub fn radius_or_default(&self) -> f32 {
        self.radius.unwrap_or(DEFAULT_POINT_RADIUS)
    }
}

/// Style configuration: a static style or a function of the feature.
#[derive(Clone)]
pub enum StyleSource {
    /// One style for every feature of the layer
    Static(DrawStyle),
    /// Style computed per feature
    Dynamic(Arc<dyn Fn(&VectorTileFeature) -> DrawStyle + Send + Sync>),
}

impl StyleSource {
    /// Evaluate the base style for a feature.
    pub fn base_for(&self, feature: &VectorTileFeature) -> DrawStyle {
        match self {
            StyleSource::Static(style) => style.clone(),
            StyleSource::Dynamic(f) => f(feature),
        }
    }
}

impl Default for StyleSource {
    fn default() -> Self {
        StyleSource::Static(DrawStyle::default())
    }
}

impl fmt::Debug for StyleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleSource::Static(s) => f.debug_tuple("Static").field(s).finish(),
            StyleSource::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Default selected style for a geometry type.
///
/// Used when the base style carries no `selected` block; fills in only
/// what the base left unset.
fn default_selected(geom_type: GeomType, base: &DrawStyle) -> DrawStyle {
    match geom_type {
        GeomType::Point => DrawStyle {
            fill: Some(ACCENT.to_string()),
            fill_opacity: Some(1.0),
            radius: Some(base.radius_or_default() + 2.0),
            ..Default::default()
        },
        GeomType::LineString => DrawStyle {
            stroke: Some(ACCENT.to_string()),
            line_width: Some(base.line_width_or_default() * 2.0),
            ..Default::default()
        },
        GeomType::Polygon => DrawStyle {
            fill: Some(ACCENT_FILL.to_string()),
            stroke: Some(ACCENT.to_string()),
            line_width: Some(base.line_width_or_default().max(3.0)),
            ..Default::default()
        },
        GeomType::Unknown => DrawStyle::default(),
    }
}

/// Compose the effective draw style for a feature.
///
/// Resolution order: evaluate the base (static or dynamic), strip its
/// nested blocks, then layer the selected override (configured block, or
/// geometry-type defaults filling unset fields only) or the hover
/// override (configured block, or a fill-opacity nudge).
pub fn resolve(
    source: &StyleSource,
    feature: &VectorTileFeature,
    selected: bool,
    hovered: bool,
) -> DrawStyle {
    let raw = source.base_for(feature);
    let base = raw.flattened();

    if selected {
        return match &raw.selected {
            Some(block) => base.merged_with(block),
            None => {
                let defaults = default_selected(feature.geom_type, &base);
                // Defaults fill gaps; explicit base fields win.
                defaults.merged_with(&base)
            }
        };
    }

    if hovered {
        return match &raw.hover {
            Some(block) => base.merged_with(block),
            None => {
                let nudged = (base.fill_opacity.unwrap_or(1.0) + HOVER_OPACITY_NUDGE).min(1.0);
                DrawStyle {
                    fill_opacity: Some(nudged),
                    ..base
                }
            }
        };
    }

    base
}

//! Feature identity and interaction state.
//!
//! A [`Feature`] is the engine's cross-tile view of one logical map
//! feature: the fragments it contributes to each tile, its property bag,
//! and its interaction flags. The [`FeatureRegistry`] keys features by
//! their stable id and is the single source of truth for the selected and
//! hovered identity sets.

mod cache;
mod registry;

pub use cache::{geometry_hash, CachedGeometry, TileFragment, CACHE_MIN_VERTICES, FRAGMENT_CACHE_CAP};
pub use registry::FeatureRegistry;

use std::collections::HashMap;

use serde_json::Map;

use crate::coord::TileKey;
use crate::mvt::GeomType;
use crate::style::DrawStyle;

/// Stable cross-tile feature identity.
///
/// Numeric wire ids are stringified at the extraction boundary so one key
/// type covers every id source.
pub type FeatureId = String;

/// The engine's record for one logical feature.
#[derive(Debug)]
pub struct Feature {
    /// Stable identity shared by every tile fragment
    pub id: FeatureId,
    /// Geometry type, fixed on first encounter
    pub geom_type: GeomType,
    /// Property bag from the most recent fragment
    pub properties: Map<String, serde_json::Value>,
    /// Effective base style from the most recent reconciliation
    pub style: DrawStyle,
    /// Mirror of registry selection membership
    pub selected: bool,
    /// Mirror of registry hover membership
    pub hovered: bool,
    tiles: HashMap<TileKey, TileFragment>,
    lru_tick: u64,
}

impl Feature {
    /// Create a feature from its first encountered fragment's metadata.
    pub fn new(id: FeatureId, geom_type: GeomType, properties: Map<String, serde_json::Value>) -> Self {
        Self {
            id,
            geom_type,
            properties,
            style: DrawStyle::default(),
            selected: false,
            hovered: false,
            tiles: HashMap::new(),
            lru_tick: 0,
        }
    }

    /// Insert or replace the fragment this feature contributes to a tile.
    ///
    /// The divisor is fixed once computed for a given tile; replacing a
    /// fragment with identical geometry keeps its cached paths.
    pub fn upsert_fragment(&mut self, key: TileKey, fragment: TileFragment) {
        match self.tiles.get_mut(&key) {
            Some(existing) if existing.geometry_hash == fragment.geometry_hash => {
                existing.divisor = fragment.divisor;
                existing.source = fragment.source;
            }
            _ => {
                self.tiles.insert(key, fragment);
            }
        }
    }

    /// The fragment for a tile, if any.
    pub fn fragment(&self, key: &TileKey) -> Option<&TileFragment> {
        self.tiles.get(key)
    }

    /// Mutable access to a tile's fragment.
    pub fn fragment_mut(&mut self, key: &TileKey) -> Option<&mut TileFragment> {
        self.tiles.get_mut(key)
    }

    /// Drop the fragment for an evicted tile.
    pub fn remove_fragment(&mut self, key: &TileKey) {
        self.tiles.remove(key);
    }

    /// Keys of every tile this feature currently has fragments in.
    pub fn tile_keys(&self) -> Vec<TileKey> {
        self.tiles.keys().copied().collect()
    }

    /// Number of tiles contributing fragments.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Store computed geometry in a tile's fragment cache.
    ///
    /// Small geometries (< [`CACHE_MIN_VERTICES`] vertices) are rebuilt on
    /// demand instead of cached. The per-feature cache is bounded at
    /// [`FRAGMENT_CACHE_CAP`] tiles; the least recently used entry's
    /// geometry is dropped on overflow, the fragment itself stays.
    pub fn store_cached_geometry(&mut self, key: &TileKey, geometry: CachedGeometry) {
        if geometry.vertex_count < CACHE_MIN_VERTICES {
            return;
        }

        self.lru_tick += 1;
        let tick = self.lru_tick;

        let cached_count = self.tiles.values().filter(|f| f.cached.is_some()).count();
        let has_entry = self
            .tiles
            .get(key)
            .map(|f| f.cached.is_some())
            .unwrap_or(false);
        if !has_entry && cached_count >= FRAGMENT_CACHE_CAP {
            if let Some(oldest) = self
                .tiles
                .iter()
                .filter(|(_, f)| f.cached.is_some())
                .min_by_key(|(_, f)| f.last_used)
                .map(|(k, _)| *k)
            {
                if let Some(f) = self.tiles.get_mut(&oldest) {
                    f.cached = None;
                }
            }
        }

        if let Some(fragment) = self.tiles.get_mut(key) {
            fragment.cached = Some(geometry);
            fragment.last_used = tick;
        }
    }

    /// Fetch cached geometry for a tile, touching its LRU slot.
    ///
    /// Returns `None` when nothing is cached or the fragment's geometry
    /// hash no longer matches the decoded feature (stale cache).
    pub fn cached_geometry(&mut self, key: &TileKey) -> Option<CachedGeometry> {
        self.lru_tick += 1;
        let tick = self.lru_tick;
        let fragment = self.tiles.get_mut(key)?;
        let cached = fragment.cached.as_ref()?;
        if cached.geometry_hash != fragment.geometry_hash {
            fragment.cached = None;
            return None;
        }
        fragment.last_used = tick;
        Some(cached.clone())
    }

    /// Number of tiles with live cached geometry, for tests.
    pub fn cached_tile_count(&self) -> usize {
        self.tiles.values().filter(|f| f.cached.is_some()).count()
    }
}

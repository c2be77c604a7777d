//! The source facade.
//!
//! [`MvtSource`] wires every component together and implements the host's
//! tile-provider contract: `get_tile` returns a canvas synchronously and
//! fills it as fetch and decode complete; `release_tile` drops it. The
//! public mutation surface (selection, style, filters, manifest, redraw)
//! lives here; pointer interaction is in the sibling `interact` module.

mod config;
mod interact;
mod stats;

pub use config::{
    InteractionCallback, InteractionEvent, ReplacementProvider, SelectionCallback, SourceConfig,
    DEFAULT_TILE_SIZE,
};
pub use stats::SourceStats;

use stats::StatsCounters;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::{DashMap, DashSet};
use tokio_util::sync::CancellationToken;

use crate::color::ColorParser;
use crate::coord::TileKey;
use crate::error::SourceError;
use crate::feature::{FeatureId, FeatureRegistry};
use crate::fetch::{expand_template, TileFetcher};
use crate::host::{GeoJsonSink, HostMap, ListenerId, MapEventKind};
use crate::log::Logger;
use crate::manifest::{AvailabilityOracle, ManifestSource};
use crate::mvt::VectorTile;
use crate::render::{draw_annotation, draw_layer_tile, parse_layer, FeatureFilter, IdResolver, Layer};
use crate::sched::RedrawScheduler;
use crate::style::StyleSource;
use crate::tile::{resolve_fetch_key, TileContext, TileManager, TileState};
use crate::{log_debug, log_warn};

/// Name under which the source registers on the host overlay stack.
const OVERLAY_NAME: &str = "mvtlayer";

/// Delay before the post-zoom selection reapplication.
const ZOOM_REAPPLY_DELAY: std::time::Duration = std::time::Duration::from_millis(50);

/// Configuration fields mutable after construction.
#[derive(Clone)]
pub(crate) struct MutableConfig {
    pub url: String,
    pub style: StyleSource,
    pub filter: Option<FeatureFilter>,
    pub visible_layers: Option<Vec<String>>,
    pub clickable_layers: Option<Vec<String>>,
}

pub(crate) struct SourceInner {
    pub(crate) config: SourceConfig,
    pub(crate) mutable: Mutex<MutableConfig>,
    pub(crate) registry: FeatureRegistry,
    pub(crate) layers: Mutex<Vec<Layer>>,
    pub(crate) tiles: TileManager,
    pub(crate) scheduler: Arc<RedrawScheduler>,
    pub(crate) oracle: AvailabilityOracle,
    pub(crate) resolver: IdResolver,
    pub(crate) color: ColorParser,
    pub(crate) fetcher: Arc<dyn TileFetcher>,
    pub(crate) host: Arc<dyn HostMap>,
    pub(crate) sink: Option<Arc<dyn GeoJsonSink>>,
    pub(crate) logger: Arc<dyn Logger>,
    listeners: Mutex<Vec<ListenerId>>,
    pub(crate) replacements: DashMap<FeatureId, CancellationToken>,
    pub(crate) replaced: DashSet<FeatureId>,
    pub(crate) hover_epoch: AtomicU64,
    pub(crate) multiple_selection: AtomicBool,
    pub(crate) stats: StatsCounters,
    disposed: AtomicBool,
    pub(crate) cancel: CancellationToken,
}

/// Interactive vector tile source.
///
/// Construction registers the source on the host overlay stack and
/// installs zoom, click and pointer-move listeners; [`dispose`]
/// (MvtSource::dispose) tears all of that down again.
pub struct MvtSource {
    inner: Arc<SourceInner>,
}

impl MvtSource {
    /// Assemble a source from its collaborators.
    ///
    /// Must run inside a tokio runtime: fetches, the redraw debounce and
    /// replacement lookups are spawned tasks.
    pub fn new(
        config: SourceConfig,
        host: Arc<dyn HostMap>,
        sink: Option<Arc<dyn GeoJsonSink>>,
        fetcher: Arc<dyn TileFetcher>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, SourceError> {
        if config.tile_size == 0 {
            return Err(SourceError::InvalidConfig("tile_size must be nonzero".into()));
        }

        let mutable = MutableConfig {
            url: config.url.clone(),
            style: config.style.clone(),
            filter: config.filter.clone(),
            visible_layers: config.visible_layers.clone(),
            clickable_layers: config.clickable_layers.clone(),
        };
        let resolver = IdResolver::new(
            config.get_id_for_layer_feature.clone(),
            config.default_feature_id.clone(),
        );
        let multiple = config.multiple_selection;

        let inner = Arc::new(SourceInner {
            mutable: Mutex::new(mutable),
            registry: FeatureRegistry::new(),
            layers: Mutex::new(Vec::new()),
            tiles: TileManager::new(config.cache),
            scheduler: RedrawScheduler::new(),
            oracle: AvailabilityOracle::new(),
            resolver,
            color: ColorParser::new(),
            fetcher,
            host,
            sink,
            logger,
            listeners: Mutex::new(Vec::new()),
            replacements: DashMap::new(),
            replaced: DashSet::new(),
            hover_epoch: AtomicU64::new(0),
            multiple_selection: AtomicBool::new(multiple),
            stats: StatsCounters::default(),
            disposed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            config,
        });

        inner.tiles.set_current_zoom(inner.host.zoom());

        // Initial selection, applied without callbacks.
        for id in &inner.config.selected_features {
            inner.registry.mark_selected(id, true);
        }
        if inner.config.selected_features.len() > 1 {
            inner.multiple_selection.store(true, Ordering::SeqCst);
        }

        // Manifest initialization is asynchronous; tiles requested before
        // it settles are treated as available.
        if let Some(source) = inner.config.tile_availability_manifest.clone() {
            let weak = Arc::downgrade(&inner);
            tokio::spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.oracle.set_source(source).await;
                }
            });
        }

        // Redraw flush replays pending tiles.
        {
            let weak = Arc::downgrade(&inner);
            inner.scheduler.set_flush_handler(Arc::new(move |keys| {
                if let Some(inner) = weak.upgrade() {
                    inner.render_pending(keys);
                }
            }));
        }

        inner.host.register_overlay(OVERLAY_NAME);
        inner.install_listeners();

        Ok(Self { inner })
    }

    /// Host tile-provider contract: hand out a tile canvas synchronously.
    ///
    /// The fetch/decode/render cycle runs in the background and draws into
    /// the returned context's canvas.
    pub fn get_tile(&self, key: TileKey, zoom: u8) -> Result<Arc<TileContext>, SourceError> {
        if self.inner.is_disposed() {
            return Err(SourceError::Disposed);
        }

        let (fetch_key, delta) = resolve_fetch_key(key, self.inner.config.source_max_zoom);
        let parent = (delta > 0).then_some(fetch_key);
        let ctx = TileContext::new(key, zoom, parent, self.inner.config.tile_size).ok_or(
            SourceError::CanvasAllocation {
                width: self.inner.config.tile_size,
                height: self.inner.config.tile_size,
            },
        )?;

        for evicted in self.inner.tiles.insert_visible(Arc::clone(&ctx)) {
            self.inner.prune_tile(&evicted);
        }

        if !self.inner.oracle.is_available(&fetch_key) {
            self.inner.finish_debug_only(&ctx);
            return Ok(ctx);
        }

        self.inner.spawn_fetch(Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Host tile-provider contract: the host no longer shows this tile.
    pub fn release_tile(&self, key: &TileKey) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.tiles.remove_visible(key);
        self.inner.prune_tile(key);
    }

    /// Replace the selection set.
    ///
    /// Passing more than one id switches the source into
    /// multiple-selection mode.
    pub fn set_selected_features(&self, ids: &[FeatureId]) {
        if self.inner.is_disposed() {
            return;
        }
        if ids.len() > 1 {
            self.inner.multiple_selection.store(true, Ordering::SeqCst);
        }

        let wanted: HashSet<&FeatureId> = ids.iter().collect();
        for current in self.inner.registry.selected_ids() {
            if !wanted.contains(&current) {
                self.inner.apply_selection(&current, false);
            }
        }
        for id in ids {
            if !self.inner.registry.is_selected(id) {
                self.inner.apply_selection(id, true);
            }
        }
        self.inner.schedule_redraw_all();
    }

    /// Snapshot of selected ids.
    pub fn get_selected_feature_ids(&self) -> Vec<FeatureId> {
        if self.inner.is_disposed() {
            return Vec::new();
        }
        self.inner.registry.selected_ids()
    }

    /// Snapshot of selected features with their property bags.
    ///
    /// Ids selected before their feature materialized appear with an
    /// empty bag.
    pub fn get_selected_features(
        &self,
    ) -> Vec<(FeatureId, serde_json::Map<String, serde_json::Value>)> {
        if self.inner.is_disposed() {
            return Vec::new();
        }
        self.inner
            .registry
            .selected_ids()
            .into_iter()
            .map(|id| {
                let properties = self
                    .inner
                    .registry
                    .with_feature(&id, |f| f.properties.clone())
                    .unwrap_or_default();
                (id, properties)
            })
            .collect()
    }

    /// Selected ids with a fragment in the given tile.
    pub fn get_selected_features_in_tile(&self, key: &TileKey) -> Vec<FeatureId> {
        if self.inner.is_disposed() {
            return Vec::new();
        }
        self.inner
            .registry
            .selected_ids()
            .into_iter()
            .filter(|id| {
                self.inner
                    .registry
                    .with_feature(id, |f| f.fragment(key).is_some())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Clear the selection and remove every replacement overlay.
    pub fn deselect_all_features(&self) {
        if self.inner.is_disposed() {
            return;
        }
        for id in self.inner.registry.selected_ids() {
            self.inner.apply_selection(&id, false);
        }
        self.inner.schedule_redraw_all();
    }

    /// Clear the hover set.
    pub fn clear_all_hovered_features(&self) {
        if self.inner.is_disposed() {
            return;
        }
        for id in self.inner.registry.hovered_ids() {
            self.inner.registry.mark_hovered(&id, false);
            self.inner.schedule_feature_tiles(&id);
        }
    }

    /// Replace the base style. Selection is preserved.
    pub fn set_style(&self, style: StyleSource, redraw: bool) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.mutable.lock().unwrap().style = style;
        if redraw {
            self.inner.schedule_redraw_all();
        }
    }

    /// Replace the per-layer feature filter.
    pub fn set_filter(&self, filter: Option<FeatureFilter>, redraw: bool) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.mutable.lock().unwrap().filter = filter;
        if redraw {
            self.inner.schedule_redraw_all();
        }
    }

    /// Restrict drawn layers; `None` draws all.
    pub fn set_visible_layers(&self, names: Option<Vec<String>>, redraw: bool) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.mutable.lock().unwrap().visible_layers = names;
        if redraw {
            self.inner.schedule_redraw_all();
        }
    }

    /// Change the tile URL template and reset the layer map.
    pub fn set_url(&self, url: impl Into<String>, redraw: bool) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.mutable.lock().unwrap().url = url.into();
        self.inner.layers.lock().unwrap().clear();
        if redraw {
            self.inner.schedule_redraw_all();
        }
    }

    /// Restrict click-hit-tested layers; `None` examines all.
    pub fn set_clickable_layers(&self, names: Option<Vec<String>>) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.mutable.lock().unwrap().clickable_layers = names;
    }

    /// Replace and reload the availability manifest.
    pub async fn set_tile_availability_manifest(&self, source: ManifestSource) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.oracle.set_source(source).await;
    }

    /// Re-pull a producer-based manifest.
    pub async fn refresh_manifest(&self) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.oracle.refresh().await;
    }

    /// Enqueue one tile for repaint.
    pub fn redraw_tile(&self, key: TileKey) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.scheduler.enqueue(key);
    }

    /// Enqueue every visible tile for repaint.
    pub fn redraw_all_tiles(&self) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.schedule_redraw_all();
    }

    /// Resolve when every tile load dispatched so far has settled.
    pub async fn tile_loaded(&self) {
        self.inner.tiles.wait_for_loads().await;
    }

    /// Selection probe.
    pub fn is_feature_selected(&self, id: &FeatureId) -> bool {
        !self.inner.is_disposed() && self.inner.registry.is_selected(id)
    }

    /// Hover probe.
    pub fn is_feature_hovered(&self, id: &FeatureId) -> bool {
        !self.inner.is_disposed() && self.inner.registry.is_hovered(id)
    }

    /// Replacement-overlay probe.
    pub fn is_feature_replaced(&self, id: &FeatureId) -> bool {
        !self.inner.is_disposed() && self.inner.replaced.contains(id)
    }

    /// Terminal cleanup: cancel timers and futures, remove host listeners
    /// and overlays, clear every cache. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Number of visible tiles, for diagnostics and tests.
    pub fn visible_tile_count(&self) -> usize {
        self.inner.tiles.visible_len()
    }

    /// Number of drawn-state entries, for diagnostics and tests.
    pub fn drawn_tile_count(&self) -> usize {
        self.inner.tiles.drawn_len()
    }

    /// Registered feature count, for diagnostics and tests.
    pub fn feature_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> SourceStats {
        self.inner.stats.snapshot(
            self.inner.tiles.visible_len(),
            self.inner.tiles.drawn_len(),
            self.inner.registry.len(),
            self.inner.registry.selected_ids().len(),
            self.inner.scheduler.flush_count(),
        )
    }
}

impl SourceInner {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn install_listeners(self: &Arc<Self>) {
        let mut listeners = self.listeners.lock().unwrap();

        let weak = Arc::downgrade(self);
        listeners.push(self.host.add_listener(
            MapEventKind::ZoomEnd,
            Arc::new(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_zoom_end(event.zoom);
                }
            }),
        ));

        let weak = Arc::downgrade(self);
        listeners.push(self.host.add_listener(
            MapEventKind::Click,
            Arc::new(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_click(&event);
                }
            }),
        ));

        let weak = Arc::downgrade(self);
        listeners.push(self.host.add_listener(
            MapEventKind::MouseMove,
            Arc::new(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_mouse_move(&event);
                }
            }),
        ));

        // Replacement overlays live on the secondary surface; pointer
        // events there route through the same tile-space paths.
        let weak = Arc::downgrade(self);
        listeners.push(self.host.add_listener(
            MapEventKind::OverlayClick,
            Arc::new(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_click(&event);
                }
            }),
        ));

        let weak = Arc::downgrade(self);
        listeners.push(self.host.add_listener(
            MapEventKind::OverlayHover,
            Arc::new(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_mouse_move(&event);
                }
            }),
        ));
    }

    /// Dispatch the async fetch/decode/render cycle for a tile.
    pub(crate) fn spawn_fetch(self: &Arc<Self>, ctx: Arc<TileContext>) {
        self.tiles.load_started();
        self.stats.record_fetch();
        ctx.set_state(TileState::Fetching);

        let url = expand_template(&self.mutable.lock().unwrap().url, &ctx.fetch_key());
        let headers = self.config.xhr_headers.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let cancel = self.cancel.clone();
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                result = fetcher.fetch(url, headers) => Some(result),
            };

            let Some(inner) = weak.upgrade() else {
                return;
            };

            match outcome {
                None => ctx.set_state(TileState::DebugOnly),
                Some(Err(error)) => {
                    log_debug!(
                        inner.logger,
                        "tile {} fetch failed: {}",
                        ctx.fetch_key(),
                        error
                    );
                    inner.stats.record_fetch_failure();
                    inner.finish_debug_only(&ctx);
                }
                Some(Ok(bytes)) => {
                    if inner.tiles.current_zoom() != ctx.zoom_at_creation {
                        log_debug!(
                            inner.logger,
                            "tile {} response dropped after zoom change",
                            ctx.key
                        );
                        inner.stats.record_stale_response();
                        ctx.set_state(TileState::DebugOnly);
                    } else {
                        match VectorTile::from_bytes(&bytes) {
                            Ok(tile) => {
                                ctx.set_decoded(Arc::new(tile));
                                ctx.set_state(TileState::Decoded);
                                inner.render_tile(&ctx);
                            }
                            Err(error) => {
                                log_warn!(
                                    inner.logger,
                                    "tile {} decode failed: {}",
                                    ctx.fetch_key(),
                                    error
                                );
                                inner.stats.record_decode_failure();
                                inner.finish_debug_only(&ctx);
                            }
                        }
                    }
                }
            }

            inner.tiles.load_finished();
        });
    }

    /// Mark a tile debug-only and annotate it when debugging is on.
    pub(crate) fn finish_debug_only(&self, ctx: &Arc<TileContext>) {
        ctx.set_state(TileState::DebugOnly);
        if self.config.debug && ctx.mark_debug_drawn() {
            ctx.with_canvas(|canvas| draw_annotation(canvas, &ctx.key));
        }
    }

    /// Parse and draw every visible layer of a decoded tile.
    pub(crate) fn render_tile(&self, ctx: &Arc<TileContext>) {
        let Some(decoded) = ctx.decoded() else {
            return;
        };

        let (style, filter, visible_layers) = {
            let mutable = self.mutable.lock().unwrap();
            (
                mutable.style.clone(),
                mutable.filter.clone(),
                mutable.visible_layers.clone(),
            )
        };

        // Deterministic layer order: the configured list when present,
        // otherwise name order.
        let names: Vec<String> = match &visible_layers {
            Some(visible) => visible
                .iter()
                .filter(|name| decoded.layer(name).is_some())
                .cloned()
                .collect(),
            None => {
                let mut names: Vec<String> = decoded.layers().keys().cloned().collect();
                names.sort();
                names
            }
        };

        for name in names {
            let Some(vlayer) = decoded.layer(&name) else {
                continue;
            };
            let draw_list = parse_layer(
                vlayer,
                ctx,
                &self.registry,
                &style,
                filter.as_ref(),
                &self.resolver,
            );

            {
                let mut layers = self.layers.lock().unwrap();
                match layers.iter_mut().find(|l| l.name == name) {
                    Some(layer) => layer.set_tile_features(ctx.key, draw_list.clone()),
                    None => {
                        let mut layer = Layer::new(name.clone());
                        layer.set_tile_features(ctx.key, draw_list.clone());
                        layers.push(layer);
                    }
                }
            }

            draw_layer_tile(
                ctx,
                &draw_list,
                &self.registry,
                &style,
                &self.color,
                self.config.custom_draw.as_ref(),
            );
        }

        if self.config.debug && ctx.mark_debug_drawn() {
            ctx.with_canvas(|canvas| draw_annotation(canvas, &ctx.key));
        }

        ctx.set_state(TileState::Rendered);
        self.tiles.mark_drawn(ctx.key);
        self.stats.record_tile_rendered();
    }

    /// Scheduler flush target: repaint each pending visible, decoded tile.
    pub(crate) fn render_pending(&self, keys: Vec<TileKey>) {
        for key in keys {
            let Some(ctx) = self.tiles.visible(&key) else {
                continue;
            };
            if ctx.decoded().is_none() {
                continue;
            }
            ctx.clear_canvas();
            self.tiles.delete_drawn(&key);
            self.render_tile(&ctx);
        }
    }

    pub(crate) fn schedule_redraw_all(&self) {
        self.scheduler.enqueue_many(self.tiles.visible_keys());
    }

    /// Enqueue every tile a feature contributes to.
    pub(crate) fn schedule_feature_tiles(&self, id: &FeatureId) {
        let keys = self
            .registry
            .with_feature(id, |f| f.tile_keys())
            .unwrap_or_default();
        if !keys.is_empty() {
            self.scheduler.enqueue_many(keys);
        }
    }

    /// Zoom settled on a new level: reset visible tiles, optionally the
    /// layer map and registry, and reapply the selection after a short
    /// deferral so newly materialized features adopt the selected style.
    pub(crate) fn handle_zoom_end(self: &Arc<Self>, zoom: u8) {
        if self.is_disposed() || self.tiles.current_zoom() == zoom {
            return;
        }

        self.tiles.set_current_zoom(zoom);
        self.tiles.clear_visible();
        if !self.config.cache {
            self.layers.lock().unwrap().clear();
            self.registry.clear_features();
        }
        self.scheduler.flush_now();

        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(ZOOM_REAPPLY_DELAY) => {}
            }
            if let Some(inner) = weak.upgrade() {
                for id in inner.registry.selected_ids() {
                    inner.registry.mark_selected(&id, true);
                }
                inner.schedule_redraw_all();
            }
        });
    }

    /// Drop per-layer draw lists and feature fragments for a tile that
    /// left the visible set.
    pub(crate) fn prune_tile(&self, key: &TileKey) {
        let ids: Vec<FeatureId> = {
            let mut layers = self.layers.lock().unwrap();
            let mut ids = Vec::new();
            for layer in layers.iter_mut() {
                ids.extend(layer.tile_features(key).to_vec());
                layer.remove_tile(key);
            }
            ids
        };
        for id in ids {
            self.registry.with_feature_mut(&id, |f| f.remove_fragment(key));
        }
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        self.scheduler.shutdown();

        for entry in self.replacements.iter() {
            entry.value().cancel();
        }
        self.replacements.clear();
        self.replaced.clear();

        if let Some(sink) = &self.sink {
            sink.clear();
        }

        for id in self.listeners.lock().unwrap().drain(..) {
            self.host.remove_listener(id);
        }
        self.host.remove_overlay(OVERLAY_NAME);

        self.tiles.clear();
        self.layers.lock().unwrap().clear();
        self.registry.clear();
        self.oracle.clear();
    }
}

impl Drop for MvtSource {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

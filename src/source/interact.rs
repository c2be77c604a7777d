//! Pointer interaction and selection side effects.
//!
//! Click and pointer-move events arrive through the host listeners
//! installed by the facade. Both translate the geographic position into a
//! tile-space hit query, then diverge: clicks drive the selection policy
//! and its side effects (callbacks, replacement lookups), moves drive the
//! single-feature hover state behind an optional debounce.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{InteractionEvent, SourceInner};
use crate::coord::{lat_lng_to_world, tile_at_lat_lng, LatLng, TileKey, TilePoint, WORLD_SIZE};
use crate::feature::FeatureId;
use crate::hit::hit_test;
use crate::host::MapEvent;
use crate::log_debug;
use crate::merge::{merge_feature_rings, TileRings};
use crate::mvt::GeomType;
use crate::style;

impl SourceInner {
    /// Pointer position in a tile's canvas frame.
    pub(crate) fn tile_point_in(&self, lat_lng: &LatLng, zoom: u8, key: &TileKey) -> TilePoint {
        let world = lat_lng_to_world(lat_lng);
        let tile_size = self.config.tile_size as f64;
        let scale = (1u64 << zoom) as f64 * tile_size / WORLD_SIZE;
        TilePoint::new(
            world.x * scale - key.x as f64 * tile_size,
            world.y * scale - key.y as f64 * tile_size,
        )
    }

    /// Clickable layers' draw lists for a tile, topmost layer first.
    fn clickable_scan(&self, key: &TileKey) -> Vec<Vec<FeatureId>> {
        let clickable = self.mutable.lock().unwrap().clickable_layers.clone();
        let layers = self.layers.lock().unwrap();
        layers
            .iter()
            .rev()
            .filter(|layer| {
                clickable
                    .as_ref()
                    .map(|names| names.contains(&layer.name))
                    .unwrap_or(true)
            })
            .map(|layer| layer.tile_features(key).to_vec())
            .filter(|list| !list.is_empty())
            .collect()
    }

    /// Host click listener target.
    pub(crate) fn handle_click(self: &Arc<Self>, event: &MapEvent) {
        if self.is_disposed() {
            return;
        }
        let Some(lat_lng) = event.lat_lng else {
            return;
        };

        let zoom = self.tiles.current_zoom();
        let pixel = self.host.lat_lng_to_pixel(&lat_lng).unwrap_or_default();
        let key = tile_at_lat_lng(&lat_lng, zoom);

        let Some(ctx) = self.tiles.visible(&key) else {
            // Tile not visible: the callback still fires, with no feature.
            self.emit_click(InteractionEvent {
                feature_id: None,
                lat_lng,
                pixel,
                tile_key: Some(key),
                tile_point: None,
                selection_changed: false,
                is_selected: false,
            });
            return;
        };

        let tile_point = self.tile_point_in(&lat_lng, zoom, &key);
        let style = self.mutable.lock().unwrap().style.clone();

        let mut any_hit = false;
        for draw_list in self.clickable_scan(&key) {
            let Some(hit) = hit_test(&draw_list, &self.registry, &style, &ctx, &tile_point) else {
                continue;
            };
            any_hit = true;

            let (selection_changed, is_selected) = self.apply_click_selection(&hit.feature_id);
            self.emit_click(InteractionEvent {
                feature_id: Some(hit.feature_id.clone()),
                lat_lng,
                pixel,
                tile_key: Some(key),
                tile_point: Some(tile_point),
                selection_changed,
                is_selected,
            });

            if self.config.limit_to_first_visible_layer {
                break;
            }
        }

        if !any_hit {
            self.emit_click(InteractionEvent {
                feature_id: None,
                lat_lng,
                pixel,
                tile_key: Some(key),
                tile_point: Some(tile_point),
                selection_changed: false,
                is_selected: false,
            });
        }
    }

    /// Selection policy for a clicked feature.
    ///
    /// Returns `(selection_changed, is_selected_afterwards)`.
    fn apply_click_selection(self: &Arc<Self>, id: &FeatureId) -> (bool, bool) {
        let was_selected = self.registry.is_selected(id);
        if !self.config.set_selected_on_click {
            return (false, was_selected);
        }

        let mut changed = false;

        if !self.multiple_selection.load(Ordering::SeqCst) {
            for other in self.registry.selected_ids() {
                if other != *id {
                    self.apply_selection(&other, false);
                    changed = true;
                }
            }
        }

        let now_selected = if self.config.toggle_selection && was_selected {
            self.apply_selection(id, false);
            changed = true;
            false
        } else if !was_selected {
            self.apply_selection(id, true);
            changed = true;
            true
        } else {
            true
        };

        (changed, now_selected)
    }

    /// Flip one feature's selection with every side effect: registry
    /// state, the selection callback, replacement lookup or teardown, and
    /// redraw of the feature's tiles.
    pub(crate) fn apply_selection(self: &Arc<Self>, id: &FeatureId, selected: bool) {
        if self.registry.is_selected(id) == selected {
            return;
        }
        self.registry.mark_selected(id, selected);

        if let Some(callback) = &self.config.feature_selection_callback {
            let properties = self
                .registry
                .with_feature(id, |f| f.properties.clone())
                .unwrap_or_default();
            callback(id, &properties, selected);
        }

        if selected {
            self.start_replacement(id);
        } else {
            self.cancel_replacement(id);
        }

        self.schedule_feature_tiles(id);
    }

    /// Kick off the async replacement lookup for a newly selected
    /// feature. The in-flight request is tracked per feature id and
    /// cancelled on deselection or disposal; a result arriving after
    /// deselection is discarded.
    fn start_replacement(self: &Arc<Self>, id: &FeatureId) {
        let Some(provider) = self.config.get_replacement_feature.clone() else {
            return;
        };

        if let Some((_, old)) = self.replacements.remove(id) {
            old.cancel();
        }
        let token = CancellationToken::new();
        self.replacements.insert(id.clone(), token.clone());

        let weak = Arc::downgrade(self);
        let global_cancel = self.cancel.clone();
        let id = id.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                _ = global_cancel.cancelled() => return,
                result = provider(id.clone()) => result,
            };

            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.replacements.remove(&id);

            // Deselected while the lookup was in flight: discard.
            if !inner.registry.is_selected(&id) {
                log_debug!(inner.logger, "replacement for {} discarded after deselect", id);
                return;
            }

            match result {
                Some(geometry) => inner.publish_replacement(&id, geometry),
                None => {
                    if let Some(geometry) = inner.merge_fallback(&id) {
                        inner.publish_replacement(&id, geometry);
                    }
                }
            }
        });
    }

    /// Cancel any in-flight replacement and remove the published overlay.
    pub(crate) fn cancel_replacement(&self, id: &FeatureId) {
        if let Some((_, token)) = self.replacements.remove(id) {
            token.cancel();
        }
        if self.replaced.remove(id).is_some() {
            if let Some(sink) = &self.sink {
                sink.remove_overlay(id);
            }
        }
    }

    /// Publish replacement geometry to the secondary overlay surface
    /// under the feature's id, styled as selected.
    fn publish_replacement(&self, id: &FeatureId, geometry: geojson::Geometry) {
        let Some(sink) = &self.sink else {
            return;
        };
        let style_source = self.mutable.lock().unwrap().style.clone();
        let style = self
            .registry
            .with_feature(id, |f| {
                f.tile_keys()
                    .first()
                    .and_then(|key| f.fragment(key))
                    .map(|fragment| style::resolve(&style_source, &fragment.source, true, false))
            })
            .flatten()
            .unwrap_or_default();

        sink.set_overlay(id, geometry, style);
        self.replaced.insert(id.clone());
    }

    /// Reassemble a selected polygon from its tile fragments.
    ///
    /// Each decoded frame contributes once: overzoomed children that share
    /// an ancestor would otherwise duplicate every ring.
    pub(crate) fn merge_fallback(&self, id: &FeatureId) -> Option<geojson::Geometry> {
        let tile_rings = self.registry.with_feature(id, |f| {
            if f.geom_type != GeomType::Polygon {
                return Vec::new();
            }
            let mut seen_frames: HashSet<TileKey> = HashSet::new();
            let mut out: Vec<TileRings> = Vec::new();
            for key in f.tile_keys() {
                let Some(ctx) = self.tiles.visible(&key) else {
                    continue;
                };
                let frame = ctx.fetch_key();
                if !seen_frames.insert(frame) {
                    continue;
                }
                if let Some(fragment) = f.fragment(&key) {
                    out.push(TileRings {
                        key: frame,
                        divisor: fragment.divisor,
                        rings: fragment.source.load_geometry().to_vec(),
                    });
                }
            }
            out
        })?;

        if tile_rings.is_empty() {
            return None;
        }
        merge_feature_rings(&tile_rings, self.config.tile_size as f64, &self.logger)
    }

    /// Host pointer-move listener target.
    ///
    /// With a configured hover delay, processing is deferred and
    /// superseded by any newer move event.
    pub(crate) fn handle_mouse_move(self: &Arc<Self>, event: &MapEvent) {
        if self.is_disposed() {
            return;
        }
        let Some(lat_lng) = event.lat_lng else {
            return;
        };

        let epoch = self.hover_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        if self.config.hover_delay.is_zero() {
            self.process_hover(lat_lng, epoch);
            return;
        }

        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let delay = self.config.hover_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(inner) = weak.upgrade() {
                inner.process_hover(lat_lng, epoch);
            }
        });
    }

    fn process_hover(self: &Arc<Self>, lat_lng: LatLng, epoch: u64) {
        // A newer move supersedes this one.
        if self.hover_epoch.load(Ordering::SeqCst) != epoch || self.is_disposed() {
            return;
        }

        let zoom = self.tiles.current_zoom();
        let pixel = self.host.lat_lng_to_pixel(&lat_lng).unwrap_or_default();
        let key = tile_at_lat_lng(&lat_lng, zoom);

        let hit_id: Option<FeatureId> = self.tiles.visible(&key).and_then(|ctx| {
            let tile_point = self.tile_point_in(&lat_lng, zoom, &key);
            let style = self.mutable.lock().unwrap().style.clone();
            self.clickable_scan(&key)
                .into_iter()
                .find_map(|draw_list| {
                    hit_test(&draw_list, &self.registry, &style, &ctx, &tile_point)
                })
                .map(|hit| hit.feature_id)
        });

        let current = self.registry.hovered_ids().into_iter().next();
        if hit_id != current {
            // At most one hovered feature at a time.
            if let Some(old) = &current {
                self.registry.mark_hovered(old, false);
                self.schedule_feature_tiles(old);
            }
            if let Some(new) = &hit_id {
                self.registry.mark_hovered(new, true);
                self.schedule_feature_tiles(new);
            }
        }

        let is_selected = hit_id
            .as_ref()
            .map(|id| self.registry.is_selected(id))
            .unwrap_or(false);
        self.emit_hover(InteractionEvent {
            feature_id: hit_id,
            lat_lng,
            pixel,
            tile_key: Some(key),
            tile_point: Some(self.tile_point_in(&lat_lng, zoom, &key)),
            selection_changed: false,
            is_selected,
        });
    }

    fn emit_click(&self, event: InteractionEvent) {
        if let Some(callback) = &self.config.on_click {
            callback(&event);
        }
    }

    fn emit_hover(&self, event: InteractionEvent) {
        if let Some(callback) = &self.config.on_mouse_hover {
            callback(&event);
        }
    }
}

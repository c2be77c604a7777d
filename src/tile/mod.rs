//! Tile lifecycle management.
//!
//! Owns the visible and drawn tile caches, resolves overzoom to ancestor
//! fetches, and tracks outstanding loads so callers can await quiescence.
//! Fetch dispatch itself lives in the source facade; the manager is the
//! bookkeeping underneath it.

mod context;
mod fifo;

pub use context::{TileContext, TileState};
pub use fifo::FifoCache;

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::coord::TileKey;

/// Cap on simultaneously tracked visible tiles.
pub const VISIBLE_TILE_CAP: usize = 50;

/// Cap on tiles with retained drawn state.
pub const DRAWN_TILE_CAP: usize = 100;

/// Resolve the tile to fetch for a request, honoring the source's
/// maximum zoom.
///
/// Above `source_max_zoom` the ancestor at that zoom is fetched and the
/// zoom delta recorded for coordinate scaling; at or below it (including
/// below any minimum) the request passes through unchanged.
pub fn resolve_fetch_key(requested: TileKey, source_max_zoom: Option<u8>) -> (TileKey, u8) {
    match source_max_zoom {
        Some(max) if requested.z > max => {
            let delta = requested.z - max;
            (requested.ancestor(delta), delta)
        }
        _ => (requested, 0),
    }
}

/// Bookkeeping for every tile the host currently cares about.
#[derive(Debug)]
pub struct TileManager {
    visible: Mutex<FifoCache<TileKey, Arc<TileContext>>>,
    drawn: Mutex<FifoCache<TileKey, ()>>,
    current_zoom: AtomicU8,
    pending_loads: AtomicUsize,
    load_notify: Notify,
    /// Whether drawn-state bookkeeping is enabled (the `cache` option).
    cache_enabled: bool,
}

impl TileManager {
    /// Create a manager with the default caps.
    pub fn new(cache_enabled: bool) -> Self {
        Self::with_caps(cache_enabled, VISIBLE_TILE_CAP, DRAWN_TILE_CAP)
    }

    /// Create a manager with explicit caps, for tests.
    pub fn with_caps(cache_enabled: bool, visible_cap: usize, drawn_cap: usize) -> Self {
        Self {
            visible: Mutex::new(FifoCache::new(visible_cap)),
            drawn: Mutex::new(FifoCache::new(drawn_cap)),
            current_zoom: AtomicU8::new(0),
            pending_loads: AtomicUsize::new(0),
            load_notify: Notify::new(),
            cache_enabled,
        }
    }

    /// The map zoom the manager currently believes in.
    pub fn current_zoom(&self) -> u8 {
        self.current_zoom.load(Ordering::SeqCst)
    }

    /// Record a zoom change.
    pub fn set_current_zoom(&self, zoom: u8) {
        self.current_zoom.store(zoom, Ordering::SeqCst);
    }

    /// Track a context as visible, FIFO-evicting past the cap.
    ///
    /// Returns the evicted keys so callers can prune dependent state.
    pub fn insert_visible(&self, context: Arc<TileContext>) -> Vec<TileKey> {
        self.visible.lock().unwrap().insert(context.key, context)
    }

    /// The visible context for a key.
    pub fn visible(&self, key: &TileKey) -> Option<Arc<TileContext>> {
        self.visible.lock().unwrap().get(key).cloned()
    }

    /// Whether a key is currently visible.
    pub fn is_visible(&self, key: &TileKey) -> bool {
        self.visible.lock().unwrap().contains(key)
    }

    /// Drop a tile from the visible set (host released it).
    pub fn remove_visible(&self, key: &TileKey) -> Option<Arc<TileContext>> {
        self.visible.lock().unwrap().remove(key)
    }

    /// Keys of every visible tile, in insertion order.
    pub fn visible_keys(&self) -> Vec<TileKey> {
        self.visible.lock().unwrap().keys()
    }

    /// Every visible context.
    pub fn visible_contexts(&self) -> Vec<Arc<TileContext>> {
        self.visible.lock().unwrap().values().cloned().collect()
    }

    /// Number of visible tiles.
    pub fn visible_len(&self) -> usize {
        self.visible.lock().unwrap().len()
    }

    /// Mark a tile's full rendering as done.
    pub fn mark_drawn(&self, key: TileKey) {
        self.drawn.lock().unwrap().insert(key, ());
    }

    /// Whether a tile's full rendering is retained.
    pub fn is_drawn(&self, key: &TileKey) -> bool {
        self.drawn.lock().unwrap().contains(key)
    }

    /// Invalidate a tile's drawn marker ahead of a repaint.
    ///
    /// With caching disabled this is a no-op; the redraw path calls it
    /// unconditionally and both behaviors are correct.
    pub fn delete_drawn(&self, key: &TileKey) {
        if !self.cache_enabled {
            return;
        }
        self.drawn.lock().unwrap().remove(key);
    }

    /// Number of retained drawn markers.
    pub fn drawn_len(&self) -> usize {
        self.drawn.lock().unwrap().len()
    }

    /// Forget all visible tiles (zoom change).
    pub fn clear_visible(&self) {
        self.visible.lock().unwrap().clear();
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.visible.lock().unwrap().clear();
        self.drawn.lock().unwrap().clear();
    }

    /// Whether drawn-state bookkeeping is on.
    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Register an in-flight tile load.
    pub fn load_started(&self) {
        self.pending_loads.fetch_add(1, Ordering::SeqCst);
    }

    /// Settle an in-flight tile load.
    pub fn load_finished(&self) {
        let prev = self.pending_loads.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "load_finished without load_started");
        if prev <= 1 {
            self.load_notify.notify_waiters();
        }
    }

    /// Number of unsettled loads.
    pub fn pending_loads(&self) -> usize {
        self.pending_loads.load(Ordering::SeqCst)
    }

    /// Resolve once every load dispatched so far has settled.
    pub async fn wait_for_loads(&self) {
        loop {
            if self.pending_loads.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.load_notify.notified();
            if self.pending_loads.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

//! Per-tile rendering context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tiny_skia::Pixmap;

use crate::coord::TileKey;
use crate::mvt::VectorTile;

/// Lifecycle state of a tile's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Created by `get_tile`, availability not yet checked
    Requested,
    /// Fetch dispatched
    Fetching,
    /// Bytes decoded into the vector-tile model
    Decoded,
    /// Features parsed and drawn to the canvas
    Rendered,
    /// Unavailable or failed; only debug annotation is drawn
    DebugOnly,
}

/// A tile's canvas and decode state.
///
/// Created synchronously when the host requests a tile; the canvas handle
/// is handed to the host immediately while fetch and decode complete in
/// the background. For overzoomed tiles `parent_key` names the ancestor
/// whose decoded content backs this tile and `zoom_delta` the scaling
/// level difference.
pub struct TileContext {
    /// Grid position this context was created for
    pub key: TileKey,
    /// Map zoom at creation, used to drop stale fetch responses
    pub zoom_at_creation: u8,
    /// Ancestor tile actually fetched, when overzoomed
    pub parent_key: Option<TileKey>,
    /// `key.z - parent_key.z`; zero when not overzoomed
    pub zoom_delta: u8,
    /// Canvas edge length in pixels
    pub tile_size: u32,
    canvas: Mutex<Pixmap>,
    decoded: OnceLock<Arc<VectorTile>>,
    state: Mutex<TileState>,
    debug_drawn: AtomicBool,
}

impl std::fmt::Debug for TileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileContext")
            .field("key", &self.key)
            .field("zoom_at_creation", &self.zoom_at_creation)
            .field("parent_key", &self.parent_key)
            .field("zoom_delta", &self.zoom_delta)
            .field("tile_size", &self.tile_size)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TileContext {
    /// Allocate a context with a blank canvas.
    ///
    /// Returns `None` when the pixmap allocation fails (zero size).
    pub fn new(
        key: TileKey,
        zoom_at_creation: u8,
        parent_key: Option<TileKey>,
        tile_size: u32,
    ) -> Option<Arc<Self>> {
        let canvas = Pixmap::new(tile_size, tile_size)?;
        let zoom_delta = parent_key.map(|p| key.z.saturating_sub(p.z)).unwrap_or(0);
        Some(Arc::new(Self {
            key,
            zoom_at_creation,
            parent_key,
            zoom_delta,
            tile_size,
            canvas: Mutex::new(canvas),
            decoded: OnceLock::new(),
            state: Mutex::new(TileState::Requested),
            debug_drawn: AtomicBool::new(false),
        }))
    }

    /// The tile key whose bytes should actually be fetched.
    pub fn fetch_key(&self) -> TileKey {
        self.parent_key.unwrap_or(self.key)
    }

    /// Run a closure over the locked canvas.
    pub fn with_canvas<R>(&self, f: impl FnOnce(&mut Pixmap) -> R) -> R {
        let mut canvas = self.canvas.lock().unwrap();
        f(&mut canvas)
    }

    /// Clear the canvas to full transparency.
    pub fn clear_canvas(&self) {
        self.with_canvas(|c| c.fill(tiny_skia::Color::TRANSPARENT));
    }

    /// Snapshot of the canvas pixel data, for tests.
    pub fn canvas_data(&self) -> Vec<u8> {
        self.with_canvas(|c| c.data().to_vec())
    }

    /// Attach the decoded tile; first write wins.
    pub fn set_decoded(&self, tile: Arc<VectorTile>) {
        let _ = self.decoded.set(tile);
    }

    /// The decoded tile, once available.
    pub fn decoded(&self) -> Option<Arc<VectorTile>> {
        self.decoded.get().cloned()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TileState {
        *self.state.lock().unwrap()
    }

    /// Advance the lifecycle state.
    pub fn set_state(&self, state: TileState) {
        *self.state.lock().unwrap() = state;
    }

    /// Whether the fetch/decode cycle has settled (rendered or failed).
    pub fn is_settled(&self) -> bool {
        matches!(self.state(), TileState::Rendered | TileState::DebugOnly)
    }

    /// Mark the debug annotation as drawn; returns whether this call was
    /// the first. Debug annotation happens once per tile, not on
    /// feature-level redraws.
    pub fn mark_debug_drawn(&self) -> bool {
        !self.debug_drawn.swap(true, Ordering::SeqCst)
    }
}

//! Host map runtime contract.
//!
//! The engine never talks to a concrete map widget; it consumes these
//! traits. The host provides viewport queries, an overlay stack, event
//! listeners, and a secondary GeoJSON surface for replacement geometry.
//! [`MockHost`] and [`RecordingSink`] are the in-crate test doubles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::coord::{LatLng, PixelPoint};
use crate::style::DrawStyle;

/// Identifies an installed listener for later removal.
pub type ListenerId = u64;

/// Host event categories the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapEventKind {
    /// The map's zoom level settled on a new value
    ZoomEnd,
    /// Pointer click with a geographic position
    Click,
    /// Pointer movement with a geographic position
    MouseMove,
    /// Click landing on the secondary GeoJSON overlay surface
    OverlayClick,
    /// Pointer movement over the secondary GeoJSON overlay surface
    OverlayHover,
}

/// A host event delivered to an installed listener.
#[derive(Debug, Clone, Copy)]
pub struct MapEvent {
    pub kind: MapEventKind,
    /// Geographic position for pointer events
    pub lat_lng: Option<LatLng>,
    /// Map zoom at event time
    pub zoom: u8,
}

/// Listener callback type.
pub type MapListener = Arc<dyn Fn(MapEvent) + Send + Sync>;

/// The host map runtime as seen by the engine.
pub trait HostMap: Send + Sync {
    /// Current map zoom.
    fn zoom(&self) -> u8;

    /// Project a geographic position into viewport pixels.
    ///
    /// `None` when the host projection is unavailable; callers substitute
    /// `(0, 0)`.
    fn lat_lng_to_pixel(&self, p: &LatLng) -> Option<PixelPoint>;

    /// Add a named overlay to the host's overlay stack.
    fn register_overlay(&self, name: &str);

    /// Remove a named overlay from the host's overlay stack.
    fn remove_overlay(&self, name: &str);

    /// Install a listener; the returned handle removes it.
    fn add_listener(&self, kind: MapEventKind, listener: MapListener) -> ListenerId;

    /// Remove a previously installed listener.
    fn remove_listener(&self, id: ListenerId);
}

/// The host's secondary GeoJSON overlay surface.
///
/// Replacement geometry for selected features is published here under the
/// feature's id.
pub trait GeoJsonSink: Send + Sync {
    /// Create or replace the overlay for a feature id.
    fn set_overlay(&self, id: &str, geometry: geojson::Geometry, style: DrawStyle);

    /// Remove the overlay for a feature id.
    fn remove_overlay(&self, id: &str);

    /// Remove every overlay this engine published.
    fn clear(&self);
}

/// In-memory host double for tests.
///
/// Projection maps geographic positions to global pixel coordinates at
/// the current zoom, anchored at the world origin.
#[derive(Default)]
pub struct MockHost {
    zoom: AtomicU8,
    projection_available: AtomicBool,
    next_listener: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, (MapEventKind, MapListener)>>,
    overlays: Mutex<Vec<String>>,
}

impl MockHost {
    /// Create a host at zoom 0 with a working projection.
    pub fn new(zoom: u8) -> Self {
        let host = Self::default();
        host.zoom.store(zoom, Ordering::SeqCst);
        host.projection_available.store(true, Ordering::SeqCst);
        host
    }

    /// Change the reported zoom without emitting an event.
    pub fn set_zoom_silent(&self, zoom: u8) {
        self.zoom.store(zoom, Ordering::SeqCst);
    }

    /// Change zoom and deliver a `ZoomEnd` event to listeners.
    pub fn set_zoom(&self, zoom: u8) {
        self.set_zoom_silent(zoom);
        self.emit(MapEvent {
            kind: MapEventKind::ZoomEnd,
            lat_lng: None,
            zoom,
        });
    }

    /// Simulate a broken host projection.
    pub fn set_projection_available(&self, available: bool) {
        self.projection_available.store(available, Ordering::SeqCst);
    }

    /// Deliver an event to every matching listener.
    pub fn emit(&self, event: MapEvent) {
        let listeners: Vec<MapListener> = self
            .listeners
            .lock()
            .unwrap()
            .values()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Emit a click at a geographic position.
    pub fn click(&self, p: LatLng) {
        self.emit(MapEvent {
            kind: MapEventKind::Click,
            lat_lng: Some(p),
            zoom: self.zoom(),
        });
    }

    /// Emit a pointer move at a geographic position.
    pub fn mouse_move(&self, p: LatLng) {
        self.emit(MapEvent {
            kind: MapEventKind::MouseMove,
            lat_lng: Some(p),
            zoom: self.zoom(),
        });
    }

    /// Number of installed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Names currently on the overlay stack.
    pub fn overlay_names(&self) -> Vec<String> {
        self.overlays.lock().unwrap().clone()
    }
}

impl HostMap for MockHost {
    fn zoom(&self) -> u8 {
        self.zoom.load(Ordering::SeqCst)
    }

    fn lat_lng_to_pixel(&self, p: &LatLng) -> Option<PixelPoint> {
        if !self.projection_available.load(Ordering::SeqCst) {
            return None;
        }
        let world = crate::coord::lat_lng_to_world(p);
        let scale = (1u64 << self.zoom()) as f64;
        Some(PixelPoint {
            x: world.x * scale,
            y: world.y * scale,
        })
    }

    fn register_overlay(&self, name: &str) {
        self.overlays.lock().unwrap().push(name.to_string());
    }

    fn remove_overlay(&self, name: &str) {
        self.overlays.lock().unwrap().retain(|n| n != name);
    }

    fn add_listener(&self, kind: MapEventKind, listener: MapListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().insert(id, (kind, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().unwrap().remove(&id);
    }
}

/// GeoJSON sink double that records published overlays.
#[derive(Default)]
pub struct RecordingSink {
    overlays: Mutex<HashMap<String, geojson::Geometry>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded geometry for a feature id.
    pub fn overlay(&self, id: &str) -> Option<geojson::Geometry> {
        self.overlays.lock().unwrap().get(id).cloned()
    }

    /// Number of live overlays.
    pub fn len(&self) -> usize {
        self.overlays.lock().unwrap().len()
    }

    /// Whether no overlays are live.
    pub fn is_empty(&self) -> bool {
        self.overlays.lock().unwrap().is_empty()
    }
}

impl GeoJsonSink for RecordingSink {
    fn set_overlay(&self, id: &str, geometry: geojson::Geometry, _style: DrawStyle) {
        self.overlays
            .lock()
            .unwrap()
            .insert(id.to_string(), geometry);
    }

    fn remove_overlay(&self, id: &str) {
        self.overlays.lock().unwrap().remove(id);
    }

    fn clear(&self) {
        self.overlays.lock().unwrap().clear();
    }
}

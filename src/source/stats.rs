//! Source statistics tracking and reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live counters maintained by the source internals.
///
/// Counters are relaxed atomics; a snapshot is taken with
/// [`StatsCounters::snapshot`].
#[derive(Debug)]
pub(crate) struct StatsCounters {
    tile_fetches: AtomicU64,
    fetch_failures: AtomicU64,
    decode_failures: AtomicU64,
    stale_responses: AtomicU64,
    tiles_rendered: AtomicU64,
    created_at: Instant,
}

impl Default for StatsCounters {
    fn default() -> Self {
        Self {
            tile_fetches: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            stale_responses: AtomicU64::new(0),
            tiles_rendered: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }
}

impl StatsCounters {
    pub fn record_fetch(&self) {
        self.tile_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_response(&self) {
        self.stale_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tile_rendered(&self) {
        self.tiles_rendered.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters, filling the state gauges from the caller.
    pub fn snapshot(
        &self,
        visible_tiles: usize,
        drawn_tiles: usize,
        features: usize,
        selected_features: usize,
        redraw_flushes: u64,
    ) -> SourceStats {
        SourceStats {
            tile_fetches: self.tile_fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
            tiles_rendered: self.tiles_rendered.load(Ordering::Relaxed),
            visible_tiles,
            drawn_tiles,
            features,
            selected_features,
            redraw_flushes,
            created_at: self.created_at,
        }
    }
}

/// Point-in-time source statistics for monitoring and debugging.
#[derive(Debug, Clone)]
pub struct SourceStats {
    /// Tile fetches dispatched
    pub tile_fetches: u64,
    /// Fetches that failed at the transport layer
    pub fetch_failures: u64,
    /// Responses that were not valid vector tiles
    pub decode_failures: u64,
    /// Responses dropped because the zoom changed mid-flight
    pub stale_responses: u64,
    /// Full tile renders performed (initial and repaint)
    pub tiles_rendered: u64,
    /// Tiles currently tracked as visible
    pub visible_tiles: usize,
    /// Tiles with retained drawn state
    pub drawn_tiles: usize,
    /// Features currently registered
    pub features: usize,
    /// Ids currently selected
    pub selected_features: usize,
    /// Coalesced redraw flushes performed
    pub redraw_flushes: u64,
    /// When counting started
    pub created_at: Instant,
}

impl SourceStats {
    /// Fraction of dispatched fetches that produced a rendered tile.
    pub fn fetch_success_rate(&self) -> f64 {
        if self.tile_fetches == 0 {
            return 0.0;
        }
        let failures = self.fetch_failures + self.decode_failures + self.stale_responses;
        (self.tile_fetches.saturating_sub(failures)) as f64 / self.tile_fetches as f64
    }

    /// Uptime since counting started.
    pub fn uptime(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

//! Tile availability oracle.
//!
//! An optional manifest answers "does tile (z, x, y) exist?" before any
//! fetch is dispatched. Tiles the oracle rejects are drawn with debug
//! annotation only and never fetched. With no manifest loaded, every tile
//! is assumed available.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::coord::TileKey;

/// Closed `[start, end]` row interval.
pub type YRange = (u32, u32);

/// Availability data: `z -> x -> closed y intervals`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityManifest {
    #[serde(flatten)]
    zooms: HashMap<String, HashMap<String, Vec<YRange>>>,
}

impl AvailabilityManifest {
    /// Build a manifest from already-typed interval data.
    pub fn from_intervals(data: HashMap<u8, HashMap<u32, Vec<YRange>>>) -> Self {
        let zooms = data
            .into_iter()
            .map(|(z, columns)| {
                (
                    z.to_string(),
                    columns
                        .into_iter()
                        .map(|(x, ranges)| (x.to_string(), ranges))
                        .collect(),
                )
            })
            .collect();
        Self { zooms }
    }

    /// Parse a manifest from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether the manifest lists the tile.
    ///
    /// True iff the zoom exists, the column exists under it, and the row
    /// falls within one of the listed closed intervals.
    pub fn contains(&self, key: &TileKey) -> bool {
        self.zooms
            .get(&key.z.to_string())
            .and_then(|columns| columns.get(&key.x.to_string()))
            .map(|ranges| ranges.iter().any(|&(start, end)| key.y >= start && key.y <= end))
            .unwrap_or(false)
    }
}

/// Where a manifest comes from.
#[derive(Clone)]
pub enum ManifestSource {
    /// A literal manifest value.
    Value(AvailabilityManifest),
    /// An async producer, re-invoked by `refresh()`.
    Producer(
        Arc<
            dyn Fn() -> Pin<Box<dyn Future<Output = Option<AvailabilityManifest>> + Send>>
                + Send
                + Sync,
        >,
    ),
}

impl std::fmt::Debug for ManifestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestSource::Value(_) => f.write_str("Value(..)"),
            ManifestSource::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// The oracle: answers availability queries once its manifest settles.
///
/// Until initialization completes (or when no source is configured) every
/// tile is reported available.
#[derive(Debug, Default)]
pub struct AvailabilityOracle {
    manifest: std::sync::Mutex<Option<AvailabilityManifest>>,
    source: std::sync::Mutex<Option<ManifestSource>>,
}

impl AvailabilityOracle {
    /// Create an oracle with no manifest; everything is available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the manifest source and load it.
    ///
    /// A `Value` source applies synchronously; a `Producer` source is
    /// awaited. A producer that yields `None` leaves the oracle open.
    pub async fn set_source(&self, source: ManifestSource) {
        *self.source.lock().unwrap() = Some(source.clone());
        match source {
            ManifestSource::Value(manifest) => {
                *self.manifest.lock().unwrap() = Some(manifest);
            }
            ManifestSource::Producer(producer) => {
                let loaded = producer().await;
                *self.manifest.lock().unwrap() = loaded;
            }
        }
    }

    /// Re-pull a producer-based source. Value sources are unchanged.
    pub async fn refresh(&self) {
        let source = self.source.lock().unwrap().clone();
        if let Some(ManifestSource::Producer(producer)) = source {
            if let Some(manifest) = producer().await {
                *self.manifest.lock().unwrap() = Some(manifest);
            }
        }
    }

    /// Whether a tile should be fetched.
    pub fn is_available(&self, key: &TileKey) -> bool {
        match self.manifest.lock().unwrap().as_ref() {
            Some(manifest) => manifest.contains(key),
            None => true,
        }
    }

    /// Drop the manifest and its source.
    pub fn clear(&self) {
        *self.manifest.lock().unwrap() = None;
        *self.source.lock().unwrap() = None;
    }
}

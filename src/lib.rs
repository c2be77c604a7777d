//! mvtlayer - Interactive vector tile overlays for raster slippy maps
//!
//! This library renders Mapbox Vector Tile (MVT/PBF) data as an interactive
//! overlay on top of a host map runtime that only understands raster tiles.
//! Decoded tile features are tracked across tile boundaries under a stable
//! feature identity, so individual features can be styled, hovered, selected
//! and replaced with higher-detail geometry while the map pans and zooms.
//!
//! # High-Level API
//!
//! The [`source`] module provides the facade that hosts interact with:
//!
//! ```ignore
//! use mvtlayer::source::{MvtSource, SourceConfig};
//!
//! let config = SourceConfig::new("https://tiles.example.com/{z}/{x}/{y}.pbf");
//! let source = MvtSource::new(config, host, fetcher, logger)?;
//!
//! // Host tile-provider contract
//! let tile = source.get_tile(key, zoom);
//! source.set_selected_features(&["road:42".into()]);
//! ```

pub mod color;
pub mod coord;
pub mod error;
pub mod feature;
pub mod fetch;
pub mod hit;
pub mod host;
pub mod log;
pub mod manifest;
pub mod merge;
pub mod mvt;
pub mod render;
pub mod sched;
pub mod source;
pub mod style;
pub mod tile;

/// Version of the mvtlayer library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

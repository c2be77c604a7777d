//! Shared fixtures for the end-to-end scenario tests.

#![allow(dead_code)]

use std::sync::Arc;

use geozero::mvt::{tile, Message, Tile};

use mvtlayer::coord::TileKey;
use mvtlayer::fetch::MockFetcher;
use mvtlayer::host::{MockHost, RecordingSink};
use mvtlayer::log::NoOpLogger;
use mvtlayer::source::{MvtSource, SourceConfig};

pub const URL_TEMPLATE: &str = "https://tiles.test/{z}/{x}/{y}.pbf";

/// Zigzag-encode a delta.
pub fn zigzag(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

/// MVT command integer.
pub fn command(id: u32, count: u32) -> u32 {
    (count << 3) | id
}

/// Command stream for a closed square with origin `(x, y)`.
pub fn square_commands(x: i32, y: i32, size: i32) -> Vec<u32> {
    vec![
        command(1, 1),
        zigzag(x),
        zigzag(y),
        command(2, 3),
        zigzag(size),
        zigzag(0),
        zigzag(0),
        zigzag(size),
        zigzag(-size),
        zigzag(0),
        command(7, 1),
    ]
}

/// A polygon feature with a wire id.
pub fn polygon_feature(id: u64, x: i32, y: i32, size: i32) -> tile::Feature {
    tile::Feature {
        id: Some(id),
        tags: vec![],
        r#type: Some(3),
        geometry: square_commands(x, y, size),
    }
}

/// A point feature with a wire id.
pub fn point_feature(id: u64, x: i32, y: i32) -> tile::Feature {
    tile::Feature {
        id: Some(id),
        tags: vec![],
        r#type: Some(1),
        geometry: vec![command(1, 1), zigzag(x), zigzag(y)],
    }
}

/// A single-part line feature with a wire id.
pub fn line_feature(id: u64, from: (i32, i32), to: (i32, i32)) -> tile::Feature {
    tile::Feature {
        id: Some(id),
        tags: vec![],
        r#type: Some(2),
        geometry: vec![
            command(1, 1),
            zigzag(from.0),
            zigzag(from.1),
            command(2, 1),
            zigzag(to.0 - from.0),
            zigzag(to.1 - from.1),
        ],
    }
}

/// Encode a one-layer tile.
pub fn encode_tile(layer_name: &str, features: Vec<tile::Feature>) -> Vec<u8> {
    Tile {
        layers: vec![tile::Layer {
            version: 2,
            name: layer_name.to_string(),
            features,
            keys: vec![],
            values: vec![],
            extent: Some(4096),
        }],
    }
    .encode_to_vec()
}

/// Expanded fetch URL for a tile key.
pub fn url_for(key: &TileKey) -> String {
    format!("https://tiles.test/{}/{}/{}.pbf", key.z, key.x, key.y)
}

/// A fully wired source with in-memory collaborators.
pub struct Harness {
    pub host: Arc<MockHost>,
    pub sink: Arc<RecordingSink>,
    pub fetcher: Arc<MockFetcher>,
    pub source: MvtSource,
}

impl Harness {
    /// Build a harness at the given zoom.
    pub fn new(config: SourceConfig, zoom: u8) -> Self {
        let host = Arc::new(MockHost::new(zoom));
        let sink = Arc::new(RecordingSink::new());
        let fetcher = Arc::new(MockFetcher::new());
        let source = MvtSource::new(
            config,
            Arc::clone(&host) as _,
            Some(Arc::clone(&sink) as _),
            Arc::clone(&fetcher) as _,
            Arc::new(NoOpLogger),
        )
        .expect("source construction");
        Self {
            host,
            sink,
            fetcher,
            source,
        }
    }

    /// Can a tile response and request it, waiting for the render.
    pub async fn load_tile(
        &self,
        key: TileKey,
        bytes: Vec<u8>,
    ) -> Arc<mvtlayer::tile::TileContext> {
        self.fetcher.insert(url_for(&key), bytes);
        let ctx = self.source.get_tile(key, key.z).expect("get_tile");
        self.source.tile_loaded().await;
        ctx
    }
}

//! Per-tile geometry fragments and their bounded cache entries.

use std::sync::Arc;

use crate::coord::TilePoint;
use crate::mvt::{GeomPoint, VectorTileFeature};

/// Features below this vertex count are rebuilt on demand; the allocation
/// cost of caching exceeds the lookup savings.
pub const CACHE_MIN_VERTICES: usize = 50;

/// Maximum tiles with live cached geometry per feature.
pub const FRAGMENT_CACHE_CAP: usize = 50;

/// One feature's contribution to one tile.
#[derive(Debug, Clone)]
pub struct TileFragment {
    /// The decoded feature backing this fragment
    pub source: Arc<VectorTileFeature>,
    /// `extent / tile_size`, fixed once computed for this tile
    pub divisor: f64,
    /// Hash of the decoded geometry, detects reference changes
    pub geometry_hash: u64,
    /// Cached canvas-space geometry; dropped under cache pressure
    pub(super) cached: Option<CachedGeometry>,
    /// LRU tick of the last cache touch
    pub(super) last_used: u64,
}

impl TileFragment {
    /// Create an uncached fragment.
    pub fn new(source: Arc<VectorTileFeature>, divisor: f64, geometry_hash: u64) -> Self {
        Self {
            source,
            divisor,
            geometry_hash,
            cached: None,
            last_used: 0,
        }
    }
}

/// Computed geometry for one (feature, tile) pair.
#[derive(Clone)]
pub struct CachedGeometry {
    /// Drawable canvas-space path; `None` when every sub-path was empty
    pub path: Option<tiny_skia::Path>,
    /// Canvas-space vertices grouped by ring/part, for hit testing
    pub raw_points: Arc<Vec<Vec<TilePoint>>>,
    /// Total vertex count across parts
    pub vertex_count: usize,
    /// Hash of the geometry this was computed from
    pub geometry_hash: u64,
}

impl std::fmt::Debug for CachedGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedGeometry")
            .field("has_path", &self.path.is_some())
            .field("parts", &self.raw_points.len())
            .field("vertex_count", &self.vertex_count)
            .field("geometry_hash", &self.geometry_hash)
            .finish()
    }
}

/// Hash a feature's decoded integer geometry for cache invalidation.
///
/// Built from the ring count and the first and last vertex of up to three
/// rings; cheap to compute and sensitive to the reference swaps that
/// matter (a re-decoded tile replacing a feature's geometry).
pub fn geometry_hash(parts: &[Vec<GeomPoint>]) -> u64 {
    // FNV-1a over a few distinguished vertices.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut mix = |v: u64| {
        hash ^= v;
        hash = hash.wrapping_mul(0x1000_0000_01b3);
    };

    mix(parts.len() as u64);
    for part in parts.iter().take(3) {
        mix(part.len() as u64);
        for point in [part.first(), part.last()].into_iter().flatten() {
            mix(point.x as u32 as u64);
            mix(point.y as u32 as u64);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(points: &[(i32, i32)]) -> Vec<Vec<GeomPoint>> {
        vec![points.iter().map(|&(x, y)| GeomPoint::new(x, y)).collect()]
    }

    #[test]
    fn hash_is_stable_for_equal_geometry() {
        let a = parts(&[(0, 0), (1, 1), (2, 0)]);
        let b = parts(&[(0, 0), (1, 1), (2, 0)]);
        assert_eq!(geometry_hash(&a), geometry_hash(&b));
    }

    #[test]
    fn hash_differs_on_endpoint_change() {
        let a = parts(&[(0, 0), (1, 1), (2, 0)]);
        let b = parts(&[(0, 0), (1, 1), (3, 0)]);
        assert_ne!(geometry_hash(&a), geometry_hash(&b));
    }

    #[test]
    fn hash_differs_on_ring_count_change() {
        let a = parts(&[(0, 0), (1, 1)]);
        let mut b = a.clone();
        b.push(vec![GeomPoint::new(9, 9)]);
        assert_ne!(geometry_hash(&a), geometry_hash(&b));
    }

    #[test]
    fn hash_ignores_rings_beyond_third() {
        let base: Vec<Vec<GeomPoint>> = (0..4)
            .map(|i| vec![GeomPoint::new(i, 0), GeomPoint::new(i, 1)])
            .collect();
        let mut changed = base.clone();
        changed[3][0] = GeomPoint::new(99, 99);
        // Same ring count, first three rings identical.
        assert_eq!(geometry_hash(&base), geometry_hash(&changed));
    }

    #[test]
    fn empty_geometry_hashes() {
        assert_eq!(geometry_hash(&[]), geometry_hash(&[]));
        assert_ne!(geometry_hash(&[]), geometry_hash(&parts(&[(0, 0)])));
    }
}

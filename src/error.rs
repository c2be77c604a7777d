//! Source-level error types.
//!
//! Most failure modes in the engine degrade locally (a tile turns
//! debug-only, a feature is skipped); these errors cover the construction
//! and disposal surface where a caller can actually react.

use thiserror::Error;

/// Errors surfaced by the source facade.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The tile canvas could not be allocated.
    #[error("failed to allocate a {width}x{height} tile canvas")]
    CanvasAllocation { width: u32, height: u32 },

    /// Configuration rejected at construction.
    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),

    /// A public method was called after `dispose()`.
    #[error("source has been disposed")]
    Disposed,
}

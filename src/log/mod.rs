//! Logging abstraction layer.
//!
//! The engine logs through an injected [`Logger`] handle rather than a
//! process-wide sink, so embedders can route diagnostics wherever their
//! host runtime wants them.
//!
//! - `Logger` trait: the interface components log through
//! - `TracingLogger`: production adapter delegating to the `tracing` crate
//! - `NoOpLogger`: silent logger for tests
//!
//! Components accept an `Arc<dyn Logger>` and use the `log_*!` macros:
//!
//! ```
//! use mvtlayer::log::{Logger, NoOpLogger};
//! use mvtlayer::log_warn;
//! use std::sync::Arc;
//!
//! let logger: Arc<dyn Logger> = Arc::new(NoOpLogger);
//! log_warn!(logger, "tile {} dropped", "12:4:7");
//! ```

mod noop;
mod tracing_adapter;
mod r#trait;

pub use noop::NoOpLogger;
pub use r#trait::{LogLevel, Logger};
pub use tracing_adapter::TracingLogger;

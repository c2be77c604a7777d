//! Tracing library adapter implementation.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

/// Logger implementation that delegates to the `tracing` crate.
///
/// Bridges the engine's `Logger` trait to the `tracing` ecosystem so hosts
/// that already run a subscriber get structured output for free.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    /// Create a new tracing logger adapter.
    pub fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        match level {
            LogLevel::Trace => tracing::trace!("{}", args),
            LogLevel::Debug => tracing::debug!("{}", args),
            LogLevel::Info => tracing::info!("{}", args),
            LogLevel::Warn => tracing::warn!("{}", args),
            LogLevel::Error => tracing::error!("{}", args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_logger_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TracingLogger>();
    }

    #[test]
    fn tracing_logger_as_trait_object() {
        let logger: Box<dyn Logger> = Box::new(TracingLogger::new());
        logger.debug(format_args!("routed through tracing"));
    }
}

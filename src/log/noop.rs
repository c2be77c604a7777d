//! No-operation logger implementation.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

/// A logger that discards all messages.
///
/// The default for unit tests, where redraw and fetch diagnostics would
/// be noise.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    #[inline]
    fn log(&self, _level: LogLevel, _args: Arguments<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_logger_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoOpLogger>();
    }

    #[test]
    fn noop_logger_as_trait_object() {
        let logger: Box<dyn Logger> = Box::new(NoOpLogger);
        logger.info(format_args!("discarded"));
        logger.error(format_args!("also discarded"));
    }
}

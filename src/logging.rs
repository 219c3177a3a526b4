//! Pluggable diagnostic logging
//!
//! Inputs and outputs report runtime failures (dial errors, decode errors,
//! dropped connections) through a [`Logger`] owned by the component instance.
//! The default is [`NullLogger`]; [`TracingLogger`] forwards to `tracing`.
//! Logging never affects delivery.

use std::fmt;
use std::sync::Arc;

use tracing::Level;

/// Diagnostic sink for component events
pub trait Logger: Send + Sync {
    /// Record one diagnostic message
    fn log(&self, level: Level, args: fmt::Arguments<'_>);
}

/// Shared logger handle
pub type SharedLogger = Arc<dyn Logger>;

/// Logger that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Level, _args: fmt::Arguments<'_>) {}
}

/// Logger that emits `tracing` events under a fixed component name
#[derive(Debug, Clone)]
pub struct TracingLogger {
    component: &'static str,
}

impl TracingLogger {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new("dnstap")
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let component = self.component;
        match level {
            Level::ERROR => tracing::error!(component, "{}", args),
            Level::WARN => tracing::warn!(component, "{}", args),
            Level::INFO => tracing::info!(component, "{}", args),
            Level::DEBUG => tracing::debug!(component, "{}", args),
            _ => tracing::trace!(component, "{}", args),
        }
    }
}

/// The default logger for new components
pub fn null_logger() -> SharedLogger {
    Arc::new(NullLogger)
}


#[cfg(test)]
mod tests {
    use super::test_support::CollectingLogger;
    use super::*;

    #[test]
    fn test_collecting_logger() {
        let logger = CollectingLogger::default();
        logger.log(Level::WARN, format_args!("dial failed: {}", "refused"));

        let messages = logger.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, Level::WARN);
        assert!(logger.contains("refused"));
    }

    #[test]
    fn test_null_and_tracing_loggers_accept_all_levels() {
        let loggers: Vec<SharedLogger> = vec![null_logger(), Arc::new(TracingLogger::default())];
        for logger in loggers {
            for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE] {
                logger.log(level, format_args!("message"));
            }
        }
    }
}

//! Token counting and the tracing-backed log capability.

use gatekeeper_engine::{LogLevel, LogService, TokenCounter};
use tracing::{debug, error, info, warn};

/// Rough token estimate: one token per four characters, rounded up.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Forwards validator log calls to `tracing` under the `gatekeeper` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

impl LogService for TracingLog {
    fn log(&self, level: LogLevel, message: &str, metadata: Option<&serde_json::Value>) {
        let metadata = metadata.map(|m| m.to_string()).unwrap_or_default();
        match level {
            LogLevel::Debug => debug!(target: "gatekeeper", metadata = %metadata, "{}", message),
            LogLevel::Info => info!(target: "gatekeeper", metadata = %metadata, "{}", message),
            LogLevel::Warn => warn!(target: "gatekeeper", metadata = %metadata, "{}", message),
            LogLevel::Error => error!(target: "gatekeeper", metadata = %metadata, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_estimated_from_characters() {
        let counter = ApproxTokenCounter;
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
        assert_eq!(counter.count(&"x".repeat(400)), 100);
    }

    #[test]
    fn logging_without_a_subscriber_is_harmless() {
        TracingLog.info("hello", Some(&serde_json::json!({"k": 1})));
        TracingLog.error("bye", None);
    }
}

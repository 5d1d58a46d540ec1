//! Driver logger
//!
//! Every message is emitted as a `tracing` event and, when the caller
//! supplied one, forwarded to their sink.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Log levels understood by caller-supplied sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Caller-supplied log sink: `(level, message, meta)`
pub type LogSink = Arc<dyn Fn(LogLevel, &str, &Value) + Send + Sync>;

/// Logger bound to one driver instance
#[derive(Clone)]
pub struct DriverLogger {
    driver_id: String,
    provider: &'static str,
    sink: Option<LogSink>,
}

impl fmt::Debug for DriverLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverLogger")
            .field("driver_id", &self.driver_id)
            .field("provider", &self.provider)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl DriverLogger {
    pub fn new(driver_id: impl Into<String>, provider: &'static str, sink: Option<LogSink>) -> Self {
        Self {
            driver_id: driver_id.into(),
            provider,
            sink,
        }
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn debug(&self, message: &str, meta: Value) {
        tracing::debug!(driver = %self.driver_id, provider = self.provider, meta = %meta, "{}", message);
        self.forward(LogLevel::Debug, message, &meta);
    }

    pub fn info(&self, message: &str, meta: Value) {
        tracing::info!(driver = %self.driver_id, provider = self.provider, meta = %meta, "{}", message);
        self.forward(LogLevel::Info, message, &meta);
    }

    pub fn warn(&self, message: &str, meta: Value) {
        tracing::warn!(driver = %self.driver_id, provider = self.provider, meta = %meta, "{}", message);
        self.forward(LogLevel::Warn, message, &meta);
    }

    pub fn error(&self, message: &str, meta: Value) {
        tracing::error!(driver = %self.driver_id, provider = self.provider, meta = %meta, "{}", message);
        self.forward(LogLevel::Error, message, &meta);
    }

    /// A panicking sink is contained here; logging never takes a run down.
    fn forward(&self, level: LogLevel, message: &str, meta: &Value) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| sink(level, message, meta))).is_err() {
            tracing::warn!(driver = %self.driver_id, "Log sink panicked, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_absent_sink_is_noop() {
        let logger = DriverLogger::new("d1", "gcp", None);
        logger.error("nothing listens", json!({}));
    }

    #[test]
    fn test_sink_receives_level_message_and_meta() {
        let seen: Arc<Mutex<Vec<(LogLevel, String, Value)>>> = Arc::default();
        let captured = seen.clone();
        let sink: LogSink = Arc::new(move |level, message, meta| {
            captured
                .lock()
                .unwrap()
                .push((level, message.to_string(), meta.clone()));
        });

        let logger = DriverLogger::new("d1", "gcp", Some(sink));
        logger.warn("service failed", json!({ "service": "storage" }));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, LogLevel::Warn);
        assert_eq!(seen[0].1, "service failed");
        assert_eq!(seen[0].2["service"], "storage");
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let sink: LogSink = Arc::new(|_, _, _| panic!("sink exploded"));
        let logger = DriverLogger::new("d1", "gcp", Some(sink));
        logger.info("still fine", json!(null));
    }
}

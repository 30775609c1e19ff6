//! Where lifecycle events go.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn, Level};

/// Receives execution, stage, job, step and artifact events.
///
/// `event_type` is one of the dotted names in [`super::names`]; the payload is
/// a JSON object carrying at least `execution_id`.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Called by workers as an execution progresses.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Called from the synchronous engine API (queueing, cancel, rejection).
    ///
    /// Must return promptly and never panic.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Engine default: drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing`, tagged with the execution they belong to.
///
/// Failure events (`*.failed`) are always logged at WARN; everything else
/// uses the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Logs non-failure events at `level` (anything but DEBUG means INFO).
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn log(&self, event_type: &str, data: Option<&Value>) {
        let execution_id = data
            .and_then(|d| d.get("execution_id"))
            .and_then(Value::as_str)
            .unwrap_or("-");
        if event_type.ends_with(".failed") {
            warn!(event_type, execution_id, payload = ?data, "Pipeline event");
        } else if self.level == Level::DEBUG {
            debug!(event_type, execution_id, payload = ?data, "Pipeline event");
        } else {
            info!(event_type, execution_id, payload = ?data, "Pipeline event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, data.as_ref());
    }
}

/// One event as received by a [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Dotted event name.
    pub event_type: String,
    /// Payload as emitted.
    pub data: Option<Value>,
}

impl RecordedEvent {
    fn field(&self, name: &str) -> Option<&str> {
        self.data.as_ref()?.get(name)?.as_str()
    }
}

/// Keeps every event in arrival order so tests can check what a run reported.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True before the first event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Event names in arrival order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Events whose name starts with `prefix`, e.g. `"stage."`.
    #[must_use]
    pub fn matching(&self, prefix: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Everything reported about one execution.
    #[must_use]
    pub fn for_execution(&self, execution_id: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.field("execution_id") == Some(execution_id))
            .cloned()
            .collect()
    }

    /// Index of the first `event_type` event whose payload has `field == value`.
    #[must_use]
    pub fn position(&self, event_type: &str, field: &str, value: &str) -> Option<usize> {
        self.events
            .read()
            .iter()
            .position(|e| e.event_type == event_type && e.field(field) == Some(value))
    }

    fn record(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push(RecordedEvent {
            event_type: event_type.to_string(),
            data,
        });
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::names;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_sink_accepts_anything() {
        let sink = NoOpEventSink;
        sink.emit(names::EXECUTION_STARTED, None).await;
        sink.try_emit(names::EXECUTION_QUEUED, Some(json!({ "execution_id": "e" })));
    }

    #[tokio::test]
    async fn test_logging_sink_handles_missing_execution_id() {
        let sink = LoggingEventSink::new(Level::DEBUG);
        sink.emit(names::STAGE_FAILED, Some(json!({ "stage": "build" }))).await;
        sink.try_emit(names::EXECUTION_COMPLETED, None);
        LoggingEventSink::default()
            .try_emit(names::JOB_STARTED, Some(json!(["not", "an", "object"])));
    }

    #[tokio::test]
    async fn test_collecting_sink_groups_by_execution() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        let build = |id: &str| Some(json!({ "execution_id": id, "stage": "build" }));
        sink.emit(names::STAGE_STARTED, build("a")).await;
        sink.try_emit(names::STAGE_STARTED, build("b"));
        sink.try_emit(names::STAGE_COMPLETED, build("a"));
        sink.try_emit(names::STEP_STARTED, None);

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.matching("stage.").len(), 3);
        assert_eq!(sink.for_execution("a").len(), 2);
        assert_eq!(sink.position(names::STAGE_COMPLETED, "stage", "build"), Some(2));
        assert_eq!(sink.position(names::STAGE_COMPLETED, "stage", "deploy"), None);
        assert_eq!(
            sink.event_types(),
            vec![
                names::STAGE_STARTED,
                names::STAGE_STARTED,
                names::STAGE_COMPLETED,
                names::STEP_STARTED
            ]
        );
    }
}

//! Structured diagnostic events and the per-event warning policy.
//!
//! The pipeline never formats user-facing warning text. It raises a
//! [`DiagnosticEvent`] (an [`EventId`] plus key/value context) and the
//! [`WarningsConfiguration`] decides whether that event is logged through a
//! [`DiagnosticsSink`], ignored, or turned into an error.
//!
//! ```rust
//! use quarry_query::diagnostics::{EventId, WarningBehavior, WarningsConfigurationBuilder};
//!
//! let warnings = WarningsConfigurationBuilder::new()
//!     .default_behavior(WarningBehavior::Log)
//!     .throw(&[EventId::ClientEvaluation])
//!     .build();
//!
//! assert_eq!(warnings.behavior_for(EventId::ClientEvaluation), WarningBehavior::Throw);
//! assert_eq!(warnings.behavior_for(EventId::IncludeIgnored), WarningBehavior::Log);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ErrorCode, QueryError, QueryResult};

/// Identity of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventId {
    /// Part of a query is evaluated in process after fetching rows.
    ClientEvaluation,
    /// An include was dropped because its source is not part of the result.
    IncludeIgnored,
}

impl EventId {
    /// Stable name used in logs and configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClientEvaluation => "client_evaluation",
            Self::IncludeIgnored => "include_ignored",
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One raised event with its context.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticEvent {
    /// Which event.
    pub id: EventId,
    /// Key/value context, in insertion order.
    pub context: Vec<(&'static str, String)>,
}

impl DiagnosticEvent {
    /// Create an event without context.
    pub fn new(id: EventId) -> Self {
        Self {
            id,
            context: Vec::new(),
        }
    }

    /// Attach a context field.
    pub fn with(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Look up a context field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// What happens when a warning event is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningBehavior {
    /// Raise an error.
    Throw,
    /// Send to the diagnostics sink.
    #[default]
    Log,
    /// Drop silently.
    Ignore,
}

/// Default behavior plus explicit per-event overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarningsConfiguration {
    default_behavior: WarningBehavior,
    explicit: HashMap<EventId, WarningBehavior>,
}

impl WarningsConfiguration {
    /// The behavior used for events without an override.
    pub fn default_behavior(&self) -> WarningBehavior {
        self.default_behavior
    }

    /// Resolve the behavior for one event.
    pub fn behavior_for(&self, id: EventId) -> WarningBehavior {
        self.explicit
            .get(&id)
            .copied()
            .unwrap_or(self.default_behavior)
    }

    fn add_explicit(&mut self, ids: &[EventId], behavior: WarningBehavior) {
        for id in ids {
            self.explicit.insert(*id, behavior);
        }
    }
}

/// Builder for [`WarningsConfiguration`].
#[derive(Debug, Clone, Default)]
pub struct WarningsConfigurationBuilder {
    configuration: WarningsConfiguration,
}

impl WarningsConfigurationBuilder {
    /// Start from the default (log everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the behavior for events without an explicit override.
    pub fn default_behavior(mut self, behavior: WarningBehavior) -> Self {
        self.configuration.default_behavior = behavior;
        self
    }

    /// Raise an error for these events.
    pub fn throw(mut self, ids: &[EventId]) -> Self {
        self.configuration.add_explicit(ids, WarningBehavior::Throw);
        self
    }

    /// Log these events.
    pub fn log(mut self, ids: &[EventId]) -> Self {
        self.configuration.add_explicit(ids, WarningBehavior::Log);
        self
    }

    /// Drop these events.
    pub fn ignore(mut self, ids: &[EventId]) -> Self {
        self.configuration.add_explicit(ids, WarningBehavior::Ignore);
        self
    }

    /// Finish the configuration.
    pub fn build(self) -> WarningsConfiguration {
        self.configuration
    }
}

/// Receiver of logged diagnostic events.
pub trait DiagnosticsSink: Send + Sync {
    /// Record one event.
    fn log(&self, event: &DiagnosticEvent);
}

/// Sink forwarding events to `tracing` at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn log(&self, event: &DiagnosticEvent) {
        warn!(event_id = %event.id, context = ?event.context, "query diagnostic");
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events with this id.
    pub fn count(&self, id: EventId) -> usize {
        self.events.lock().iter().filter(|e| e.id == id).count()
    }
}

impl DiagnosticsSink for MemorySink {
    fn log(&self, event: &DiagnosticEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Applies a [`WarningsConfiguration`] in front of a sink.
#[derive(Clone)]
pub struct Diagnostics {
    warnings: WarningsConfiguration,
    sink: Arc<dyn DiagnosticsSink>,
}

impl Diagnostics {
    /// Create with a policy and a sink.
    pub fn new(warnings: WarningsConfiguration, sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self { warnings, sink }
    }

    /// The policy in effect.
    pub fn warnings(&self) -> &WarningsConfiguration {
        &self.warnings
    }

    /// Raise an event. Returns an error only when the event is configured to throw.
    pub fn emit(&self, event: DiagnosticEvent) -> QueryResult<()> {
        match self.warnings.behavior_for(event.id) {
            WarningBehavior::Throw => {
                let mut message = format!("Warning '{}' was raised as an error", event.id);
                for (key, value) in &event.context {
                    message.push_str(&format!("; {}={}", key, value));
                }
                Err(QueryError::new(ErrorCode::WarningAsError, message)
                    .with_suggestion("Configure this event to log or ignore instead of throw"))
            }
            WarningBehavior::Log => {
                self.sink.log(&event);
                Ok(())
            }
            WarningBehavior::Ignore => Ok(()),
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(WarningsConfiguration::default(), Arc::new(TracingSink))
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_overrides_default() {
        let config = WarningsConfigurationBuilder::new()
            .default_behavior(WarningBehavior::Throw)
            .ignore(&[EventId::IncludeIgnored])
            .build();

        assert_eq!(config.behavior_for(EventId::ClientEvaluation), WarningBehavior::Throw);
        assert_eq!(config.behavior_for(EventId::IncludeIgnored), WarningBehavior::Ignore);
    }

    #[test]
    fn test_later_override_wins() {
        let config = WarningsConfigurationBuilder::new()
            .throw(&[EventId::ClientEvaluation])
            .log(&[EventId::ClientEvaluation])
            .build();
        assert_eq!(config.behavior_for(EventId::ClientEvaluation), WarningBehavior::Log);
    }

    #[test]
    fn test_emit_logs_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let diagnostics = Diagnostics::new(WarningsConfiguration::default(), sink.clone());

        diagnostics
            .emit(DiagnosticEvent::new(EventId::ClientEvaluation).with("expression", "x.reverse()"))
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("expression"), Some("x.reverse()"));
    }

    #[test]
    fn test_emit_throw_and_ignore() {
        let sink = Arc::new(MemorySink::new());
        let warnings = WarningsConfigurationBuilder::new()
            .throw(&[EventId::IncludeIgnored])
            .ignore(&[EventId::ClientEvaluation])
            .build();
        let diagnostics = Diagnostics::new(warnings, sink.clone());

        let err = diagnostics
            .emit(DiagnosticEvent::new(EventId::IncludeIgnored).with("path", "Lines"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::WarningAsError);
        assert!(err.message.contains("path=Lines"));

        diagnostics
            .emit(DiagnosticEvent::new(EventId::ClientEvaluation))
            .unwrap();
        assert!(sink.events().is_empty());
    }
}

//! Execution history events
//!
//! The raw, append-only event log of one execution as handed over by the
//! backend. Events are never mutated here; see `compact` for grouping.

use std::fmt;

use crate::model::{ExecutionRef, Failure};

/// Ascending event identifier within one execution's history
pub type EventId = i64;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    WorkflowExecutionStarted,
    WorkflowExecutionCompleted,
    WorkflowExecutionFailed,
    WorkflowExecutionTimedOut,
    WorkflowExecutionCanceled,
    WorkflowExecutionCancelRequested,
    WorkflowExecutionTerminated,
    WorkflowExecutionContinuedAsNew,
    WorkflowExecutionSignaled,
    WorkflowTaskScheduled,
    WorkflowTaskStarted,
    WorkflowTaskCompleted,
    WorkflowTaskTimedOut,
    WorkflowTaskFailed,
    ActivityTaskScheduled,
    ActivityTaskStarted,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    ActivityTaskTimedOut,
    ActivityTaskCancelRequested,
    ActivityTaskCanceled,
    TimerStarted,
    TimerFired,
    TimerCanceled,
    StartChildWorkflowExecutionInitiated,
    StartChildWorkflowExecutionFailed,
    ChildWorkflowExecutionStarted,
    ChildWorkflowExecutionCompleted,
    ChildWorkflowExecutionFailed,
    ChildWorkflowExecutionCanceled,
    ChildWorkflowExecutionTimedOut,
    ChildWorkflowExecutionTerminated,
    MarkerRecorded,
    UpsertWorkflowSearchAttributes,
    /// Anything this build does not know by name, kept in CamelCase form
    Other(String),
}

const KNOWN: &[(&str, EventType)] = &[
    ("WorkflowExecutionStarted", EventType::WorkflowExecutionStarted),
    ("WorkflowExecutionCompleted", EventType::WorkflowExecutionCompleted),
    ("WorkflowExecutionFailed", EventType::WorkflowExecutionFailed),
    ("WorkflowExecutionTimedOut", EventType::WorkflowExecutionTimedOut),
    ("WorkflowExecutionCanceled", EventType::WorkflowExecutionCanceled),
    (
        "WorkflowExecutionCancelRequested",
        EventType::WorkflowExecutionCancelRequested,
    ),
    ("WorkflowExecutionTerminated", EventType::WorkflowExecutionTerminated),
    (
        "WorkflowExecutionContinuedAsNew",
        EventType::WorkflowExecutionContinuedAsNew,
    ),
    ("WorkflowExecutionSignaled", EventType::WorkflowExecutionSignaled),
    ("WorkflowTaskScheduled", EventType::WorkflowTaskScheduled),
    ("WorkflowTaskStarted", EventType::WorkflowTaskStarted),
    ("WorkflowTaskCompleted", EventType::WorkflowTaskCompleted),
    ("WorkflowTaskTimedOut", EventType::WorkflowTaskTimedOut),
    ("WorkflowTaskFailed", EventType::WorkflowTaskFailed),
    ("ActivityTaskScheduled", EventType::ActivityTaskScheduled),
    ("ActivityTaskStarted", EventType::ActivityTaskStarted),
    ("ActivityTaskCompleted", EventType::ActivityTaskCompleted),
    ("ActivityTaskFailed", EventType::ActivityTaskFailed),
    ("ActivityTaskTimedOut", EventType::ActivityTaskTimedOut),
    ("ActivityTaskCancelRequested", EventType::ActivityTaskCancelRequested),
    ("ActivityTaskCanceled", EventType::ActivityTaskCanceled),
    ("TimerStarted", EventType::TimerStarted),
    ("TimerFired", EventType::TimerFired),
    ("TimerCanceled", EventType::TimerCanceled),
    (
        "StartChildWorkflowExecutionInitiated",
        EventType::StartChildWorkflowExecutionInitiated,
    ),
    (
        "StartChildWorkflowExecutionFailed",
        EventType::StartChildWorkflowExecutionFailed,
    ),
    ("ChildWorkflowExecutionStarted", EventType::ChildWorkflowExecutionStarted),
    ("ChildWorkflowExecutionCompleted", EventType::ChildWorkflowExecutionCompleted),
    ("ChildWorkflowExecutionFailed", EventType::ChildWorkflowExecutionFailed),
    ("ChildWorkflowExecutionCanceled", EventType::ChildWorkflowExecutionCanceled),
    ("ChildWorkflowExecutionTimedOut", EventType::ChildWorkflowExecutionTimedOut),
    (
        "ChildWorkflowExecutionTerminated",
        EventType::ChildWorkflowExecutionTerminated,
    ),
    ("MarkerRecorded", EventType::MarkerRecorded),
    ("UpsertWorkflowSearchAttributes", EventType::UpsertWorkflowSearchAttributes),
];

impl EventType {
    /// CamelCase name, e.g. `ActivityTaskScheduled`
    pub fn name(&self) -> &str {
        if let EventType::Other(name) = self {
            return name;
        }
        KNOWN
            .iter()
            .find(|(_, t)| t == self)
            .map(|(name, _)| *name)
            .unwrap_or("Unknown")
    }

    /// Accepts `ActivityTaskScheduled` or the wire form
    /// `EVENT_TYPE_ACTIVITY_TASK_SCHEDULED`
    pub fn parse(s: &str) -> Self {
        let camel = match s.strip_prefix("EVENT_TYPE_") {
            Some(screaming) => screaming_to_camel(screaming),
            None => s.to_string(),
        };
        KNOWN
            .iter()
            .find(|(name, _)| *name == camel)
            .map(|(_, t)| t.clone())
            .unwrap_or(EventType::Other(camel))
    }

    /// Workflow-task bookkeeping events never surface in compacted history
    pub fn is_bookkeeping(&self) -> bool {
        self.name().starts_with("WorkflowTask")
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn screaming_to_camel(s: &str) -> String {
    s.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lower = part.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Serialized user data attached to an event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub data: Vec<u8>,
}

impl Payload {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Pretty JSON when the bytes parse as JSON, raw text otherwise
    pub fn pretty(&self) -> String {
        match serde_json::from_slice::<serde_json::Value>(&self.data) {
            Ok(value) => serde_json::to_string_pretty(&value)
                .unwrap_or_else(|_| String::from_utf8_lossy(&self.data).into_owned()),
            Err(_) => String::from_utf8_lossy(&self.data).into_owned(),
        }
    }
}

/// Type-specific attributes, flattened; which fields are set depends on the
/// event type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventAttributes {
    /// Scheduled / started / initiated event this one continues
    pub back_reference: Option<EventId>,
    /// Activity type, workflow type, timer id or signal name
    pub name: Option<String>,
    pub activity_id: Option<String>,
    pub input: Option<Payload>,
    pub result: Option<Payload>,
    pub failure: Option<Failure>,
    /// Child execution identity, carried by child-started events
    pub child_execution: Option<ExecutionRef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEvent {
    pub event_id: EventId,
    pub event_type: EventType,
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    pub fn new(event_id: EventId, event_type: EventType) -> Self {
        Self {
            event_id,
            event_type,
            attributes: EventAttributes::default(),
        }
    }

    pub fn with_back_reference(mut self, id: EventId) -> Self {
        self.attributes.back_reference = Some(id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.attributes.name = Some(name.into());
        self
    }

    pub fn with_activity_id(mut self, id: impl Into<String>) -> Self {
        self.attributes.activity_id = Some(id.into());
        self
    }

    pub fn with_input(mut self, payload: Payload) -> Self {
        self.attributes.input = Some(payload);
        self
    }

    pub fn with_result(mut self, payload: Payload) -> Self {
        self.attributes.result = Some(payload);
        self
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.attributes.failure = Some(failure);
        self
    }

    pub fn with_child_execution(mut self, execution: ExecutionRef) -> Self {
        self.attributes.child_execution = Some(execution);
        self
    }
}

/// Event a restart resets to: the first completed workflow task
pub fn first_reset_point(events: &[HistoryEvent]) -> Option<EventId> {
    events
        .iter()
        .find(|e| e.event_type == EventType::WorkflowTaskCompleted)
        .map(|e| e.event_id)
}

//! History compaction
//!
//! Groups a flat execution history into display records. Every event plays
//! one of three roles:
//! - opening: starts a record keyed by its own event id
//! - continuation: joins the record named by its back-reference
//! - singleton: a record of its own
//!
//! Workflow-task bookkeeping events are dropped. The build runs in two
//! phases (open everything, then apply continuations) and fails on any
//! continuation whose record does not exist, so a malformed stream surfaces
//! as a `CompactError` naming the offending event.

use std::collections::{BTreeMap, BTreeSet};

use crate::history::{EventId, EventType, HistoryEvent, Payload};
use crate::model::{ExecutionRef, PendingActivityInfo};

/// Id of the event that opened a record
pub type CorrelationKey = EventId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordCategory {
    Activity,
    Timer,
    ChildWorkflow,
    /// Execution-level and miscellaneous events, labelled by type
    Event(EventType),
}

impl RecordCategory {
    pub fn label(&self) -> &str {
        match self {
            RecordCategory::Activity => "Activity",
            RecordCategory::Timer => "Timer",
            RecordCategory::ChildWorkflow => "Child Workflow",
            RecordCategory::Event(event_type) => event_type.name(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Input,
    Output,
    LastError,
    Failure,
}

impl ContentKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Input => "Input",
            ContentKind::Output => "Output",
            ContentKind::LastError => "Last Error",
            ContentKind::Failure => "Failure",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentBlock {
    pub kind: ContentKind,
    pub text: String,
}

impl ContentBlock {
    fn payload(kind: ContentKind, payload: &Payload) -> Self {
        Self {
            kind,
            text: payload.pretty(),
        }
    }
}

/// One correlated group of history events
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactedRecord {
    pub key: CorrelationKey,
    pub category: RecordCategory,
    pub icon: &'static str,
    pub label: String,
    /// Current retry attempt, for activities still pending
    pub attempt: Option<u32>,
    pub content: Vec<ContentBlock>,
    /// Constituent events, opener first
    pub events: Vec<HistoryEvent>,
}

impl CompactedRecord {
    fn open(event: &HistoryEvent, category: RecordCategory, icon: &'static str) -> Self {
        Self {
            key: event.event_id,
            category,
            icon,
            label: event.attributes.name.clone().unwrap_or_default(),
            attempt: None,
            content: Vec::new(),
            events: vec![event.clone()],
        }
    }

    /// Child identity, once the child has actually started
    pub fn child_execution(&self) -> Option<&ExecutionRef> {
        if self.category != RecordCategory::ChildWorkflow {
            return None;
        }
        self.events
            .iter()
            .find(|e| e.event_type == EventType::ChildWorkflowExecutionStarted)
            .and_then(|e| e.attributes.child_execution.as_ref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CompactError {
    #[error("event {event_id} continues record {key}, which was never opened before it")]
    OrphanedContinuation {
        event_id: EventId,
        key: CorrelationKey,
    },
    #[error("event {event_id} ({event_type}) continues record {key} of a different kind")]
    MismatchedContinuation {
        event_id: EventId,
        key: CorrelationKey,
        event_type: EventType,
    },
    #[error("event {event_id} ({event_type}) carries no back-reference")]
    MissingBackReference {
        event_id: EventId,
        event_type: EventType,
    },
    #[error("event {event_id} appears more than once")]
    DuplicateEvent { event_id: EventId },
}

/// Compacted records keyed by correlation key
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactedHistory {
    records: BTreeMap<CorrelationKey, CompactedRecord>,
}

impl CompactedHistory {
    pub fn get(&self, key: CorrelationKey) -> Option<&CompactedRecord> {
        self.records.get(&key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CorrelationKey> {
        self.records.keys()
    }

    /// Display order: most recently opened first
    pub fn ordered(&self) -> Vec<&CompactedRecord> {
        self.records.values().rev().collect()
    }

    /// Record at a display position
    pub fn at(&self, index: usize) -> Option<&CompactedRecord> {
        self.records.values().rev().nth(index)
    }
}

enum Role {
    Opening(RecordCategory),
    Continuation(RecordCategory),
    Singleton,
    Dropped,
}

fn role(event_type: &EventType) -> Role {
    use EventType::*;
    match event_type {
        WorkflowExecutionStarted | WorkflowExecutionCompleted | WorkflowExecutionSignaled => {
            Role::Opening(RecordCategory::Event(event_type.clone()))
        }
        ActivityTaskScheduled => Role::Opening(RecordCategory::Activity),
        TimerStarted => Role::Opening(RecordCategory::Timer),
        StartChildWorkflowExecutionInitiated => Role::Opening(RecordCategory::ChildWorkflow),
        ActivityTaskStarted
        | ActivityTaskCompleted
        | ActivityTaskFailed
        | ActivityTaskTimedOut
        | ActivityTaskCancelRequested
        | ActivityTaskCanceled => Role::Continuation(RecordCategory::Activity),
        TimerFired | TimerCanceled => Role::Continuation(RecordCategory::Timer),
        ChildWorkflowExecutionStarted
        | ChildWorkflowExecutionCompleted
        | ChildWorkflowExecutionFailed => Role::Continuation(RecordCategory::ChildWorkflow),
        other if other.is_bookkeeping() => Role::Dropped,
        _ => Role::Singleton,
    }
}

fn singleton_icon(event_type: &EventType) -> &'static str {
    use EventType::*;
    match event_type {
        WorkflowExecutionFailed | StartChildWorkflowExecutionFailed => "❌",
        WorkflowExecutionTimedOut | ChildWorkflowExecutionTimedOut => "⏰",
        WorkflowExecutionCanceled
        | WorkflowExecutionCancelRequested
        | ChildWorkflowExecutionCanceled => "🚫",
        WorkflowExecutionTerminated | ChildWorkflowExecutionTerminated => "💀",
        WorkflowExecutionContinuedAsNew => "🔄",
        MarkerRecorded => "📌",
        UpsertWorkflowSearchAttributes => "🏷",
        _ => "•",
    }
}

fn open_record(
    event: &HistoryEvent,
    category: RecordCategory,
    pending: &[PendingActivityInfo],
) -> CompactedRecord {
    let attrs = &event.attributes;
    match category {
        RecordCategory::Activity => {
            let mut record = CompactedRecord::open(event, category, "📅");
            let matched = attrs
                .activity_id
                .as_deref()
                .and_then(|id| pending.iter().find(|p| p.activity_id == id));
            if let Some(info) = matched {
                if let Some(failure) = &info.last_failure {
                    record.content.push(ContentBlock {
                        kind: ContentKind::LastError,
                        text: failure.root_message().to_string(),
                    });
                }
                record.label.push_str(&format!(" 🔄{}", info.attempt));
                record.attempt = Some(info.attempt);
            }
            if let Some(input) = &attrs.input {
                record
                    .content
                    .push(ContentBlock::payload(ContentKind::Input, input));
            }
            record
        }
        RecordCategory::Timer => CompactedRecord::open(event, category, "⏰"),
        RecordCategory::ChildWorkflow => {
            let mut record = CompactedRecord::open(event, category, "👶🏃");
            if let Some(input) = &attrs.input {
                record
                    .content
                    .push(ContentBlock::payload(ContentKind::Input, input));
            }
            record
        }
        RecordCategory::Event(ref event_type) => {
            let icon = match event_type {
                EventType::WorkflowExecutionStarted => "🚀",
                EventType::WorkflowExecutionCompleted => "✅",
                EventType::WorkflowExecutionSignaled => "🛜",
                other => singleton_icon(other),
            };
            let mut record = CompactedRecord::open(event, category.clone(), icon);
            match event_type {
                EventType::WorkflowExecutionStarted => record.label = "Workflow started".into(),
                EventType::WorkflowExecutionCompleted if record.label.is_empty() => {
                    record.label = "Workflow completed".into()
                }
                _ => {}
            }
            if let Some(input) = &attrs.input {
                record
                    .content
                    .push(ContentBlock::payload(ContentKind::Input, input));
            }
            if let Some(result) = &attrs.result {
                record
                    .content
                    .push(ContentBlock::payload(ContentKind::Output, result));
            }
            if let Some(failure) = &attrs.failure {
                record.content.push(ContentBlock {
                    kind: ContentKind::Failure,
                    text: failure.root_message().to_string(),
                });
            }
            record
        }
    }
}

fn continuation_icon(event_type: &EventType) -> &'static str {
    use EventType::*;
    match event_type {
        ActivityTaskStarted => "🏃",
        ActivityTaskCompleted => "✅",
        ActivityTaskFailed => "❌",
        ActivityTaskTimedOut => "⏰",
        ActivityTaskCancelRequested | ActivityTaskCanceled => "🚫",
        TimerFired => "🔥",
        TimerCanceled => "🚫",
        ChildWorkflowExecutionStarted => "🏃👶",
        ChildWorkflowExecutionCompleted => "✅👶",
        ChildWorkflowExecutionFailed => "❌👶",
        _ => "•",
    }
}

fn apply_continuation(record: &mut CompactedRecord, event: &HistoryEvent) {
    record.icon = continuation_icon(&event.event_type);
    if let Some(result) = &event.attributes.result {
        record
            .content
            .push(ContentBlock::payload(ContentKind::Output, result));
    }
    if let Some(failure) = &event.attributes.failure {
        record.content.push(ContentBlock {
            kind: ContentKind::Failure,
            text: failure.root_message().to_string(),
        });
    }
    record.events.push(event.clone());
}

/// Compact one execution's history into keyed records.
///
/// Pure: the same events and pending activities always produce the same map.
/// Events must be in ascending id order.
pub fn compact(
    events: &[HistoryEvent],
    pending: &[PendingActivityInfo],
) -> Result<CompactedHistory, CompactError> {
    let mut records: BTreeMap<CorrelationKey, CompactedRecord> = BTreeMap::new();
    let mut continuations: Vec<(&HistoryEvent, RecordCategory)> = Vec::new();
    let mut seen: BTreeSet<EventId> = BTreeSet::new();

    // Phase one: every record that opens itself
    for event in events {
        let role = role(&event.event_type);
        if matches!(role, Role::Dropped) {
            continue;
        }
        // overlapping history pages repeat events
        if !seen.insert(event.event_id) {
            return Err(CompactError::DuplicateEvent {
                event_id: event.event_id,
            });
        }
        let category = match role {
            Role::Dropped => continue,
            Role::Continuation(category) => {
                continuations.push((event, category));
                continue;
            }
            Role::Opening(category) => category,
            Role::Singleton => RecordCategory::Event(event.event_type.clone()),
        };
        records.insert(event.event_id, open_record(event, category, pending));
    }

    // Phase two: attach continuations to the records they reference
    for (event, category) in continuations {
        let key = event
            .attributes
            .back_reference
            .ok_or_else(|| CompactError::MissingBackReference {
                event_id: event.event_id,
                event_type: event.event_type.clone(),
            })?;
        let record = records
            .get_mut(&key)
            .filter(|_| key < event.event_id)
            .ok_or(CompactError::OrphanedContinuation {
                event_id: event.event_id,
                key,
            })?;
        if record.category != category {
            return Err(CompactError::MismatchedContinuation {
                event_id: event.event_id,
                key,
                event_type: event.event_type.clone(),
            });
        }
        apply_continuation(record, event);
    }

    Ok(CompactedHistory { records })
}

//! Drill-down navigation into single executions
//!
//! Each frame holds the compacted history of one execution. An empty stack
//! means the root list is on screen.

use crate::compact::{CompactError, CompactedHistory, CompactedRecord, compact};
use crate::history::HistoryEvent;
use crate::model::{ExecutionDescription, ExecutionInfo, ExecutionRef};

#[derive(Clone, Debug, PartialEq)]
pub struct FocusFrame {
    pub execution: ExecutionRef,
    pub info: ExecutionInfo,
    pub history: CompactedHistory,
    pub cursor: usize,
}

impl FocusFrame {
    /// Compact a freshly fetched execution into a frame with the cursor on
    /// the newest record
    pub fn build(
        execution: ExecutionRef,
        description: &ExecutionDescription,
        events: &[HistoryEvent],
    ) -> Result<Self, CompactError> {
        let history = compact(events, &description.pending_activities)?;
        Ok(Self {
            execution,
            info: description.info.clone(),
            history,
            cursor: 0,
        })
    }

    pub fn selected(&self) -> Option<&CompactedRecord> {
        self.history.at(self.cursor)
    }

    pub fn cursor_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_down(&mut self) {
        if self.cursor + 1 < self.history.len() {
            self.cursor += 1;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FocusError {
    #[error("no execution is focused")]
    Empty,
    #[error("selected record is not a started child workflow")]
    NotAStartedChild,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FocusStack {
    frames: Vec<FocusFrame>,
}

impl FocusStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, mut frame: FocusFrame) {
        frame.cursor = 0;
        self.frames.push(frame);
    }

    /// Remove the top frame; `None` when already at the root list
    pub fn pop(&mut self) -> Option<FocusFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&FocusFrame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut FocusFrame> {
        self.frames.last_mut()
    }

    pub fn frames(&self) -> &[FocusFrame] {
        &self.frames
    }

    /// Child execution under the cursor, if it has started
    pub fn child_target(&self) -> Result<ExecutionRef, FocusError> {
        let frame = self.top().ok_or(FocusError::Empty)?;
        frame
            .selected()
            .and_then(|record| record.child_execution())
            .cloned()
            .ok_or(FocusError::NotAStartedChild)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EventType;
    use crate::model::ExecutionStatus;

    fn description(id: &ExecutionRef) -> ExecutionDescription {
        ExecutionDescription {
            info: ExecutionInfo {
                execution: id.clone(),
                workflow_type: "Parent".into(),
                status: ExecutionStatus::Running,
                start_time: None,
                close_time: None,
                parent: None,
            },
            pending_activities: vec![],
        }
    }

    fn parent_history(child_started: bool) -> Vec<HistoryEvent> {
        let mut events = vec![
            HistoryEvent::new(1, EventType::WorkflowExecutionStarted),
            HistoryEvent::new(2, EventType::WorkflowTaskScheduled),
            HistoryEvent::new(3, EventType::WorkflowTaskStarted),
            HistoryEvent::new(4, EventType::WorkflowTaskCompleted),
            HistoryEvent::new(5, EventType::StartChildWorkflowExecutionInitiated)
                .with_name("Child"),
        ];
        if child_started {
            events.push(
                HistoryEvent::new(6, EventType::ChildWorkflowExecutionStarted)
                    .with_back_reference(5)
                    .with_child_execution(ExecutionRef::new("wf-B", "run-2")),
            );
        }
        events
    }

    fn frame(id: ExecutionRef, child_started: bool) -> FocusFrame {
        let desc = description(&id);
        FocusFrame::build(id, &desc, &parent_history(child_started)).unwrap()
    }

    #[test]
    fn test_push_drill_pop() {
        let mut stack = FocusStack::new();
        assert_eq!(stack.depth(), 0);

        stack.push(frame(ExecutionRef::new("wf-A", "run-1"), true));
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.top().unwrap().cursor, 0);

        // newest record first: the child workflow record is at the cursor
        let child = stack.child_target().unwrap();
        assert_eq!(child, ExecutionRef::new("wf-B", "run-2"));

        stack.push(frame(child.clone(), false));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.top().unwrap().execution, child);

        assert!(stack.pop().is_some());
        assert_eq!(stack.depth(), 1);
        assert!(stack.pop().is_some());
        assert_eq!(stack.depth(), 0);
        assert!(stack.pop().is_none());
    }

    #[test]
    fn test_drill_requires_started_child() {
        let mut stack = FocusStack::new();
        assert_eq!(stack.child_target(), Err(FocusError::Empty));

        stack.push(frame(ExecutionRef::new("wf-A", "run-1"), false));
        assert_eq!(stack.child_target(), Err(FocusError::NotAStartedChild));

        let mut started = frame(ExecutionRef::new("wf-A", "run-1"), true);
        started.cursor_down();
        stack.push(started);
        // push resets the cursor to the top
        assert!(stack.child_target().is_ok());
        stack.top_mut().unwrap().cursor_down();
        assert_eq!(stack.child_target(), Err(FocusError::NotAStartedChild));
    }

    #[test]
    fn test_cursor_bounds() {
        let mut f = frame(ExecutionRef::new("wf-A", "run-1"), true);
        assert_eq!(f.history.len(), 2);
        f.cursor_up();
        assert_eq!(f.cursor, 0);
        f.cursor_down();
        f.cursor_down();
        assert_eq!(f.cursor, 1);
    }

    #[test]
    fn test_build_propagates_compaction_errors() {
        let id = ExecutionRef::new("wf-A", "run-1");
        let events = vec![HistoryEvent::new(9, EventType::TimerFired).with_back_reference(3)];
        assert!(FocusFrame::build(id.clone(), &description(&id), &events).is_err());
    }
}

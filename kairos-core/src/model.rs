use std::fmt;

use chrono::{DateTime, Utc};

pub type WorkflowId = String;
pub type RunId = String;

/// Identity of a single workflow execution
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExecutionRef {
    pub workflow_id: WorkflowId,
    pub run_id: RunId,
}

impl ExecutionRef {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl fmt::Display for ExecutionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workflow_id, self.run_id)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutionStatus {
    #[default]
    Unspecified,
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    ContinuedAsNew,
    TimedOut,
}

impl ExecutionStatus {
    /// Statuses shown as counters in the header, in display order
    pub const HEADLINE: [ExecutionStatus; 5] = [
        ExecutionStatus::Running,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Canceled,
        ExecutionStatus::Terminated,
    ];

    /// Every status a user can filter on
    pub const SEARCHABLE: [ExecutionStatus; 7] = [
        ExecutionStatus::Running,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Canceled,
        ExecutionStatus::Terminated,
        ExecutionStatus::ContinuedAsNew,
        ExecutionStatus::TimedOut,
    ];

    /// Name used by the visibility query language (`ExecutionStatus = 'Running'`)
    pub fn query_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "Unspecified",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
            Self::Terminated => "Terminated",
            Self::ContinuedAsNew => "ContinuedAsNew",
            Self::TimedOut => "TimedOut",
        }
    }

    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            Self::ContinuedAsNew => "Cont. New",
            Self::TimedOut => "Timed Out",
            other => other.query_name(),
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Unspecified => "?",
            Self::Running => "🏃",
            Self::Completed => "✅",
            Self::Failed => "❌",
            Self::Canceled => "✋",
            Self::Terminated => "💀",
            Self::ContinuedAsNew => "🔄",
            Self::TimedOut => "⏰",
        }
    }

    /// Anything but Running is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Parse either the query name (`Running`) or the wire enum
    /// (`WORKFLOW_EXECUTION_STATUS_RUNNING`), case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let bare = trimmed
            .strip_prefix("WORKFLOW_EXECUTION_STATUS_")
            .unwrap_or(trimmed);
        let normalized: String = bare
            .chars()
            .filter(|c| *c != '_' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            "terminated" => Some(Self::Terminated),
            "continuedasnew" => Some(Self::ContinuedAsNew),
            "timedout" => Some(Self::TimedOut),
            "unspecified" => Some(Self::Unspecified),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_name())
    }
}

/// Snapshot of an execution as reported by the visibility store
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionInfo {
    pub execution: ExecutionRef,
    pub workflow_type: String,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    /// Set for child executions
    pub parent: Option<ExecutionRef>,
}

impl ExecutionInfo {
    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }
}

/// Opaque continuation token returned by a list call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageToken(pub Vec<u8>);

impl PageToken {
    /// Empty tokens mean "no further pages"
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            Some(Self(bytes))
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPage {
    pub executions: Vec<ExecutionInfo>,
    pub next_page_token: Option<PageToken>,
}

/// Failure reported by the service, with its chain of causes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub cause: Option<Box<Failure>>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: Failure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Innermost cause message, or this failure's own message
    pub fn root_message(&self) -> &str {
        match &self.cause {
            Some(cause) => cause.root_message(),
            None => &self.message,
        }
    }
}

/// In-flight retry state of an activity that has not resolved yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingActivityInfo {
    pub activity_id: String,
    pub activity_type: String,
    pub attempt: u32,
    pub last_failure: Option<Failure>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionDescription {
    pub info: ExecutionInfo,
    pub pending_activities: Vec<PendingActivityInfo>,
}

impl ExecutionDescription {
    /// Highest attempt across pending activities, 0 when nothing is retrying
    pub fn max_attempt(&self) -> u32 {
        self.pending_activities
            .iter()
            .map(|p| p.attempt)
            .max()
            .unwrap_or(0)
    }
}

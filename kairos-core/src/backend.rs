use async_trait::async_trait;

use crate::history::{EventId, HistoryEvent};
use crate::model::{ExecutionDescription, ExecutionPage, ExecutionRef, PageToken};
use crate::query::Filter;

/// Errors reported by a backend call
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("execution not found: {0}")]
    NotFound(ExecutionRef),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

/// The workflow service as seen by the dashboard.
///
/// Implementations own their own retry/backoff; every error returned here is
/// treated as a failed request and surfaced without retrying.
///
/// - `HttpBackend`: the service's HTTP API
/// - `DemoBackend`: in-memory executions for demos and tests
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_executions(
        &self,
        filter: &Filter,
        page_size: usize,
        page_token: Option<&PageToken>,
    ) -> Result<ExecutionPage, BackendError>;

    async fn count_executions(&self, filter: &Filter) -> Result<u64, BackendError>;

    async fn describe_execution(
        &self,
        execution: &ExecutionRef,
    ) -> Result<ExecutionDescription, BackendError>;

    /// Full history in ascending event order
    async fn get_history(&self, execution: &ExecutionRef)
    -> Result<Vec<HistoryEvent>, BackendError>;

    async fn terminate_execution(
        &self,
        execution: &ExecutionRef,
        reason: &str,
    ) -> Result<(), BackendError>;

    async fn reset_execution(
        &self,
        execution: &ExecutionRef,
        reset_to: EventId,
        reason: &str,
    ) -> Result<(), BackendError>;

    /// Name of this backend implementation
    fn name(&self) -> &'static str;
}

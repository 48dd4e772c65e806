use std::collections::BTreeSet;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use kairos_core::app::{AppEvent, DestructiveAction, Effect, FocusLoad};
use kairos_core::backend::{Backend, BackendError};
use kairos_core::history::first_reset_point;
use kairos_core::model::ExecutionRef;
use kairos_core::query::{Filter, SearchField};

const TERMINATE_REASON: &str = "terminated from kairos";
const RESET_REASON: &str = "restarted from kairos";
const SUGGESTION_LIMIT: usize = 10;

/// Executes effects against the backend on the tokio runtime and reports
/// each outcome as an `AppEvent`. Dispatch never blocks the caller.
#[derive(Clone)]
pub struct EffectRunner {
    backend: Arc<dyn Backend>,
    event_tx: mpsc::UnboundedSender<AppEvent>,
}

fn text(e: BackendError) -> String {
    e.to_string()
}

impl EffectRunner {
    pub fn new(backend: Arc<dyn Backend>, event_tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { backend, event_tx }
    }

    /// Spawn the work for one effect. `Effect::Quit` is the caller's to handle.
    pub fn dispatch(&self, effect: Effect) {
        match effect {
            Effect::Quit => {}
            Effect::Schedule { timer, after } => {
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tx.send(AppEvent::Tick(timer));
                });
            }
            Effect::OpenUrl(url) => {
                tokio::spawn(async move {
                    if let Err(e) = open_url(&url).await {
                        warn!(%url, error = %e, "could not open browser");
                    }
                });
            }
            other => self.spawn_backend(other),
        }
    }

    fn spawn_backend(&self, effect: Effect) {
        debug!(?effect, backend = self.backend.name(), "dispatch");
        let backend = Arc::clone(&self.backend);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            if let Some(event) = run(backend.as_ref(), effect).await {
                let _ = tx.send(event);
            }
        });
    }
}

async fn run(backend: &dyn Backend, effect: Effect) -> Option<AppEvent> {
    let event = match effect {
        Effect::ListExecutions {
            epoch,
            page,
            filter,
            page_size,
            token,
        } => AppEvent::ListFetched {
            epoch,
            page,
            result: backend
                .list_executions(&filter, page_size, token.as_ref())
                .await
                .map_err(text),
        },
        Effect::SyncStatus {
            epoch,
            filter,
            page_size,
        } => AppEvent::StatusSynced {
            epoch,
            result: backend
                .list_executions(&filter, page_size, None)
                .await
                .map(|page| page.executions)
                .map_err(text),
        },
        Effect::SyncAttempts { epoch, targets } => AppEvent::AttemptsSynced {
            epoch,
            result: resolve_attempts(backend, &targets).await,
        },
        Effect::CountExecutions {
            epoch,
            status,
            from_timer,
            filter,
        } => AppEvent::CountFetched {
            epoch,
            status,
            from_timer,
            result: backend.count_executions(&filter).await.map_err(text),
        },
        Effect::LoadFocus {
            seq,
            execution,
            replace,
        } => {
            let result = load_focus(backend, &execution).await.map_err(text);
            AppEvent::FocusLoaded {
                seq,
                execution,
                replace,
                result,
            }
        }
        Effect::Execute(action) => AppEvent::ActionFinished {
            result: execute(backend, &action).await,
        },
        Effect::FetchSuggestions {
            field,
            prefix,
            filter,
        } => AppEvent::SuggestionsFetched {
            field,
            result: suggestions(backend, field, &filter).await.map_err(text),
            prefix,
        },
        Effect::Schedule { .. } | Effect::OpenUrl(_) | Effect::Quit => return None,
    };
    Some(event)
}

async fn load_focus(
    backend: &dyn Backend,
    execution: &ExecutionRef,
) -> Result<FocusLoad, BackendError> {
    let description = backend.describe_execution(execution).await?;
    let events = backend.get_history(execution).await?;
    Ok(FocusLoad {
        description,
        events,
    })
}

/// One describe per running row. Rows whose lookup fails are left out so
/// they keep their previous count.
async fn resolve_attempts(
    backend: &dyn Backend,
    targets: &[ExecutionRef],
) -> Result<Vec<(ExecutionRef, u32)>, String> {
    let mut resolved = Vec::with_capacity(targets.len());
    let mut last_error = None;
    for execution in targets {
        match backend.describe_execution(execution).await {
            Ok(desc) => resolved.push((execution.clone(), desc.max_attempt())),
            Err(e) => {
                debug!(%execution, error = %e, "attempt lookup failed");
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) if resolved.is_empty() => Err(e.to_string()),
        _ => Ok(resolved),
    }
}

async fn execute(backend: &dyn Backend, action: &DestructiveAction) -> Result<(), String> {
    let mut failures = Vec::new();
    for execution in action.targets() {
        let outcome = match action {
            DestructiveAction::Terminate { .. } => {
                backend
                    .terminate_execution(execution, TERMINATE_REASON)
                    .await
            }
            DestructiveAction::Restart { .. } => restart(backend, execution).await,
        };
        match outcome {
            Ok(()) => info!(%execution, "action applied"),
            Err(e) => {
                warn!(%execution, error = %e, "action failed");
                failures.push(format!("{}: {}", execution.workflow_id, e));
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures.join("; "))
    }
}

/// Reset to the first completed workflow task
async fn restart(backend: &dyn Backend, execution: &ExecutionRef) -> Result<(), BackendError> {
    let events = backend.get_history(execution).await?;
    let point = first_reset_point(&events)
        .ok_or_else(|| BackendError::Other("no completed workflow task to reset to".into()))?;
    backend.reset_execution(execution, point, RESET_REASON).await
}

async fn suggestions(
    backend: &dyn Backend,
    field: SearchField,
    filter: &Filter,
) -> Result<Vec<String>, BackendError> {
    let page = backend.list_executions(filter, 50, None).await?;
    let values: BTreeSet<String> = page
        .executions
        .into_iter()
        .map(|info| match field {
            SearchField::WorkflowType => info.workflow_type,
            SearchField::WorkflowId | SearchField::ExecutionStatus => info.execution.workflow_id,
        })
        .collect();
    Ok(values.into_iter().take(SUGGESTION_LIMIT).collect())
}

async fn open_url(url: &str) -> std::io::Result<()> {
    let mut cmd = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        Command::new("xdg-open")
    };
    cmd.arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let status = cmd.status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("opener exited with {}", status)))
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use kairos_core::backend::{Backend, BackendError};
use kairos_core::history::{EventId, EventType, HistoryEvent, Payload};
use kairos_core::model::{
    ExecutionDescription, ExecutionInfo, ExecutionPage, ExecutionRef, ExecutionStatus, Failure,
    PageToken, PendingActivityInfo,
};
use kairos_core::query::Filter;

/// Seconds each scripted step takes to show up in history
const STEP_SECS: i64 = 3;
/// Seconds between retries of a failing activity
const RETRY_SECS: i64 = 4;

#[derive(Clone, Debug)]
enum Step {
    Activity {
        name: &'static str,
        input: &'static str,
        outcome: Result<&'static str, &'static str>,
    },
    /// Fails forever; the execution stays running with a growing attempt
    Retrying {
        name: &'static str,
        input: &'static str,
        error: &'static str,
    },
    Timer {
        id: &'static str,
    },
    Signal {
        name: &'static str,
        input: &'static str,
    },
    Child {
        workflow_id: String,
        script: Box<Script>,
    },
}

#[derive(Clone, Copy, Debug)]
enum Ending {
    Complete(&'static str),
    Fail(&'static str),
    Open,
}

#[derive(Clone, Debug)]
struct Script {
    workflow_type: &'static str,
    input: &'static str,
    steps: Vec<Step>,
    ending: Ending,
}

impl Script {
    fn new(workflow_type: &'static str, input: &'static str) -> Self {
        Self {
            workflow_type,
            input,
            steps: Vec::new(),
            ending: Ending::Complete("{}"),
        }
    }

    fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }

    /// Seconds from start to close, `None` when it never closes on its own
    fn duration(&self) -> Option<i64> {
        let mut t = 0;
        for step in &self.steps {
            t += match step {
                Step::Activity { .. } | Step::Signal { .. } => STEP_SECS,
                Step::Timer { .. } => 2 * STEP_SECS,
                Step::Retrying { .. } => return None,
                Step::Child { script, .. } => STEP_SECS + script.duration()?,
            };
        }
        match self.ending {
            Ending::Open => None,
            _ => Some(t + STEP_SECS),
        }
    }
}

#[derive(Clone, Debug)]
struct DemoExecution {
    execution: ExecutionRef,
    script: Script,
    started_at: DateTime<Utc>,
    parent: Option<ExecutionRef>,
    /// Child runs in the order their steps appear
    children: Vec<ExecutionRef>,
    /// Closed from outside (terminate or reset)
    closed_at: Option<DateTime<Utc>>,
}

/// History and status of one execution as of a point in time
struct Snapshot {
    info: ExecutionInfo,
    events: Vec<HistoryEvent>,
    pending: Vec<PendingActivityInfo>,
}

struct HistoryBuilder {
    events: Vec<HistoryEvent>,
}

impl HistoryBuilder {
    fn next_id(&self) -> EventId {
        self.events.len() as EventId + 1
    }

    fn push(
        &mut self,
        event_type: EventType,
        build: impl FnOnce(HistoryEvent) -> HistoryEvent,
    ) -> EventId {
        let id = self.next_id();
        self.events.push(build(HistoryEvent::new(id, event_type)));
        id
    }

    fn workflow_task(&mut self) {
        self.push(EventType::WorkflowTaskScheduled, |e| e);
        self.push(EventType::WorkflowTaskStarted, |e| e);
        self.push(EventType::WorkflowTaskCompleted, |e| e);
    }
}

fn json(s: &str) -> Payload {
    Payload::new(s.as_bytes().to_vec())
}

fn failure(message: &str) -> Failure {
    Failure::new("activity error").with_cause(Failure::new(message))
}

#[derive(Default)]
struct Store {
    executions: BTreeMap<ExecutionRef, DemoExecution>,
    next_run: u128,
}

impl Store {
    fn new_run_id(&mut self) -> String {
        self.next_run += 1;
        Uuid::from_u128(0xdead_0000_0000_0000_0000_0000_0000_0000 + self.next_run).to_string()
    }

    /// Insert an execution and its children, returning its identity
    fn spawn(
        &mut self,
        workflow_id: &str,
        script: Script,
        started_at: DateTime<Utc>,
        parent: Option<ExecutionRef>,
    ) -> ExecutionRef {
        let execution = ExecutionRef::new(workflow_id, self.new_run_id());
        let mut children = Vec::new();
        let mut t = 0;
        for step in &script.steps {
            match step {
                Step::Activity { .. } | Step::Signal { .. } => t += STEP_SECS,
                Step::Timer { .. } => t += 2 * STEP_SECS,
                Step::Retrying { .. } => break,
                Step::Child {
                    workflow_id,
                    script: child,
                } => {
                    t += STEP_SECS;
                    let child_ref = self.spawn(
                        workflow_id,
                        (**child).clone(),
                        started_at + Duration::seconds(t),
                        Some(execution.clone()),
                    );
                    children.push(child_ref);
                    match child.duration() {
                        Some(d) => t += d,
                        None => break,
                    }
                }
            }
        }
        self.executions.insert(
            execution.clone(),
            DemoExecution {
                execution: execution.clone(),
                script,
                started_at,
                parent,
                children,
                closed_at: None,
            },
        );
        execution
    }

    fn snapshot(&self, exec: &DemoExecution, now: DateTime<Utc>) -> Snapshot {
        let effective = exec.closed_at.map_or(now, |c| c.min(now));
        let script = &exec.script;
        let mut b = HistoryBuilder { events: Vec::new() };
        let mut pending = Vec::new();
        let mut t = exec.started_at;
        let step = Duration::seconds(STEP_SECS);

        b.push(EventType::WorkflowExecutionStarted, |e| {
            e.with_name(script.workflow_type).with_input(json(script.input))
        });
        b.workflow_task();

        let mut children = exec.children.iter();
        let mut closed = None;
        'steps: {
            for s in &script.steps {
                t += step;
                if t > effective {
                    break 'steps;
                }
                match s {
                    Step::Activity {
                        name,
                        input,
                        outcome,
                    } => {
                        let id = b.next_id();
                        b.push(EventType::ActivityTaskScheduled, |e| {
                            e.with_name(*name)
                                .with_activity_id(id.to_string())
                                .with_input(json(input))
                        });
                        b.push(EventType::ActivityTaskStarted, |e| e.with_back_reference(id));
                        match outcome {
                            Ok(out) => b.push(EventType::ActivityTaskCompleted, |e| {
                                e.with_back_reference(id).with_result(json(out))
                            }),
                            Err(msg) => b.push(EventType::ActivityTaskFailed, |e| {
                                e.with_back_reference(id).with_failure(failure(msg))
                            }),
                        };
                    }
                    Step::Retrying { name, input, error } => {
                        let id = b.next_id();
                        b.push(EventType::ActivityTaskScheduled, |e| {
                            e.with_name(*name)
                                .with_activity_id(id.to_string())
                                .with_input(json(input))
                        });
                        let retries = (effective - t).num_seconds() / RETRY_SECS;
                        pending.push(PendingActivityInfo {
                            activity_id: id.to_string(),
                            activity_type: name.to_string(),
                            attempt: 1 + retries as u32,
                            last_failure: (retries > 0).then(|| failure(error)),
                        });
                        break 'steps;
                    }
                    Step::Timer { id: timer } => {
                        let id = b.push(EventType::TimerStarted, |e| e.with_name(*timer));
                        t += step;
                        if t > effective {
                            break 'steps;
                        }
                        b.push(EventType::TimerFired, |e| e.with_back_reference(id));
                    }
                    Step::Signal { name, input } => {
                        b.push(EventType::WorkflowExecutionSignaled, |e| {
                            e.with_name(*name).with_input(json(input))
                        });
                    }
                    Step::Child { script: child, .. } => {
                        let Some(child_ref) = children.next() else {
                            break 'steps;
                        };
                        let id = b.push(EventType::StartChildWorkflowExecutionInitiated, |e| {
                            e.with_name(child.workflow_type).with_input(json(child.input))
                        });
                        b.push(EventType::ChildWorkflowExecutionStarted, |e| {
                            e.with_back_reference(id).with_child_execution(child_ref.clone())
                        });
                        let Some(child_exec) = self.executions.get(child_ref) else {
                            break 'steps;
                        };
                        let child_snap = self.snapshot(child_exec, effective);
                        let Some(child_closed) = child_snap.info.close_time else {
                            break 'steps;
                        };
                        t = t.max(child_closed);
                        let result = child_snap
                            .events
                            .last()
                            .and_then(|e| e.attributes.result.clone());
                        match child_snap.info.status {
                            ExecutionStatus::Completed => {
                                b.push(EventType::ChildWorkflowExecutionCompleted, |e| {
                                    let e = e.with_back_reference(id);
                                    match result {
                                        Some(r) => e.with_result(r),
                                        None => e,
                                    }
                                });
                            }
                            ExecutionStatus::Failed => {
                                b.push(EventType::ChildWorkflowExecutionFailed, |e| {
                                    e.with_back_reference(id)
                                        .with_failure(Failure::new("child workflow failed"))
                                });
                            }
                            _ => {
                                b.push(EventType::ChildWorkflowExecutionTerminated, |e| {
                                    e.with_child_execution(child_ref.clone())
                                });
                            }
                        }
                    }
                }
                b.workflow_task();
            }

            t += step;
            if t > effective {
                break 'steps;
            }
            match script.ending {
                Ending::Complete(result) => {
                    b.push(EventType::WorkflowExecutionCompleted, |e| {
                        e.with_result(json(result))
                    });
                    closed = Some((ExecutionStatus::Completed, t));
                }
                Ending::Fail(message) => {
                    b.push(EventType::WorkflowExecutionFailed, |e| {
                        e.with_failure(Failure::new(message))
                    });
                    closed = Some((ExecutionStatus::Failed, t));
                }
                Ending::Open => {}
            }
        }

        if closed.is_none() {
            if let Some(at) = exec.closed_at {
                b.push(EventType::WorkflowExecutionTerminated, |e| e.with_name("terminated"));
                pending.clear();
                closed = Some((ExecutionStatus::Terminated, at));
            }
        }

        let (status, close_time) = match closed {
            Some((status, at)) => (status, Some(at)),
            None => (ExecutionStatus::Running, None),
        };
        Snapshot {
            info: ExecutionInfo {
                execution: exec.execution.clone(),
                workflow_type: script.workflow_type.to_string(),
                status,
                start_time: Some(exec.started_at),
                close_time,
                parent: exec.parent.clone(),
            },
            events: b.events,
            pending,
        }
    }

    fn visible(&self, now: DateTime<Utc>) -> Vec<ExecutionInfo> {
        let mut infos: Vec<ExecutionInfo> = self
            .executions
            .values()
            .filter(|e| e.started_at <= now)
            .map(|e| self.snapshot(e, now).info)
            .collect();
        infos.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.execution.cmp(&b.execution))
        });
        infos
    }

    fn get(&self, execution: &ExecutionRef, now: DateTime<Utc>) -> Result<&DemoExecution, BackendError> {
        self.executions
            .get(execution)
            .filter(|e| e.started_at <= now)
            .ok_or_else(|| BackendError::NotFound(execution.clone()))
    }
}

fn seed(origin: DateTime<Utc>) -> Store {
    let mut store = Store::default();
    let ago = |mins: i64| origin - Duration::minutes(mins);

    let shipment = |n: u32| {
        Script::new("ShipmentWorkflow", r#"{"carrier":"ups"}"#)
            .step(Step::Activity {
                name: "ReserveTruck",
                input: r#"{"region":"eu-west"}"#,
                outcome: Ok(r#"{"truck":"T-17"}"#),
            })
            .step(Step::Activity {
                name: "PrintLabel",
                input: "{}",
                outcome: Ok(r#"{"label":"ok"}"#),
            })
            .ending(Ending::Complete(if n % 2 == 0 {
                r#"{"tracking":"1Z999"}"#
            } else {
                r#"{"tracking":"1Z555"}"#
            }))
    };

    let order = |id: u32| {
        Script::new("OrderWorkflow", r#"{"order":1042,"items":3}"#)
            .step(Step::Activity {
                name: "ValidateOrder",
                input: r#"{"order":1042}"#,
                outcome: Ok(r#"{"valid":true}"#),
            })
            .step(Step::Child {
                workflow_id: format!("shipment-{}", id),
                script: Box::new(shipment(id)),
            })
            .step(Step::Timer { id: "settle" })
            .step(Step::Signal {
                name: "customer-confirmed",
                input: r#"{"by":"email"}"#,
            })
            .ending(Ending::Complete(r#"{"status":"shipped"}"#))
    };

    let payment = Script::new("PaymentWorkflow", r#"{"amount":129.5,"currency":"EUR"}"#)
        .step(Step::Activity {
            name: "AuthorizeCard",
            input: r#"{"card":"**** 4242"}"#,
            outcome: Ok(r#"{"auth":"A-88"}"#),
        })
        .step(Step::Retrying {
            name: "CaptureFunds",
            input: r#"{"auth":"A-88"}"#,
            error: "gateway timeout after 30s",
        })
        .ending(Ending::Open);

    let import = Script::new("ImportWorkflow", r#"{"file":"users.csv"}"#)
        .step(Step::Activity {
            name: "Download",
            input: r#"{"file":"users.csv"}"#,
            outcome: Ok(r#"{"rows":1200}"#),
        })
        .step(Step::Activity {
            name: "ParseRows",
            input: r#"{"rows":1200}"#,
            outcome: Err("row 733: unexpected end of record"),
        })
        .ending(Ending::Fail("import aborted: parse error"));

    let subscription = Script::new("SubscriptionWorkflow", r#"{"plan":"pro"}"#)
        .step(Step::Activity {
            name: "ChargeMonthly",
            input: r#"{"plan":"pro"}"#,
            outcome: Ok(r#"{"charged":true}"#),
        })
        .step(Step::Timer { id: "billing-cycle" })
        .step(Step::Signal {
            name: "upgrade",
            input: r#"{"plan":"team"}"#,
        })
        .ending(Ending::Open);

    let report = |n: u32| {
        Script::new("ReportWorkflow", r#"{"kind":"daily"}"#)
            .step(Step::Activity {
                name: "Aggregate",
                input: r#"{"kind":"daily"}"#,
                outcome: Ok(r#"{"rows":52}"#),
            })
            .ending(if n % 9 == 4 {
                Ending::Fail("storage quota exceeded")
            } else {
                Ending::Complete(r#"{"url":"s3://reports/daily.pdf"}"#)
            })
    };

    // history long finished
    for n in 0..48u32 {
        store.spawn(&format!("report-{:03}", n), report(n), ago(90 + n as i64 * 37), None);
    }
    store.spawn("import-users", import, ago(45), None);
    store.spawn("order-1041", order(1041), ago(30), None);
    store.spawn("subscription-acme", subscription, ago(20), None);
    // progressing live
    store.spawn("payment-7731", payment.clone(), origin, None);
    store.spawn("payment-7732", payment, origin + Duration::seconds(6), None);
    store.spawn("order-1042", order(1042), origin, None);
    store.spawn("order-1043", order(1043), origin + Duration::seconds(20), None);
    store
}

fn encode_offset(offset: usize) -> PageToken {
    PageToken((offset as u64).to_be_bytes().to_vec())
}

fn decode_offset(token: &PageToken) -> Result<usize, BackendError> {
    let bytes: [u8; 8] = token
        .0
        .as_slice()
        .try_into()
        .map_err(|_| BackendError::Decode("bad page token".into()))?;
    Ok(u64::from_be_bytes(bytes) as usize)
}

/// In-memory workflow service whose executions advance with wall-clock time
pub struct DemoBackend {
    store: RwLock<Store>,
    frozen: Option<DateTime<Utc>>,
}

impl DemoBackend {
    pub fn new() -> Self {
        Self::seeded(Utc::now())
    }

    /// Seed executions relative to `origin`
    pub fn seeded(origin: DateTime<Utc>) -> Self {
        Self {
            store: RwLock::new(seed(origin)),
            frozen: None,
        }
    }

    /// Pin the clock, for tests
    #[cfg(test)]
    pub fn frozen_at(mut self, now: DateTime<Utc>) -> Self {
        self.frozen = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.frozen.unwrap_or_else(Utc::now)
    }
}

impl Default for DemoBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for DemoBackend {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn list_executions(
        &self,
        filter: &Filter,
        page_size: usize,
        page_token: Option<&PageToken>,
    ) -> Result<ExecutionPage, BackendError> {
        let offset = page_token.map(decode_offset).transpose()?.unwrap_or(0);
        let store = self.store.read().await;
        let matching: Vec<ExecutionInfo> = store
            .visible(self.now())
            .into_iter()
            .filter(|info| filter.matches(info))
            .collect();
        let end = (offset + page_size.max(1)).min(matching.len());
        let executions = matching.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < matching.len()).then(|| encode_offset(end));
        Ok(ExecutionPage {
            executions,
            next_page_token,
        })
    }

    async fn count_executions(&self, filter: &Filter) -> Result<u64, BackendError> {
        let store = self.store.read().await;
        Ok(store
            .visible(self.now())
            .iter()
            .filter(|info| filter.matches(info))
            .count() as u64)
    }

    async fn describe_execution(
        &self,
        execution: &ExecutionRef,
    ) -> Result<ExecutionDescription, BackendError> {
        let now = self.now();
        let store = self.store.read().await;
        let snap = store.snapshot(store.get(execution, now)?, now);
        Ok(ExecutionDescription {
            info: snap.info,
            pending_activities: snap.pending,
        })
    }

    async fn get_history(
        &self,
        execution: &ExecutionRef,
    ) -> Result<Vec<HistoryEvent>, BackendError> {
        let now = self.now();
        let store = self.store.read().await;
        Ok(store.snapshot(store.get(execution, now)?, now).events)
    }

    async fn terminate_execution(
        &self,
        execution: &ExecutionRef,
        reason: &str,
    ) -> Result<(), BackendError> {
        let now = self.now();
        let mut store = self.store.write().await;
        let status = store.snapshot(store.get(execution, now)?, now).info.status;
        if status.is_terminal() {
            return Err(BackendError::Rejected {
                status: 400,
                message: "workflow execution already completed".into(),
            });
        }
        if let Some(exec) = store.executions.get_mut(execution) {
            exec.closed_at = Some(now);
        }
        tracing::info!(%execution, reason, "demo execution terminated");
        Ok(())
    }

    async fn reset_execution(
        &self,
        execution: &ExecutionRef,
        reset_to: EventId,
        reason: &str,
    ) -> Result<(), BackendError> {
        let now = self.now();
        let mut store = self.store.write().await;
        let exec = store.get(execution, now)?.clone();
        let snap = store.snapshot(&exec, now);
        let valid = snap
            .events
            .iter()
            .any(|e| e.event_id == reset_to && e.event_type == EventType::WorkflowTaskCompleted);
        if !valid {
            return Err(BackendError::Rejected {
                status: 400,
                message: format!("event {} is not a valid reset point", reset_to),
            });
        }
        if !snap.info.status.is_terminal() {
            if let Some(old) = store.executions.get_mut(execution) {
                old.closed_at = Some(now);
            }
        }
        let new_run = store.spawn(&exec.execution.workflow_id, exec.script, now, exec.parent);
        tracing::info!(%execution, %new_run, reset_to, reason, "demo execution reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::compact::compact;
    use kairos_core::history::first_reset_point;
    use kairos_core::query::{SearchField, SearchFilters, count_filter};
    use chrono::TimeZone;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 21, 9, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DemoBackend {
        DemoBackend::seeded(origin()).frozen_at(origin() + Duration::seconds(secs))
    }

    async fn find(backend: &DemoBackend, workflow_id: &str) -> ExecutionInfo {
        let mut filters = SearchFilters::new();
        filters.add(SearchField::WorkflowId, workflow_id);
        let page = backend
            .list_executions(&filters.to_filter(false), 10, None)
            .await
            .unwrap();
        page.executions.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn test_pages_cover_every_execution_once() {
        let backend = at(600);
        let total = backend.count_executions(&Filter::All).await.unwrap();
        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = backend
                .list_executions(&Filter::All, 40, token.as_ref())
                .await
                .unwrap();
            assert!(page.executions.len() <= 40);
            seen.extend(page.executions.into_iter().map(|i| i.execution));
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(seen.len() as u64, total);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len() as u64, total);
    }

    #[tokio::test]
    async fn test_every_history_compacts() {
        for secs in [0, 5, 14, 40, 600] {
            let backend = at(secs);
            let page = backend.list_executions(&Filter::All, 200, None).await.unwrap();
            for info in page.executions {
                let desc = backend.describe_execution(&info.execution).await.unwrap();
                let events = backend.get_history(&info.execution).await.unwrap();
                assert!(
                    compact(&events, &desc.pending_activities).is_ok(),
                    "{} at +{}s",
                    info.execution,
                    secs
                );
            }
        }
    }

    #[tokio::test]
    async fn test_retrying_activity_attempts_grow() {
        let early = at(4);
        let late = at(40);
        let early_info = find(&early, "payment-7731").await;
        let late_info = find(&late, "payment-7731").await;
        let early_desc = early.describe_execution(&early_info.execution).await.unwrap();
        let late_desc = late.describe_execution(&late_info.execution).await.unwrap();
        assert!(late_desc.max_attempt() > 3);
        assert!(early_desc.max_attempt() < late_desc.max_attempt());
        assert_eq!(late_desc.info.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn test_parent_waits_for_child() {
        let backend = at(600);
        let order = find(&backend, "order-1042").await;
        assert_eq!(order.status, ExecutionStatus::Completed);
        let events = backend.get_history(&order.execution).await.unwrap();
        let history = compact(&events, &[]).unwrap();
        let child = history
            .ordered()
            .into_iter()
            .find_map(|r| r.child_execution().cloned())
            .unwrap();
        let child_desc = backend.describe_execution(&child).await.unwrap();
        assert_eq!(child_desc.info.parent, Some(order.execution.clone()));
        assert!(child_desc.info.close_time <= order.close_time);
    }

    #[tokio::test]
    async fn test_terminate_once() {
        let backend = at(10);
        let payment = find(&backend, "payment-7731").await;
        backend
            .terminate_execution(&payment.execution, "test")
            .await
            .unwrap();
        let desc = backend.describe_execution(&payment.execution).await.unwrap();
        assert_eq!(desc.info.status, ExecutionStatus::Terminated);
        assert!(desc.pending_activities.is_empty());

        let again = backend.terminate_execution(&payment.execution, "test").await;
        assert!(matches!(again, Err(BackendError::Rejected { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_reset_starts_new_run() {
        let backend = at(10);
        let payment = find(&backend, "payment-7731").await;
        let events = backend.get_history(&payment.execution).await.unwrap();
        let point = first_reset_point(&events).unwrap();

        assert!(backend
            .reset_execution(&payment.execution, 1, "bad point")
            .await
            .is_err());
        backend
            .reset_execution(&payment.execution, point, "retry")
            .await
            .unwrap();

        let mut filters = SearchFilters::new();
        filters.add(SearchField::WorkflowId, "payment-7731");
        let runs = backend
            .list_executions(&filters.to_filter(false), 10, None)
            .await
            .unwrap()
            .executions;
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, ExecutionStatus::Running);
        assert_ne!(runs[0].execution.run_id, payment.execution.run_id);
        assert_eq!(runs[1].status, ExecutionStatus::Terminated);
    }

    #[tokio::test]
    async fn test_counts_follow_filters() {
        let backend = at(600);
        let failed = backend
            .count_executions(&count_filter(&Filter::All, ExecutionStatus::Failed))
            .await
            .unwrap();
        assert!(failed > 0);
        let mut filters = SearchFilters::new();
        filters.add(SearchField::WorkflowType, "ImportWorkflow");
        let imports = backend
            .count_executions(&count_filter(
                &filters.to_filter(true),
                ExecutionStatus::Failed,
            ))
            .await
            .unwrap();
        assert_eq!(imports, 1);
    }

    #[tokio::test]
    async fn test_unknown_execution() {
        let backend = at(0);
        let missing = ExecutionRef::new("nope", "nope");
        assert_eq!(
            backend.get_history(&missing).await,
            Err(BackendError::NotFound(missing))
        );
    }
}

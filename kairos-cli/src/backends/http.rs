use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use uuid::Uuid;

use kairos_core::backend::{Backend, BackendError};
use kairos_core::config::ConnectionProfile;
use kairos_core::history::{EventId, EventType, HistoryEvent, Payload};
use kairos_core::model::{
    ExecutionDescription, ExecutionInfo, ExecutionPage, ExecutionRef, ExecutionStatus, Failure,
    PageToken, PendingActivityInfo,
};
use kairos_core::query::Filter;

const IDENTITY: &str = "kairos";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireExecution {
    #[serde(default)]
    workflow_id: String,
    #[serde(default)]
    run_id: String,
}

impl From<WireExecution> for ExecutionRef {
    fn from(w: WireExecution) -> Self {
        ExecutionRef::new(w.workflow_id, w.run_id)
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireType {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireExecutionInfo {
    #[serde(default)]
    execution: WireExecution,
    #[serde(default, rename = "type")]
    workflow_type: WireType,
    #[serde(default)]
    status: String,
    start_time: Option<DateTime<Utc>>,
    close_time: Option<DateTime<Utc>>,
    parent_execution: Option<WireExecution>,
}

impl From<WireExecutionInfo> for ExecutionInfo {
    fn from(w: WireExecutionInfo) -> Self {
        ExecutionInfo {
            execution: w.execution.into(),
            workflow_type: w.workflow_type.name,
            status: ExecutionStatus::parse(&w.status).unwrap_or_default(),
            start_time: w.start_time,
            close_time: w.close_time,
            parent: w.parent_execution.map(Into::into),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    executions: Vec<WireExecutionInfo>,
    #[serde(default)]
    next_page_token: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    #[serde(default)]
    count: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFailure {
    #[serde(default)]
    message: String,
    cause: Option<Box<WireFailure>>,
}

impl From<WireFailure> for Failure {
    fn from(w: WireFailure) -> Self {
        let failure = Failure::new(w.message);
        match w.cause {
            Some(cause) => failure.with_cause((*cause).into()),
            None => failure,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePendingActivity {
    #[serde(default)]
    activity_id: String,
    #[serde(default)]
    activity_type: WireType,
    #[serde(default)]
    attempt: u32,
    last_failure: Option<WireFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeResponse {
    workflow_execution_info: WireExecutionInfo,
    #[serde(default)]
    pending_activities: Vec<WirePendingActivity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    #[serde(default)]
    history: WireHistory,
    #[serde(default)]
    next_page_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireHistory {
    #[serde(default)]
    events: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// 64-bit integers arrive as JSON strings
fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn first_payload(v: Option<&Value>) -> Option<Payload> {
    let data = v?.get("payloads")?.get(0)?.get("data")?.as_str()?;
    B64.decode(data).ok().map(Payload::new)
}

fn decode_failure(v: Option<&Value>) -> Option<Failure> {
    serde_json::from_value::<WireFailure>(v?.clone())
        .ok()
        .map(Into::into)
}

/// Map one history event from its JSON form. Attributes live under a single
/// `<eventType>EventAttributes` key; only the fields the correlator reads are
/// extracted.
fn decode_event(raw: &Value) -> Result<HistoryEvent, BackendError> {
    let event_id = raw
        .get("eventId")
        .and_then(as_i64)
        .ok_or_else(|| BackendError::Decode("history event without eventId".into()))?;
    let event_type = EventType::parse(raw.get("eventType").and_then(Value::as_str).unwrap_or(""));
    let mut event = HistoryEvent::new(event_id, event_type);

    let Some(attrs) = raw
        .as_object()
        .and_then(|o| o.iter().find(|(k, _)| k.ends_with("EventAttributes")))
        .map(|(_, v)| v)
    else {
        return Ok(event);
    };

    let back_reference = ["scheduledEventId", "initiatedEventId", "startedEventId"]
        .iter()
        .find_map(|k| attrs.get(*k).and_then(as_i64))
        .filter(|id| *id > 0);
    if let Some(id) = back_reference {
        event = event.with_back_reference(id);
    }

    let name = attrs
        .get("activityType")
        .or_else(|| attrs.get("workflowType"))
        .and_then(|t| t.get("name"))
        .or_else(|| attrs.get("timerId"))
        .or_else(|| attrs.get("signalName"))
        .and_then(Value::as_str);
    if let Some(name) = name {
        event = event.with_name(name);
    }
    if let Some(id) = attrs.get("activityId").and_then(Value::as_str) {
        event = event.with_activity_id(id);
    }
    if let Some(input) = first_payload(attrs.get("input")) {
        event = event.with_input(input);
    }
    if let Some(result) = first_payload(attrs.get("result")) {
        event = event.with_result(result);
    }
    if let Some(failure) = decode_failure(attrs.get("failure")) {
        event = event.with_failure(failure);
    }
    if let Some(child) = attrs.get("workflowExecution") {
        if let Ok(wire) = serde_json::from_value::<WireExecution>(child.clone()) {
            event = event.with_child_execution(wire.into());
        }
    }
    Ok(event)
}

/// Client for the workflow service's HTTP API
pub struct HttpBackend {
    client: Client,
    base: Url,
    namespace: String,
}

impl HttpBackend {
    pub fn connect(profile: &ConnectionProfile) -> Result<Self, BackendError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("kairos/", env!("CARGO_PKG_VERSION")));
        if let Some(tls) = &profile.tls {
            let pem = format!("{}\n{}", tls.cert_pem, tls.key_pem);
            let identity = reqwest::Identity::from_pem(pem.as_bytes())
                .map_err(|e| BackendError::Connection(format!("invalid key pair: {}", e)))?;
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        let base = Url::parse(&profile.http_endpoint)
            .map_err(|e| BackendError::Connection(format!("invalid endpoint: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::Connection(format!(
                "invalid endpoint: {}",
                profile.http_endpoint
            )));
        }
        Ok(Self {
            client,
            base,
            namespace: profile.namespace.clone(),
        })
    }

    /// Namespace-scoped API url. Each segment is percent-encoded on its own,
    /// so ids containing `/`, `#` or `?` stay one segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // base is checked in `connect`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["api", "v1", "namespaces", self.namespace.as_str()])
                .extend(segments);
        }
        url
    }

    fn workflow_url(&self, execution: &ExecutionRef, action: Option<&str>) -> Url {
        let mut segments = vec!["workflows", execution.workflow_id.as_str()];
        segments.extend(action);
        self.url(&segments)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        execution: Option<&ExecutionRef>,
    ) -> Result<T, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            if let Some(execution) = execution {
                return Err(BackendError::NotFound(execution.clone()));
            }
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn run_query(execution: &ExecutionRef) -> [(&'static str, String); 1] {
        [("execution.runId", execution.run_id.clone())]
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn list_executions(
        &self,
        filter: &Filter,
        page_size: usize,
        page_token: Option<&PageToken>,
    ) -> Result<ExecutionPage, BackendError> {
        let mut query = vec![
            ("query", filter.to_query()),
            ("pageSize", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("nextPageToken", B64.encode(&token.0)));
        }
        let request = self.client.get(self.url(&["workflows"])).query(&query);
        let response: ListResponse = self.send(request, None).await?;
        let next = B64
            .decode(&response.next_page_token)
            .map_err(|e| BackendError::Decode(format!("page token: {}", e)))?;
        Ok(ExecutionPage {
            executions: response.executions.into_iter().map(Into::into).collect(),
            next_page_token: PageToken::from_bytes(next),
        })
    }

    async fn count_executions(&self, filter: &Filter) -> Result<u64, BackendError> {
        let request = self
            .client
            .get(self.url(&["workflow-count"]))
            .query(&[("query", filter.to_query())]);
        let response: CountResponse = self.send(request, None).await?;
        Ok(as_i64(&response.count).unwrap_or(0).max(0) as u64)
    }

    async fn describe_execution(
        &self,
        execution: &ExecutionRef,
    ) -> Result<ExecutionDescription, BackendError> {
        let request = self
            .client
            .get(self.workflow_url(execution, None))
            .query(&Self::run_query(execution));
        let response: DescribeResponse = self.send(request, Some(execution)).await?;
        Ok(ExecutionDescription {
            info: response.workflow_execution_info.into(),
            pending_activities: response
                .pending_activities
                .into_iter()
                .map(|p| PendingActivityInfo {
                    activity_id: p.activity_id,
                    activity_type: p.activity_type.name,
                    attempt: p.attempt,
                    last_failure: p.last_failure.map(Into::into),
                })
                .collect(),
        })
    }

    async fn get_history(
        &self,
        execution: &ExecutionRef,
    ) -> Result<Vec<HistoryEvent>, BackendError> {
        let mut events = Vec::new();
        let mut token = String::new();
        loop {
            let mut query = vec![("execution.runId", execution.run_id.clone())];
            if !token.is_empty() {
                query.push(("nextPageToken", token.clone()));
            }
            let request = self
                .client
                .get(self.workflow_url(execution, Some("history")))
                .query(&query);
            let page: HistoryResponse = self.send(request, Some(execution)).await?;
            for raw in &page.history.events {
                events.push(decode_event(raw)?);
            }
            if page.next_page_token.is_empty() {
                break;
            }
            token = page.next_page_token;
        }
        Ok(events)
    }

    async fn terminate_execution(
        &self,
        execution: &ExecutionRef,
        reason: &str,
    ) -> Result<(), BackendError> {
        let body = json!({
            "workflowExecution": {
                "workflowId": execution.workflow_id,
                "runId": execution.run_id,
            },
            "reason": reason,
            "identity": IDENTITY,
        });
        let request = self
            .client
            .post(self.workflow_url(execution, Some("terminate")))
            .json(&body);
        let _: Value = self.send(request, Some(execution)).await?;
        Ok(())
    }

    async fn reset_execution(
        &self,
        execution: &ExecutionRef,
        reset_to: EventId,
        reason: &str,
    ) -> Result<(), BackendError> {
        let body = json!({
            "workflowExecution": {
                "workflowId": execution.workflow_id,
                "runId": execution.run_id,
            },
            "reason": reason,
            "workflowTaskFinishEventId": reset_to.to_string(),
            "requestId": Uuid::new_v4().to_string(),
            "identity": IDENTITY,
        });
        let request = self
            .client
            .post(self.workflow_url(execution, Some("reset")))
            .json(&body);
        let _: Value = self.send(request, Some(execution)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_activity_events() {
        let scheduled = json!({
            "eventId": "5",
            "eventType": "EVENT_TYPE_ACTIVITY_TASK_SCHEDULED",
            "activityTaskScheduledEventAttributes": {
                "activityId": "5",
                "activityType": { "name": "ChargeCard" },
                "input": { "payloads": [{ "data": B64.encode(br#"{"amount":10}"#) }] }
            }
        });
        let event = decode_event(&scheduled).unwrap();
        assert_eq!(event.event_id, 5);
        assert_eq!(event.event_type, EventType::ActivityTaskScheduled);
        assert_eq!(event.attributes.name.as_deref(), Some("ChargeCard"));
        assert_eq!(event.attributes.activity_id.as_deref(), Some("5"));
        assert_eq!(
            event.attributes.input,
            Some(Payload::new(br#"{"amount":10}"#.to_vec()))
        );

        // completed carries both ids; the scheduling one is the key
        let completed = json!({
            "eventId": "7",
            "eventType": "EVENT_TYPE_ACTIVITY_TASK_COMPLETED",
            "activityTaskCompletedEventAttributes": {
                "scheduledEventId": "5",
                "startedEventId": "6"
            }
        });
        assert_eq!(decode_event(&completed).unwrap().attributes.back_reference, Some(5));
    }

    #[test]
    fn test_decode_child_and_failure() {
        let started = json!({
            "eventId": "10",
            "eventType": "EVENT_TYPE_CHILD_WORKFLOW_EXECUTION_STARTED",
            "childWorkflowExecutionStartedEventAttributes": {
                "initiatedEventId": "9",
                "workflowExecution": { "workflowId": "ship-1", "runId": "run-c" }
            }
        });
        let event = decode_event(&started).unwrap();
        assert_eq!(event.attributes.back_reference, Some(9));
        assert_eq!(
            event.attributes.child_execution,
            Some(ExecutionRef::new("ship-1", "run-c"))
        );

        let failed = json!({
            "eventId": "12",
            "eventType": "EVENT_TYPE_WORKFLOW_EXECUTION_FAILED",
            "workflowExecutionFailedEventAttributes": {
                "failure": { "message": "outer", "cause": { "message": "disk full" } }
            }
        });
        let event = decode_event(&failed).unwrap();
        assert_eq!(event.attributes.failure.unwrap().root_message(), "disk full");
    }

    #[test]
    fn test_decode_requires_event_id() {
        let raw = json!({ "eventType": "EVENT_TYPE_TIMER_FIRED" });
        assert!(matches!(decode_event(&raw), Err(BackendError::Decode(_))));
    }

    #[test]
    fn test_execution_info_mapping() {
        let raw = json!({
            "execution": { "workflowId": "wf-1", "runId": "r-1" },
            "type": { "name": "OrderWorkflow" },
            "status": "WORKFLOW_EXECUTION_STATUS_RUNNING",
            "startTime": "2024-08-21T09:00:00Z",
            "parentExecution": { "workflowId": "p", "runId": "pr" }
        });
        let info: ExecutionInfo = serde_json::from_value::<WireExecutionInfo>(raw)
            .unwrap()
            .into();
        assert_eq!(info.status, ExecutionStatus::Running);
        assert_eq!(info.workflow_type, "OrderWorkflow");
        assert!(info.is_child());
        assert!(info.close_time.is_none());
    }

    #[test]
    fn test_int64_as_string_or_number() {
        assert_eq!(as_i64(&json!("42")), Some(42));
        assert_eq!(as_i64(&json!(42)), Some(42));
        assert_eq!(as_i64(&json!(null)), None);
    }

    #[test]
    fn test_workflow_id_stays_one_path_segment() {
        let backend = HttpBackend::connect(&ConnectionProfile::local()).unwrap();
        let execution = ExecutionRef::new("orders/2024#7 retry?x", "r1");
        let url = backend.workflow_url(&execution, Some("terminate"));
        assert_eq!(
            url.path(),
            "/api/v1/namespaces/default/workflows/orders%2F2024%237%20retry%3Fx/terminate"
        );
        assert!(url.fragment().is_none());
        assert!(url.query().is_none());

        let list = backend.url(&["workflows"]);
        assert_eq!(list.as_str(), "http://localhost:7243/api/v1/namespaces/default/workflows");
    }

    #[test]
    fn test_endpoint_with_path_prefix() {
        let mut profile = ConnectionProfile::local();
        profile.http_endpoint = "https://proxy.example.com/temporal/".into();
        let backend = HttpBackend::connect(&profile).unwrap();
        let url = backend.workflow_url(&ExecutionRef::new("a", "r"), None);
        assert_eq!(url.path(), "/temporal/api/v1/namespaces/default/workflows/a");
    }
}

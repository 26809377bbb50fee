//! In-memory stand-in for the LLM evaluation API.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

use crate::error::{RequestError, RequestErrorKind};
use crate::http::client::Transport;
use crate::http::method::HttpMethod;
use crate::http::request::{ApiRequest, RequestBody};
use crate::http::response::ApiResponse;

/// Fields that point at another collection. Creates referencing a missing
/// instance are rejected and referenced instances cannot be deleted.
const REFERENCES: &[(&str, &str)] = &[
    ("agent_id", "agents"),
    ("dataset_id", "datasets"),
    ("prompt_id", "prompts"),
    ("evaluation_id", "evaluations"),
];

const COLLECTIONS: &[&str] = &["agents", "prompts", "datasets", "evaluations", "reports"];

#[derive(Default)]
struct Store {
    items: HashMap<String, Vec<Value>>,
    counters: HashMap<String, usize>,
    calls: Vec<(HttpMethod, String)>,
}

#[derive(Default)]
pub struct FakeApi {
    store: Mutex<Store>,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
    timeout_on: Option<String>,
    hang_on: Option<String>,
    stall_create: Option<String>,
    stalled: AtomicBool,
    drop_field: Option<(String, String)>,
    deny_auth: bool,
    hung: Notify,
    release: Notify,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates of `resource` answer 500.
    pub fn failing_create(mut self, resource: &str) -> Self {
        self.fail_create.insert(resource.to_string());
        self
    }

    /// Deletes of `resource` answer 500.
    pub fn failing_delete(mut self, resource: &str) -> Self {
        self.fail_delete.insert(resource.to_string());
        self
    }

    /// Requests whose path contains `fragment` time out.
    pub fn timing_out_on(mut self, fragment: &str) -> Self {
        self.timeout_on = Some(fragment.to_string());
        self
    }

    /// Requests whose path contains `fragment` never answer.
    pub fn hanging_on(mut self, fragment: &str) -> Self {
        self.hang_on = Some(fragment.to_string());
        self
    }

    /// The first create in `collection` is stored, then its response is held
    /// back until [`FakeApi::release`].
    pub fn stalling_create(mut self, collection: &str) -> Self {
        self.stall_create = Some(collection.to_string());
        self
    }

    /// GET responses under `prefix` omit `field`.
    pub fn dropping_field(mut self, prefix: &str, field: &str) -> Self {
        self.drop_field = Some((prefix.to_string(), field.to_string()));
        self
    }

    /// The auth status endpoint reports the token as unauthenticated.
    pub fn denying_auth(mut self) -> Self {
        self.deny_auth = true;
        self
    }

    /// Resolves once a hanging request has arrived.
    pub async fn hung(&self) {
        self.hung.notified().await;
    }

    /// Lets a stalled create answer.
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Instances still stored across every collection.
    pub fn remaining(&self) -> usize {
        self.lock().items.values().map(Vec::len).sum()
    }

    pub fn calls(&self) -> Vec<(HttpMethod, String)> {
        self.lock().calls.clone()
    }

    pub fn was_called(&self, method: HttpMethod, fragment: &str) -> bool {
        self.lock()
            .calls
            .iter()
            .any(|(called, path)| *called == method && path.contains(fragment))
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn route(&self, request: &ApiRequest) -> (u16, Value) {
        let segments: Vec<&str> = request
            .path
            .trim_start_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        let method = request.method;

        match (method, segments.as_slice()) {
            (HttpMethod::Get, ["health"]) => (200, json!({"status": "healthy"})),
            (HttpMethod::Get, ["api", "auth", "status"]) => {
                (200, json!({"authenticated": !self.deny_auth}))
            }
            (HttpMethod::Get, ["api", "auth", "me"]) => (
                200,
                json!({
                    "sub": "user-1",
                    "username": "tester",
                    "email": "tester@example.com",
                    "name": "Test User",
                    "roles": ["admin"]
                }),
            ),
            (HttpMethod::Post, ["api", "auth", "logout"]) => (200, json!({"message": "Logged out"})),
            (HttpMethod::Get, ["api", "datasets", "schema", kind]) => (
                200,
                json!({
                    "dataset_type": kind,
                    "schema": {"question": "string", "answer": "string"},
                    "supported_metrics": ["faithfulness"]
                }),
            ),
            (HttpMethod::Get, ["api", "datasets", "metrics", kind]) => {
                let mut metrics = Map::new();
                metrics.insert(kind.to_string(), json!(["faithfulness", "answer_relevancy"]));
                (200, Value::Object(metrics))
            }
            (HttpMethod::Get, ["api", "evaluations", "metrics", _]) => (
                200,
                json!({"faithfulness": {"description": "Answer is grounded in the context"}}),
            ),
            (HttpMethod::Get, ["api", "reports", "status", "counts"]) => {
                let total = self.lock().items.get("reports").map_or(0, Vec::len);
                (200, json!({"draft": total}))
            }
            (_, ["api", collection, rest @ ..]) if COLLECTIONS.contains(collection) => {
                self.collection(method, collection, rest, request)
            }
            _ => (404, json!({"detail": "Not Found"})),
        }
    }

    fn collection(
        &self,
        method: HttpMethod,
        collection: &str,
        rest: &[&str],
        request: &ApiRequest,
    ) -> (u16, Value) {
        match (method, rest) {
            (HttpMethod::Get, []) => {
                let store = self.lock();
                let items = store.items.get(collection).cloned().unwrap_or_default();
                let total = items.len();
                (200, json!({"items": items, "total": total}))
            }
            (HttpMethod::Post, []) => self.create(collection, request),
            (HttpMethod::Post, ["search"]) => {
                let query = match &request.body {
                    RequestBody::Json(body) => body["query"].as_str().unwrap_or_default().to_string(),
                    _ => String::new(),
                };
                let store = self.lock();
                let items: Vec<Value> = store
                    .items
                    .get(collection)
                    .into_iter()
                    .flatten()
                    .filter(|item| item["name"].as_str().is_some_and(|name| name.contains(&query)))
                    .cloned()
                    .collect();
                let total = items.len();
                (200, json!({"items": items, "total": total}))
            }
            (HttpMethod::Get, [id]) => match self.find(collection, id) {
                Some(mut item) => {
                    if collection == "reports" {
                        item["evaluation_summary"] = json!({"overall_score": 0.9});
                    }
                    (200, item)
                }
                None => not_found(),
            },
            (HttpMethod::Put, [id]) => {
                let mut store = self.lock();
                let item = store
                    .items
                    .get_mut(collection)
                    .and_then(|items| items.iter_mut().find(|item| item["id"] == *id));
                match (item, &request.body) {
                    (Some(item), RequestBody::Json(Value::Object(update))) => {
                        if let Value::Object(fields) = &mut *item {
                            for (key, value) in update {
                                fields.insert(key.clone(), value.clone());
                            }
                        }
                        (200, item.clone())
                    }
                    (Some(_), _) => (422, json!({"detail": "Expected a JSON object"})),
                    (None, _) => not_found(),
                }
            }
            (HttpMethod::Delete, [id]) => self.delete(collection, id),
            (_, [id, action]) => {
                let Some(item) = self.find(collection, id) else {
                    return not_found();
                };
                match (collection, *action) {
                    ("agents", "test") => (200, json!({"response": "Paris"})),
                    ("evaluations", "start") => (200, json!({"id": item["id"], "status": "running"})),
                    ("evaluations", "progress") => (
                        200,
                        json!({"status": "running", "completed": 1, "total": 3, "percentage": 33.3}),
                    ),
                    ("evaluations", "cancel") => {
                        (200, json!({"id": item["id"], "status": "cancelled"}))
                    }
                    ("evaluations", "results") => (200, json!({"items": [], "total": 0})),
                    ("evaluations", "test") => (200, json!({"scores": {"faithfulness": 1.0}})),
                    ("reports", "generate") => (200, json!({"id": item["id"], "status": "generated"})),
                    ("reports", "send") => (501, json!({"detail": "Email is not configured"})),
                    ("reports", "download") => (200, Value::String("%PDF-1.4".to_string())),
                    ("reports", "preview") => (200, json!({"html": "<h1>Report</h1>"})),
                    _ => not_found(),
                }
            }
            _ => (405, json!({"detail": "Method Not Allowed"})),
        }
    }

    fn create(&self, collection: &str, request: &ApiRequest) -> (u16, Value) {
        if self.fail_create.contains(collection) {
            return (500, json!({"detail": "Internal Server Error"}));
        }

        let mut fields = match &request.body {
            RequestBody::Json(Value::Object(fields)) => fields.clone(),
            RequestBody::Multipart { fields, file } => {
                let mut map: Map<String, Value> = fields
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                    .collect();
                map.insert("row_count".to_string(), json!(file.content.lines().count().saturating_sub(1)));
                map
            }
            _ => return (422, json!({"detail": "Missing body"})),
        };

        let mut store = self.lock();
        for (field, target) in REFERENCES {
            if let Some(id) = fields.get(*field) {
                let exists = store
                    .items
                    .get(*target)
                    .is_some_and(|items| items.iter().any(|item| item["id"] == *id));
                if !exists {
                    return (422, json!({"detail": format!("Unknown {field}")}));
                }
            }
        }

        let counter = store.counters.entry(collection.to_string()).or_default();
        *counter += 1;
        let id = format!("{collection}-{counter}");
        fields.insert("id".to_string(), Value::String(id));
        let item = Value::Object(fields);
        store
            .items
            .entry(collection.to_string())
            .or_default()
            .push(item.clone());
        (201, item)
    }

    fn delete(&self, collection: &str, id: &str) -> (u16, Value) {
        if self.fail_delete.contains(collection) {
            return (500, json!({"detail": "Internal Server Error"}));
        }

        let mut store = self.lock();
        let referenced = REFERENCES
            .iter()
            .filter(|(_, target)| *target == collection)
            .any(|(field, _)| {
                store
                    .items
                    .values()
                    .flatten()
                    .any(|item| item[*field] == *id)
            });
        if referenced {
            return (409, json!({"detail": "Instance is still referenced"}));
        }

        let Some(items) = store.items.get_mut(collection) else {
            return not_found();
        };
        let before = items.len();
        items.retain(|item| item["id"] != *id);
        if items.len() == before {
            return not_found();
        }
        (204, Value::Null)
    }

    fn find(&self, collection: &str, id: &str) -> Option<Value> {
        self.lock()
            .items
            .get(collection)?
            .iter()
            .find(|item| item["id"] == *id)
            .cloned()
    }

    fn stalls(&self, request: &ApiRequest) -> bool {
        let Some(collection) = self.stall_create.as_deref() else {
            return false;
        };
        request.method == HttpMethod::Post
            && request.path.trim_matches('/') == format!("api/{collection}")
    }

    fn drops_field(&self, request: &ApiRequest) -> Option<&str> {
        let (prefix, field) = self.drop_field.as_ref()?;
        (request.method == HttpMethod::Get && request.path.starts_with(prefix.as_str()))
            .then_some(field.as_str())
    }
}

#[async_trait]
impl Transport for FakeApi {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, RequestError> {
        self.lock().calls.push((request.method, request.path.clone()));

        if self
            .hang_on
            .as_deref()
            .is_some_and(|fragment| request.path.contains(fragment))
        {
            self.hung.notify_one();
            std::future::pending::<()>().await;
        }
        if self
            .timeout_on
            .as_deref()
            .is_some_and(|fragment| request.path.contains(fragment))
        {
            return Err(RequestError::new(RequestErrorKind::Timeout, "Request timed out"));
        }

        let (status, mut body) = self.route(request);
        if let (Some(field), Value::Object(fields)) = (self.drops_field(request), &mut body) {
            fields.remove(field);
        }

        let (content_type, body) = match body {
            Value::Null => ("application/json", String::new()),
            Value::String(raw) => ("application/pdf", raw),
            other => ("application/json", other.to_string()),
        };
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        headers.insert("x-request-id".to_string(), format!("req-{}", self.lock().calls.len()));

        if self.stalls(request) && !self.stalled.swap(true, Ordering::SeqCst) {
            self.hung.notify_one();
            self.release.notified().await;
        }

        Ok(ApiResponse {
            status,
            headers,
            body,
            latency: Duration::from_millis(2),
        })
    }
}

fn not_found() -> (u16, Value) {
    (404, json!({"detail": "Not Found"}))
}

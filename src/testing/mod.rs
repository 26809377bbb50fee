//! # Test Cases & Results
//!
//! A [`TestCase`] is one call against one endpoint: a path and body template,
//! the instances it needs, what it expects back and which assertions to run.
//! Cases are pure data. The runner fills their templates from the run
//! variables and records a [`TestResult`] per case.

pub mod assertions;
mod catalog;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::environment::{self, RunVariables};
use crate::http::method::HttpMethod;
use crate::http::request::AuthRequirement;
use crate::http::response::ApiResponse;
use crate::resources::InstanceKey;
use crate::schema::{ApiSchema, Violation};

pub use assertions::{Assertion, AssertionTarget, JsonType};
pub use catalog::plan_cases;

/// Response bodies kept in results are cut to this many characters.
const SNAPSHOT_LIMIT: usize = 2_000;

/// Endpoint groups a run can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Auth,
    Health,
    Agents,
    Datasets,
    Evaluations,
    Prompts,
    Reports,
    All,
}

impl Module {
    pub const CONCRETE: [Module; 7] = [
        Module::Auth,
        Module::Health,
        Module::Agents,
        Module::Datasets,
        Module::Evaluations,
        Module::Prompts,
        Module::Reports,
    ];

    /// Concrete modules for a selection. Nothing selected or `all` means
    /// every module.
    pub fn expand(selection: &[Module]) -> Vec<Module> {
        if selection.is_empty() || selection.contains(&Module::All) {
            return Self::CONCRETE.to_vec();
        }
        Self::CONCRETE
            .into_iter()
            .filter(|module| selection.contains(module))
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Module::Auth => "auth",
            Module::Health => "health",
            Module::Agents => "agents",
            Module::Datasets => "datasets",
            Module::Evaluations => "evaluations",
            Module::Prompts => "prompts",
            Module::Reports => "reports",
            Module::All => "all",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: HttpMethod,
    /// Path template, e.g. `/api/agents/{{agents.id}}`.
    pub path: String,
    pub auth: AuthRequirement,
}

impl Endpoint {
    /// Grouping key with placeholders collapsed, e.g. `GET /api/agents/{id}`.
    pub fn key(&self) -> String {
        let mut path = self.path.clone();
        for placeholder in environment::placeholders(&self.path) {
            let short = placeholder.rsplit('.').next().unwrap_or(&placeholder);
            path = path.replacen(&format!("{{{{{placeholder}}}}}"), &format!("{{{short}}}"), 1);
        }
        format!("{} {path}", self.method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Any 2xx status.
    Success,
    ExpectedFailure { statuses: Vec<u16> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    /// The case destroys the instance; teardown must not delete it again.
    Deletes(InstanceKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub module: Module,
    pub name: String,
    pub endpoint: Endpoint,
    pub requires: Vec<InstanceKey>,
    pub body: Option<Value>,
    pub expected: Expectation,
    pub assertions: Vec<Assertion>,
    /// Statuses meaning "not available in this deployment": the case is
    /// recorded as skipped instead of failed.
    pub skip_on_status: Vec<u16>,
    pub effect: Effect,
}

impl TestCase {
    pub fn new(module: Module, name: &str, method: HttpMethod, path: &str) -> Self {
        Self {
            id: format!("{module}::{name}"),
            module,
            name: name.to_string(),
            endpoint: Endpoint {
                method,
                path: path.to_string(),
                auth: AuthRequirement::Optional,
            },
            requires: Vec::new(),
            body: None,
            expected: Expectation::Success,
            assertions: Vec::new(),
            skip_on_status: Vec::new(),
            effect: Effect::None,
        }
    }

    pub fn auth(mut self, auth: AuthRequirement) -> Self {
        self.endpoint.auth = auth;
        self
    }

    pub fn requires(mut self, key: InstanceKey) -> Self {
        if !self.requires.contains(&key) {
            self.requires.push(key);
        }
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn expect_failure(mut self, statuses: &[u16]) -> Self {
        self.expected = Expectation::ExpectedFailure {
            statuses: statuses.to_vec(),
        };
        self
    }

    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn skip_on(mut self, statuses: &[u16]) -> Self {
        self.skip_on_status = statuses.to_vec();
        self
    }

    /// Marks the case as deleting `key` and makes it a requirement.
    pub fn deletes(mut self, key: InstanceKey) -> Self {
        self = self.requires(key.clone());
        self.effect = Effect::Deletes(key);
        self
    }

    /// Placeholders used by the path, body and assertion templates.
    pub fn placeholders(&self) -> Vec<String> {
        let mut found = environment::placeholders(&self.endpoint.path);
        if let Some(body) = &self.body {
            found.extend(environment::json_placeholders(body));
        }
        for assertion in &self.assertions {
            found.extend(environment::json_placeholders(&assertion.expected));
        }
        found
    }

    /// Placeholders that neither a required instance nor the run provides.
    /// Instance placeholders are `<resource>[.<label>].<field>`.
    pub fn undeclared_placeholders(&self) -> Vec<String> {
        self.placeholders()
            .into_iter()
            .filter(|placeholder| {
                if let Some(name) = placeholder.strip_prefix("run.") {
                    return !environment::RUN_VARIABLES.contains(&name);
                }
                !self.requires.iter().any(|key| {
                    instance_field(placeholder, key).is_some()
                })
            })
            .collect()
    }
}

/// The field part of `placeholder` when it addresses `key`.
pub fn instance_field<'a>(placeholder: &'a str, key: &InstanceKey) -> Option<&'a str> {
    let prefix = key.variable_prefix();
    placeholder
        .strip_prefix(prefix.as_str())?
        .strip_prefix('.')
        .filter(|field| !field.is_empty() && !field.contains('.'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
    Skipped,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::Error => "error",
            TestStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub content_type: Option<String>,
    /// Response headers, names lower-cased.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub truncated: bool,
}

impl ResponseSnapshot {
    pub fn capture(response: &ApiResponse) -> Self {
        let truncated = response.body.chars().count() > SNAPSHOT_LIMIT;
        let body = if truncated {
            response.body.chars().take(SNAPSHOT_LIMIT).collect()
        } else {
            response.body.clone()
        };
        Self {
            status: response.status,
            content_type: response.content_type().map(str::to_string),
            headers: response.headers.clone(),
            body,
            truncated,
        }
    }
}

/// Outcome of one case (or one provisioning create). Never modified after it
/// is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Position in the plan; the report sorts by it.
    pub sequence: usize,
    pub test_id: String,
    pub module: String,
    pub name: String,
    /// Grouping key, e.g. `GET /api/agents/{id}`.
    pub endpoint: String,
    /// Path actually requested.
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub status: TestStatus,
    pub latency_ms: f64,
    pub response: Option<ResponseSnapshot>,
    pub violations: Vec<Violation>,
    pub message: Option<String>,
}

/// Result of judging a response against a case.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: TestStatus,
    pub violations: Vec<Violation>,
    pub message: Option<String>,
}

/// Checks a response against the case's expectation, the documented response
/// schema and the case's assertions.
pub fn judge(
    case: &TestCase,
    path: &str,
    response: &ApiResponse,
    vars: &RunVariables,
    schema: Option<&ApiSchema>,
) -> Verdict {
    if case.skip_on_status.contains(&response.status) {
        return Verdict {
            status: TestStatus::Skipped,
            violations: Vec::new(),
            message: Some(format!(
                "Endpoint not available in this environment (status {})",
                response.status
            )),
        };
    }

    let status_ok = match &case.expected {
        Expectation::Success => response.is_success(),
        Expectation::ExpectedFailure { statuses } => statuses.contains(&response.status),
    };
    if !status_ok {
        let wanted = match &case.expected {
            Expectation::Success => "2xx".to_string(),
            Expectation::ExpectedFailure { statuses } => statuses
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
        };
        return Verdict {
            status: TestStatus::Fail,
            violations: vec![Violation::assertion(
                "",
                format!("Expected status {wanted}, got {}", response.status),
            )],
            message: Some(format!("Unexpected status {}", response.status)),
        };
    }

    let mut violations = schema_violations(case.endpoint.method, path, response, schema);
    for assertion in &case.assertions {
        let result = assertion.evaluate(response, vars);
        if !result.passed {
            let location = match &assertion.target {
                AssertionTarget::JsonPath(path) => path.as_str(),
                _ => "",
            };
            violations.push(Violation::assertion(location, result.message));
        }
    }

    let status = if violations.is_empty() {
        TestStatus::Pass
    } else {
        TestStatus::Fail
    };
    let message = match violations.len() {
        0 => None,
        1 => Some(violations[0].message.clone()),
        count => Some(format!("{count} checks failed")),
    };

    Verdict {
        status,
        violations,
        message,
    }
}

/// Validates a JSON response body against the documented schema, if any.
pub fn schema_violations(
    method: HttpMethod,
    path: &str,
    response: &ApiResponse,
    schema: Option<&ApiSchema>,
) -> Vec<Violation> {
    let Some(expected) = schema.and_then(|schema| schema.response_schema(method, path, response.status))
    else {
        return Vec::new();
    };

    match response.json() {
        Some(body) => expected.validate(&body),
        None => vec![Violation::schema("", "Response body is not valid JSON")],
    }
}

//! # Test Executor
//!
//! Drives one run through its phases:
//!
//! 1. **Plan**: select cases, collect the instances they need and order them
//!    with the resolver. Every problem found here is fatal and no request has
//!    been sent yet.
//! 2. **Pre-flight**: check the token against the auth status endpoint.
//! 3. **Provisioning**: create instances one at a time in dependency order.
//! 4. **Execution**: release the cases whose instances exist to a bounded
//!    worker pool (one worker in sequential mode).
//! 5. **Teardown**: delete every created instance in reverse creation order.
//!    This always runs, after failures and cancellation alike.
//!
//! Workers share nothing mutable except the [`ResultLog`].

mod cancel;
mod log;

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::{self, AuthState};
use crate::config::{ExecutionMode, RunConfig};
use crate::datagen::DataGenerator;
use crate::environment::RunVariables;
use crate::error::{CleanupFailure, HarnessError, RequestError, RequestErrorKind};
use crate::http::client::{HttpTransport, Transport};
use crate::http::request::{ApiRequest, AuthRequirement, RequestBody};
use crate::http::response::ApiResponse;
use crate::report::{Report, RunMetadata};
use crate::resolver::{self, ProvisionOrder};
use crate::resources::{
    GeneratedInstance, InstanceKey, InstanceRegistry, ResourceCatalog, ResourceSpec,
    builtin_catalog,
};
use crate::schema::{ApiSchema, Violation};
use crate::testing::{
    self, Effect, Module, ResponseSnapshot, TestCase, TestResult, TestStatus, instance_field,
    plan_cases,
};

pub use cancel::CancelFlag;
pub use log::ResultLog;

const CANCELLED_MESSAGE: &str = "Run cancelled";

/// What a run will do, computed before any request is sent.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub cases: Vec<TestCase>,
    /// Instances in creation order.
    pub instances: Vec<InstanceKey>,
    pub order: ProvisionOrder,
}

/// Builds and validates the plan for `modules`.
pub fn plan(catalog: &ResourceCatalog, modules: &[Module]) -> Result<RunPlan, HarnessError> {
    let cases = plan_cases(modules);
    validate_cases(catalog, &cases)?;

    let mut required: BTreeSet<InstanceKey> = cases
        .iter()
        .flat_map(|case| case.requires.iter().cloned())
        .collect();
    let order = resolver::resolve(catalog, required.iter().map(|key| key.resource.clone()))?;

    // Dependents reference the primary instance of every type they need.
    for type_name in order.creation() {
        required.insert(InstanceKey::primary(type_name));
    }

    let mut instances = Vec::with_capacity(required.len());
    for type_name in order.creation() {
        let mut keys: Vec<InstanceKey> = required
            .iter()
            .filter(|key| &key.resource == type_name)
            .cloned()
            .collect();
        keys.sort_by(|a, b| (!a.is_primary(), &a.label).cmp(&(!b.is_primary(), &b.label)));
        instances.extend(keys);
    }

    Ok(RunPlan {
        cases,
        instances,
        order,
    })
}

/// Checks that every case only uses instances and variables that will exist.
pub fn validate_cases(catalog: &ResourceCatalog, cases: &[TestCase]) -> Result<(), HarnessError> {
    let mut ids = HashSet::new();
    for case in cases {
        if !ids.insert(case.id.as_str()) {
            return Err(HarnessError::config(format!("Duplicate test case `{}`", case.id)));
        }

        for key in &case.requires {
            if catalog.get(&key.resource).is_none() {
                return Err(HarnessError::config(format!(
                    "Case `{}` requires unknown resource type `{}`",
                    case.id, key.resource
                )));
            }
        }

        let undeclared = case.undeclared_placeholders();
        if !undeclared.is_empty() {
            return Err(HarnessError::config(format!(
                "Case `{}` uses undeclared variables: {}",
                case.id,
                undeclared.join(", ")
            )));
        }

        for placeholder in case.placeholders() {
            for key in &case.requires {
                let Some(field) = instance_field(&placeholder, key) else {
                    continue;
                };
                let known = field == "id"
                    || catalog
                        .get(&key.resource)
                        .is_some_and(|spec| spec.fields().any(|spec_field| spec_field.name == field));
                if !known {
                    return Err(HarnessError::config(format!(
                        "Case `{}` uses `{placeholder}` but `{}` has no field `{field}`",
                        case.id, key.resource
                    )));
                }
            }
        }

        if let Effect::Deletes(key) = &case.effect {
            if let Some(other) = cases
                .iter()
                .find(|other| other.id != case.id && other.requires.contains(key))
            {
                return Err(HarnessError::config(format!(
                    "Instance {key} is deleted by `{}` but also used by `{}`",
                    case.id, other.id
                )));
            }
        }
    }
    Ok(())
}

/// Runs planned cases against one API.
pub struct Executor {
    config: RunConfig,
    transport: Arc<dyn Transport>,
    catalog: ResourceCatalog,
    schema: Option<Arc<ApiSchema>>,
}

impl Executor {
    /// Executor over HTTP, loading the OpenAPI document if one is configured.
    pub fn new(config: RunConfig) -> Result<Self, HarnessError> {
        let transport = HttpTransport::new(config.base_url.clone(), config.token.clone(), config.timeout)
            .map_err(|err| HarnessError::config(err.to_string()))?;
        let schema = match &config.schema_path {
            Some(path) => Some(ApiSchema::load(path)?),
            None => None,
        };
        Ok(Self::with_transport(config, Arc::new(transport), schema))
    }

    pub fn with_transport(
        config: RunConfig,
        transport: Arc<dyn Transport>,
        schema: Option<ApiSchema>,
    ) -> Self {
        Self {
            config,
            transport,
            catalog: builtin_catalog(),
            schema: schema.map(Arc::new),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Executes the configured modules. Only fatal errors are returned; every
    /// per-case problem ends up in the report.
    pub async fn run(&self, cancel: broadcast::Receiver<()>) -> Result<Report, HarnessError> {
        let started_at = Utc::now();
        let run_plan = plan(&self.catalog, &self.config.modules)?;
        let mut generator = DataGenerator::new(self.config.seed);
        let run_id = Uuid::new_v4();

        tracing::info!(
            %run_id,
            cases = run_plan.cases.len(),
            instances = run_plan.instances.len(),
            order = %run_plan.order.creation().join(" -> "),
            seed = generator.seed(),
            "Starting run"
        );

        let (cancel, watcher) = CancelFlag::watch(cancel);
        let log = Arc::new(ResultLog::new());

        let auth_state = auth::check_token(self.transport.as_ref(), self.config.token.is_some()).await;
        match auth_state.skip_reason() {
            None => tracing::info!("Token accepted"),
            Some(reason) => tracing::warn!(%reason, "Authenticated endpoints will be skipped"),
        }

        let mut vars = RunVariables::new();
        vars.insert("run.id", run_id.to_string());
        vars.insert("run.missing_id", Uuid::new_v4().to_string());

        let mut registry = InstanceRegistry::new();
        let mut sequence = 0;

        let provisioned = if self.config.generate_data {
            self.provision(
                &run_plan,
                &mut generator,
                &mut registry,
                &mut vars,
                &auth_state,
                &cancel,
                &log,
                &mut sequence,
            )
            .await
        } else {
            tracing::info!("Test data generation disabled, cases needing instances are skipped");
            Ok(())
        };

        if let Err(err) = provisioned {
            tracing::error!(error = %err, "Provisioning aborted");
            self.teardown(&run_plan.order, &mut registry).await;
            watcher.abort();
            return Err(err);
        }

        let destroyed = self
            .execute(&run_plan, &registry, vars, &auth_state, &cancel, &log, sequence)
            .await;
        for key in &destroyed {
            registry.mark_destroyed(key);
        }

        let cleanup_failures = self.teardown(&run_plan.order, &mut registry).await;
        let cancelled = cancel.is_set();
        watcher.abort();

        let metadata = RunMetadata {
            run_id: run_id.to_string(),
            title: self.config.report_title.clone(),
            base_url: self.config.base_url.to_string(),
            started_at,
            finished_at: Utc::now(),
            seed: generator.seed(),
            modules: self
                .config
                .modules
                .iter()
                .map(|module| module.to_string())
                .collect(),
            execution: match self.config.execution {
                ExecutionMode::Sequential => "sequential".to_string(),
                ExecutionMode::Parallel { .. } => "parallel".to_string(),
            },
            workers: self.config.execution.worker_count(),
            generate_data: self.config.generate_data,
            authenticated: auth_state.is_authenticated(),
            auth_detail: auth_state.skip_reason(),
            schema_path: self
                .config
                .schema_path
                .as_ref()
                .map(|path| path.display().to_string()),
            cancelled,
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let report = Report::build(metadata, log.take(), cleanup_failures);
        tracing::info!(
            total = report.summary.total,
            passed = report.summary.passed,
            failed = report.summary.failed,
            errors = report.summary.errors,
            skipped = report.summary.skipped,
            cancelled,
            "Run finished"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn provision(
        &self,
        run_plan: &RunPlan,
        generator: &mut DataGenerator,
        registry: &mut InstanceRegistry,
        vars: &mut RunVariables,
        auth_state: &AuthState,
        cancel: &CancelFlag,
        log: &ResultLog,
        sequence: &mut usize,
    ) -> Result<(), HarnessError> {
        for key in &run_plan.instances {
            let current = *sequence;
            *sequence += 1;

            let spec = self
                .catalog
                .get(&key.resource)
                .ok_or_else(|| HarnessError::config(format!("Unknown resource type `{}`", key.resource)))?;
            let mut record = CreateRecord::new(current, key, spec);

            if cancel.is_set() {
                log.push(record.skipped(CANCELLED_MESSAGE.to_string()));
                continue;
            }
            if spec.requires_auth {
                if let Some(reason) = auth_state.skip_reason() {
                    log.push(record.skipped(reason));
                    continue;
                }
            }
            if let Some(missing) = spec
                .dependencies()
                .into_iter()
                .find(|dep| registry.get(&InstanceKey::primary(dep)).and_then(GeneratedInstance::created_id).is_none())
            {
                log.push(record.skipped(format!("Prerequisite `{missing}` was not created")));
                continue;
            }

            let spec = spec.for_label(&key.label);
            let payload = generator.generate(&spec, registry)?;
            let request = spec.create_request(&payload);
            registry.insert(GeneratedInstance::pending(key.clone()));

            // Not raced against cancel: the new id only arrives with the
            // response. The transport timeout bounds the wait.
            let started = Instant::now();
            match self.transport.send(&request).await {
                Err(err) => {
                    registry.mark_failed(key);
                    tracing::warn!(instance = %key, error = %err, "Create request failed");
                    let latency = self.error_latency(&err, started);
                    log.push(record.errored(&err, latency));
                }
                Ok(response) => {
                    let id = response.is_success().then(|| created_id(&response)).flatten();
                    match id {
                        Some(id) => {
                            tracing::debug!(instance = %key, %id, "Created");
                            registry.mark_created(key, id.clone());
                            vars.insert_instance(key, &id, &payload.body);
                            let violations = testing::schema_violations(
                                request.method,
                                &request.path,
                                &response,
                                self.schema.as_deref(),
                            );
                            log.push(record.responded(&response, violations, None));
                        }
                        None => {
                            registry.mark_failed(key);
                            let message = if response.is_success() {
                                "Create response carried no `id`".to_string()
                            } else {
                                format!("Create returned status {}", response.status)
                            };
                            tracing::warn!(instance = %key, status = response.status, "{message}");
                            record.force_fail();
                            log.push(record.responded(&response, Vec::new(), Some(message)));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Releases runnable cases to the worker pool. Returns the instances the
    /// cases destroyed.
    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        run_plan: &RunPlan,
        registry: &InstanceRegistry,
        vars: RunVariables,
        auth_state: &AuthState,
        cancel: &CancelFlag,
        log: &Arc<ResultLog>,
        first_sequence: usize,
    ) -> Vec<InstanceKey> {
        let mut released = VecDeque::new();
        for (index, case) in run_plan.cases.iter().enumerate() {
            let sequence = first_sequence + index;
            match self.gate(case, registry, auth_state) {
                Some(reason) => log.push(skipped_case(sequence, case, reason)),
                None => released.push_back((sequence, case.clone())),
            }
        }

        let released_sequences: Vec<(usize, TestCase)> = released.iter().cloned().collect();
        let worker_count = self.config.execution.worker_count().clamp(1, released.len().max(1));
        tracing::info!(released = released.len(), workers = worker_count, "Executing cases");

        let queue = Arc::new(Mutex::new(released));
        let context = Arc::new(CaseContext {
            transport: self.transport.clone(),
            vars: Arc::new(vars),
            schema: self.schema.clone(),
            timeout: self.config.timeout,
        });

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let queue = queue.clone();
            let context = context.clone();
            let log = log.clone();
            let mut cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let mut destroyed = Vec::new();
                loop {
                    if cancel.is_set() {
                        break;
                    }
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some((sequence, case)) = next else {
                        break;
                    };
                    let (result, deleted) = context.execute(sequence, &case, &mut cancel).await;
                    destroyed.extend(deleted);
                    log.push(result);
                }
                destroyed
            }));
        }

        let mut destroyed = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(keys) => destroyed.extend(keys),
                Err(err) => tracing::error!(error = %err, "Worker crashed"),
            }
        }

        // Every released case gets exactly one result, run or not.
        let recorded = log.sequences();
        for (sequence, case) in released_sequences {
            if !recorded.contains(&sequence) {
                let reason = if cancel.is_set() {
                    CANCELLED_MESSAGE.to_string()
                } else {
                    "Worker stopped before running this case".to_string()
                };
                let mut result = skipped_case(sequence, &case, reason);
                if !cancel.is_set() {
                    result.status = TestStatus::Error;
                }
                log.push(result);
            }
        }

        destroyed
    }

    /// Reason a case cannot run, if any.
    fn gate(&self, case: &TestCase, registry: &InstanceRegistry, auth_state: &AuthState) -> Option<String> {
        if case.endpoint.auth == AuthRequirement::Required {
            if let Some(reason) = auth_state.skip_reason() {
                return Some(reason);
            }
        }
        if !case.requires.is_empty() && !self.config.generate_data {
            return Some("Test data generation is disabled".to_string());
        }
        case.requires
            .iter()
            .find(|key| registry.get(key).and_then(GeneratedInstance::created_id).is_none())
            .map(|key| format!("Required instance {key} was not created"))
    }

    /// Deletes every created instance, dependents before their prerequisites
    /// and newest first within a type. Failures are collected, never
    /// propagated.
    async fn teardown(&self, order: &ProvisionOrder, registry: &mut InstanceRegistry) -> Vec<CleanupFailure> {
        let created = registry.teardown_order();
        let targets: Vec<(InstanceKey, String)> = order
            .teardown()
            .iter()
            .flat_map(|type_name| created.iter().filter(move |instance| &instance.key.resource == type_name))
            .filter_map(|instance| Some((instance.key.clone(), instance.created_id()?.to_string())))
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }
        tracing::info!(instances = targets.len(), "Tearing down test data");

        let mut failures = Vec::new();
        for (key, id) in targets {
            let Some(spec) = self.catalog.get(&key.resource) else {
                continue;
            };
            match self.transport.send(&spec.delete_request(&id)).await {
                Ok(response) if response.is_success() || response.status == 404 => {
                    registry.mark_destroyed(&key);
                }
                Ok(response) => {
                    let message = format!("Delete returned status {}", response.status);
                    tracing::warn!(instance = %key, %id, status = response.status, "Cleanup failed");
                    failures.push(CleanupFailure {
                        instance: key.to_string(),
                        id,
                        message,
                    });
                }
                Err(err) => {
                    tracing::warn!(instance = %key, %id, error = %err, "Cleanup failed");
                    failures.push(CleanupFailure {
                        instance: key.to_string(),
                        id,
                        message: err.to_string(),
                    });
                }
            }
        }
        failures
    }

    fn error_latency(&self, err: &RequestError, started: Instant) -> Duration {
        error_latency(err, started, self.config.timeout)
    }
}

/// Read-only state every worker needs.
struct CaseContext {
    transport: Arc<dyn Transport>,
    vars: Arc<RunVariables>,
    schema: Option<Arc<ApiSchema>>,
    timeout: Duration,
}

impl CaseContext {
    async fn execute(
        &self,
        sequence: usize,
        case: &TestCase,
        cancel: &mut CancelFlag,
    ) -> (TestResult, Option<InstanceKey>) {
        let path = self.vars.interpolate(&case.endpoint.path);
        let body = match &case.body {
            Some(template) => RequestBody::Json(self.vars.interpolate_json(template)),
            None => RequestBody::Empty,
        };
        let request = ApiRequest::new(case.endpoint.method, path.clone())
            .with_body(body)
            .with_auth(case.endpoint.auth);

        let started = Instant::now();
        let outcome = tokio::select! {
            outcome = self.transport.send(&request) => Some(outcome),
            _ = cancel.cancelled() => None,
        };

        let mut result = TestResult {
            sequence,
            test_id: case.id.clone(),
            module: case.module.to_string(),
            name: case.name.clone(),
            endpoint: case.endpoint.key(),
            path,
            timestamp: Utc::now(),
            status: TestStatus::Skipped,
            latency_ms: 0.0,
            response: None,
            violations: Vec::new(),
            message: None,
        };

        let response = match outcome {
            None => {
                result.latency_ms = millis(started.elapsed());
                result.message = Some(CANCELLED_MESSAGE.to_string());
                return (result, None);
            }
            Some(Err(err)) => {
                tracing::warn!(case = %case.id, error = %err, "Request failed");
                result.status = TestStatus::Error;
                result.latency_ms = millis(error_latency(&err, started, self.timeout));
                result.message = Some(err.to_string());
                return (result, None);
            }
            Some(Ok(response)) => response,
        };

        let verdict = testing::judge(case, &result.path, &response, &self.vars, self.schema.as_deref());
        tracing::debug!(case = %case.id, status = response.status, verdict = %verdict.status, "Case finished");

        let deleted = match &case.effect {
            // A 404 means the instance is gone either way.
            Effect::Deletes(key) if response.is_success() || response.status == 404 => {
                Some(key.clone())
            }
            _ => None,
        };

        result.status = verdict.status;
        result.latency_ms = millis(response.latency);
        result.response = Some(ResponseSnapshot::capture(&response));
        result.violations = verdict.violations;
        result.message = verdict.message;
        (result, deleted)
    }
}

/// Builds the `<instance>::create` result for one provisioning step.
struct CreateRecord {
    result: TestResult,
    failed: bool,
}

impl CreateRecord {
    fn new(sequence: usize, key: &InstanceKey, spec: &ResourceSpec) -> Self {
        let name = if key.is_primary() {
            "create".to_string()
        } else {
            format!("create[{}]", key.label)
        };
        Self {
            result: TestResult {
                sequence,
                test_id: format!("{}::{name}", key.resource),
                module: key.resource.clone(),
                name,
                endpoint: format!("POST {}", spec.collection_path),
                path: spec.collection_path.clone(),
                timestamp: Utc::now(),
                status: TestStatus::Skipped,
                latency_ms: 0.0,
                response: None,
                violations: Vec::new(),
                message: None,
            },
            failed: false,
        }
    }

    fn force_fail(&mut self) {
        self.failed = true;
    }

    fn skipped(mut self, reason: String) -> TestResult {
        self.result.timestamp = Utc::now();
        self.result.message = Some(reason);
        self.result
    }

    fn errored(mut self, err: &RequestError, latency: Duration) -> TestResult {
        self.result.timestamp = Utc::now();
        self.result.status = TestStatus::Error;
        self.result.latency_ms = millis(latency);
        self.result.message = Some(err.to_string());
        self.result
    }

    fn responded(
        mut self,
        response: &ApiResponse,
        violations: Vec<Violation>,
        message: Option<String>,
    ) -> TestResult {
        self.result.timestamp = Utc::now();
        self.result.status = if self.failed || !violations.is_empty() {
            TestStatus::Fail
        } else {
            TestStatus::Pass
        };
        self.result.latency_ms = millis(response.latency);
        self.result.response = Some(ResponseSnapshot::capture(response));
        self.result.message = message.or_else(|| violations.first().map(|v| v.message.clone()));
        self.result.violations = violations;
        self.result
    }
}

fn skipped_case(sequence: usize, case: &TestCase, reason: String) -> TestResult {
    TestResult {
        sequence,
        test_id: case.id.clone(),
        module: case.module.to_string(),
        name: case.name.clone(),
        endpoint: case.endpoint.key(),
        path: case.endpoint.path.clone(),
        timestamp: Utc::now(),
        status: TestStatus::Skipped,
        latency_ms: 0.0,
        response: None,
        violations: Vec::new(),
        message: Some(reason),
    }
}

/// Timeouts count as the configured timeout, everything else as measured.
fn error_latency(err: &RequestError, started: Instant, timeout: Duration) -> Duration {
    match err.kind {
        RequestErrorKind::Timeout => timeout,
        _ => started.elapsed(),
    }
}

fn created_id(response: &ApiResponse) -> Option<String> {
    match response.json()?.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod fake;

#[cfg(test)]
mod tests;

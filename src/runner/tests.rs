use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::json;
use tokio::sync::broadcast;

use super::fake::FakeApi;
use super::*;
use crate::auth::AuthToken;
use crate::http::method::HttpMethod;
use crate::report::ReportFormat;

fn config(modules: &[Module], execution: ExecutionMode) -> RunConfig {
    RunConfig {
        base_url: Url::parse("http://fake.test").unwrap(),
        token: Some(AuthToken::new("test-token")),
        timeout: Duration::from_secs(5),
        generate_data: true,
        execution,
        seed: Some(7),
        schema_path: None,
        report_formats: vec![ReportFormat::Json],
        report_dir: "reports".into(),
        report_title: "Runner Test".to_string(),
        modules: Module::expand(modules),
    }
}

async fn run(executor: &Executor) -> Report {
    let (_tx, rx) = broadcast::channel(1);
    executor.run(rx).await.unwrap()
}

fn result<'a>(report: &'a Report, test_id: &str) -> &'a TestResult {
    report
        .results
        .iter()
        .find(|result| result.test_id == test_id)
        .unwrap_or_else(|| panic!("no result for {test_id}"))
}

#[test]
fn plan_orders_instances_by_resource_then_label() {
    let run_plan = plan(&builtin_catalog(), &[Module::Datasets, Module::Evaluations]).unwrap();

    assert_eq!(
        run_plan.order.creation(),
        ["agents", "prompts", "datasets", "evaluations"]
    );
    let keys: Vec<String> = run_plan.instances.iter().map(ToString::to_string).collect();
    assert_eq!(
        keys,
        [
            "agents",
            "prompts",
            "datasets",
            "datasets[doomed]",
            "evaluations",
            "evaluations[cancellable]",
            "evaluations[doomed]",
        ]
    );
}

#[test]
fn plan_without_instances_is_empty() {
    let run_plan = plan(&builtin_catalog(), &[Module::Health, Module::Auth]).unwrap();
    assert!(run_plan.instances.is_empty());
    assert!(run_plan.order.creation().is_empty());
}

#[test]
fn validation_rejects_undeclared_variables() {
    let catalog = builtin_catalog();
    let case = TestCase::new(Module::Agents, "get", HttpMethod::Get, "/api/agents/{{agents.id}}");

    let err = validate_cases(&catalog, &[case]).unwrap_err();
    assert!(err.to_string().contains("agents.id"), "{err}");
}

#[test]
fn validation_rejects_unknown_fields_and_resources() {
    let catalog = builtin_catalog();
    let unknown_field = TestCase::new(Module::Agents, "get", HttpMethod::Get, "/api/agents/{{agents.colour}}")
        .requires(InstanceKey::primary("agents"));
    let unknown_resource = TestCase::new(Module::Agents, "widgets", HttpMethod::Get, "/api/widgets/")
        .requires(InstanceKey::primary("widgets"));

    let err = validate_cases(&catalog, &[unknown_field]).unwrap_err();
    assert!(err.to_string().contains("colour"), "{err}");
    let err = validate_cases(&catalog, &[unknown_resource]).unwrap_err();
    assert!(err.to_string().contains("widgets"), "{err}");
}

#[test]
fn validation_rejects_shared_deleted_instances_and_duplicates() {
    let catalog = builtin_catalog();
    let doomed = InstanceKey::labeled("agents", "doomed");
    let delete = TestCase::new(Module::Agents, "delete", HttpMethod::Delete, "/api/agents/{{agents.doomed.id}}")
        .deletes(doomed.clone());
    let reader = TestCase::new(Module::Agents, "peek", HttpMethod::Get, "/api/agents/{{agents.doomed.id}}")
        .requires(doomed);

    let err = validate_cases(&catalog, &[delete.clone(), reader]).unwrap_err();
    assert!(err.to_string().contains("agents::peek"), "{err}");

    let err = validate_cases(&catalog, &[delete.clone(), delete]).unwrap_err();
    assert!(err.to_string().contains("Duplicate"), "{err}");
}

#[tokio::test]
async fn full_run_passes_and_leaves_nothing_behind() {
    let fake = Arc::new(FakeApi::new());
    let executor = Executor::with_transport(
        config(&[Module::All], ExecutionMode::Parallel { workers: 4 }),
        fake.clone(),
        None,
    );

    let report = run(&executor).await;

    let bad: Vec<_> = report
        .results
        .iter()
        .filter(|result| matches!(result.status, TestStatus::Fail | TestStatus::Error))
        .map(|result| format!("{}: {:?}", result.test_id, result.message))
        .collect();
    assert!(bad.is_empty(), "{bad:#?}");
    let health = result(&report, "health::check").response.as_ref().unwrap();
    assert!(health.headers.get("x-request-id").is_some_and(|id| id.starts_with("req-")));

    let run_plan = plan(&builtin_catalog(), &[Module::All]).unwrap();
    assert_eq!(report.results.len(), run_plan.cases.len() + run_plan.instances.len());
    let ids: HashSet<_> = report.results.iter().map(|result| result.test_id.as_str()).collect();
    assert_eq!(ids.len(), report.results.len());

    assert_eq!(result(&report, "reports::send").status, TestStatus::Skipped);
    assert_eq!(result(&report, "evaluations::cancel").status, TestStatus::Pass);
    assert!(report.cleanup_failures.is_empty());
    assert_eq!(fake.remaining(), 0);
    assert!(!report.metadata.cancelled);
}

#[tokio::test]
async fn sequential_and_parallel_runs_record_the_same_cases() {
    let mut recorded = Vec::new();
    for execution in [ExecutionMode::Sequential, ExecutionMode::Parallel { workers: 3 }] {
        let executor = Executor::with_transport(
            config(&[Module::Agents, Module::Reports], execution),
            Arc::new(FakeApi::new()),
            None,
        );
        let report = run(&executor).await;
        let ids: Vec<String> = report
            .results
            .iter()
            .map(|result| format!("{}={}", result.test_id, result.status))
            .collect();
        recorded.push(ids);
    }

    assert_eq!(recorded[0], recorded[1]);
}

#[tokio::test]
async fn failed_create_skips_dependents_and_still_tears_down() {
    let fake = Arc::new(FakeApi::new().failing_create("datasets"));
    let executor = Executor::with_transport(
        config(&[Module::Evaluations], ExecutionMode::Sequential),
        fake.clone(),
        None,
    );

    let report = run(&executor).await;

    assert_eq!(result(&report, "datasets::create").status, TestStatus::Fail);
    let evaluation = result(&report, "evaluations::create");
    assert_eq!(evaluation.status, TestStatus::Skipped);
    assert_eq!(
        evaluation.message.as_deref(),
        Some("Prerequisite `datasets` was not created")
    );
    assert_eq!(result(&report, "evaluations::get").status, TestStatus::Skipped);
    assert_eq!(result(&report, "evaluations::list").status, TestStatus::Pass);
    assert!(!fake.was_called(HttpMethod::Post, "/api/evaluations/"));
    assert_eq!(fake.remaining(), 0);
}

#[tokio::test]
async fn teardown_deletes_in_reverse_creation_order() {
    let fake = Arc::new(FakeApi::new());
    let executor = Executor::with_transport(
        config(&[Module::Datasets, Module::Evaluations], ExecutionMode::Sequential),
        fake.clone(),
        None,
    );

    let report = run(&executor).await;

    assert!(report.cleanup_failures.is_empty());
    assert_eq!(fake.remaining(), 0);
    let deletes: Vec<String> = fake
        .calls()
        .into_iter()
        .filter(|(method, _)| *method == HttpMethod::Delete)
        .map(|(_, path)| path)
        .collect();
    // The two `delete` cases run first, then teardown.
    assert_eq!(
        &deletes[2..],
        [
            "/api/evaluations/evaluations-2",
            "/api/evaluations/evaluations-1",
            "/api/datasets/datasets-1",
            "/api/prompts/prompts-1",
            "/api/agents/agents-1",
        ]
    );
}

#[tokio::test]
async fn cleanup_failures_are_reported_without_stopping_teardown() {
    let fake = Arc::new(FakeApi::new().failing_delete("agents"));
    let executor = Executor::with_transport(
        config(&[Module::Agents, Module::Prompts], ExecutionMode::Sequential),
        fake.clone(),
        None,
    );

    let report = run(&executor).await;

    assert_eq!(result(&report, "agents::delete").status, TestStatus::Fail);
    let failed: Vec<&str> = report
        .cleanup_failures
        .iter()
        .map(|failure| failure.instance.as_str())
        .collect();
    assert_eq!(failed, ["agents[doomed]", "agents"]);
    // Prompts were still deleted.
    assert_eq!(fake.remaining(), 2);
}

#[tokio::test]
async fn cancellation_skips_pending_cases_and_cleans_up() {
    let fake = Arc::new(FakeApi::new().hanging_on("/progress"));
    let executor = Executor::with_transport(
        config(&[Module::Evaluations], ExecutionMode::Sequential),
        fake.clone(),
        None,
    );
    let (tx, rx) = broadcast::channel(1);

    let (report, ()) = tokio::join!(executor.run(rx), async {
        fake.hung().await;
        tx.send(()).unwrap();
    });
    let report = report.unwrap();

    assert!(report.metadata.cancelled);
    let progress = result(&report, "evaluations::progress");
    assert_eq!(progress.status, TestStatus::Skipped);
    assert_eq!(progress.message.as_deref(), Some("Run cancelled"));
    assert_eq!(result(&report, "evaluations::test").status, TestStatus::Skipped);
    assert!(!fake.was_called(HttpMethod::Get, "/results"));
    assert_eq!(fake.remaining(), 0);
}

#[tokio::test]
async fn create_in_flight_at_cancel_is_registered_and_torn_down() {
    let fake = Arc::new(FakeApi::new().stalling_create("datasets"));
    let executor = Executor::with_transport(
        config(&[Module::Datasets], ExecutionMode::Sequential),
        fake.clone(),
        None,
    );
    let (tx, rx) = broadcast::channel(1);

    let (report, ()) = tokio::join!(executor.run(rx), async {
        fake.hung().await;
        // The server already holds the dataset when the cancel lands.
        assert_eq!(fake.remaining(), 1);
        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        fake.release();
    });
    let report = report.unwrap();

    assert!(report.metadata.cancelled);
    let create = result(&report, "datasets::create");
    assert_eq!(create.status, TestStatus::Pass);
    let doomed = result(&report, "datasets::create[doomed]");
    assert_eq!(doomed.status, TestStatus::Skipped);
    assert_eq!(doomed.message.as_deref(), Some("Run cancelled"));
    assert_eq!(result(&report, "datasets::get").status, TestStatus::Skipped);

    assert!(fake.was_called(HttpMethod::Delete, "/api/datasets/datasets-1"));
    assert!(report.cleanup_failures.is_empty());
    assert_eq!(fake.remaining(), 0);
}

#[tokio::test]
async fn timeouts_are_errors_with_the_configured_latency() {
    let fake = Arc::new(FakeApi::new().timing_out_on("/search"));
    let executor = Executor::with_transport(
        config(&[Module::Agents], ExecutionMode::Sequential),
        fake,
        None,
    );

    let report = run(&executor).await;

    let search = result(&report, "agents::search");
    assert_eq!(search.status, TestStatus::Error);
    assert_eq!(search.latency_ms, 5_000.0);
    assert!(search.message.as_deref().unwrap_or_default().starts_with("TIMEOUT"));
    assert_eq!(result(&report, "agents::get").status, TestStatus::Pass);
}

#[tokio::test]
async fn schema_violations_fail_the_case() {
    let schema = ApiSchema::from_value(json!({
        "paths": {"/api/agents/{id}": {"get": {"responses": {"200": {"content": {
            "application/json": {"schema": {
                "type": "object",
                "required": ["id", "name"],
                "properties": {"id": {"type": "string"}, "name": {"type": "string"}}
            }}
        }}}}}}
    }))
    .unwrap();
    let fake = Arc::new(FakeApi::new().dropping_field("/api/agents/", "name"));
    let executor = Executor::with_transport(
        config(&[Module::Agents], ExecutionMode::Sequential),
        fake,
        Some(schema),
    );

    let report = run(&executor).await;

    let get = result(&report, "agents::get");
    assert_eq!(get.status, TestStatus::Fail);
    assert!(
        get.violations
            .iter()
            .any(|violation| violation.message == "Missing required property: name"),
        "{:?}",
        get.violations
    );
}

#[tokio::test]
async fn missing_token_skips_authenticated_cases() {
    let fake = Arc::new(FakeApi::new());
    let mut config = config(&[Module::Agents, Module::Datasets], ExecutionMode::Sequential);
    config.token = None;
    let executor = Executor::with_transport(config, fake.clone(), None);

    let report = run(&executor).await;

    assert!(!report.metadata.authenticated);
    let create = result(&report, "datasets::create");
    assert_eq!(create.status, TestStatus::Skipped);
    assert_eq!(create.message.as_deref(), Some("Authentication token not provided"));
    assert_eq!(result(&report, "datasets::list").status, TestStatus::Skipped);
    assert_eq!(result(&report, "agents::get").status, TestStatus::Pass);
    assert!(!fake.was_called(HttpMethod::Get, "/api/auth/status"));
}

#[tokio::test]
async fn rejected_token_skips_authenticated_cases() {
    let fake = Arc::new(FakeApi::new().denying_auth());
    let executor = Executor::with_transport(
        config(&[Module::Reports], ExecutionMode::Sequential),
        fake.clone(),
        None,
    );

    let report = run(&executor).await;

    let create = result(&report, "reports::create");
    assert_eq!(create.status, TestStatus::Skipped);
    assert!(
        create
            .message
            .as_deref()
            .unwrap_or_default()
            .starts_with("Authentication token is invalid")
    );
    // Agents and prompts need no token and are still provisioned and cleaned up.
    assert_eq!(result(&report, "agents::create").status, TestStatus::Pass);
    assert_eq!(fake.remaining(), 0);
}

#[tokio::test]
async fn disabled_data_generation_skips_instance_cases() {
    let fake = Arc::new(FakeApi::new());
    let mut config = config(&[Module::Agents], ExecutionMode::Sequential);
    config.generate_data = false;
    let executor = Executor::with_transport(config, fake.clone(), None);

    let report = run(&executor).await;

    assert_eq!(result(&report, "agents::list").status, TestStatus::Pass);
    let get = result(&report, "agents::get");
    assert_eq!(get.status, TestStatus::Skipped);
    assert_eq!(get.message.as_deref(), Some("Test data generation is disabled"));
    assert!(!fake.was_called(HttpMethod::Post, "/api/agents/"));
}

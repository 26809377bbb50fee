use serde_json::json;

use crate::http::method::HttpMethod;
use crate::http::request::AuthRequirement;
use crate::resources::InstanceKey;

use super::{Assertion, JsonType, Module, TestCase};

/// Dedicated instance label for cases that delete what they touch.
pub const DOOMED: &str = "doomed";
/// Dedicated evaluation the cancel case works on.
pub const CANCELLABLE: &str = "cancellable";

/// Statuses an optional integration (mail, rendering) answers with when it is
/// not configured.
const UNAVAILABLE: &[u16] = &[404, 500, 501, 503];

/// Cases of every selected module, in module order.
pub fn plan_cases(modules: &[Module]) -> Vec<TestCase> {
    Module::expand(modules)
        .into_iter()
        .flat_map(cases_for)
        .collect()
}

pub fn cases_for(module: Module) -> Vec<TestCase> {
    match module {
        Module::Auth => auth(),
        Module::Health => health(),
        Module::Agents => agents(),
        Module::Datasets => datasets(),
        Module::Evaluations => evaluations(),
        Module::Prompts => prompts(),
        Module::Reports => reports(),
        Module::All => plan_cases(&[Module::All]),
    }
}

fn auth_for(module: Module) -> AuthRequirement {
    match module {
        Module::Agents | Module::Prompts | Module::Health => AuthRequirement::Optional,
        _ => AuthRequirement::Required,
    }
}

fn case(module: Module, name: &str, method: HttpMethod, path: &str) -> TestCase {
    TestCase::new(module, name, method, path).auth(auth_for(module))
}

/// List, get, update, delete and get-missing cases shared by every resource
/// module.
fn crud(module: Module) -> Vec<TestCase> {
    let resource = module.as_str();
    let primary = InstanceKey::primary(resource);
    let doomed = InstanceKey::labeled(resource, DOOMED);
    let collection = format!("/api/{resource}/");
    let item = format!("/api/{resource}/{{{{{resource}.id}}}}");

    vec![
        case(module, "list", HttpMethod::Get, &collection)
            .assert(Assertion::header_contains("content-type", "application/json"))
            .assert(Assertion::has_type("items", JsonType::Array))
            .assert(Assertion::has_type("total", JsonType::Integer)),
        case(module, "get", HttpMethod::Get, &item)
            .requires(primary.clone())
            .assert(Assertion::has_type("id", JsonType::String))
            .assert(Assertion::equals("id", format!("{{{{{resource}.id}}}}")))
            .assert(Assertion::equals("name", format!("{{{{{resource}.name}}}}"))),
        // Only the description changes, so concurrent cases reading the name
        // still see the generated one.
        case(module, "update", HttpMethod::Put, &item)
            .requires(primary)
            .body(json!({"description": "Updated by automated test"}))
            .assert(Assertion::equals("id", format!("{{{{{resource}.id}}}}")))
            .assert(Assertion::equals("description", "Updated by automated test")),
        case(
            module,
            "delete",
            HttpMethod::Delete,
            &format!("/api/{resource}/{{{{{resource}.{DOOMED}.id}}}}"),
        )
        .deletes(doomed)
        .assert(Assertion::status_in(&[200, 204])),
        case(
            module,
            "get_missing",
            HttpMethod::Get,
            &format!("/api/{resource}/{{{{run.missing_id}}}}"),
        )
        .expect_failure(&[404]),
    ]
}

fn search(module: Module) -> TestCase {
    let resource = module.as_str();
    case(
        module,
        "search",
        HttpMethod::Post,
        &format!("/api/{resource}/search"),
    )
    .requires(InstanceKey::primary(resource))
    .body(json!({"query": format!("{{{{{resource}.name}}}}")}))
    .assert(Assertion::non_empty("items"))
    .assert(Assertion::greater_than("total", 0))
    .assert(Assertion::equals(
        "items[*].name",
        format!("{{{{{resource}.name}}}}"),
    ))
}

fn auth() -> Vec<TestCase> {
    vec![
        TestCase::new(Module::Auth, "status", HttpMethod::Get, "/api/auth/status")
            .assert(Assertion::has_type("authenticated", JsonType::Boolean)),
        case(Module::Auth, "me", HttpMethod::Get, "/api/auth/me")
            .assert(Assertion::exists("sub"))
            .assert(Assertion::has_type("username", JsonType::String))
            .assert(Assertion::exists("email"))
            .assert(Assertion::exists("name"))
            .assert(Assertion::exists("roles")),
        case(Module::Auth, "logout", HttpMethod::Post, "/api/auth/logout"),
    ]
}

fn health() -> Vec<TestCase> {
    vec![TestCase::new(Module::Health, "check", HttpMethod::Get, "/health").auth(AuthRequirement::None)]
}

fn agents() -> Vec<TestCase> {
    let module = Module::Agents;
    let mut cases = crud(module);
    cases.push(search(module));
    cases.push(
        case(module, "test", HttpMethod::Post, "/api/agents/{{agents.id}}/test")
            .requires(InstanceKey::primary("agents"))
            .body(json!({"query": "What is the capital of France?"})),
    );
    cases
}

fn prompts() -> Vec<TestCase> {
    crud(Module::Prompts)
}

fn datasets() -> Vec<TestCase> {
    let module = Module::Datasets;
    let mut cases = crud(module);
    cases.push(
        case(module, "schema", HttpMethod::Get, "/api/datasets/schema/question_answer")
            .assert(Assertion::equals("dataset_type", "question_answer"))
            .assert(Assertion::exists("schema"))
            .assert(Assertion::exists("supported_metrics")),
    );
    cases.push(
        case(module, "metrics", HttpMethod::Get, "/api/datasets/metrics/question_answer")
            .assert(Assertion::has_type("question_answer", JsonType::Array)),
    );
    cases
}

fn evaluations() -> Vec<TestCase> {
    let module = Module::Evaluations;
    let primary = InstanceKey::primary("evaluations");
    let mut cases = crud(module);
    cases.push(search(module));
    cases.extend([
        case(module, "start", HttpMethod::Post, "/api/evaluations/{{evaluations.id}}/start")
            .requires(primary.clone())
            .assert(Assertion::equals("id", "{{evaluations.id}}")),
        case(module, "progress", HttpMethod::Get, "/api/evaluations/{{evaluations.id}}/progress")
            .requires(primary.clone())
            .assert(Assertion::exists("status"))
            .assert(Assertion::exists("completed"))
            .assert(Assertion::exists("total"))
            .assert(Assertion::has_type("percentage", JsonType::Number)),
        case(
            module,
            "cancel",
            HttpMethod::Post,
            "/api/evaluations/{{evaluations.cancellable.id}}/cancel",
        )
        .requires(InstanceKey::labeled("evaluations", CANCELLABLE))
        .assert(Assertion::equals("id", "{{evaluations.cancellable.id}}"))
        .assert(Assertion::not_equals("status", "running"))
        .assert(Assertion::one_of("status", json!(["cancelled", "pending", "failed"]))),
        case(module, "results", HttpMethod::Get, "/api/evaluations/{{evaluations.id}}/results")
            .requires(primary.clone()),
        case(module, "metrics", HttpMethod::Get, "/api/evaluations/metrics/question_answer")
            .assert(Assertion::has_type("$", JsonType::Object))
            .assert(Assertion::non_empty("$")),
        case(module, "test", HttpMethod::Post, "/api/evaluations/{{evaluations.id}}/test")
            .requires(primary)
            .body(json!({
                "query": "What is the capital of France?",
                "context": "France is a country in Western Europe. Its capital is Paris.",
                "answer": "The capital of France is Paris.",
                "ground_truth": "Paris"
            })),
    ]);
    cases
}

fn reports() -> Vec<TestCase> {
    let module = Module::Reports;
    let primary = InstanceKey::primary("reports");
    let mut cases = crud(module);
    cases.extend([
        case(module, "get_summary", HttpMethod::Get, "/api/reports/{{reports.id}}")
            .requires(primary.clone())
            .assert(Assertion::exists("evaluation_summary")),
        case(module, "generate", HttpMethod::Post, "/api/reports/{{reports.id}}/generate")
            .requires(primary.clone())
            .body(json!({"force_regenerate": true}))
            .assert(Assertion::equals("id", "{{reports.id}}")),
        case(module, "send", HttpMethod::Post, "/api/reports/{{reports.id}}/send")
            .requires(primary.clone())
            .body(json!({
                "recipients": [{"email": "test@example.com", "name": "Test User"}],
                "subject": "Automated Test Report",
                "message": "This is a test report sent by the automated test suite.",
                "include_pdf": true
            }))
            .skip_on(UNAVAILABLE),
        case(module, "download", HttpMethod::Get, "/api/reports/{{reports.id}}/download")
            .requires(primary.clone())
            .skip_on(UNAVAILABLE)
            .assert(Assertion::body_contains("%PDF")),
        case(module, "preview", HttpMethod::Get, "/api/reports/{{reports.id}}/preview")
            .requires(primary)
            .skip_on(UNAVAILABLE),
        case(module, "status_counts", HttpMethod::Get, "/api/reports/status/counts")
            .assert(Assertion::has_type("$", JsonType::Object)),
    ]);
    cases
}

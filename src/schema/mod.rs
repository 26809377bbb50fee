//! # Response Schema Validation
//!
//! Looks up the response schema an OpenAPI document declares for an
//! operation and checks a decoded JSON body against it with `jsonschema`.
//!
//! Each looked-up schema is compiled with the whole document as its root, so
//! `$ref` pointers such as `#/components/schemas/Agent` resolve on demand
//! while validating. Recursive components are fine. Compiled validators are
//! cached per schema location.
//!
//! OpenAPI 3.0 documents are normalized once on load: `nullable: true` adds
//! `"null"` to the declared type, and boolean `exclusiveMinimum` /
//! `exclusiveMaximum` become their numeric form.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex};

use jsonschema::Validator;
use jsonschema::error::ValidationErrorKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HarnessError;
use crate::http::method::HttpMethod;

/// Hops allowed when a response object is itself a `$ref`.
const MAX_RESPONSE_HOPS: usize = 8;

static TEMPLATE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}/]+\}").expect("template pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    Schema,
    Assertion,
}

/// One failed check. `path` is the location in the body (`items[0].name`),
/// empty for the body itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn schema(path: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::Schema,
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn assertion(path: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::Assertion,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

struct PathTemplate {
    template: String,
    pattern: Regex,
}

/// A loaded OpenAPI document.
pub struct ApiSchema {
    document: Value,
    templates: Vec<PathTemplate>,
    /// Compiled validators by schema pointer; `None` when compiling failed.
    validators: Mutex<HashMap<String, Option<Arc<Validator>>>>,
}

/// The compiled schema for one documented response.
#[derive(Clone)]
pub struct ResponseSchema {
    pointer: String,
    validator: Arc<Validator>,
}

impl fmt::Debug for ResponseSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSchema")
            .field("pointer", &self.pointer)
            .finish_non_exhaustive()
    }
}

impl ResponseSchema {
    /// JSON pointer of the schema inside the document.
    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    /// Checks `body` and returns every violation found.
    pub fn validate(&self, body: &Value) -> Vec<Violation> {
        self.validator
            .iter_errors(body)
            .map(|error| {
                let segments = pointer_segments(&error.instance_path.to_string());
                if let ValidationErrorKind::Required { property } = &error.kind {
                    let property = property
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| property.to_string());
                    let location = append_key(&body_path(body, &segments), &property);
                    return Violation::schema(
                        &location,
                        format!("Missing required property: {location}"),
                    );
                }

                let location = body_path(body, &segments);
                let name = if location.is_empty() { "response" } else { location.as_str() };
                Violation::schema(&location, format!("Property {name}: {error}"))
            })
            .collect()
    }
}

impl ApiSchema {
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            HarnessError::config(format!("Failed to read schema `{}`: {err}", path.display()))
        })?;
        let document: Value = serde_json::from_str(&raw).map_err(|err| {
            HarnessError::config(format!("Failed to parse schema `{}`: {err}", path.display()))
        })?;
        Self::from_value(document)
    }

    pub fn from_value(mut document: Value) -> Result<Self, HarnessError> {
        let paths = document
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| HarnessError::config("Schema document has no `paths` object"))?;

        let mut templates = Vec::new();
        for template in paths.keys() {
            if !TEMPLATE_PARAM.is_match(template) {
                continue;
            }
            let normalized = normalize_path(template);
            let mut pattern = String::from("^");
            let mut last = 0;
            for found in TEMPLATE_PARAM.find_iter(&normalized) {
                pattern.push_str(&regex::escape(&normalized[last..found.start()]));
                pattern.push_str("[^/]+");
                last = found.end();
            }
            pattern.push_str(&regex::escape(&normalized[last..]));
            pattern.push('$');

            let pattern = Regex::new(&pattern).map_err(|err| {
                HarnessError::config(format!("Invalid path template `{template}`: {err}"))
            })?;
            templates.push(PathTemplate {
                template: template.clone(),
                pattern,
            });
        }

        normalize_openapi(&mut document);

        Ok(Self {
            document,
            templates,
            validators: Mutex::new(HashMap::new()),
        })
    }

    /// Compiled schema for the response to `method path` with `status`, if
    /// the document declares a JSON one.
    pub fn response_schema(
        &self,
        method: HttpMethod,
        path: &str,
        status: u16,
    ) -> Option<ResponseSchema> {
        let method = method.as_str().to_ascii_lowercase();
        let (template, operation) = self.operation(&method, path)?;
        let responses = operation.get("responses")?.as_object()?;

        let exact = status.to_string();
        let range = format!("{}XX", status / 100);
        let (code, mut response) = responses
            .get_key_value(&exact)
            .or_else(|| {
                responses
                    .iter()
                    .find(|(code, _)| code.eq_ignore_ascii_case(&range))
            })
            .or_else(|| responses.get_key_value("default"))?;

        let mut pointer = format!(
            "/paths/{}/{method}/responses/{}",
            escape_segment(template),
            escape_segment(code)
        );
        for _ in 0..MAX_RESPONSE_HOPS {
            let Some(reference) = response.get("$ref").and_then(Value::as_str) else {
                break;
            };
            let target = reference.strip_prefix('#')?;
            response = self.document.pointer(target)?;
            pointer = target.to_string();
        }

        let (media, schema) = response
            .get("content")?
            .as_object()?
            .iter()
            .find(|(media, _)| media.starts_with("application/json"))
            .and_then(|(media, body)| Some((media, body.get("schema")?)))?;
        let pointer = format!("{pointer}/content/{}/schema", escape_segment(media));

        let validator = self.validator(&pointer, schema)?;
        Some(ResponseSchema { pointer, validator })
    }

    fn validator(&self, pointer: &str, schema: &Value) -> Option<Arc<Validator>> {
        let mut cache = self
            .validators
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = cache.get(pointer) {
            return cached.clone();
        }

        // The document is the root so `#/...` references resolve against it.
        let mut root = self.document.clone();
        if let Value::Object(fields) = &mut root {
            fields.insert("allOf".to_string(), Value::Array(vec![schema.clone()]));
        }
        let compiled = match jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&root)
        {
            Ok(validator) => Some(Arc::new(validator)),
            Err(err) => {
                tracing::warn!(pointer, error = %err, "Response schema does not compile, skipping validation");
                None
            }
        };
        cache.insert(pointer.to_string(), compiled.clone());
        compiled
    }

    fn operation(&self, method: &str, path: &str) -> Option<(&str, &Value)> {
        let paths = self.document.get("paths")?.as_object()?;
        let normalized = normalize_path(path);

        let exact = paths
            .iter()
            .find(|(template, _)| normalize_path(template) == normalized)
            .and_then(|(template, item)| Some((template.as_str(), item.get(method)?)));
        if exact.is_some() {
            return exact;
        }

        self.templates
            .iter()
            .filter(|template| template.pattern.is_match(&normalized))
            .find_map(|template| {
                let operation = paths.get(&template.template)?.get(method)?;
                Some((template.template.as_str(), operation))
            })
    }
}

/// Leading slash, no trailing slash, no query string.
fn normalize_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn append_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Renders pointer segments as `items[0].name`, using the body to tell array
/// indexes from object keys.
fn body_path(body: &Value, segments: &[String]) -> String {
    let mut path = String::new();
    let mut current = Some(body);
    for segment in segments {
        match current {
            Some(Value::Array(items)) => {
                path.push_str(&format!("[{segment}]"));
                current = segment.parse::<usize>().ok().and_then(|index| items.get(index));
            }
            other => {
                path = append_key(&path, segment);
                current = other.and_then(|value| value.get(segment.as_str()));
            }
        }
    }
    path
}

/// Rewrites OpenAPI 3.0 keywords into their JSON Schema 2020-12 form.
fn normalize_openapi(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            if fields.get("nullable").and_then(Value::as_bool) == Some(true) {
                allow_null(fields);
            }
            for (exclusive, bound) in [("exclusiveMinimum", "minimum"), ("exclusiveMaximum", "maximum")] {
                if let Some(flag) = fields.get(exclusive).and_then(Value::as_bool) {
                    fields.remove(exclusive);
                    if flag {
                        if let Some(limit) = fields.remove(bound) {
                            fields.insert(exclusive.to_string(), limit);
                        }
                    }
                }
            }
            for child in fields.values_mut() {
                normalize_openapi(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_openapi),
        _ => {}
    }
}

fn allow_null(fields: &mut Map<String, Value>) {
    let null = Value::String("null".to_string());
    match fields.get_mut("type") {
        Some(Value::String(name)) => {
            let name = Value::String(std::mem::take(name));
            fields.insert("type".to_string(), Value::Array(vec![name, null]));
        }
        Some(Value::Array(names)) if !names.contains(&null) => names.push(null),
        _ => {}
    }
    if let Some(Value::Array(allowed)) = fields.get_mut("enum") {
        if !allowed.contains(&Value::Null) {
            allowed.push(Value::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent_schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "name", "domain"],
            "properties": {
                "id": {"type": "string", "format": "uuid"},
                "name": {"type": "string", "minLength": 1, "maxLength": 100},
                "domain": {"type": "string", "enum": ["healthcare", "finance"]},
                "created_at": {"type": "string", "format": "date-time"},
                "description": {"type": "string", "nullable": true},
                "config": {
                    "type": "object",
                    "required": ["temperature"],
                    "properties": {"temperature": {"type": "number", "minimum": 0, "maximum": 1}}
                },
                "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 2},
                "version": {"anyOf": [{"type": "string"}, {"type": "null"}]}
            }
        })
    }

    fn valid_agent() -> Value {
        json!({
            "id": "3f2b8c1e-9d4a-4b7e-8f00-1a2b3c4d5e6f",
            "name": "Acme Agent",
            "domain": "finance",
            "created_at": "2024-01-01T10:00:00Z",
            "description": null,
            "config": {"temperature": 0.5},
            "tags": ["a"],
            "version": null
        })
    }

    fn json_response(schema: Value) -> Value {
        json!({"content": {"application/json": {"schema": schema}}})
    }

    fn document() -> Value {
        json!({
            "openapi": "3.0.3",
            "paths": {
                "/api/agents/": {
                    "get": {"responses": {"200": json_response(json!({"$ref": "#/components/schemas/AgentList"}))}},
                    "post": {"responses": {"201": json_response(json!({"$ref": "#/components/schemas/Agent"}))}}
                },
                "/api/agents/search": {
                    "post": {"responses": {"200": json_response(json!({"$ref": "#/components/schemas/AgentList"}))}}
                },
                "/api/agents/{agent_id}": {
                    "get": {"responses": {
                        "2XX": json_response(json!({"$ref": "#/components/schemas/Agent"})),
                        "default": {"$ref": "#/components/responses/Problem"}
                    }},
                    "delete": {"responses": {"204": {"description": "No Content"}}}
                },
                "/api/tags": {
                    "get": {"responses": {"200": json_response(json!({"type": "array", "items": {"type": "string"}}))}}
                },
                "/api/nodes/{node_id}": {
                    "get": {"responses": {"200": json_response(json!({"$ref": "#/components/schemas/Node"}))}}
                }
            },
            "components": {
                "schemas": {
                    "Agent": agent_schema(),
                    "AgentList": {
                        "type": "object",
                        "required": ["items", "total"],
                        "properties": {
                            "items": {"type": "array", "items": {"$ref": "#/components/schemas/Agent"}},
                            "total": {"type": "integer"}
                        }
                    },
                    "Node": {
                        "type": "object",
                        "required": ["name"],
                        "properties": {
                            "name": {"type": "string"},
                            "left": {"$ref": "#/components/schemas/Node"},
                            "right": {"$ref": "#/components/schemas/Node"},
                            "parent": {"$ref": "#/components/schemas/Node"},
                            "children": {"type": "array", "items": {"$ref": "#/components/schemas/Node"}}
                        }
                    }
                },
                "responses": {
                    "Problem": json_response(json!({"type": "object", "required": ["detail"]}))
                }
            }
        })
    }

    fn api() -> ApiSchema {
        ApiSchema::from_value(document()).unwrap()
    }

    fn agent() -> ResponseSchema {
        api()
            .response_schema(HttpMethod::Post, "/api/agents", 201)
            .unwrap()
    }

    fn paths(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|violation| violation.path.as_str()).collect()
    }

    #[test]
    fn valid_body_has_no_violations() {
        assert!(agent().validate(&valid_agent()).is_empty());
    }

    #[test]
    fn missing_required_field_is_one_violation_naming_it() {
        let mut body = valid_agent();
        body.as_object_mut().unwrap().remove("name");

        let violations = agent().validate(&body);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Schema);
        assert_eq!(violations[0].path, "name");
        assert_eq!(violations[0].message, "Missing required property: name");
    }

    #[test]
    fn type_format_and_range_checks() {
        let mut body = valid_agent();
        body["id"] = json!("not-a-uuid");
        body["domain"] = json!("retail");
        body["created_at"] = json!("yesterday");
        body["config"]["temperature"] = json!(3);
        body["tags"] = json!(["a", 1, "c"]);

        let violations = agent().validate(&body);
        let found = paths(&violations);

        for expected in ["id", "domain", "created_at", "config.temperature", "tags[1]", "tags"] {
            assert!(found.contains(&expected), "{expected} not in {found:?}");
        }
        let temperature = violations
            .iter()
            .find(|violation| violation.path == "config.temperature")
            .unwrap();
        assert!(temperature.message.starts_with("Property config.temperature: "));
    }

    #[test]
    fn nullable_admits_null_only_where_declared() {
        let mut body = valid_agent();
        body["name"] = Value::Null;

        let violations = agent().validate(&body);
        assert_eq!(paths(&violations), vec!["name"]);
    }

    #[test]
    fn exclusive_bounds_are_normalized() {
        let mut document = json!({
            "paths": {"/api/scores": {"get": {"responses": {"200": json_response(json!({
                "type": "number", "minimum": 0, "exclusiveMinimum": true
            }))}}}}
        });
        normalize_openapi(&mut document);
        let schema = &document["paths"]["/api/scores"]["get"]["responses"]["200"]["content"]
            ["application/json"]["schema"];
        assert_eq!(schema["exclusiveMinimum"], json!(0));
        assert!(schema.get("minimum").is_none());

        let api = ApiSchema::from_value(document).unwrap();
        let scores = api.response_schema(HttpMethod::Get, "/api/scores", 200).unwrap();
        assert_eq!(scores.validate(&json!(0)).len(), 1);
        assert!(scores.validate(&json!(0.5)).is_empty());
    }

    #[test]
    fn exact_path_beats_template() {
        let resolved = api()
            .response_schema(HttpMethod::Post, "/api/agents/search", 200)
            .unwrap();
        assert_eq!(
            resolved.pointer(),
            "/paths/~1api~1agents~1search/post/responses/200/content/application~1json/schema"
        );
    }

    #[test]
    fn template_match_follows_status_ranges_and_response_refs() {
        let api = api();

        let ok = api
            .response_schema(HttpMethod::Get, "/api/agents/3f2b8c1e", 200)
            .unwrap();
        assert!(ok.validate(&valid_agent()).is_empty());

        let missing = api
            .response_schema(HttpMethod::Get, "/api/agents/3f2b8c1e", 404)
            .unwrap();
        assert_eq!(
            missing.pointer(),
            "/components/responses/Problem/content/application~1json/schema"
        );
        assert_eq!(paths(&missing.validate(&json!({}))), vec!["detail"]);
    }

    #[test]
    fn nested_refs_report_item_paths() {
        let list = api()
            .response_schema(HttpMethod::Get, "/api/agents", 200)
            .unwrap();

        let body = json!({"items": [valid_agent(), {"id": "3f2b8c1e-9d4a-4b7e-8f00-1a2b3c4d5e6f", "domain": "finance"}], "total": 2});
        let violations = list.validate(&body);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "Missing required property: items[1].name");
    }

    #[test]
    fn root_array_items_are_indexed_from_the_root() {
        let tags = api()
            .response_schema(HttpMethod::Get, "/api/tags", 200)
            .unwrap();
        let violations = tags.validate(&json!(["a", 2]));
        assert_eq!(paths(&violations), vec!["[1]"]);
        assert!(violations[0].message.starts_with("Property [1]: "));
    }

    #[test]
    fn recursive_components_resolve_lazily() {
        let api = api();
        for _ in 0..3 {
            let node = api
                .response_schema(HttpMethod::Get, "/api/nodes/1", 200)
                .unwrap();

            let body = json!({
                "name": "root",
                "left": {"name": "l", "left": {"name": "ll"}},
                "right": {"name": "r", "parent": {"name": "root"}},
                "children": [{"name": "c0", "children": [{"name": 7}]}]
            });
            let violations = node.validate(&body);
            assert_eq!(paths(&violations), vec!["children[0].children[0].name"]);
        }
        assert_eq!(api.validators.lock().unwrap().len(), 1);
    }

    #[test]
    fn undocumented_responses_have_no_schema() {
        let api = api();
        assert!(api.response_schema(HttpMethod::Delete, "/api/agents/x", 204).is_none());
        assert!(api.response_schema(HttpMethod::Put, "/api/agents/x", 200).is_none());
        assert!(api.response_schema(HttpMethod::Get, "/api/unknown", 200).is_none());
    }

    #[test]
    fn load_reports_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openapi.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(ApiSchema::load(&path), Err(HarnessError::Configuration(_))));
        assert!(matches!(
            ApiSchema::load(&dir.path().join("missing.json")),
            Err(HarnessError::Configuration(_))
        ));
    }
}

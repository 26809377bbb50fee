use std::fmt;

use serde_json::Value;

use crate::environment::RunVariables;
use crate::http::response::ApiResponse;

/// Target of an assertion within the HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionTarget {
    StatusCode,
    Header(String),
    /// Dotted path into the JSON body. `$` is the body itself, numeric
    /// segments index arrays and `[*]` fans out over every element.
    JsonPath(String),
    BodyContains,
}

impl fmt::Display for AssertionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionTarget::StatusCode => write!(f, "status"),
            AssertionTarget::Header(name) => write!(f, "header {name}"),
            AssertionTarget::JsonPath(path) => write!(f, "{path}"),
            AssertionTarget::BodyContains => write!(f, "body"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl JsonType {
    fn matches(self, value: &Value) -> bool {
        match self {
            JsonType::String => value.is_string(),
            JsonType::Integer => value.is_i64() || value.is_u64(),
            JsonType::Number => value.is_number(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Array => value.is_array(),
            JsonType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonType::String => "string",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
            JsonType::Array => "array",
            JsonType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Comparison operator for an assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    Exists,
    HasType(JsonType),
    NonEmpty,
    /// `expected` is an array of allowed values.
    In,
}

/// A single check evaluated against a response. String values inside
/// `expected` may use run variable placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub target: AssertionTarget,
    pub operator: AssertionOperator,
    pub expected: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssertionResult {
    pub passed: bool,
    pub actual: String,
    pub message: String,
}

impl Assertion {
    pub fn new(target: AssertionTarget, operator: AssertionOperator, expected: Value) -> Self {
        Self {
            target,
            operator,
            expected,
        }
    }

    pub fn json(path: &str, operator: AssertionOperator, expected: Value) -> Self {
        Self::new(AssertionTarget::JsonPath(path.to_string()), operator, expected)
    }

    pub fn equals(path: &str, expected: impl Into<Value>) -> Self {
        Self::json(path, AssertionOperator::Equals, expected.into())
    }

    pub fn exists(path: &str) -> Self {
        Self::json(path, AssertionOperator::Exists, Value::Null)
    }

    pub fn has_type(path: &str, json_type: JsonType) -> Self {
        Self::json(path, AssertionOperator::HasType(json_type), Value::Null)
    }

    pub fn non_empty(path: &str) -> Self {
        Self::json(path, AssertionOperator::NonEmpty, Value::Null)
    }

    pub fn one_of(path: &str, allowed: Value) -> Self {
        Self::json(path, AssertionOperator::In, allowed)
    }

    pub fn not_equals(path: &str, unexpected: impl Into<Value>) -> Self {
        Self::json(path, AssertionOperator::NotEquals, unexpected.into())
    }

    pub fn greater_than(path: &str, bound: impl Into<Value>) -> Self {
        Self::json(path, AssertionOperator::GreaterThan, bound.into())
    }

    pub fn status_in(statuses: &[u16]) -> Self {
        Self::new(AssertionTarget::StatusCode, AssertionOperator::In, Value::from(statuses.to_vec()))
    }

    pub fn header_contains(name: &str, needle: &str) -> Self {
        Self::new(
            AssertionTarget::Header(name.to_string()),
            AssertionOperator::Contains,
            Value::from(needle),
        )
    }

    pub fn body_contains(needle: &str) -> Self {
        Self::new(AssertionTarget::BodyContains, AssertionOperator::Contains, Value::from(needle))
    }

    pub fn evaluate(&self, response: &ApiResponse, vars: &RunVariables) -> AssertionResult {
        let expected = vars.interpolate_json(&self.expected);

        let actual: Vec<Value> = match &self.target {
            AssertionTarget::StatusCode => vec![Value::from(response.status)],
            AssertionTarget::Header(name) => response
                .headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| Value::String(value.clone()))
                .into_iter()
                .collect(),
            AssertionTarget::BodyContains => vec![Value::String(response.body.clone())],
            AssertionTarget::JsonPath(path) => match response.json() {
                Some(body) => select(&body, path).into_iter().cloned().collect(),
                None => {
                    return AssertionResult {
                        passed: false,
                        actual: "<non-JSON body>".to_string(),
                        message: format!("{} could not be read: body is not JSON", self.target),
                    };
                }
            },
        };

        // Any selected value satisfying the operator passes the assertion.
        let passed = match &self.operator {
            AssertionOperator::Exists => !actual.is_empty(),
            operator => actual
                .iter()
                .any(|value| compare(operator, value, &expected)),
        };

        let actual_text = match actual.as_slice() {
            [] => "<missing>".to_string(),
            [single] => render(single),
            many => Value::Array(many.to_vec()).to_string(),
        };

        let message = if passed {
            format!("{} {}", self.target, describe(&self.operator, &expected))
        } else {
            format!(
                "Expected {} {}, got {actual_text}",
                self.target,
                describe(&self.operator, &expected)
            )
        };

        AssertionResult {
            passed,
            actual: actual_text,
            message,
        }
    }
}

fn compare(operator: &AssertionOperator, actual: &Value, expected: &Value) -> bool {
    match operator {
        AssertionOperator::Equals => loosely_equal(actual, expected),
        AssertionOperator::NotEquals => !loosely_equal(actual, expected),
        AssertionOperator::Contains => match (actual, expected) {
            (Value::String(text), Value::String(needle)) => text.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| loosely_equal(item, needle)),
            (Value::Object(fields), Value::String(key)) => fields.contains_key(key),
            _ => false,
        },
        AssertionOperator::GreaterThan => {
            matches!((actual.as_f64(), expected.as_f64()), (Some(a), Some(e)) if a > e)
        }
        AssertionOperator::Exists => true,
        AssertionOperator::HasType(json_type) => json_type.matches(actual),
        AssertionOperator::NonEmpty => match actual {
            Value::String(text) => !text.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(fields) => !fields.is_empty(),
            Value::Null => false,
            _ => true,
        },
        AssertionOperator::In => expected
            .as_array()
            .is_some_and(|allowed| allowed.iter().any(|option| loosely_equal(actual, option))),
    }
}

/// Numbers compare by value and a string matches the text of a scalar, so
/// `"{{agents.max_examples}}"` equals `10`.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(e)) => a.as_f64() == e.as_f64(),
        (Value::String(a), Value::String(e)) => a == e,
        (Value::Number(_) | Value::Bool(_), Value::String(e)) => actual.to_string() == *e,
        _ => actual == expected,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn describe(operator: &AssertionOperator, expected: &Value) -> String {
    match operator {
        AssertionOperator::Equals => format!("== {}", render(expected)),
        AssertionOperator::NotEquals => format!("!= {}", render(expected)),
        AssertionOperator::Contains => format!("contains {}", render(expected)),
        AssertionOperator::GreaterThan => format!("> {}", render(expected)),
        AssertionOperator::Exists => "exists".to_string(),
        AssertionOperator::HasType(json_type) => format!("is a {json_type}"),
        AssertionOperator::NonEmpty => "is not empty".to_string(),
        AssertionOperator::In => format!("in {expected}"),
    }
}

/// Values addressed by a dotted path.
pub fn select<'a>(body: &'a Value, path: &str) -> Vec<&'a Value> {
    let path = path.strip_prefix('$').unwrap_or(path);
    let mut current = vec![body];

    for segment in path.split('.').filter(|segment| !segment.is_empty()) {
        let (name, fan_out) = match segment.strip_suffix("[*]") {
            Some(name) => (name, true),
            None => (segment, false),
        };

        let mut next = Vec::new();
        for value in current {
            let child = if name.is_empty() {
                Some(value)
            } else {
                match value {
                    Value::Object(fields) => fields.get(name),
                    Value::Array(items) => name.parse::<usize>().ok().and_then(|index| items.get(index)),
                    _ => None,
                }
            };
            match (child, fan_out) {
                (Some(Value::Array(items)), true) => next.extend(items.iter()),
                (Some(_), true) | (None, _) => {}
                (Some(child), false) => next.push(child),
            }
        }
        current = next;
    }

    current
}

//! # Run Variables
//!
//! Endpoint paths and request bodies are written as templates with
//! `{{variable}}` placeholders (`/api/agents/{{agents.id}}`). Variables are
//! filled from the instances created during provisioning plus a few run-level
//! values, and are frozen before any case is dispatched.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::resources::InstanceKey;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Run-level variables, available as `{{run.<name>}}`.
pub const RUN_VARIABLES: &[&str] = &["id", "missing_id"];

/// Flat variable map used to resolve templates.
#[derive(Debug, Clone, Default)]
pub struct RunVariables {
    values: HashMap<String, String>,
}

impl RunVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Registers `<prefix>.id` and every scalar top-level payload field.
    pub fn insert_instance(&mut self, key: &InstanceKey, id: &str, payload: &Value) {
        let prefix = key.variable_prefix();
        self.insert(format!("{prefix}.id"), id);

        if let Some(fields) = payload.as_object() {
            for (name, value) in fields {
                let rendered = match value {
                    Value::String(text) => text.clone(),
                    Value::Number(number) => number.to_string(),
                    Value::Bool(flag) => flag.to_string(),
                    _ => continue,
                };
                self.insert(format!("{prefix}.{name}"), rendered);
            }
        }
    }

    /// Interpolate `{{variable}}` placeholders in the given text. Unknown
    /// placeholders are left untouched.
    pub fn interpolate(&self, text: &str) -> String {
        PLACEHOLDER
            .replace_all(text, |caps: &regex::Captures<'_>| {
                self.get(&caps[1])
                    .map_or_else(|| caps[0].to_string(), str::to_string)
            })
            .into_owned()
    }

    /// Interpolates every string inside a JSON template.
    pub fn interpolate_json(&self, template: &Value) -> Value {
        match template {
            Value::String(text) => Value::String(self.interpolate(text)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.interpolate_json(item)).collect())
            }
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), self.interpolate_json(value)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Placeholder names used in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Placeholder names used anywhere inside a JSON template.
pub fn json_placeholders(template: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_json_placeholders(template, &mut found);
    found
}

fn collect_json_placeholders(template: &Value, found: &mut Vec<String>) {
    match template {
        Value::String(text) => found.extend(placeholders(text)),
        Value::Array(items) => items
            .iter()
            .for_each(|item| collect_json_placeholders(item, found)),
        Value::Object(fields) => fields
            .values()
            .for_each(|value| collect_json_placeholders(value, found)),
        _ => {}
    }
}

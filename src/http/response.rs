use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub latency: Duration,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body parsed as JSON. An empty body reads as an empty object, the
    /// way a 204 from the API is treated by its own clients.
    pub fn json(&self) -> Option<Value> {
        if self.body.trim().is_empty() {
            return Some(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.body).ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            headers: BTreeMap::new(),
            body: body.to_string(),
            latency: Duration::from_millis(5),
        }
    }

    #[test]
    fn empty_body_reads_as_empty_object() {
        assert_eq!(response(204, "").json(), Some(serde_json::json!({})));
    }

    #[test]
    fn non_json_body_reads_as_none() {
        assert!(response(200, "<html></html>").json().is_none());
    }

    #[test]
    fn success_is_2xx() {
        assert!(response(201, "{}").is_success());
        assert!(!response(404, "{}").is_success());
    }
}

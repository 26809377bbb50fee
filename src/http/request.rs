use serde_json::Value;

use super::method::HttpMethod;

/// Whether a request carries the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    /// Never attach a token.
    None,
    /// Attach the token when one is configured.
    Optional,
    /// The endpoint is only exercised with a valid token.
    Required,
}

impl AuthRequirement {
    pub fn attaches_token(self) -> bool {
        !matches!(self, AuthRequirement::None)
    }
}

/// A file part of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart {
        fields: Vec<(String, String)>,
        file: FilePart,
    },
}

/// A fully resolved request: the path is relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: RequestBody,
    pub auth: AuthRequirement,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            auth: AuthRequirement::Optional,
        }
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_auth(mut self, auth: AuthRequirement) -> Self {
        self.auth = auth;
        self
    }
}

//! # Authentication
//!
//! The API under test authenticates with a JWT bearer token. The token is
//! established once per run and never changes afterwards, so it is stored
//! behind an `Arc` and shared read-only by every worker.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::http::client::Transport;
use crate::http::method::HttpMethod;
use crate::http::request::{ApiRequest, AuthRequirement};

pub const AUTH_STATUS_PATH: &str = "/api/auth/status";

/// Bearer token for the run. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(Arc<str>);

impl AuthToken {
    pub fn new(token: &str) -> Self {
        Self(Arc::from(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(***)")
    }
}

/// Outcome of the token pre-flight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Authenticated,
    Missing,
    Rejected(String),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// Reason recorded on cases skipped for lack of authentication.
    pub fn skip_reason(&self) -> Option<String> {
        match self {
            AuthState::Authenticated => None,
            AuthState::Missing => Some("Authentication token not provided".to_string()),
            AuthState::Rejected(reason) => Some(format!("Authentication token is invalid: {reason}")),
        }
    }
}

/// Asks the API whether the configured token is accepted.
pub async fn check_token(transport: &dyn Transport, has_token: bool) -> AuthState {
    if !has_token {
        return AuthState::Missing;
    }

    let request =
        ApiRequest::new(HttpMethod::Get, AUTH_STATUS_PATH).with_auth(AuthRequirement::Required);

    match transport.send(&request).await {
        Ok(response) if response.is_success() => match response.json() {
            Some(body) if reports_authenticated(&body) => AuthState::Authenticated,
            Some(_) => AuthState::Rejected("status endpoint reports unauthenticated".to_string()),
            None => AuthState::Rejected("status endpoint returned a non-JSON body".to_string()),
        },
        Ok(response) => AuthState::Rejected(format!("status endpoint returned {}", response.status)),
        Err(err) => AuthState::Rejected(err.to_string()),
    }
}

fn reports_authenticated(body: &Value) -> bool {
    body.get("authenticated")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_token() {
        let token = AuthToken::new("secret-jwt");
        assert_eq!(format!("{token:?}"), "AuthToken(***)");
        assert_eq!(token.as_str(), "secret-jwt");
    }

    #[test]
    fn authenticated_flag_must_be_true() {
        assert!(reports_authenticated(&serde_json::json!({"authenticated": true})));
        assert!(!reports_authenticated(&serde_json::json!({"authenticated": "yes"})));
        assert!(!reports_authenticated(&serde_json::json!({})));
    }

    #[test]
    fn skip_reason_only_for_unauthenticated_states() {
        assert!(AuthState::Authenticated.skip_reason().is_none());
        assert!(AuthState::Missing.skip_reason().unwrap().contains("not provided"));
    }
}

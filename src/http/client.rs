use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};

use crate::auth::AuthToken;
use crate::error::{RequestError, RequestErrorKind};

use super::request::{ApiRequest, RequestBody};
use super::response::ApiResponse;

/// Sends requests to the API under test.
///
/// The executor only talks to this trait, so runs can be driven against an
/// in-memory fake in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, RequestError>;
}

/// reqwest-backed transport. The token is fixed at construction and shared
/// read-only by every worker.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    token: Option<AuthToken>,
}

impl HttpTransport {
    pub fn new(
        base_url: Url,
        token: Option<AuthToken>,
        timeout: Duration,
    ) -> Result<Self, RequestError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .default_headers(default_headers)
            .user_agent(concat!("llm-api-harness/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                RequestError::new(
                    RequestErrorKind::Invalid,
                    format!("Failed to build HTTP client: {err}"),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, RequestError> {
        let url = build_url(&self.base_url, &request.path)?;
        let mut builder = self.client.request(request.method.into(), url);

        if request.auth.attaches_token() {
            if let Some(token) = &self.token {
                builder = builder.bearer_auth(token.as_str());
            }
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => {
                let raw = serde_json::to_vec(value).map_err(|err| {
                    RequestError::new(
                        RequestErrorKind::Invalid,
                        format!("Failed to encode body: {err}"),
                    )
                })?;
                builder
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(raw)
            }
            RequestBody::Multipart { fields, file } => {
                let part = Part::text(file.content.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.content_type)
                    .map_err(|err| {
                        RequestError::new(
                            RequestErrorKind::Invalid,
                            format!("Invalid content type `{}`: {err}", file.content_type),
                        )
                    })?;
                let form = fields
                    .iter()
                    .fold(Form::new(), |form, (key, value)| {
                        form.text(key.clone(), value.clone())
                    })
                    .part(file.field.clone(), part);
                builder.multipart(form)
            }
        };

        let started = Instant::now();
        let response = builder.send().await.map_err(|err| classify(&err))?;

        let status = response.status().as_u16();
        let headers = format_headers(response.headers());
        let bytes = response.bytes().await.map_err(|err| classify(&err))?;
        let latency = started.elapsed();

        Ok(ApiResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            latency,
        })
    }
}

pub fn build_url(base_url: &Url, path: &str) -> Result<Url, RequestError> {
    let base = base_url.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let raw = if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    };

    Url::parse(&raw).map_err(|err| {
        RequestError::new(RequestErrorKind::Invalid, format!("Invalid URL `{raw}`: {err}"))
    })
}

fn format_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}

fn classify(err: &reqwest::Error) -> RequestError {
    let kind = if err.is_timeout() {
        RequestErrorKind::Timeout
    } else {
        let message = err.to_string().to_ascii_lowercase();
        if message.contains("dns") || message.contains("failed to lookup address") {
            RequestErrorKind::Dns
        } else if message.contains("tls")
            || message.contains("ssl")
            || message.contains("certificate")
        {
            RequestErrorKind::Tls
        } else if err.is_connect() {
            RequestErrorKind::Connect
        } else if err.is_builder() {
            RequestErrorKind::Invalid
        } else {
            RequestErrorKind::Read
        }
    };

    RequestError::new(kind, format!("Request failed: {err}"))
}

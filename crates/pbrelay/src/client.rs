//! Productboard REST client.
//!
//! Two calls are needed by the relay: `GET /components/{id}` to resolve a
//! component name and `POST /features` to create the linked feature. Both carry
//! the bearer token, `X-Version: 1` and JSON accept headers, run under a
//! per-request timeout, and go through the injected [`RetryConfig`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::constants::{API_BASE_URL, API_VERSION, DEFAULT_TIMEOUT};
use crate::error::{ApiError, RelayError};
use crate::model::{ComponentEnvelope, ComponentRecord, FeatureRequest};
use crate::retry::RetryConfig;

/// Everything the client needs, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl ClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Authenticated client for the Productboard API.
#[derive(Debug, Clone)]
pub struct ProductboardClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl ProductboardClient {
    pub fn new(config: ClientConfig) -> Result<Self, RelayError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| RelayError::Config("API token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert("X-Version", HeaderValue::from_static(API_VERSION));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RelayError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Look up a component by id.
    pub async fn fetch_component(&self, component_id: &str) -> Result<ComponentRecord, RelayError> {
        let url = format!(
            "{}/components/{}",
            self.base_url,
            urlencoding::encode(component_id)
        );

        self.retry
            .run("lookup", true, || self.get_component_once(&url, component_id))
            .await
            .map_err(|source| RelayError::Lookup {
                component_id: component_id.to_string(),
                source,
            })
    }

    /// Look up a component and return only its name.
    pub async fn fetch_component_name(&self, component_id: &str) -> Result<String, RelayError> {
        self.fetch_component(component_id)
            .await
            .map(|record| record.name)
    }

    /// Create a Blocked feature under `parent_id`. Returns the new feature id
    /// when the response carries one.
    pub async fn create_feature(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<String>, RelayError> {
        self.submit_feature(&FeatureRequest::for_component(parent_id, name))
            .await
    }

    /// Submit a prepared feature body.
    pub async fn submit_feature(
        &self,
        request: &FeatureRequest,
    ) -> Result<Option<String>, RelayError> {
        let url = format!("{}/features", self.base_url);

        self.retry
            .run("create", false, || self.post_feature_once(&url, request))
            .await
            .map_err(|source| RelayError::Creation {
                component_id: request.data.parent.component.id.clone(),
                source,
            })
    }

    async fn get_component_once(
        &self,
        url: &str,
        component_id: &str,
    ) -> Result<ComponentRecord, ApiError> {
        let response = self.http.get(url).send().await?;
        let response = error_for_status(response).await?;
        let envelope: ComponentEnvelope = response
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))?;
        envelope.into_record(component_id)
    }

    async fn post_feature_once(
        &self,
        url: &str,
        request: &FeatureRequest,
    ) -> Result<Option<String>, ApiError> {
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        // The body is informational; a created feature with an unreadable body
        // still counts as created.
        let body = response.text().await.unwrap_or_default();
        let id = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["data"]["id"].as_str().map(String::from));
        Ok(id)
    }
}

/// Upstream error bodies are kept up to this many bytes.
pub const MAX_ERROR_BODY_BYTES: usize = 4096;

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = read_error_body(response).await;
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Read at most [`MAX_ERROR_BODY_BYTES`] of the body, marking anything cut off.
async fn read_error_body(mut response: reqwest::Response) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let mut truncated = false;
    while let Ok(Some(chunk)) = response.chunk().await {
        let room = MAX_ERROR_BODY_BYTES - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    let mut body = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        // A multi-byte character split at the cut decodes to U+FFFD; drop it.
        if body.ends_with('\u{FFFD}') {
            body.pop();
        }
        body.push_str("...[truncated]");
    }
    body
}

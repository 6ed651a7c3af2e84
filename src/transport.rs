//! The HTTP layer underneath a [`crate::Session`].
//!
//! Sessions only need one operation: POST a form and read back status, headers and
//! text. [`ReqwestTransport`] is the default; tests and embedders can plug in any
//! other [`Transport`].

use crate::{Error, Result};
use async_trait::async_trait;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// A raw HTTP response as seen by the session.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body as text.
    pub body: String,
}

/// Sends form-encoded POST requests.
///
/// Implementations report connection problems and timeouts as errors. Non-2xx
/// statuses are returned as normal responses; the session decides what to do with
/// them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs `form` to `url` as `application/x-www-form-urlencoded`.
    async fn post_form(
        &self,
        url: &Url,
        form: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<TransportResponse>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    default_headers: HeaderMap,
}

impl ReqwestTransport {
    /// Creates a transport that asks for JSON responses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the HTTP client can't be built.
    pub fn new() -> Result<Self> {
        Self::with_headers(HeaderMap::new())
    }

    /// Creates a transport that adds `headers` to every request.
    pub fn with_headers(headers: HeaderMap) -> Result<Self> {
        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.extend(headers);

        Ok(Self {
            http_client,
            default_headers,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_form(
        &self,
        url: &Url,
        form: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<TransportResponse> {
        let mut request = self.http_client.post(url.clone()).timeout(timeout);

        for (name, value) in &self.default_headers {
            if name != CONTENT_TYPE {
                request = request.header(name, value);
            }
        }

        let response = request.form(form).send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

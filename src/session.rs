//! Request execution and error recovery.
//!
//! A [`Session`] owns the access token and the transport. It turns a finalized
//! [`MethodRequest`] into a form POST, decodes the response envelope and handles
//! the two server errors that can be recovered from without the caller:
//!
//! * a captcha challenge, answered through the configured [`CaptchaSolver`] and
//!   re-sent with `captcha_sid`/`captcha_key`;
//! * a rejected access token, which is dropped before the call is re-sent.
//!
//! Every other outcome is returned to the caller. Recovery runs as a loop bounded
//! by the session's [`RetryPolicy`].

use crate::{
    api::MethodRequest,
    auth::{censor_token, CaptchaSolver, CredentialProvider, NoCaptchaSolver},
    envelope::{self, Envelope},
    error::{ApiError, ApiErrorKind},
    retry::RetryPolicy,
    transport::{ReqwestTransport, Transport, TransportResponse},
    Error, Response, Result,
};
use http::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// Base URL of the public API.
pub const DEFAULT_API_URL: &str = "https://api.vk.com/method/";

/// Executes method calls on behalf of an [`crate::Api`].
///
/// Sessions are cheap to clone; clones share the access token, so a token dropped
/// by one call is gone for all of them. The token is guarded by a lock and is only
/// cleared if it is still the token the server rejected, so calls running
/// concurrently on one session never drop a token another call just stored.
///
/// # Examples
///
/// ```no_run
/// use vkcall::{Api, Arguments, RetryPolicy, Session};
///
/// # async fn example() -> Result<(), vkcall::Error> {
/// let session = Session::builder()
///     .access_token("my-token")
///     .retry_policy(RetryPolicy::new(3))
///     .build()?;
///
/// let api = Api::new(session).with_version("5.131");
/// let users = api.call("users.get", Arguments::new().with("user_ids", 1)).await?;
/// println!("{}", users.data);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    base_url: Url,
    access_token: RwLock<Option<String>>,
    transport: Box<dyn Transport>,
    captcha_solver: Box<dyn CaptchaSolver>,
    credential_provider: Option<Box<dyn CredentialProvider>>,
    retry_policy: RetryPolicy,
}

/// The answer to a captcha challenge, attached to the next request.
#[derive(Debug, Clone, PartialEq)]
struct CaptchaResponse {
    sid: String,
    key: String,
}

/// A token the server refused, with the error it refused it with.
struct RejectedToken {
    token: String,
    error: ApiError,
}

/// One HTTP round trip and the token it carried.
struct SentRequest {
    response: TransportResponse,
    access_token: Option<String>,
}

impl Session {
    /// Creates a new `SessionBuilder`.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Returns the base URL method names are appended to.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Returns the current access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.inner.access_token.read().clone()
    }

    /// Replaces the access token. An empty token counts as none.
    pub fn set_access_token(&self, access_token: Option<String>) {
        *self.inner.access_token.write() = access_token.filter(|token| !token.is_empty());
    }

    /// Returns the recovery retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    /// Executes a method request, recovering from captcha challenges and rejected
    /// access tokens.
    ///
    /// Returns the value of the first `response` chunk in the body. An `error`
    /// chunk seen first is classified and either recovered from or returned.
    ///
    /// # Errors
    ///
    /// * [`Error::Network`] / [`Error::Timeout`] when the transport fails
    /// * [`Error::HttpError`] for non-2xx responses
    /// * [`Error::DeserializationFailed`] when the body does not start with JSON
    /// * [`Error::MalformedResponse`] when no chunk has `response` or `error`
    /// * [`Error::Api`] for unrecoverable server errors
    /// * [`Error::MaxRetriesExceeded`] when the retry policy runs out
    /// * [`Error::Auth`] when the credential provider fails
    pub async fn make_request(&self, request: &MethodRequest<'_>) -> Result<Response<Value>> {
        let start_time = Instant::now();
        let mut attempt = 0;
        let mut captcha_response: Option<CaptchaResponse> = None;
        let mut rejected: Option<RejectedToken> = None;

        loop {
            attempt += 1;

            let sent = self
                .send_api_request(
                    request,
                    captcha_response.take().as_ref(),
                    rejected.as_ref(),
                    attempt,
                )
                .await?;

            let SentRequest {
                response,
                access_token,
            } = sent;
            let latency = start_time.elapsed();

            tracing::info!(
                method = %request.method_name(),
                status = response.status.as_u16(),
                latency_ms = latency.as_millis(),
                attempt = attempt,
                "Received API response"
            );

            let error = match self.parse_response(&response)? {
                Envelope::Response(data) => {
                    return Ok(Response::new(
                        data,
                        response.body,
                        response.status,
                        response.headers,
                        latency,
                        attempt,
                    ));
                }
                Envelope::Error(error) => error,
                Envelope::Empty => {
                    tracing::error!(
                        raw_response = %response.body,
                        "Response has neither `response` nor `error`"
                    );
                    return Err(Error::MalformedResponse {
                        raw_response: response.body,
                        status: response.status,
                    });
                }
            };

            if error.is_access_token_invalid() {
                if let Some(token) = &access_token {
                    rejected = Some(RejectedToken {
                        token: token.clone(),
                        error: error.clone(),
                    });
                }
            }

            captcha_response = self
                .recover(request, error, access_token.as_deref(), attempt)
                .await?;

            let delay = self.inner.retry_policy.delay.delay_for_retry(attempt);
            if !delay.is_zero() {
                tracing::info!(
                    delay_ms = delay.as_millis(),
                    attempt = attempt,
                    "Retrying API request after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Decides how to proceed after the server reported `error`.
    ///
    /// Returns the captcha answer to send with the retry (`None` for a token
    /// retry), or the error that ends the call.
    async fn recover(
        &self,
        request: &MethodRequest<'_>,
        error: ApiError,
        rejected_token: Option<&str>,
        attempt: usize,
    ) -> Result<Option<CaptchaResponse>> {
        let kind = error.kind();

        if kind == ApiErrorKind::Other {
            tracing::warn!(
                method = %request.method_name(),
                code = error.code,
                message = %error.message,
                "API error"
            );
            return Err(Error::Api(error));
        }

        if kind == ApiErrorKind::AccessTokenInvalid {
            tracing::info!(
                access_token = %rejected_token.map(censor_token).unwrap_or_default(),
                "Authorization failed. Access token will be dropped"
            );
            self.invalidate_access_token(rejected_token);
        }

        let captcha = match (&error.captcha_sid, &error.captcha_img) {
            (Some(sid), Some(image_url)) => Some((sid.clone(), image_url.clone())),
            _ => None,
        };
        if kind == ApiErrorKind::CaptchaNeeded && captcha.is_none() {
            tracing::warn!(
                method = %request.method_name(),
                "Captcha challenge without sid or image, cannot answer"
            );
            return Err(Error::Api(error));
        }

        if !self.inner.retry_policy.allows_retry(attempt) {
            tracing::warn!(
                method = %request.method_name(),
                code = error.code,
                attempts = attempt,
                "Recovery retry limit reached"
            );
            return Err(Error::MaxRetriesExceeded {
                attempts: attempt,
                last_error: Box::new(Error::Api(error)),
            });
        }

        let Some((sid, image_url)) = captcha.filter(|_| kind == ApiErrorKind::CaptchaNeeded)
        else {
            return Ok(None);
        };

        let key = self
            .inner
            .captcha_solver
            .solve(&image_url)
            .await
            .filter(|key| !key.is_empty());

        match key {
            Some(key) => {
                tracing::info!(captcha_sid = %sid, attempt = attempt, "Captcha solved, retrying");
                Ok(Some(CaptchaResponse { sid, key }))
            }
            None => Err(Error::Api(error)),
        }
    }

    /// Builds the form for `request` and sends it.
    async fn send_api_request(
        &self,
        request: &MethodRequest<'_>,
        captcha_response: Option<&CaptchaResponse>,
        rejected: Option<&RejectedToken>,
        attempt: usize,
    ) -> Result<SentRequest> {
        let url = self.method_url(request.method_name())?;

        let mut form = request.form_arguments();

        let access_token = self.current_access_token().await?;
        if let (Some(token), Some(rejected)) = (&access_token, rejected) {
            if *token == rejected.token {
                tracing::warn!(
                    method = %request.method_name(),
                    access_token = %censor_token(token),
                    "Credential provider returned the rejected access token"
                );
                self.invalidate_access_token(Some(token));
                return Err(Error::Api(rejected.error.clone()));
            }
        }
        if let Some(token) = &access_token {
            form.insert("access_token".to_string(), token.clone());
        }

        if let Some(captcha) = captcha_response {
            form.insert("captcha_sid".to_string(), captcha.sid.clone());
            form.insert("captcha_key".to_string(), captcha.key.clone());
        }

        tracing::debug!(
            method = %request.method_name(),
            url = %url,
            attempt = attempt,
            access_token = %access_token.as_deref().map(censor_token).unwrap_or_default(),
            "Sending API request"
        );

        let response = self
            .inner
            .transport
            .post_form(&url, &form, request.timeout())
            .await?;

        Ok(SentRequest {
            response,
            access_token,
        })
    }

    /// Checks the status and decodes the body envelope.
    fn parse_response(&self, response: &TransportResponse) -> Result<Envelope> {
        if !response.status.is_success() {
            tracing::error!(
                status = response.status.as_u16(),
                response = %response.body,
                "HTTP error"
            );

            return Err(Error::HttpError {
                status: response.status,
                raw_response: response.body.clone(),
                headers: response.headers.clone(),
            });
        }

        envelope::interpret(&response.body).map_err(|e| {
            tracing::error!(
                error = %e,
                raw_response = %response.body,
                "Failed to deserialize response"
            );

            Error::DeserializationFailed {
                raw_response: response.body.clone(),
                serde_error: e.to_string(),
                status: response.status,
            }
        })
    }

    fn method_url(&self, method_name: &str) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::ConfigurationError("Base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(method_name);
        Ok(url)
    }

    /// Returns the stored token, asking the credential provider when there is none.
    async fn current_access_token(&self) -> Result<Option<String>> {
        let stored = self
            .inner
            .access_token
            .read()
            .clone()
            .filter(|token| !token.is_empty());
        if stored.is_some() {
            return Ok(stored);
        }

        let Some(provider) = &self.inner.credential_provider else {
            return Ok(None);
        };

        tracing::debug!("Requesting a new access token");
        let token = provider.access_token().await?;
        if token.is_empty() {
            return Ok(None);
        }

        let mut stored = self.inner.access_token.write();
        Ok(Some(stored.get_or_insert(token).clone()))
    }

    /// Drops the stored token if it is still the one that was rejected.
    fn invalidate_access_token(&self, rejected: Option<&str>) {
        let mut stored = self.inner.access_token.write();
        if stored.as_deref() == rejected {
            *stored = None;
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.inner.base_url.as_str())
            .field(
                "access_token",
                &self.inner.access_token.read().as_deref().map(censor_token),
            )
            .field("retry_policy", &self.inner.retry_policy)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring and creating a [`Session`].
///
/// # Examples
///
/// ```no_run
/// use vkcall::{RetryPolicy, SessionBuilder};
/// use vkcall::retry::RetryDelay;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), vkcall::Error> {
/// let session = SessionBuilder::new()
///     .access_token("my-token")
///     .retry_policy(RetryPolicy::new(3).with_delay(RetryDelay::Fixed(Duration::from_secs(1))))
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    base_url: Option<Url>,
    access_token: Option<String>,
    default_headers: HeaderMap,
    transport: Option<Box<dyn Transport>>,
    captcha_solver: Box<dyn CaptchaSolver>,
    credential_provider: Option<Box<dyn CredentialProvider>>,
    retry_policy: RetryPolicy,
}

impl SessionBuilder {
    /// Creates a new `SessionBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            access_token: None,
            default_headers: HeaderMap::new(),
            transport: None,
            captcha_solver: Box::new(NoCaptchaSolver),
            credential_provider: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Sets the base URL method names are appended to.
    ///
    /// Defaults to [`DEFAULT_API_URL`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or cannot have a path.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        if url.cannot_be_a_base() {
            return Err(Error::ConfigurationError(format!(
                "Base URL cannot have a path: {}",
                url
            )));
        }
        self.base_url = Some(url);
        Ok(self)
    }

    /// Sets the initial access token. An empty token counts as none.
    pub fn access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into()).filter(|token| !token.is_empty());
        self
    }

    /// Adds a header sent with every request.
    ///
    /// Only applies to the default transport; combining it with
    /// [`transport`](SessionBuilder::transport) fails at build time.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Replaces the HTTP transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Sets the solver consulted on captcha challenges.
    ///
    /// By default every captcha challenge is fatal.
    pub fn captcha_solver(mut self, solver: impl CaptchaSolver + 'static) -> Self {
        self.captcha_solver = Box::new(solver);
        self
    }

    /// Sets the provider consulted whenever the session has no access token.
    pub fn credential_provider(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.credential_provider = Some(Box::new(provider));
        self
    }

    /// Sets the recovery retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Builds the configured `Session`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default transport can't be created, or if default
    /// headers were given together with a custom transport.
    pub fn build(self) -> Result<Session> {
        if self.transport.is_some() && !self.default_headers.is_empty() {
            return Err(Error::ConfigurationError(
                "Default headers only apply to the default transport".to_string(),
            ));
        }

        let mut base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_API_URL)?,
        };
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(ReqwestTransport::with_headers(self.default_headers)?),
        };

        Ok(Session {
            inner: Arc::new(SessionInner {
                base_url,
                access_token: RwLock::new(self.access_token),
                transport,
                captcha_solver: self.captcha_solver,
                credential_provider: self.credential_provider,
                retry_policy: self.retry_policy,
            }),
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

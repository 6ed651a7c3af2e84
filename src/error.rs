//! Error types for API method calls.
//!
//! Transport failures, undecodable bodies and server-reported errors all surface
//! through the single [`Error`] enum. Server-reported errors are wrapped in an
//! [`ApiError`], which keeps the code and message the server sent and classifies
//! the two conditions the session recovers from on its own.

use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The main error type for API method calls.
///
/// # Examples
///
/// ```no_run
/// use vkcall::{Api, Arguments, Error, Session};
///
/// # async fn example() -> Result<(), Error> {
/// let api = Api::new(Session::builder().access_token("token").build()?);
///
/// match api.call("users.get", Arguments::new().with("user_ids", 1)).await {
///     Ok(response) => println!("Users: {}", response.data),
///     Err(Error::Api(error)) if error.is_captcha_needed() => {
///         eprintln!("Captcha left unsolved: {:?}", error.captcha_img);
///     }
///     Err(Error::Api(error)) => eprintln!("API error {}: {}", error.code, error.message),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection failed, DNS lookup failed, etc.).
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request took longer than the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The server returned a non-2xx HTTP status code.
    ///
    /// No recovery is attempted for these; the body is kept for debugging.
    #[error("HTTP error {status}: {raw_response}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// The response body did not start with a decodable JSON value.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The response decoded, but no chunk carried a `response` or `error` key.
    #[error("Malformed response (status {status}): {raw_response}")]
    MalformedResponse {
        /// The raw response body
        raw_response: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The server reported an error the session could not recover from.
    ///
    /// This includes captcha challenges nobody solved and every error code
    /// without a recovery path.
    #[error("API error {0}")]
    Api(ApiError),

    /// The recovery retry limit was reached.
    ///
    /// # Fields
    ///
    /// * `attempts` - The number of requests sent for this call
    /// * `last_error` - The server error that asked for one more retry
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// The number of attempts made
        attempts: usize,
        /// The last error encountered
        last_error: Box<Error>,
    },

    /// The credential provider could not produce an access token.
    #[error("Authorization error: {0}")]
    Auth(String),

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Method arguments could not be converted into a flat argument map.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(error)
        }
    }
}

impl Error {
    /// Returns the server-reported error, if this is one.
    ///
    /// Looks through [`Error::MaxRetriesExceeded`] to the error that caused the
    /// final retry request.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(error) => Some(error),
            Error::MaxRetriesExceeded { last_error, .. } => last_error.api_error(),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            Error::MalformedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            Error::MalformedResponse { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for API method calls.
pub type Result<T> = std::result::Result<T, Error>;

/// How the session reacts to a server-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The server wants a captcha answer before it will run the method.
    CaptchaNeeded,
    /// The access token was rejected.
    AccessTokenInvalid,
    /// Anything else. Always fatal.
    Other,
}

/// An error object reported by the API inside an `{"error": {...}}` chunk.
///
/// # Examples
///
/// ```
/// use vkcall::{ApiError, ApiErrorKind};
///
/// let error = ApiError::from_value(serde_json::json!({
///     "error_code": 14,
///     "error_msg": "Captcha needed",
///     "captcha_sid": "42",
///     "captcha_img": "https://api.vk.com/captcha.php?sid=42",
/// }));
///
/// assert_eq!(error.kind(), ApiErrorKind::CaptchaNeeded);
/// assert_eq!(error.captcha_sid.as_deref(), Some("42"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// The numeric error code. `0` when the server sent none.
    pub code: i64,

    /// The human-readable message.
    pub message: String,

    /// Captcha session id, present on captcha challenges.
    pub captcha_sid: Option<String>,

    /// URL of the captcha image, present on captcha challenges.
    pub captcha_img: Option<String>,

    /// Where the user should go to resolve the error, e.g. a validation page.
    pub redirect_uri: Option<String>,

    /// The parameters the server received, as it echoed them back.
    pub request_params: BTreeMap<String, String>,
}

impl ApiError {
    /// Error code the server sends when a captcha must be solved.
    pub const CAPTCHA_NEEDED: i64 = 14;

    /// Error code the server sends when the access token is rejected.
    pub const AUTHORIZATION_FAILED: i64 = 5;

    /// Wraps an error object.
    ///
    /// `error_code` and `error_msg` are read first; the remaining fields are
    /// decoded leniently and fall back to empty when malformed, so they never
    /// affect classification. A value that is not an object is still wrapped,
    /// with code `0` and the raw JSON as the message.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(fields) = &value else {
            return ApiError {
                code: 0,
                message: value.to_string(),
                captcha_sid: None,
                captcha_img: None,
                redirect_uri: None,
                request_params: BTreeMap::new(),
            };
        };

        let text = |name: &str| fields.get(name).cloned().and_then(value_to_string);

        ApiError {
            code: fields.get("error_code").and_then(error_code).unwrap_or(0),
            message: text("error_msg").unwrap_or_default(),
            captcha_sid: text("captcha_sid"),
            captcha_img: text("captcha_img"),
            redirect_uri: text("redirect_uri"),
            request_params: fields
                .get("request_params")
                .map(request_params)
                .unwrap_or_default(),
        }
    }

    /// Classifies this error.
    pub fn kind(&self) -> ApiErrorKind {
        match self.code {
            Self::CAPTCHA_NEEDED => ApiErrorKind::CaptchaNeeded,
            Self::AUTHORIZATION_FAILED => ApiErrorKind::AccessTokenInvalid,
            _ => ApiErrorKind::Other,
        }
    }

    /// Returns `true` if the server asked for a captcha answer.
    pub fn is_captcha_needed(&self) -> bool {
        self.kind() == ApiErrorKind::CaptchaNeeded
    }

    /// Returns `true` if the server rejected the access token.
    pub fn is_access_token_invalid(&self) -> bool {
        self.kind() == ApiErrorKind::AccessTokenInvalid
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. {}. request_params = {:?}",
            self.code, self.message, self.request_params
        )?;
        if let Some(redirect_uri) = &self.redirect_uri {
            write!(f, ",\nredirect_uri = \"{}\"", redirect_uri)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Accepts integer codes and numeric strings.
fn error_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Deserialize)]
struct RequestParam {
    key: String,
    #[serde(default)]
    value: Value,
}

/// Reads the `[{"key": .., "value": ..}]` list, or a plain object of the same
/// pairs. Entries that don't fit are skipped.
fn request_params(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| RequestParam::deserialize(item).ok())
            .map(|param| (param.key, value_to_string(param.value).unwrap_or_default()))
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                (key.clone(), value_to_string(value.clone()).unwrap_or_default())
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classifies_known_codes() {
        let captcha = ApiError::from_value(json!({"error_code": 14}));
        assert_eq!(captcha.kind(), ApiErrorKind::CaptchaNeeded);
        assert!(captcha.is_captcha_needed());

        let token = ApiError::from_value(json!({"error_code": 5, "error_msg": "User authorization failed"}));
        assert_eq!(token.kind(), ApiErrorKind::AccessTokenInvalid);
        assert!(token.is_access_token_invalid());

        let other = ApiError::from_value(json!({"error_code": 999, "error_msg": "boom"}));
        assert_eq!(other.kind(), ApiErrorKind::Other);
        assert_eq!(other.code, 999);
        assert_eq!(other.message, "boom");
    }

    #[test]
    fn test_captcha_fields_accept_numbers() {
        let error = ApiError::from_value(json!({
            "error_code": 14,
            "captcha_sid": 123456,
            "captcha_img": "http://x",
        }));

        assert_eq!(error.captcha_sid.as_deref(), Some("123456"));
        assert_eq!(error.captcha_img.as_deref(), Some("http://x"));
    }

    #[test]
    fn test_request_params_are_flattened() {
        let error = ApiError::from_value(json!({
            "error_code": 100,
            "error_msg": "One of the parameters specified was missing or invalid",
            "request_params": [
                {"key": "method", "value": "users.get"},
                {"key": "oauth", "value": 1},
            ],
        }));

        assert_eq!(error.request_params.get("method").map(String::as_str), Some("users.get"));
        assert_eq!(error.request_params.get("oauth").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_unexpected_shape_is_still_wrapped() {
        let error = ApiError::from_value(json!("something went wrong"));
        assert_eq!(error.code, 0);
        assert_eq!(error.kind(), ApiErrorKind::Other);
        assert_eq!(error.message, "\"something went wrong\"");

        let error = ApiError::from_value(json!({"error_msg": null}));
        assert_eq!(error.code, 0);
        assert_eq!(error.message, "");
    }

    #[test]
    fn test_display_includes_redirect_uri() {
        let error = ApiError::from_value(json!({
            "error_code": 17,
            "error_msg": "Validation required",
            "redirect_uri": "https://m.vk.com/login?act=security_check",
        }));

        let text = error.to_string();
        assert!(text.starts_with("17. Validation required. request_params = {}"));
        assert!(text.contains("redirect_uri = \"https://m.vk.com/login?act=security_check\""));
    }

    #[test]
    fn test_api_error_looks_through_retry_limit() {
        let error = Error::MaxRetriesExceeded {
            attempts: 3,
            last_error: Box::new(Error::Api(ApiError::from_value(json!({"error_code": 5})))),
        };

        assert_eq!(error.api_error().map(|e| e.code), Some(5));
        assert!(error.status().is_none());
    }

    #[test]
    fn test_malformed_extras_do_not_change_classification() {
        let error = ApiError::from_value(json!({
            "error_code": 5,
            "error_msg": "auth failed",
            "request_params": {"method": "users.get"},
            "captcha_sid": {"nested": true},
        }));

        assert_eq!(error.code, 5);
        assert_eq!(error.kind(), ApiErrorKind::AccessTokenInvalid);
        assert_eq!(error.message, "auth failed");
        assert_eq!(error.request_params.get("method").map(String::as_str), Some("users.get"));

        let error = ApiError::from_value(json!({
            "error_code": "14",
            "request_params": [{"value": "no key"}, 7, {"key": "v", "value": "5.131"}],
        }));

        assert_eq!(error.kind(), ApiErrorKind::CaptchaNeeded);
        assert_eq!(error.request_params.len(), 1);
        assert_eq!(error.request_params.get("v").map(String::as_str), Some("5.131"));
    }
}

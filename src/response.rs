//! Response wrapper that keeps the decoded `response` value next to the
//! details of the HTTP exchange that produced it.

use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// The result of a successful method call.
///
/// `data` holds the value of the `response` key. The remaining fields describe the
/// final HTTP round trip, except `latency` and `attempts`, which cover every
/// recovery retry as well.
///
/// # Examples
///
/// ```no_run
/// use vkcall::{Api, Arguments, Session};
///
/// # async fn example() -> Result<(), vkcall::Error> {
/// let api = Api::new(Session::builder().access_token("token").build()?);
///
/// let response = api.call("users.get", Arguments::new().with("user_ids", 1)).await?;
///
/// println!("Users: {}", response.data);
/// println!("Request took {:?}", response.latency);
/// println!("Attempts: {}", response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T = Value> {
    /// The value of the `response` key.
    pub data: T,

    /// The raw body of the final HTTP response.
    pub raw_body: String,

    /// The HTTP status code of the final response.
    pub status: StatusCode,

    /// The headers of the final response.
    pub headers: HeaderMap,

    /// Time from the first request until the result was available.
    pub latency: Duration,

    /// The number of HTTP requests sent, `1` when no recovery was needed.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the response data to a different type, keeping the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use vkcall::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     42,
    ///     r#"{"response":42}"#.to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the call needed a captcha or token retry.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value of the final response by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl Response<Value> {
    /// Deserializes the `response` value into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeserializationFailed`] if the value does not match `U`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use vkcall::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     serde_json::json!([1, 2, 3]),
    ///     String::new(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::ZERO,
    ///     1,
    /// );
    ///
    /// let ids = response.deserialize::<Vec<u64>>().unwrap();
    /// assert_eq!(ids.data, vec![1, 2, 3]);
    /// ```
    pub fn deserialize<U: DeserializeOwned>(self) -> crate::Result<Response<U>> {
        match serde_json::from_value::<U>(self.data) {
            Ok(data) => Ok(Response {
                data,
                raw_body: self.raw_body,
                status: self.status,
                headers: self.headers,
                latency: self.latency,
                attempts: self.attempts,
            }),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    raw_response = %self.raw_body,
                    "Failed to deserialize response value"
                );

                Err(crate::Error::DeserializationFailed {
                    raw_response: self.raw_body,
                    serde_error: e.to_string(),
                    status: self.status,
                })
            }
        }
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn response(data: Value, attempts: usize) -> Response {
        Response::new(
            data,
            String::from("{}"),
            StatusCode::OK,
            HeaderMap::new(),
            Duration::from_millis(5),
            attempts,
        )
    }

    #[test]
    fn test_was_retried() {
        assert!(!response(json!(1), 1).was_retried());
        assert!(response(json!(1), 2).was_retried());
    }

    #[test]
    fn test_deserialize_into_struct() {
        #[derive(Deserialize)]
        struct User {
            id: u64,
            first_name: String,
        }

        let users = response(json!([{"id": 1, "first_name": "Pavel"}]), 1)
            .deserialize::<Vec<User>>()
            .unwrap();

        assert_eq!(users.data.len(), 1);
        assert_eq!(users.data[0].id, 1);
        assert_eq!(users.data[0].first_name, "Pavel");
        assert_eq!(users.attempts, 1);
    }

    #[test]
    fn test_deserialize_mismatch_keeps_raw_body() {
        let result = response(json!("not a number"), 1).deserialize::<u64>();

        match result {
            Err(crate::Error::DeserializationFailed { raw_response, .. }) => {
                assert_eq!(raw_response, "{}");
            }
            other => panic!("Expected DeserializationFailed, got {:?}", other.map(|r| r.data)),
        }
    }
}

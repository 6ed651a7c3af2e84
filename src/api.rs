//! Method namespace and call builders.
//!
//! [`Api`] is the entry point: it holds the default arguments and timeout shared by
//! every call, and starts [`MethodCall`] builders. A builder accumulates dotted name
//! segments (`users` + `get` = `users.get`) without touching the network; only the
//! terminal `call*` operations send anything.

use crate::{params::stringify_values, Arguments, Response, Result, Session};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Timeout applied to each HTTP request unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A namespace of remote methods bound to a [`Session`].
///
/// # Examples
///
/// ```no_run
/// use vkcall::{Api, Arguments, Session};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), vkcall::Error> {
/// let api = Api::new(Session::builder().access_token("token").build()?)
///     .with_version("5.131")
///     .with_timeout(Duration::from_secs(30));
///
/// // Builder style
/// let users = api
///     .method("users")
///     .segment("get")
///     .call(Arguments::new().with("user_ids", vec![1, 2]))
///     .await?;
///
/// // Dotted name
/// let friends = api
///     .call("friends.get", Arguments::new().with("user_id", 1))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Api {
    session: Session,
    timeout: Duration,
    default_args: Arguments,
}

impl Api {
    /// Creates a namespace with no default arguments and [`DEFAULT_TIMEOUT`].
    pub fn new(session: Session) -> Self {
        Self {
            session,
            timeout: DEFAULT_TIMEOUT,
            default_args: Arguments::new(),
        }
    }

    /// Sets the timeout of each HTTP request issued through this namespace.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds an argument sent with every call unless the call overrides it.
    pub fn with_default_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_args.insert(name, value);
        self
    }

    /// Pins the API version (`v`) for every call.
    pub fn with_version(self, version: impl Into<String>) -> Self {
        self.with_default_arg("v", version.into())
    }

    /// Sets the response language (`lang`) for every call.
    pub fn with_lang(self, lang: impl Into<String>) -> Self {
        self.with_default_arg("lang", lang.into())
    }

    /// Returns the session calls are executed on.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the default arguments.
    pub fn default_args(&self) -> &Arguments {
        &self.default_args
    }

    /// Starts a call builder. Dots in `name` separate segments.
    pub fn method(&self, name: impl AsRef<str>) -> MethodCall<'_> {
        MethodCall {
            api: self,
            segments: Vec::new(),
        }
        .segment(name)
    }

    /// Calls a method by its dotted name.
    pub async fn call(&self, method_name: &str, args: Arguments) -> Result<Response<Value>> {
        self.method(method_name).call(args).await
    }
}

/// A method name under construction.
///
/// Each [`segment`](MethodCall::segment) returns a new builder; the original keeps
/// its shorter name.
///
/// ```
/// use vkcall::{Api, Session};
///
/// # fn example() -> Result<(), vkcall::Error> {
/// let api = Api::new(Session::builder().build()?);
///
/// let photos = api.method("photos");
/// let upload = photos.segment("getUploadServer");
///
/// assert_eq!(photos.method_name(), "photos");
/// assert_eq!(upload.method_name(), "photos.getUploadServer");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MethodCall<'a> {
    api: &'a Api,
    segments: Vec<String>,
}

impl<'a> MethodCall<'a> {
    /// Returns a builder with `name` appended to this one's segments.
    pub fn segment(&self, name: impl AsRef<str>) -> MethodCall<'a> {
        let mut segments = self.segments.clone();
        segments.extend(
            name.as_ref()
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string),
        );
        MethodCall {
            api: self.api,
            segments,
        }
    }

    /// Returns the dotted method name.
    pub fn method_name(&self) -> String {
        self.segments.join(".")
    }

    /// Finalizes the call with its arguments without sending it.
    pub fn request(self, args: Arguments) -> MethodRequest<'a> {
        MethodRequest {
            api: self.api,
            method_name: self.method_name(),
            arguments: args,
        }
    }

    /// Sends the call and returns the `response` value.
    pub async fn call(self, args: Arguments) -> Result<Response<Value>> {
        let api = self.api;
        let request = self.request(args);
        api.session.make_request(&request).await
    }

    /// Sends the call with arguments taken from a serializable struct or map.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SerializationFailed`] if `args` is not an object.
    pub async fn call_with<A: Serialize + ?Sized>(self, args: &A) -> Result<Response<Value>> {
        let args = Arguments::from_serialize(args)?;
        self.call(args).await
    }

    /// Sends the call and deserializes the `response` value into `T`.
    pub async fn call_as<T: DeserializeOwned>(self, args: Arguments) -> Result<Response<T>> {
        self.call(args).await?.deserialize()
    }
}

/// A fully built call: method name plus the arguments given at call time.
#[derive(Debug, Clone)]
pub struct MethodRequest<'a> {
    api: &'a Api,
    method_name: String,
    arguments: Arguments,
}

impl<'a> MethodRequest<'a> {
    /// Returns the namespace the call was built from.
    pub fn api(&self) -> &'a Api {
        self.api
    }

    /// Returns the dotted method name.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Returns the explicit call arguments.
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.api.timeout
    }

    /// The form body without credentials: defaults overlaid with the call's own
    /// arguments, all in wire form.
    pub fn form_arguments(&self) -> BTreeMap<String, String> {
        stringify_values(&self.arguments.merged_over(&self.api.default_args))
    }
}

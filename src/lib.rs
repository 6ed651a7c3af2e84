//! # vkcall - a dotted-method client for the VK API
//!
//! vkcall invokes remote methods by their dotted names (`users.get`,
//! `wall.post`, ...), sends arguments as form fields together with a bearer access
//! token, and unwraps the `{"response": ...}` / `{"error": {...}}` envelope the API
//! answers with. Two server errors are handled transparently:
//!
//! - **Captcha challenges** are passed to a [`CaptchaSolver`]; the call is re-sent
//!   with the answer.
//! - **Rejected access tokens** are dropped and the call is re-sent, optionally with
//!   a fresh token from a [`CredentialProvider`].
//!
//! Everything else comes back as an [`Error`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use vkcall::{Api, Arguments, Session};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     first_name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vkcall::Error> {
//!     let session = Session::builder().access_token("my-token").build()?;
//!     let api = Api::new(session).with_version("5.131");
//!
//!     let users = api
//!         .method("users")
//!         .segment("get")
//!         .call_as::<Vec<User>>(Arguments::new().with("user_ids", vec![1, 2]))
//!         .await?;
//!
//!     for user in users.data {
//!         println!("{}: {}", user.id, user.first_name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! use vkcall::{Api, Arguments, Error, Session};
//!
//! # async fn example() -> Result<(), Error> {
//! # let api = Api::new(Session::builder().build()?);
//! match api.call("wall.post", Arguments::new().with("message", "hi")).await {
//!     Ok(response) => println!("Posted: {}", response.data),
//!     Err(Error::Api(error)) => eprintln!("API error {}: {}", error.code, error.message),
//!     Err(Error::MaxRetriesExceeded { attempts, last_error }) => {
//!         eprintln!("Gave up after {} attempts: {}", attempts, last_error);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Each call is a strictly sequential chain of HTTP round trips. A [`Session`] may be
//! shared between tasks: the access token sits behind a lock, and a rejected token is
//! only dropped if no other call has replaced it in the meantime.

mod api;
mod auth;
mod envelope;
mod error;
pub mod params;
mod response;
pub mod retry;
mod session;
pub mod transport;

pub use api::{Api, MethodCall, MethodRequest, DEFAULT_TIMEOUT};
pub use auth::{CaptchaSolver, CredentialProvider, NoCaptchaSolver};
pub use error::{ApiError, ApiErrorKind, Error, Result};
pub use params::Arguments;
pub use response::Response;
pub use retry::{RetryPolicy, DEFAULT_MAX_RETRIES};
pub use session::{Session, SessionBuilder, DEFAULT_API_URL};
pub use transport::{ReqwestTransport, Transport, TransportResponse};

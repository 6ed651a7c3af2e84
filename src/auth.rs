//! Capabilities a session consults while recovering from errors.
//!
//! A [`CaptchaSolver`] answers captcha challenges and a [`CredentialProvider`]
//! produces access tokens. Both are optional. Without a solver every captcha is
//! fatal, and without a provider a rejected token is simply dropped.

use crate::Result;
use async_trait::async_trait;

/// Answers captcha challenges.
///
/// Closures of type `Fn(&str) -> Option<String>` implement this trait.
///
/// # Examples
///
/// ```
/// use vkcall::{CaptchaSolver, Session};
///
/// # fn example() -> Result<(), vkcall::Error> {
/// let session = Session::builder()
///     .captcha_solver(|image_url: &str| {
///         println!("Open {} and type the answer", image_url);
///         let mut answer = String::new();
///         std::io::stdin().read_line(&mut answer).ok()?;
///         Some(answer.trim().to_string())
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Returns the answer for the captcha at `image_url`, or `None` to give up.
    async fn solve(&self, image_url: &str) -> Option<String>;
}

/// A solver that never answers, so every captcha challenge is fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCaptchaSolver;

#[async_trait]
impl CaptchaSolver for NoCaptchaSolver {
    async fn solve(&self, _image_url: &str) -> Option<String> {
        None
    }
}

#[async_trait]
impl<F> CaptchaSolver for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    async fn solve(&self, image_url: &str) -> Option<String> {
        self(image_url)
    }
}

/// Produces access tokens, e.g. by running a login flow.
///
/// The session asks for a token whenever it has none: before the first request
/// if no token was configured, and after the server rejected the current one.
///
/// # Errors
///
/// Implementations report a flow that cannot complete (missing two-factor code,
/// wrong password, ...) as [`crate::Error::Auth`].
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtains a fresh access token.
    async fn access_token(&self) -> Result<String>;
}

/// Masks a token for logging, keeping the first and last four characters.
pub(crate) fn censor_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}

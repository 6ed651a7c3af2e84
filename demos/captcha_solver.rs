//! Example wiring interactive captcha solving and token refresh into a session.
//!
//! This example shows how to:
//! - Answer captcha challenges from the terminal
//! - Supply access tokens through a `CredentialProvider`
//! - Bound recovery with a retry policy
//!
//! Run with: `VK_TOKEN=... cargo run --example captcha_solver`

use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::time::Duration;
use vkcall::retry::RetryDelay;
use vkcall::{Api, Arguments, CredentialProvider, Error, RetryPolicy, Session};

/// Reads the token from the environment each time one is needed.
struct EnvToken;

#[async_trait]
impl CredentialProvider for EnvToken {
    async fn access_token(&self) -> vkcall::Result<String> {
        std::env::var("VK_TOKEN").map_err(|_| Error::Auth("VK_TOKEN is not set".to_string()))
    }
}

fn ask_captcha(image_url: &str) -> Option<String> {
    print!("Captcha needed, open {} and type the answer: ", image_url);
    io::stdout().flush().ok()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer).ok()?;
    Some(answer.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("vkcall=info,captcha_solver=info")
        .init();

    let session = Session::builder()
        .credential_provider(EnvToken)
        .captcha_solver(ask_captcha)
        .retry_policy(RetryPolicy::new(3).with_delay(RetryDelay::ExponentialBackoff {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            jitter: true,
        }))
        .build()?;

    let api = Api::new(session).with_version("5.131");

    match api
        .method("status")
        .segment("set")
        .call(Arguments::new().with("text", "Hello from vkcall"))
        .await
    {
        Ok(response) => println!("Status updated: {}", response.data),
        Err(Error::MaxRetriesExceeded { attempts, last_error }) => {
            println!("Gave up after {} attempts: {}", attempts, last_error);
        }
        Err(Error::Api(error)) if error.is_captcha_needed() => {
            println!("Captcha was not answered");
        }
        Err(e) => return Err(e),
    }

    Ok(())
}

//! Basic example calling a few read-only methods.
//!
//! This example shows how to:
//! - Create a session and a method namespace with default arguments
//! - Call methods with the builder and by dotted name
//! - Deserialize the `response` value into your own types
//! - Inspect response metadata
//!
//! Run with: `VK_TOKEN=... cargo run --example basic_call`

use serde::Deserialize;
use std::time::Duration;
use vkcall::{Api, Arguments, Error, Session};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct User {
    id: u64,
    first_name: String,
    last_name: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("vkcall=debug,basic_call=info")
        .init();

    let mut builder = Session::builder();
    if let Ok(token) = std::env::var("VK_TOKEN") {
        builder = builder.access_token(token);
    }

    let api = Api::new(builder.build()?)
        .with_version("5.131")
        .with_lang("en")
        .with_timeout(Duration::from_secs(15));

    println!("=== Builder Example ===");
    let users = api
        .method("users")
        .segment("get")
        .call_as::<Vec<User>>(Arguments::new().with("user_ids", vec![1, 6492]))
        .await?;

    for user in &users.data {
        println!("{}: {} {}", user.id, user.first_name, user.last_name);
    }
    println!("Request latency: {:?}", users.latency);
    println!();

    println!("=== Dotted Name Example ===");
    match api
        .call("utils.resolveScreenName", Arguments::new().with("screen_name", "durov"))
        .await
    {
        Ok(response) => println!("Resolved: {}", response.data),
        Err(Error::Api(error)) => println!("API refused: {}", error),
        Err(e) => return Err(e),
    }
    println!();

    println!("=== Accessing Response Metadata ===");
    println!("Status code: {}", users.status);
    println!("Raw response length: {} bytes", users.raw_body.len());
    println!("Content-Type: {:?}", users.header("content-type"));
    println!("Was retried: {}", users.was_retried());

    Ok(())
}

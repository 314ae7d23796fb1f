//! Simple health check example.
//!
//! Run with: cargo run --example health_check
//!
//! Set CHAT_API_URL to point at the API (default: http://localhost:8000).

use chat_stream::{ChatClient, ClientConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let config = ClientConfig::from_env();
    println!("Checking {}...", config.health_url());

    let client = ChatClient::new(config)?;
    let healthy = client.health_check().await.unwrap_or(false);
    println!("Health check: {}", if healthy { "OK" } else { "FAILED" });

    Ok(())
}

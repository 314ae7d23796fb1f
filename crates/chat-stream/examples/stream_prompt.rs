//! Stream one prompt and print the reply as it arrives.
//!
//! Run with: cargo run --example stream_prompt -- "Tell me a joke"
//!
//! Configuration via .env file or environment variables:
//!   CHAT_API_URL - API base URL (default: http://localhost:8000)

use std::env;

use chat_core::{ChatRequest, StreamEvent};
use chat_stream::{ChatClient, ClientConfig, StreamError, StreamHandler};
use tokio::sync::oneshot;

struct Printer {
    done: Option<oneshot::Sender<()>>,
}

impl Printer {
    fn finish(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl StreamHandler for Printer {
    fn on_event(&mut self, event: StreamEvent) {
        if let Some(action) = event.action {
            eprintln!("[{}]", action);
        }
        if let Some(text) = event.assistant_text() {
            print!("{}", text);
        }
    }

    fn on_error(&mut self, error: StreamError) {
        eprintln!("\nError: {}", error);
        self.finish();
    }

    fn on_complete(&mut self) {
        println!();
        self.finish();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let prompt = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        return Err("usage: stream_prompt <prompt>".into());
    }

    let client = ChatClient::new(ClientConfig::from_env())?;
    let (tx, rx) = oneshot::channel();
    let thread_id = chat_core::generate_id();

    let handle = client.open(ChatRequest::new(thread_id, prompt), Printer { done: Some(tx) });

    tokio::select! {
        _ = rx => {}
        _ = tokio::signal::ctrl_c() => {
            handle.cancel();
            eprintln!("\nCancelled");
        }
    }

    Ok(())
}

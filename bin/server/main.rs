//! Conversation Relay Server
//!
//! Runs the conversation relay as a standalone HTTP server.

use anyhow::Result;
use clap::Parser;
use conversation_relay::{
    caller_tokens_from_env, run_server, AppState, AuthManager, OpenAiClient,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "conversation-server")]
#[command(about = "Authenticated chat completion relay with bounded retry")]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "8080", env = "RELAY_PORT")]
    port: u16,

    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_HOST")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("conversation_relay=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    info!("Starting Conversation Relay Server");
    info!("  Listening on: {}:{}", args.host, args.port);

    let client = OpenAiClient::from_env()?;
    if !client.has_api_key() {
        warn!("OPENAI_API_KEY is not set; completion requests will fail with 500");
    }
    info!("  Model: {}", client.model());

    let tokens = caller_tokens_from_env();
    if tokens.is_empty() {
        warn!("CONVERSATION_API_TOKENS is empty; every request will be rejected as 401");
    } else {
        info!("  Caller tokens: {}", tokens.len());
    }
    let auth = AuthManager::with_tokens(tokens);

    let state = Arc::new(AppState::new(auth, client));
    run_server(state, &args.host, args.port).await
}

//! Conversation Relay
//!
//! A single authenticated HTTP endpoint that forwards a chat message list
//! to the OpenAI chat completion API and returns the first generated reply,
//! retrying rate-limited calls (HTTP 429) with bounded exponential backoff.
//!
//! ## Module Structure
//!
//! - `config`: provider settings, retry policy, caller token parsing
//! - `auth`: bearer token extraction and caller whitelist
//! - `openai`: completion client with the retry loop
//! - `server`: axum routes, error-to-response mapping, startup

/// Service configuration
pub mod config;

/// Caller authentication
pub mod auth;

/// Completion provider client
pub mod openai;

/// HTTP server and routes
pub mod server;

pub use auth::AuthManager;
pub use config::{caller_tokens_from_env, OpenAiConfig};
pub use openai::{ChatMessage, OpenAiClient, OpenAiError, Role};
pub use server::{run_server, AppState};

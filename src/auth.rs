//! Authentication Module
//!
//! Provides:
//! - Bearer token extraction from request headers
//! - Caller token whitelist management

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::warn;

// ============================================================================
// BEARER TOKEN EXTRACTION
// ============================================================================

/// Extract the bearer token from an `Authorization` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ============================================================================
// CALLER WHITELIST
// ============================================================================

/// Manages the set of caller tokens allowed to use the endpoint
pub struct AuthManager {
    tokens: RwLock<HashSet<String>>,
}

impl AuthManager {
    /// Create a new AuthManager with an empty token set
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashSet::new()),
        }
    }

    /// Create a new AuthManager with an initial token set
    pub fn with_tokens(tokens: Vec<String>) -> Self {
        let mut set = HashSet::new();
        for token in tokens {
            if token.is_empty() {
                warn!("Ignoring empty caller token");
            } else {
                set.insert(token);
            }
        }
        Self {
            tokens: RwLock::new(set),
        }
    }

    /// Check if a caller token is authorized
    pub async fn is_authorized(&self, token: &str) -> bool {
        let tokens = self.tokens.read().await;
        tokens.contains(token)
    }

    /// Add a caller token
    pub async fn add_token(&self, token: &str) -> bool {
        if token.is_empty() {
            warn!("Cannot add empty caller token");
            return false;
        }
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.to_string())
    }

    /// Remove a caller token
    pub async fn remove_token(&self, token: &str) -> bool {
        let mut tokens = self.tokens.write().await;
        tokens.remove(token)
    }
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

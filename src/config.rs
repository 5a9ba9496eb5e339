//! Service Configuration
//!
//! Defines the configuration for the conversation relay including:
//! - Completion provider settings (API base, key, model)
//! - Request timeout
//! - Retry policy for rate-limited provider calls
//! - Caller token list for endpoint authentication

/// Completion provider configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL of the provider API (ends with the version segment)
    pub api_base: String,
    /// Provider API key; empty means completions are unconfigured
    pub api_key: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of retries after the initial call (429 only)
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; retry k waits base * 2^k
    pub base_delay_ms: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: std::env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
            timeout_secs: 60,
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

impl OpenAiConfig {
    /// Worst-case added latency from backoff, in milliseconds.
    ///
    /// With defaults (3 retries, 500ms base) this is 1000 + 2000 + 4000 = 7000.
    pub fn max_backoff_ms(&self) -> u64 {
        (1..=self.max_retries as u64)
            .map(|k| self.base_delay_ms * (1 << k))
            .sum()
    }
}

/// Parse the caller token list from `CONVERSATION_API_TOKENS`.
///
/// Tokens are comma-separated; whitespace around each token is trimmed and
/// empty entries are dropped. An unset variable yields an empty list, which
/// means every request is rejected as unauthenticated.
pub fn caller_tokens_from_env() -> Vec<String> {
    std::env::var("CONVERSATION_API_TOKENS")
        .map(|raw| {
            raw.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

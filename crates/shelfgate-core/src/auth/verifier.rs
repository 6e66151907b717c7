use crate::auth::{api_key::ApiKeyCredential, AuthError};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Request metadata handed to the verifier alongside the raw key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationContext {
    pub ip: String,
    pub user_agent: Option<String>,
    /// `"<METHOD> <PATH>"`, e.g. `"GET /api/books"`
    pub endpoint: String,
}

/// Which usage window a key has exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitWindow {
    Hourly,
    Daily,
}

impl RateLimitWindow {
    /// Seconds the client should wait before retrying.
    #[must_use]
    pub const fn retry_after_secs(self) -> u64 {
        match self {
            Self::Hourly => 3600,
            Self::Daily => 86_400,
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Hourly => "Hourly rate limit exceeded",
            Self::Daily => "Daily rate limit exceeded",
        }
    }
}

impl fmt::Display for RateLimitWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Daily => write!(f, "daily"),
        }
    }
}

/// Outcome of a key verification.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    /// Unknown, malformed, revoked or expired key
    Rejected,
    /// The key is valid but has used up a usage window
    RateLimited(RateLimitWindow),
    Granted(ApiKeyCredential),
}

/// Key store seam used by the authentication middleware.
///
/// Implementations own hashing, lookup and usage accounting. A well-formed but unknown key
/// is `Ok(Verification::Rejected)`; `Err` is reserved for the store itself failing.
#[async_trait]
pub trait ApiKeyVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AuthError`] if the backing store cannot complete the lookup.
    async fn validate_api_key(
        &self,
        raw_key: &str,
        context: &VerificationContext,
    ) -> Result<Verification, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_retry_after() {
        assert_eq!(RateLimitWindow::Hourly.retry_after_secs(), 3600);
        assert_eq!(RateLimitWindow::Daily.retry_after_secs(), 86_400);
    }

    #[test]
    fn test_window_messages_name_the_window() {
        assert!(RateLimitWindow::Hourly.message().starts_with("Hourly"));
        assert!(RateLimitWindow::Daily.message().starts_with("Daily"));
    }
}

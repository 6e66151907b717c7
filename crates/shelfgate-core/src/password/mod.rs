//! bcrypt password hashing with a minimum-duration floor.
//!
//! [`PasswordService`] owns a [`HashingConfig`] behind an `ArcSwap`, so reads on the hot
//! path are lock-free and [`PasswordService::update_config`] swaps the whole configuration
//! at once. bcrypt work runs on the blocking pool.
//!
//! Every `hash_password` and `verify_password` call takes at least `min_timing_ms`,
//! whether it fails validation immediately or runs the full key schedule:
//!
//! ```text
//!   start ──> validate ──> bcrypt (spawn_blocking) ──> elapsed < floor? ──> sleep(rest)
//!               │                                            ▲
//!               └──────────── early failure ─────────────────┘
//! ```

pub mod service;

pub use service::{extract_rounds_from_hash, PasswordService};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest cost factor accepted for new hashes.
pub const MIN_SALT_ROUNDS: u32 = 10;

/// Highest value `max_salt_rounds` may take, so new hashes stay within `[10, 16]`.
pub const MAX_SALT_ROUNDS: u32 = 16;

/// bcrypt's own cost bounds; anything outside cannot appear in a valid hash.
pub const BCRYPT_MIN_COST: u32 = 4;
pub const BCRYPT_MAX_COST: u32 = 31;

/// bcrypt ignores input past this many bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

pub const MIN_SALT_BYTES: usize = 8;
pub const MAX_SALT_BYTES: usize = 64;

/// Errors from the password hashing service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// The password or salt length argument was rejected
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cost factor or timing configuration out of bounds
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A stored hash could not be parsed
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The hashing backend failed or its worker was lost
    #[error("Hashing failed: {0}")]
    Hashing(String),
}

/// Hashing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// bcrypt cost factor for new hashes
    pub salt_rounds: u32,
    /// Minimum wall-clock duration of hash and verify calls
    pub min_timing_ms: u64,
    pub max_salt_rounds: u32,
    /// Default byte length for [`PasswordService::generate_salt`]
    pub salt_length: usize,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self { salt_rounds: 14, min_timing_ms: 100, max_salt_rounds: 16, salt_length: 16 }
    }
}

impl HashingConfig {
    /// # Errors
    ///
    /// Returns [`HashError::InvalidConfig`] if `salt_rounds` is outside
    /// `[MIN_SALT_ROUNDS, max_salt_rounds]`, `max_salt_rounds` is outside
    /// `[MIN_SALT_ROUNDS, MAX_SALT_ROUNDS]`, or `salt_length` is outside
    /// `[MIN_SALT_BYTES, MAX_SALT_BYTES]`.
    pub fn validate(&self) -> Result<(), HashError> {
        if !(MIN_SALT_ROUNDS..=MAX_SALT_ROUNDS).contains(&self.max_salt_rounds) {
            return Err(HashError::InvalidConfig(format!(
                "max_salt_rounds must be between {MIN_SALT_ROUNDS} and {MAX_SALT_ROUNDS}"
            )));
        }
        if self.salt_rounds < MIN_SALT_ROUNDS || self.salt_rounds > self.max_salt_rounds {
            return Err(HashError::InvalidConfig(format!(
                "Salt rounds must be between {MIN_SALT_ROUNDS} and {}",
                self.max_salt_rounds
            )));
        }
        if !(MIN_SALT_BYTES..=MAX_SALT_BYTES).contains(&self.salt_length) {
            return Err(HashError::InvalidConfig(format!(
                "salt_length must be between {MIN_SALT_BYTES} and {MAX_SALT_BYTES} bytes"
            )));
        }
        Ok(())
    }
}

/// Per-call overrides for [`PasswordService::hash_password`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HashOptions {
    pub salt_rounds: Option<u32>,
}

/// A freshly produced hash. Only `hash` needs persisting; the other fields are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashResult {
    pub hash: String,
    /// The 22-character salt embedded in `hash`
    pub salt: String,
    pub salt_rounds: u32,
    pub algorithm: &'static str,
    pub timestamp: DateTime<Utc>,
    /// bcrypt revision written into the hash prefix
    pub version: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    pub rounds: u32,
    pub iterations: u32,
    pub average_time_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
    pub times: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityRecommendation {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub priority: Priority,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HashingConfig::default();
        assert_eq!(config.salt_rounds, 14);
        assert_eq!(config.min_timing_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rounds_above_max_rejected() {
        let config = HashingConfig { salt_rounds: 17, ..Default::default() };
        assert!(matches!(config.validate(), Err(HashError::InvalidConfig(_))));
    }

    #[test]
    fn test_rounds_below_min_rejected() {
        let config = HashingConfig { salt_rounds: 9, ..Default::default() };
        assert!(matches!(config.validate(), Err(HashError::InvalidConfig(_))));
    }

    #[test]
    fn test_max_rounds_capped_at_sixteen() {
        let config = HashingConfig { salt_rounds: 14, max_salt_rounds: 32, ..Default::default() };
        assert!(matches!(config.validate(), Err(HashError::InvalidConfig(_))));

        let raised = HashingConfig { salt_rounds: 17, max_salt_rounds: 17, ..Default::default() };
        assert!(matches!(raised.validate(), Err(HashError::InvalidConfig(_))));

        let below_floor =
            HashingConfig { salt_rounds: 10, max_salt_rounds: 9, ..Default::default() };
        assert!(below_floor.validate().is_err());

        let at_cap = HashingConfig { salt_rounds: 16, max_salt_rounds: 16, ..Default::default() };
        assert!(at_cap.validate().is_ok());
    }

    #[test]
    fn test_salt_length_bounds() {
        let short = HashingConfig { salt_length: 4, ..Default::default() };
        assert!(short.validate().is_err());
        let long = HashingConfig { salt_length: 65, ..Default::default() };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_recommendation_serializes_type_field() {
        let rec = SecurityRecommendation {
            kind: "timing",
            message: "m".to_string(),
            priority: Priority::Low,
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "timing");
        assert_eq!(json["priority"], "low");
    }
}

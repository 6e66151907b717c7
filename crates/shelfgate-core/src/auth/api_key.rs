use crate::auth::{context::UserRef, AuthError};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Permission grant that satisfies every permission check.
pub const WILDCARD_PERMISSION: &str = "*";

/// Permission grant treated as equivalent to the wildcard.
pub const ADMIN_PERMISSION: &str = "admin";

/// Per-key request quotas enforced by the key store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub requests_per_hour: u64,
    pub requests_per_day: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { requests_per_hour: 1000, requests_per_day: 10_000 }
    }
}

/// Usage counters for the current hour and day windows.
///
/// `last_reset_hour` is always truncated to the start of an hour so that rollover
/// detection is a plain comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    pub requests_this_hour: u64,
    pub requests_today: u64,
    pub last_reset_hour: DateTime<Utc>,
    pub last_reset_date: NaiveDate,
}

impl UsageCounters {
    /// Fresh counters anchored at `now`.
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            requests_this_hour: 0,
            requests_today: 0,
            last_reset_hour: truncate_to_hour(now),
            last_reset_date: now.date_naive(),
        }
    }

    /// Zeroes whichever windows `now` has moved past.
    pub fn roll_windows(&mut self, now: DateTime<Utc>) {
        let hour = truncate_to_hour(now);
        if hour > self.last_reset_hour {
            self.requests_this_hour = 0;
            self.last_reset_hour = hour;
        }

        let date = now.date_naive();
        if date > self.last_reset_date {
            self.requests_today = 0;
            self.last_reset_date = date;
        }
    }
}

fn truncate_to_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// A validated API key as returned by the key store.
///
/// The middleware never mutates a credential; it reads permissions, scopes and the rate
/// limit policy, and forwards the whole record to handlers through the authorization
/// context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyCredential {
    /// Store-internal identifier
    pub id: u64,
    /// Public key id, the part between the prefix and the secret
    pub key_id: String,
    /// Owner of the key, if the key is bound to a user account
    pub user_id: Option<String>,
    /// Owner record, attached to the request as the acting user
    pub user: Option<UserRef>,
    pub permissions: BTreeSet<String>,
    pub scopes: BTreeSet<String>,
    pub usage: UsageCounters,
    pub rate_limit: RateLimitPolicy,
}

impl ApiKeyCredential {
    /// Permission check used by both the authentication and authorization middleware.
    ///
    /// A `*` or `admin` grant satisfies every permission.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(WILDCARD_PERMISSION)
            || self.permissions.contains(ADMIN_PERMISSION)
            || self.permissions.contains(permission)
    }

    /// Scope membership. No wildcard.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    #[must_use]
    pub fn granted_permissions(&self) -> Vec<String> {
        self.permissions.iter().cloned().collect()
    }

    #[must_use]
    pub fn granted_scopes(&self) -> Vec<String> {
        self.scopes.iter().cloned().collect()
    }
}

/// The three parts of a bearer key: `prefix_keyId.secret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParts<'a> {
    pub prefix: &'a str,
    pub key_id: &'a str,
    pub secret: &'a str,
}

impl<'a> KeyParts<'a> {
    /// Splits a raw key into its parts.
    ///
    /// Returns `None` unless every part is non-empty and ASCII alphanumeric. The secret may
    /// not contain further dots.
    #[must_use]
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (prefix, rest) = raw.split_once('_')?;
        let (key_id, secret) = rest.split_once('.')?;

        let well_formed = |part: &str| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric())
        };

        if well_formed(prefix) && well_formed(key_id) && well_formed(secret) {
            Some(Self { prefix, key_id, secret })
        } else {
            None
        }
    }
}

/// A freshly generated key. `plaintext` is shown to the caller once and never stored.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub plaintext: String,
    pub key_id: String,
    pub secret: String,
}

const KEY_ID_BYTES: usize = 8;
const SECRET_LENGTH: usize = 32;

/// Generates a key of the form `<prefix>_<16 hex>.<32 alphanumeric>`.
///
/// # Errors
///
/// Returns [`AuthError::KeyGenerationError`] if the system random number generator fails.
///
/// Uses rejection sampling so that all 62 alphanumeric characters are equally likely;
/// 256 % 62 = 8 would otherwise bias the first eight characters.
pub fn generate_key(prefix: &str) -> Result<GeneratedKey, AuthError> {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    const CHARSET_LEN: usize = 62;
    #[allow(clippy::cast_possible_truncation)]
    const MAX_UNBIASED: u8 = (256 / CHARSET_LEN * CHARSET_LEN - 1) as u8;

    let rng = SystemRandom::new();
    let rng_failure =
        |_| AuthError::KeyGenerationError("Failed to generate secure random bytes".to_string());

    let mut id_bytes = [0u8; KEY_ID_BYTES];
    rng.fill(&mut id_bytes).map_err(rng_failure)?;
    let key_id = hex::encode(id_bytes);

    let mut secret = String::with_capacity(SECRET_LENGTH);
    while secret.len() < SECRET_LENGTH {
        let mut byte = [0u8; 1];
        rng.fill(&mut byte).map_err(rng_failure)?;

        if byte[0] <= MAX_UNBIASED {
            let idx = (byte[0] as usize) % CHARSET_LEN;
            secret.push(CHARSET[idx] as char);
        }
    }

    Ok(GeneratedKey { plaintext: format!("{prefix}_{key_id}.{secret}"), key_id, secret })
}

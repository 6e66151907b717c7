use crate::auth::{
    api_key::{
        generate_key, ApiKeyCredential, GeneratedKey, KeyParts, RateLimitPolicy, UsageCounters,
    },
    context::UserRef,
    verifier::{ApiKeyVerifier, RateLimitWindow, Verification, VerificationContext},
    AuthError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Parameters for issuing a key.
#[derive(Debug, Clone, Default)]
pub struct NewApiKey {
    pub user: Option<UserRef>,
    pub permissions: Vec<String>,
    pub scopes: Vec<String>,
    /// Falls back to the store's default policy
    pub rate_limit: Option<RateLimitPolicy>,
    pub expires_at: Option<DateTime<Utc>>,
}

struct StoredKey {
    credential: ApiKeyCredential,
    secret_digest: String,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
}

impl StoredKey {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// In-process key store keyed by public key id.
///
/// Only an HMAC-SHA256 digest of each secret is retained. Usage windows are tracked per
/// key inside the map entry, so concurrent requests for one key serialize on its shard
/// lock while requests for different keys proceed in parallel.
pub struct InMemoryKeyStore {
    prefix: String,
    signing_secret: Vec<u8>,
    default_policy: RateLimitPolicy,
    keys: DashMap<String, StoredKey>,
    next_id: AtomicU64,
}

impl InMemoryKeyStore {
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] if the signing secret is empty or the prefix is
    /// not a non-empty alphanumeric string.
    pub fn new(
        prefix: impl Into<String>,
        signing_secret: &str,
        default_policy: RateLimitPolicy,
    ) -> Result<Self, AuthError> {
        let prefix = prefix.into();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AuthError::ConfigError(format!("invalid key prefix: {prefix:?}")));
        }
        if signing_secret.is_empty() {
            return Err(AuthError::ConfigError("signing secret must not be empty".to_string()));
        }

        Ok(Self {
            prefix,
            signing_secret: signing_secret.as_bytes().to_vec(),
            default_policy,
            keys: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Issues a new key and returns its plaintext. The plaintext is not retained.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGenerationError`] if randomness is unavailable.
    pub fn issue(&self, request: NewApiKey) -> Result<GeneratedKey, AuthError> {
        let generated = generate_key(&self.prefix)?;
        let secret_digest = self.digest(&generated.secret)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let credential = ApiKeyCredential {
            id,
            key_id: generated.key_id.clone(),
            user_id: request.user.as_ref().map(|u| u.id.clone()),
            user: request.user,
            permissions: request.permissions.into_iter().collect(),
            scopes: request.scopes.into_iter().collect(),
            usage: UsageCounters::starting_at(Utc::now()),
            rate_limit: request.rate_limit.unwrap_or(self.default_policy),
        };

        self.keys.insert(
            generated.key_id.clone(),
            StoredKey {
                credential,
                secret_digest,
                is_active: true,
                expires_at: request.expires_at,
                last_used_at: None,
            },
        );

        info!(key_id = %generated.key_id, id, "api key issued");
        Ok(generated)
    }

    /// Deactivates a key. Subsequent verifications are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotFound`] if no key has this id.
    pub fn revoke(&self, key_id: &str) -> Result<(), AuthError> {
        let mut entry =
            self.keys.get_mut(key_id).ok_or_else(|| AuthError::NotFound(key_id.to_string()))?;
        entry.is_active = false;
        info!(key_id, "api key revoked");
        Ok(())
    }

    /// Snapshot of a key's current credential record.
    #[must_use]
    pub fn get(&self, key_id: &str) -> Option<ApiKeyCredential> {
        self.keys.get(key_id).map(|entry| entry.credential.clone())
    }

    #[must_use]
    pub fn last_used_at(&self, key_id: &str) -> Option<DateTime<Utc>> {
        self.keys.get(key_id).and_then(|entry| entry.last_used_at)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn digest(&self, secret: &str) -> Result<String, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_secret)
            .map_err(|e| AuthError::ConfigError(format!("invalid signing secret: {e}")))?;
        mac.update(secret.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verification against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] if the signing secret cannot key the MAC.
    pub fn verify_at(
        &self,
        raw_key: &str,
        context: &VerificationContext,
        now: DateTime<Utc>,
    ) -> Result<Verification, AuthError> {
        let Some(parts) = KeyParts::parse(raw_key) else {
            debug!(endpoint = %context.endpoint, "malformed api key");
            return Ok(Verification::Rejected);
        };

        if parts.prefix != self.prefix {
            debug!(endpoint = %context.endpoint, "api key prefix mismatch");
            return Ok(Verification::Rejected);
        }

        let presented = self.digest(parts.secret)?;

        let Some(mut entry) = self.keys.get_mut(parts.key_id) else {
            debug!(key_id = parts.key_id, "unknown api key id");
            return Ok(Verification::Rejected);
        };

        let digest_matches: bool =
            presented.as_bytes().ct_eq(entry.secret_digest.as_bytes()).into();
        if !digest_matches {
            warn!(key_id = parts.key_id, ip = %context.ip, "api key secret mismatch");
            return Ok(Verification::Rejected);
        }

        if !entry.is_active || entry.is_expired(now) {
            debug!(key_id = parts.key_id, active = entry.is_active, "api key no longer usable");
            return Ok(Verification::Rejected);
        }

        let policy = entry.credential.rate_limit;
        let usage = &mut entry.credential.usage;
        usage.roll_windows(now);

        if usage.requests_this_hour >= policy.requests_per_hour {
            warn!(key_id = parts.key_id, limit = policy.requests_per_hour, "hourly limit hit");
            return Ok(Verification::RateLimited(RateLimitWindow::Hourly));
        }
        if usage.requests_today >= policy.requests_per_day {
            warn!(key_id = parts.key_id, limit = policy.requests_per_day, "daily limit hit");
            return Ok(Verification::RateLimited(RateLimitWindow::Daily));
        }

        usage.requests_this_hour += 1;
        usage.requests_today += 1;
        entry.last_used_at = Some(now);

        Ok(Verification::Granted(entry.credential.clone()))
    }
}

#[async_trait]
impl ApiKeyVerifier for InMemoryKeyStore {
    async fn validate_api_key(
        &self,
        raw_key: &str,
        context: &VerificationContext,
    ) -> Result<Verification, AuthError> {
        self.verify_at(raw_key, context, Utc::now())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::context::Role;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn store() -> InMemoryKeyStore {
        InMemoryKeyStore::new("lba", "test-signing-secret", RateLimitPolicy::default()).unwrap()
    }

    fn ctx() -> VerificationContext {
        VerificationContext {
            ip: "10.0.0.1".to_string(),
            user_agent: Some("test-agent".to_string()),
            endpoint: "GET /api/books".to_string(),
        }
    }

    fn granted(verification: Verification) -> ApiKeyCredential {
        match verification {
            Verification::Granted(credential) => credential,
            other => panic!("expected Granted, got {other:?}"),
        }
    }

    #[test]
    fn test_new_rejects_bad_configuration() {
        assert!(matches!(
            InMemoryKeyStore::new("", "secret", RateLimitPolicy::default()),
            Err(AuthError::ConfigError(_))
        ));
        assert!(matches!(
            InMemoryKeyStore::new("lb-a", "secret", RateLimitPolicy::default()),
            Err(AuthError::ConfigError(_))
        ));
        assert!(matches!(
            InMemoryKeyStore::new("lba", "", RateLimitPolicy::default()),
            Err(AuthError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let store = store();
        let owner = UserRef { id: "u-9".to_string(), email: None, role: Role::Librarian };
        let key = store
            .issue(NewApiKey {
                user: Some(owner.clone()),
                permissions: vec!["read:books".to_string()],
                scopes: vec!["user".to_string()],
                ..Default::default()
            })
            .unwrap();

        let credential = granted(store.validate_api_key(&key.plaintext, &ctx()).await.unwrap());
        assert_eq!(credential.key_id, key.key_id);
        assert_eq!(credential.user_id.as_deref(), Some("u-9"));
        assert_eq!(credential.user, Some(owner));
        assert!(credential.has_permission("read:books"));
        assert_eq!(credential.usage.requests_this_hour, 1);
        assert!(store.last_used_at(&key.key_id).is_some());
    }

    #[tokio::test]
    async fn test_wrong_secret_and_unknown_id_rejected() {
        let store = store();
        let key = store.issue(NewApiKey::default()).unwrap();

        let tampered = format!("lba_{}.{}", key.key_id, "A".repeat(32));
        assert_eq!(
            store.validate_api_key(&tampered, &ctx()).await.unwrap(),
            Verification::Rejected
        );

        let unknown = format!("lba_ffffffffffffffff.{}", key.secret);
        assert_eq!(
            store.validate_api_key(&unknown, &ctx()).await.unwrap(),
            Verification::Rejected
        );

        let wrong_prefix = format!("xyz_{}.{}", key.key_id, key.secret);
        assert_eq!(
            store.validate_api_key(&wrong_prefix, &ctx()).await.unwrap(),
            Verification::Rejected
        );

        assert_eq!(
            store.validate_api_key("not-a-key", &ctx()).await.unwrap(),
            Verification::Rejected
        );
    }

    #[test]
    fn test_digest_depends_on_signing_secret() {
        let a = InMemoryKeyStore::new("lba", "one", RateLimitPolicy::default()).unwrap();
        let b = InMemoryKeyStore::new("lba", "two", RateLimitPolicy::default()).unwrap();
        assert_ne!(a.digest("secret").unwrap(), b.digest("secret").unwrap());
        assert_eq!(a.digest("secret").unwrap(), a.digest("secret").unwrap());
    }

    #[tokio::test]
    async fn test_revoked_key_rejected() {
        let store = store();
        let key = store.issue(NewApiKey::default()).unwrap();
        store.revoke(&key.key_id).unwrap();

        assert_eq!(
            store.validate_api_key(&key.plaintext, &ctx()).await.unwrap(),
            Verification::Rejected
        );
        assert!(matches!(store.revoke("missing"), Err(AuthError::NotFound(_))));
    }

    #[test]
    fn test_expired_key_rejected() {
        let store = store();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let key = store
            .issue(NewApiKey { expires_at: Some(now - Duration::seconds(1)), ..Default::default() })
            .unwrap();

        assert_eq!(store.verify_at(&key.plaintext, &ctx(), now).unwrap(), Verification::Rejected);
    }

    #[test]
    fn test_hourly_then_daily_limits() {
        let store = store();
        let key = store
            .issue(NewApiKey {
                rate_limit: Some(RateLimitPolicy { requests_per_hour: 2, requests_per_day: 3 }),
                ..Default::default()
            })
            .unwrap();
        let start = Utc.with_ymd_and_hms(2030, 1, 15, 9, 5, 0).unwrap();

        granted(store.verify_at(&key.plaintext, &ctx(), start).unwrap());
        granted(store.verify_at(&key.plaintext, &ctx(), start).unwrap());
        assert_eq!(
            store.verify_at(&key.plaintext, &ctx(), start).unwrap(),
            Verification::RateLimited(RateLimitWindow::Hourly)
        );

        let next_hour = start + Duration::hours(1);
        let credential = granted(store.verify_at(&key.plaintext, &ctx(), next_hour).unwrap());
        assert_eq!(credential.usage.requests_this_hour, 1);
        assert_eq!(credential.usage.requests_today, 3);

        assert_eq!(
            store.verify_at(&key.plaintext, &ctx(), next_hour + Duration::hours(1)).unwrap(),
            Verification::RateLimited(RateLimitWindow::Daily)
        );
    }

    #[test]
    fn test_daily_limit_resets_next_day() {
        let store = store();
        let key = store
            .issue(NewApiKey {
                rate_limit: Some(RateLimitPolicy { requests_per_hour: 10, requests_per_day: 1 }),
                ..Default::default()
            })
            .unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 15, 23, 30, 0).unwrap();

        granted(store.verify_at(&key.plaintext, &ctx(), now).unwrap());
        assert_eq!(
            store.verify_at(&key.plaintext, &ctx(), now).unwrap(),
            Verification::RateLimited(RateLimitWindow::Daily)
        );
        granted(store.verify_at(&key.plaintext, &ctx(), now + Duration::hours(1)).unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_verification_counts_every_request() {
        let store = Arc::new(store());
        let key = store.issue(NewApiKey::default()).unwrap();

        let mut handles = vec![];
        for _ in 0..20 {
            let store = store.clone();
            let plaintext = key.plaintext.clone();
            handles.push(tokio::spawn(async move {
                store.validate_api_key(&plaintext, &ctx()).await.unwrap()
            }));
        }
        for handle in handles {
            granted(handle.await.unwrap());
        }

        assert_eq!(store.get(&key.key_id).unwrap().usage.requests_this_hour, 20);
    }
}

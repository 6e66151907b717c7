use crate::{
    config::Environment,
    password::{
        BenchmarkResult, HashError, HashOptions, HashResult, HashingConfig, Priority,
        SecurityRecommendation, BCRYPT_MAX_COST, BCRYPT_MIN_COST, MAX_PASSWORD_BYTES,
        MAX_SALT_BYTES, MIN_SALT_BYTES, MIN_SALT_ROUNDS,
    },
};
use arc_swap::ArcSwap;
use bcrypt::Version;
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, error, info};

/// bcrypt hashing with salt introspection and a per-call timing floor.
pub struct PasswordService {
    config: ArcSwap<HashingConfig>,
    environment: Environment,
}

impl PasswordService {
    /// # Errors
    ///
    /// Returns [`HashError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: HashingConfig) -> Result<Self, HashError> {
        Self::with_environment(config, Environment::default())
    }

    /// # Errors
    ///
    /// Returns [`HashError::InvalidConfig`] if `config` fails validation.
    pub fn with_environment(
        config: HashingConfig,
        environment: Environment,
    ) -> Result<Self, HashError> {
        config.validate()?;
        info!(
            salt_rounds = config.salt_rounds,
            min_timing_ms = config.min_timing_ms,
            %environment,
            "password service initialized"
        );
        Ok(Self { config: ArcSwap::from_pointee(config), environment })
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<HashingConfig> {
        self.config.load_full()
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Validates and atomically replaces the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidConfig`] and keeps the previous configuration if
    /// `config` fails validation.
    pub fn update_config(&self, config: HashingConfig) -> Result<(), HashError> {
        config.validate()?;
        info!(
            salt_rounds = config.salt_rounds,
            min_timing_ms = config.min_timing_ms,
            "hashing config updated"
        );
        self.config.store(Arc::new(config));
        Ok(())
    }

    /// Hashes `password` with a fresh random salt.
    ///
    /// # Errors
    ///
    /// - [`HashError::InvalidInput`] if the password is empty or longer than 72 bytes
    /// - [`HashError::InvalidConfig`] if `options.salt_rounds` is outside
    ///   `[MIN_SALT_ROUNDS, max_salt_rounds]`
    /// - [`HashError::Hashing`] if bcrypt fails
    ///
    /// Errors are returned only after the timing floor has elapsed.
    pub async fn hash_password(
        &self,
        password: &str,
        options: HashOptions,
    ) -> Result<HashResult, HashError> {
        let config = self.config.load_full();
        with_timing_floor(config.min_timing_ms, hash_unfloored(password, options, &config)).await
    }

    /// Checks `password` against a stored hash.
    ///
    /// Never fails: a malformed password or hash, or a bcrypt error, yields `false`. The
    /// timing floor applies to every outcome.
    pub async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let config = self.config.load_full();
        with_timing_floor(config.min_timing_ms, verify_unfloored(password, hash)).await
    }

    /// Random salt of `length_bytes` bytes, hex encoded.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidInput`] if `length_bytes` is outside `[8, 64]`.
    pub fn generate_salt(&self, length_bytes: usize) -> Result<String, HashError> {
        if !(MIN_SALT_BYTES..=MAX_SALT_BYTES).contains(&length_bytes) {
            return Err(HashError::InvalidInput(format!(
                "Salt length must be between {MIN_SALT_BYTES} and {MAX_SALT_BYTES} bytes"
            )));
        }
        let mut bytes = vec![0u8; length_bytes];
        OsRng.fill_bytes(&mut bytes);
        Ok(hex::encode(bytes))
    }

    /// [`Self::generate_salt`] with the configured `salt_length`.
    ///
    /// # Errors
    ///
    /// See [`Self::generate_salt`].
    pub fn generate_default_salt(&self) -> Result<String, HashError> {
        self.generate_salt(self.config.load().salt_length)
    }

    /// `true` if `hash` cannot be parsed or was produced with fewer rounds than
    /// `target_rounds` (default: the configured `salt_rounds`).
    #[must_use]
    pub fn needs_rehash(&self, hash: &str, target_rounds: Option<u32>) -> bool {
        let target = target_rounds.unwrap_or_else(|| self.config.load().salt_rounds);
        match extract_rounds_from_hash(hash) {
            Ok(rounds) => rounds < target,
            Err(_) => true,
        }
    }

    /// Times `iterations` real hash operations at `rounds`. No timing floor applies.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidInput`] for an invalid password or zero iterations,
    /// [`HashError::InvalidConfig`] if `rounds` is outside bcrypt's `[4, 31]`, and
    /// [`HashError::Hashing`] if bcrypt fails.
    pub async fn benchmark_hashing(
        &self,
        password: &str,
        rounds: u32,
        iterations: u32,
    ) -> Result<BenchmarkResult, HashError> {
        validate_password(password)?;
        if iterations == 0 {
            return Err(HashError::InvalidInput("iterations must be at least 1".to_string()));
        }
        if !(BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(&rounds) {
            return Err(HashError::InvalidConfig(format!(
                "rounds must be between {BCRYPT_MIN_COST} and {BCRYPT_MAX_COST}"
            )));
        }

        let mut times = Vec::with_capacity(iterations as usize);
        for _ in 0..iterations {
            let owned = password.to_owned();
            let start = Instant::now();
            tokio::task::spawn_blocking(move || bcrypt::hash(owned, rounds))
                .await
                .map_err(|e| HashError::Hashing(format!("hashing task failed: {e}")))?
                .map_err(|e| HashError::Hashing(e.to_string()))?;
            times.push(start.elapsed().as_secs_f64() * 1000.0);
        }

        let min_time_ms = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max_time_ms = times.iter().copied().fold(0.0, f64::max);
        let average_time_ms = times.iter().sum::<f64>() / f64::from(iterations);

        info!(rounds, iterations, average_time_ms, "hashing benchmark complete");

        Ok(BenchmarkResult { rounds, iterations, average_time_ms, min_time_ms, max_time_ms, times })
    }

    /// Static policy checks against the current configuration, in a fixed order.
    #[must_use]
    pub fn security_recommendations(&self) -> Vec<SecurityRecommendation> {
        let config = self.config.load();
        let mut recommendations = Vec::new();

        if config.salt_rounds < 12 {
            recommendations.push(SecurityRecommendation {
                kind: "salt_rounds",
                message: format!(
                    "Salt rounds is {}; use at least 12 for adequate resistance to offline attacks",
                    config.salt_rounds
                ),
                priority: Priority::Medium,
            });
        }

        if config.min_timing_ms < 100 {
            recommendations.push(SecurityRecommendation {
                kind: "timing",
                message: format!(
                    "Minimum timing is {}ms; use at least 100ms to mask timing differences",
                    config.min_timing_ms
                ),
                priority: Priority::Low,
            });
        }

        if self.environment.is_production() && config.salt_rounds < 14 {
            let priority =
                if config.salt_rounds < 12 { Priority::Critical } else { Priority::High };
            recommendations.push(SecurityRecommendation {
                kind: "production",
                message: format!(
                    "Production deployments should use at least 14 salt rounds (currently {})",
                    config.salt_rounds
                ),
                priority,
            });
        }

        recommendations
    }
}

/// Reads the cost factor from a `$2a$` or `$2b$` hash.
///
/// # Errors
///
/// Returns [`HashError::InvalidFormat`] with `"Hash must be a non-empty string"` for empty
/// input and `"Invalid bcrypt hash format"` for anything else that does not parse.
pub fn extract_rounds_from_hash(hash: &str) -> Result<u32, HashError> {
    if hash.is_empty() {
        return Err(HashError::InvalidFormat("Hash must be a non-empty string".to_string()));
    }

    let invalid = || HashError::InvalidFormat("Invalid bcrypt hash format".to_string());

    let mut fields = hash.splitn(4, '$');
    let (Some(""), Some(version), Some(rounds), Some(rest)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(invalid());
    };

    if !matches!(version, "2a" | "2b") || rest.is_empty() {
        return Err(invalid());
    }
    if rounds.is_empty() || !rounds.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let rounds: u32 = rounds.parse().map_err(|_| invalid())?;
    if (BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(&rounds) {
        Ok(rounds)
    } else {
        Err(invalid())
    }
}

async fn hash_unfloored(
    password: &str,
    options: HashOptions,
    config: &HashingConfig,
) -> Result<HashResult, HashError> {
    validate_password(password)?;

    let rounds = match options.salt_rounds {
        Some(rounds) if rounds < MIN_SALT_ROUNDS || rounds > config.max_salt_rounds => {
            return Err(HashError::InvalidConfig(format!(
                "Salt rounds must be between {MIN_SALT_ROUNDS} and {}",
                config.max_salt_rounds
            )));
        }
        Some(rounds) => rounds,
        None => config.salt_rounds,
    };

    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);

    let owned = password.to_owned();
    let parts = tokio::task::spawn_blocking(move || bcrypt::hash_with_salt(owned, rounds, salt))
        .await
        .map_err(|e| HashError::Hashing(format!("hashing task failed: {e}")))?
        .map_err(|e| HashError::Hashing(e.to_string()))?;

    debug!(rounds, "password hashed");

    Ok(HashResult {
        hash: parts.format_for_version(Version::TwoB),
        salt: parts.get_salt(),
        salt_rounds: rounds,
        algorithm: "bcrypt",
        timestamp: Utc::now(),
        version: "2b",
    })
}

fn validate_password(password: &str) -> Result<(), HashError> {
    if password.is_empty() {
        return Err(HashError::InvalidInput("Password must be a non-empty string".to_string()));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(HashError::InvalidInput(format!(
            "Password exceeds maximum length of {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

async fn verify_unfloored(password: &str, hash: &str) -> bool {
    if validate_password(password).is_err() || extract_rounds_from_hash(hash).is_err() {
        return false;
    }

    let owned_password = password.to_owned();
    let owned_hash = hash.to_owned();
    match tokio::task::spawn_blocking(move || bcrypt::verify(owned_password, &owned_hash)).await {
        Ok(Ok(matches)) => matches,
        Ok(Err(e)) => {
            error!(error = %e, "password verification failed");
            false
        }
        Err(e) => {
            error!(error = %e, "password verification task failed");
            false
        }
    }
}

/// Runs `work` and then sleeps until at least `floor_ms` has passed since the call began.
async fn with_timing_floor<T>(floor_ms: u64, work: impl Future<Output = T>) -> T {
    let start = Instant::now();
    let output = work.await;

    let floor = Duration::from_millis(floor_ms);
    let elapsed = start.elapsed();
    if elapsed < floor {
        tokio::time::sleep(floor - elapsed).await;
    }

    output
}

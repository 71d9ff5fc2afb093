use std::sync::Arc;

use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::config::HashConfig;

/// Argon2id hasher. Hashing and verification run on the blocking pool,
/// with at most `max_concurrent` jobs in flight.
#[derive(Clone)]
pub struct CredentialHasher {
    params: Params,
    permits: Arc<Semaphore>,
}

impl CredentialHasher {
    pub fn new(cfg: &HashConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        Ok(Self {
            params,
            permits: Arc::new(Semaphore::new(cfg.max_concurrent)),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Produces a PHC string with a fresh random salt.
    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// False for a wrong secret and for a stored value that is not a valid
    /// PHC string. Parameters come from the stored hash, not from `self`.
    pub fn verify(&self, plain: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "stored credential is not a valid PHC string");
                return false;
            }
        };
        self.argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    /// The permit moves into the blocking job, so a dropped caller does not
    /// free a slot while the hash is still running.
    pub async fn hash_blocking(&self, plain: String) -> anyhow::Result<String> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .context("hasher closed")?;
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            hasher.hash(&plain)
        })
        .await
        .context("hash task panicked")?
    }

    pub async fn verify_blocking(&self, plain: String, hash: String) -> bool {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return false;
        };
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            hasher.verify(&plain, &hash)
        })
        .await
        .unwrap_or(false)
    }

    #[cfg(test)]
    fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> CredentialHasher {
    CredentialHasher::new(&HashConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
        max_concurrent: 2,
    })
    .expect("cheap params are valid")
}

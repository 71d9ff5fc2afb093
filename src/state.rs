use std::{sync::Arc, time::Instant};

use crate::cache::CacheClient;
use crate::config::AppConfig;
use crate::users::{password::CredentialHasher, repo::UserStore, services::AccountService};

/// Everything a request needs, built once at startup and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: AccountService,
    pub cache: Option<Arc<dyn CacheClient>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn UserStore>,
        cache: Option<Arc<dyn CacheClient>>,
    ) -> anyhow::Result<Self> {
        let hasher = CredentialHasher::new(&config.hash)?;
        Ok(Self::from_parts(
            Arc::new(config),
            AccountService::new(store, hasher),
            cache,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        accounts: AccountService,
        cache: Option<Arc<dyn CacheClient>>,
    ) -> Self {
        Self {
            config,
            accounts,
            cache,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        self.accounts.store()
    }
}

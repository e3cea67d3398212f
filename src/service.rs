//! Wiring of backends, onboarders and controllers from configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::backends::{
    Backend, BackendType, CachedBackend, MemoryBackend, VaultApi, VaultBackend, VaultClient,
};
use crate::bouncer::Locker;
use crate::config::Config;
use crate::controller::{OnboardController, SecretController};
use crate::onboarding::{MemoryOnboarder, SharedOnboarder, VaultOnboarder};

/// The assembled secret manager: one backend chain and its onboarder.
pub struct SecretManager {
    backend: Backend,
    onboarder: SharedOnboarder,
}

impl SecretManager {
    pub fn new(backend: Backend, onboarder: SharedOnboarder) -> Self {
        Self { backend, onboarder }
    }

    /// Build the stack described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let secret_length = config.rotation.secret_length;

        let manager = match config.backend {
            BackendType::Memory => {
                let store: Backend = Arc::new(MemoryBackend::new(secret_length));
                let backend = with_cache(store, config);
                let onboarder = MemoryOnboarder::new(backend.clone()).with_secret_length(secret_length);
                Self::new(backend, Arc::new(onboarder))
            }
            BackendType::Vault => {
                let vault_config = config.vault.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("Vault configuration not found. Set CONJUR_APPLIANCE_URL or configure [vault] section")
                })?;
                let client = VaultClient::new(
                    &vault_config.url,
                    vault_config.account.clone(),
                    vault_config.login.clone(),
                    vault_config.api_key.clone(),
                    vault_config.timeout(),
                )
                .context("Failed to create vault client")?;
                let api: Arc<dyn VaultApi> = Arc::new(client);

                let store: Backend = Arc::new(VaultBackend::new(
                    api.clone(),
                    vault_config.root_policy_path.clone(),
                    secret_length,
                ));
                let backend = with_cache(store, config);

                let locker = Arc::new(Locker::new(config.onboarding.queue_name.clone()));
                let onboarder = VaultOnboarder::new(api, backend.clone(), vault_config.root_policy_path.clone())
                    .with_locker(locker, config.onboarding.lock_timeout())
                    .with_secret_length(secret_length);
                Self::new(backend, Arc::new(onboarder))
            }
        };

        info!(
            "Using {} backend (cache: {})",
            manager.backend.backend_type(),
            if config.cache.enabled { "enabled" } else { "disabled" }
        );
        Ok(manager)
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn onboard_controller(&self) -> OnboardController {
        OnboardController::new(self.onboarder.clone())
    }

    pub fn secret_controller(&self) -> SecretController {
        SecretController::new(self.backend.clone())
    }
}

fn with_cache(store: Backend, config: &Config) -> Backend {
    if !config.cache.enabled {
        return store;
    }
    Arc::new(CachedBackend::with_shards(
        store,
        config.cache.ttl(),
        config.cache.shards,
    ))
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{
    delete_catalog, write_catalog, OnboardOptions, OnboardResponse, Onboarder, SecretCatalog,
    Tenant,
};
use crate::backends::policy::{branch, Policy, PolicyMode};
use crate::backends::{Backend, Result, ResultExt, VaultApi};
use crate::bouncer::Locker;
use crate::rotation::DEFAULT_SECRET_LENGTH;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Onboarder for a policy-driven vault.
///
/// Declares the tenant's policy in its parent branch, then seeds the catalog
/// secrets through `writer`. With a [`Locker`] attached, every mutation of a
/// branch runs exclusively.
pub struct VaultOnboarder {
    api: Arc<dyn VaultApi>,
    writer: Backend,
    root_policy_path: String,
    locker: Option<Arc<Locker>>,
    lock_timeout: Duration,
    secret_length: usize,
}

impl VaultOnboarder {
    pub fn new(api: Arc<dyn VaultApi>, writer: Backend, root_policy_path: impl Into<String>) -> Self {
        Self {
            api,
            writer,
            root_policy_path: root_policy_path.into(),
            locker: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            secret_length: DEFAULT_SECRET_LENGTH,
        }
    }

    /// Serialize branch mutations, waiting at most `lock_timeout` for the lock.
    pub fn with_locker(mut self, locker: Arc<Locker>, lock_timeout: Duration) -> Self {
        self.locker = Some(locker);
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_secret_length(mut self, secret_length: usize) -> Self {
        self.secret_length = secret_length;
        self
    }

    fn parent_branch(&self, tenant: &Tenant) -> String {
        branch(&self.root_policy_path, &tenant.parent_parts())
    }

    async fn run_locked<F, Fut, T>(&self, key: &str, run: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        match &self.locker {
            Some(locker) => locker.run_b(key, self.lock_timeout, run).await,
            None => run().await,
        }
    }
}

#[async_trait::async_trait]
impl Onboarder for VaultOnboarder {
    async fn onboard(&self, tenant: &Tenant, options: OnboardOptions) -> Result<OnboardResponse> {
        tenant.validate()?;
        info!("Onboarding {}", tenant);

        let mut catalog = SecretCatalog::new(tenant.level(), self.secret_length);
        for (path, value) in options.into_secret_values() {
            catalog.try_set(&path, value)?;
        }
        let entries = catalog.into_entries()?;

        let parent = self.parent_branch(tenant);
        let policy = Policy::declare(tenant.policy_id(), entries.iter().map(|e| e.name.clone()));

        let parent_ref = parent.as_str();
        let policy_ref = &policy;
        let response = self
            .run_locked(&parent, move || async move {
                debug!("Loading policy {} into {}", policy_ref.id(), parent_ref);
                self.api
                    .load_policy(PolicyMode::Post, parent_ref, policy_ref)
                    .await
                    .with_context(|| format!("failed to declare {}", tenant))?;
                write_catalog(self.writer.as_ref(), tenant, entries).await
            })
            .await
            .with_context(|| format!("failed to onboard {}", tenant))?;

        info!("Onboarded {} with {} secrets", tenant, response.secret_refs().len());
        Ok(response)
    }

    async fn delete(&self, tenant: &Tenant) -> Result<()> {
        tenant.validate()?;
        info!("Deleting {}", tenant);

        let parent = self.parent_branch(tenant);
        let parent_ref = parent.as_str();
        self.run_locked(&parent, move || async move {
            delete_catalog(self.writer.as_ref(), tenant).await?;

            let policy = Policy::delete(tenant.policy_id());
            match self.api.load_policy(PolicyMode::Patch, parent_ref, &policy).await {
                Err(e) if e.is_not_found() => {
                    debug!("Parent of {} does not exist, nothing to retract", tenant);
                    Ok(())
                }
                result => result,
            }
        })
        .await
        .with_context(|| format!("failed to delete {}", tenant))?;

        info!("Deleted {}", tenant);
        Ok(())
    }
}

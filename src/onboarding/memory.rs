use tracing::info;

use super::{
    delete_catalog, write_catalog, OnboardOptions, OnboardResponse, Onboarder, SecretCatalog,
    Tenant,
};
use crate::backends::{Backend, Result, ResultExt};
use crate::rotation::DEFAULT_SECRET_LENGTH;

/// Onboarder for backends without scaffolding: only seeds the catalog.
pub struct MemoryOnboarder {
    writer: Backend,
    secret_length: usize,
}

impl MemoryOnboarder {
    pub fn new(writer: Backend) -> Self {
        Self {
            writer,
            secret_length: DEFAULT_SECRET_LENGTH,
        }
    }

    pub fn with_secret_length(mut self, secret_length: usize) -> Self {
        self.secret_length = secret_length;
        self
    }
}

#[async_trait::async_trait]
impl Onboarder for MemoryOnboarder {
    async fn onboard(&self, tenant: &Tenant, options: OnboardOptions) -> Result<OnboardResponse> {
        tenant.validate()?;
        info!("Onboarding {}", tenant);

        let mut catalog = SecretCatalog::new(tenant.level(), self.secret_length);
        for (path, value) in options.into_secret_values() {
            catalog.try_set(&path, value)?;
        }
        let entries = catalog.into_entries()?;

        write_catalog(self.writer.as_ref(), tenant, entries)
            .await
            .with_context(|| format!("failed to onboard {}", tenant))
    }

    async fn delete(&self, tenant: &Tenant) -> Result<()> {
        tenant.validate()?;
        info!("Deleting {}", tenant);
        delete_catalog(self.writer.as_ref(), tenant)
            .await
            .with_context(|| format!("failed to delete {}", tenant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MemoryBackend, SecretBackend, SecretValue};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_onboard_and_delete_application() {
        let backend: Backend = Arc::new(MemoryBackend::default());
        let onboarder = MemoryOnboarder::new(backend.clone()).with_secret_length(12);

        let options =
            OnboardOptions::new().with_secret_value("clientSecret", SecretValue::parse("s1"));
        let response = onboarder
            .onboard_application("dev", "team-x", "app-1", options)
            .await
            .unwrap();

        assert_eq!(response.secret_refs().len(), 2);
        let client_secret = response.get("clientSecret").unwrap();
        assert_eq!(backend.get(client_secret).await.unwrap().value(), "s1");
        let external = response.get("externalSecrets").unwrap();
        assert_eq!(backend.get(external).await.unwrap().value(), "{}");

        onboarder
            .delete_application("dev", "team-x", "app-1")
            .await
            .unwrap();
        assert!(backend.get(client_secret).await.unwrap_err().is_not_found());
        assert!(backend.get(external).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_generated_defaults_use_secret_length() {
        let backend: Backend = Arc::new(MemoryBackend::default());
        let onboarder = MemoryOnboarder::new(backend.clone()).with_secret_length(12);

        let response = onboarder
            .onboard_team("dev", "team-x", OnboardOptions::new())
            .await
            .unwrap();
        let token = response.get("teamToken").unwrap();
        assert_eq!(backend.get(token).await.unwrap().value().len(), 12);
    }
}

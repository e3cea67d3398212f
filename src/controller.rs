//! Service-facing controllers.
//!
//! Callers only ever see reference strings; backend identities never leave
//! this layer untagged.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::backends::id::is_valid_segment;
use crate::backends::{Backend, BackendError, SecretId, SecretValue};
use crate::onboarding::{OnboardOptions, OnboardResponse, SharedOnboarder};
use crate::reference::{from_ref, secret_ref};

const EMPTY_VALUE: &str = "value must not be empty";

/// Errors returned to callers of the controllers.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// A required identifier is missing or malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// One or more supplied values are invalid, keyed by field.
    #[error("{message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, String>,
    },

    #[error("{context}")]
    Backend {
        context: String,
        #[source]
        source: BackendError,
    },
}

impl ControllerError {
    fn backend(context: impl Into<String>) -> impl FnOnce(BackendError) -> Self {
        let context = context.into();
        move |source| ControllerError::Backend { context, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::Backend { source, .. } if source.is_not_found())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ControllerError::Backend { source, .. } if source.is_retryable())
    }

    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ControllerError::BadRequest(_) | ControllerError::Validation { .. } => 400,
            ControllerError::Backend { source, .. } => source.status_code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;

fn require(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ControllerError::BadRequest(format!("{} cannot be empty", name)));
    }
    if !is_valid_segment(value) {
        return Err(ControllerError::BadRequest(format!(
            "{} must not contain ':' or '/' or surrounding whitespace",
            name
        )));
    }
    Ok(())
}

/// Translate caller values into onboarding options, rejecting empty ones.
fn onboard_options(secret_values: &BTreeMap<String, String>) -> Result<OnboardOptions> {
    let fields: BTreeMap<String, String> = secret_values
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| (name.clone(), EMPTY_VALUE.to_string()))
        .collect();
    if !fields.is_empty() {
        return Err(ControllerError::Validation {
            message: "onboarding options are invalid".to_string(),
            fields,
        });
    }

    Ok(secret_values
        .iter()
        .fold(OnboardOptions::new(), |options, (name, value)| {
            options.with_secret_value(name.clone(), SecretValue::parse(value))
        }))
}

fn to_refs(response: OnboardResponse) -> BTreeMap<String, String> {
    response
        .into_secret_refs()
        .into_iter()
        .map(|(name, id)| (name, secret_ref(&id)))
        .collect()
}

/// Tenant lifecycle entry point.
pub struct OnboardController {
    onboarder: SharedOnboarder,
}

impl OnboardController {
    pub fn new(onboarder: SharedOnboarder) -> Self {
        Self { onboarder }
    }

    pub async fn upsert_environment(
        &self,
        env: &str,
        secret_values: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        require("envId", env)?;
        let options = onboard_options(secret_values)?;

        let response = self
            .onboarder
            .onboard_environment(env, options)
            .await
            .map_err(ControllerError::backend("failed to onboard environment"))?;
        Ok(to_refs(response))
    }

    pub async fn upsert_team(
        &self,
        env: &str,
        team: &str,
        secret_values: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        require("envId", env)?;
        require("teamId", team)?;
        let options = onboard_options(secret_values)?;

        let response = self
            .onboarder
            .onboard_team(env, team, options)
            .await
            .map_err(ControllerError::backend("failed to onboard team"))?;
        Ok(to_refs(response))
    }

    pub async fn upsert_application(
        &self,
        env: &str,
        team: &str,
        app: &str,
        secret_values: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        require("envId", env)?;
        require("teamId", team)?;
        require("appId", app)?;
        let options = onboard_options(secret_values)?;

        let response = self
            .onboarder
            .onboard_application(env, team, app, options)
            .await
            .map_err(ControllerError::backend("failed to onboard application"))?;
        Ok(to_refs(response))
    }

    pub async fn delete_environment(&self, env: &str) -> Result<()> {
        require("envId", env)?;
        self.onboarder
            .delete_environment(env)
            .await
            .map_err(ControllerError::backend("failed to delete environment"))
    }

    pub async fn delete_team(&self, env: &str, team: &str) -> Result<()> {
        require("envId", env)?;
        require("teamId", team)?;
        self.onboarder
            .delete_team(env, team)
            .await
            .map_err(ControllerError::backend("failed to delete team"))
    }

    pub async fn delete_application(&self, env: &str, team: &str, app: &str) -> Result<()> {
        require("envId", env)?;
        require("teamId", team)?;
        require("appId", app)?;
        self.onboarder
            .delete_application(env, team, app)
            .await
            .map_err(ControllerError::backend("failed to delete application"))
    }
}

/// Read and write individual secrets by reference.
pub struct SecretController {
    backend: Backend,
}

impl SecretController {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Accepts a tagged reference or a raw identity.
    fn parse(&self, reference: &str) -> Result<SecretId> {
        let (raw, tagged) = from_ref(reference);
        debug!("Resolving secret {} (tagged: {})", raw, tagged);
        self.backend
            .parse_secret_id(raw)
            .map_err(|e| ControllerError::BadRequest(e.to_string()))
    }

    /// Current value of the referenced secret.
    pub async fn get(&self, reference: &str) -> Result<String> {
        let id = self.parse(reference)?;
        let secret = self
            .backend
            .get(&id)
            .await
            .map_err(ControllerError::backend("failed to get secret"))?;
        Ok(secret.into_value())
    }

    /// Write `value` ("rotate" generates one) and return the new reference.
    pub async fn set(&self, reference: &str, value: &str) -> Result<String> {
        let id = self.parse(reference)?;
        let secret = self
            .backend
            .set(&id, SecretValue::parse(value))
            .await
            .map_err(ControllerError::backend("failed to set secret"))?;
        Ok(secret_ref(secret.id()))
    }

    pub async fn rotate(&self, reference: &str) -> Result<String> {
        let id = self.parse(reference)?;
        let secret = self
            .backend
            .set(&id, SecretValue::Rotate)
            .await
            .map_err(ControllerError::backend("failed to rotate secret"))?;
        Ok(secret_ref(secret.id()))
    }

    pub async fn delete(&self, reference: &str) -> Result<()> {
        let id = self.parse(reference)?;
        self.backend
            .delete(&id)
            .await
            .map_err(ControllerError::backend("failed to delete secret"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{CachedBackend, MemoryBackend, VaultBackend};
    use crate::bouncer::Locker;
    use crate::onboarding::{MemoryOnboarder, VaultOnboarder};
    use crate::reference::is_ref;
    use crate::testing::FakeVault;
    use std::sync::Arc;
    use std::time::Duration;

    const ROOT: &str = "controlplane";

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn vault_stack() -> (OnboardController, SecretController) {
        let vault = Arc::new(
            FakeVault::new()
                .with_policy(ROOT)
                .with_policy("controlplane/dev"),
        );
        let store = Arc::new(VaultBackend::new(vault.clone(), ROOT.to_string(), 32));
        let backend: Backend = Arc::new(CachedBackend::new(store, Duration::from_secs(60)));
        let onboarder = VaultOnboarder::new(vault, backend.clone(), ROOT)
            .with_locker(Arc::new(Locker::default()), Duration::from_secs(5));
        (
            OnboardController::new(Arc::new(onboarder)),
            SecretController::new(backend),
        )
    }

    fn memory_stack() -> (OnboardController, SecretController) {
        let backend: Backend = Arc::new(MemoryBackend::default());
        let onboarder = MemoryOnboarder::new(backend.clone());
        (
            OnboardController::new(Arc::new(onboarder)),
            SecretController::new(backend),
        )
    }

    #[tokio::test]
    async fn test_upsert_and_delete_team() {
        let (onboarding, secrets) = vault_stack();

        let refs = onboarding
            .upsert_team(
                "dev",
                "team-x",
                &values(&[("clientSecret", "s1"), ("teamToken", "t1")]),
            )
            .await
            .unwrap();

        assert_eq!(refs.len(), 2);
        for reference in refs.values() {
            assert!(is_ref(reference));
            let (inner, _) = from_ref(reference);
            let id = SecretId::parse(inner).unwrap();
            assert_eq!(id.env(), "dev");
            assert_eq!(id.team(), "team-x");
            assert_eq!(id.app(), "");
        }
        assert_eq!(secrets.get(&refs["clientSecret"]).await.unwrap(), "s1");
        assert_eq!(secrets.get(&refs["teamToken"]).await.unwrap(), "t1");

        onboarding.delete_team("dev", "team-x").await.unwrap();
        for reference in refs.values() {
            let err = secrets.get(reference).await.unwrap_err();
            assert!(err.is_not_found());
            assert_eq!(err.status_code(), 404);
        }
    }

    #[tokio::test]
    async fn test_empty_ids_are_bad_requests() {
        let (onboarding, _) = memory_stack();
        let none = BTreeMap::new();

        let err = onboarding.upsert_environment("", &none).await.unwrap_err();
        assert!(matches!(err, ControllerError::BadRequest(ref m) if m == "envId cannot be empty"));

        let err = onboarding.upsert_team("dev", "", &none).await.unwrap_err();
        assert!(matches!(err, ControllerError::BadRequest(ref m) if m == "teamId cannot be empty"));

        let err = onboarding
            .upsert_application("dev", "team-x", "", &none)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        assert!(onboarding.delete_application("dev", "", "app-1").await.is_err());
        assert!(onboarding.delete_environment("").await.is_err());
    }

    #[tokio::test]
    async fn test_ids_that_cannot_round_trip_are_bad_requests() {
        let (onboarding, _) = vault_stack();
        let none = BTreeMap::new();

        let err = onboarding.upsert_team("dev", "a:b", &none).await.unwrap_err();
        assert!(matches!(err, ControllerError::BadRequest(ref m) if m.starts_with("teamId must not contain")));

        let err = onboarding
            .upsert_application("dev", "team-x/app-1", "app-2", &none)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = onboarding.upsert_environment(" dev", &none).await.unwrap_err();
        assert!(matches!(err, ControllerError::BadRequest(_)));

        assert!(matches!(
            onboarding.delete_team("dev", "a/b").await.unwrap_err(),
            ControllerError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_returned_references_resolve() {
        let (onboarding, secrets) = vault_stack();
        let refs = onboarding
            .upsert_team("dev", "team-x", &BTreeMap::new())
            .await
            .unwrap();
        for reference in refs.values() {
            assert!(!secrets.get(reference).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_empty_values_are_validation_errors() {
        let (onboarding, _) = memory_stack();

        let err = onboarding
            .upsert_team("dev", "team-x", &values(&[("clientSecret", ""), ("teamToken", "t1")]))
            .await
            .unwrap_err();
        match err {
            ControllerError::Validation { fields, .. } => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields["clientSecret"], "value must not be empty");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_secret_name_is_forbidden() {
        let (onboarding, _) = memory_stack();
        let err = onboarding
            .upsert_environment("dev", &values(&[("password", "x")]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_secret_api_by_reference() {
        let (onboarding, secrets) = memory_stack();
        let refs = onboarding
            .upsert_application("dev", "team-x", "app-1", &BTreeMap::new())
            .await
            .unwrap();
        let client_secret = &refs["clientSecret"];

        let updated = secrets.set(client_secret, "s2").await.unwrap();
        assert!(is_ref(&updated));
        assert_ne!(&updated, client_secret);
        assert_eq!(secrets.get(&updated).await.unwrap(), "s2");

        // Raw identities are accepted as well
        let (raw, _) = from_ref(&updated);
        assert_eq!(secrets.get(raw).await.unwrap(), "s2");

        let rotated = secrets.rotate(client_secret).await.unwrap();
        assert_ne!(secrets.get(&rotated).await.unwrap(), "s2");

        secrets.delete(client_secret).await.unwrap();
        assert!(secrets.get(client_secret).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_malformed_reference_is_bad_request() {
        let (_, secrets) = memory_stack();
        let err = secrets.get("$<dev:team-x>").await.unwrap_err();
        assert!(matches!(err, ControllerError::BadRequest(_)));
    }
}

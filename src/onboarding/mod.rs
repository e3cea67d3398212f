//! Tenant onboarding
//!
//! Onboarding creates the storage scaffolding for an environment, team or
//! application and seeds its catalog of secrets. Deleting a tenant removes
//! them again.

mod catalog;
mod memory;
mod vault;

pub use catalog::{CatalogEntry, SecretCatalog};
pub use memory::MemoryOnboarder;
pub use vault::VaultOnboarder;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::backends::id::is_valid_segment;
use crate::backends::{BackendError, Result, SecretBackend, SecretId, SecretValue};
use crate::rotation::change_token;

/// The three levels secrets are scoped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantLevel {
    Environment,
    Team,
    Application,
}

impl fmt::Display for TenantLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantLevel::Environment => f.write_str("environment"),
            TenantLevel::Team => f.write_str("team"),
            TenantLevel::Application => f.write_str("application"),
        }
    }
}

/// An environment, a team in an environment, or an application of a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tenant {
    Environment { env: String },
    Team { env: String, team: String },
    Application { env: String, team: String, app: String },
}

impl Tenant {
    pub fn environment(env: impl Into<String>) -> Self {
        Tenant::Environment { env: env.into() }
    }

    pub fn team(env: impl Into<String>, team: impl Into<String>) -> Self {
        Tenant::Team {
            env: env.into(),
            team: team.into(),
        }
    }

    pub fn application(
        env: impl Into<String>,
        team: impl Into<String>,
        app: impl Into<String>,
    ) -> Self {
        Tenant::Application {
            env: env.into(),
            team: team.into(),
            app: app.into(),
        }
    }

    pub fn level(&self) -> TenantLevel {
        match self {
            Tenant::Environment { .. } => TenantLevel::Environment,
            Tenant::Team { .. } => TenantLevel::Team,
            Tenant::Application { .. } => TenantLevel::Application,
        }
    }

    pub fn env_id(&self) -> &str {
        match self {
            Tenant::Environment { env }
            | Tenant::Team { env, .. }
            | Tenant::Application { env, .. } => env,
        }
    }

    pub fn team_id(&self) -> &str {
        match self {
            Tenant::Environment { .. } => "",
            Tenant::Team { team, .. } | Tenant::Application { team, .. } => team,
        }
    }

    pub fn app_id(&self) -> &str {
        match self {
            Tenant::Application { app, .. } => app,
            _ => "",
        }
    }

    /// Name of this tenant inside its parent.
    pub fn policy_id(&self) -> &str {
        match self {
            Tenant::Environment { env } => env,
            Tenant::Team { team, .. } => team,
            Tenant::Application { app, .. } => app,
        }
    }

    /// Path segments of the parent tenant.
    pub fn parent_parts(&self) -> Vec<&str> {
        match self {
            Tenant::Environment { .. } => vec![],
            Tenant::Team { env, .. } => vec![env],
            Tenant::Application { env, team, .. } => vec![env, team],
        }
    }

    /// Reject tenants whose ids could not round-trip through a [`SecretId`].
    pub fn validate(&self) -> Result<()> {
        let segments = [self.env_id(), self.team_id(), self.app_id()];
        let present = match self.level() {
            TenantLevel::Environment => 1,
            TenantLevel::Team => 2,
            TenantLevel::Application => 3,
        };
        let valid = segments
            .iter()
            .enumerate()
            .all(|(i, s)| is_valid_segment(s) && (i >= present || !s.is_empty()));
        if !valid {
            return Err(BackendError::invalid_secret_id(self.to_string()));
        }
        Ok(())
    }

    /// Identity of the secret at `path` owned by this tenant.
    pub fn secret_id(&self, path: &str) -> SecretId {
        SecretId::new(self.env_id(), self.team_id(), self.app_id(), path, "")
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tenant::Environment { env } => write!(f, "environment {}", env),
            Tenant::Team { env, team } => write!(f, "team {}/{}", env, team),
            Tenant::Application { env, team, app } => {
                write!(f, "application {}/{}/{}", env, team, app)
            }
        }
    }
}

/// Caller-supplied values seeded during onboarding.
#[derive(Debug, Clone, Default)]
pub struct OnboardOptions {
    secret_values: BTreeMap<String, SecretValue>,
}

impl OnboardOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `path` (a catalog name, or `name/field`) with `value`.
    pub fn with_secret_value(mut self, path: impl Into<String>, value: SecretValue) -> Self {
        self.secret_values.insert(path.into(), value);
        self
    }

    pub fn secret_values(&self) -> &BTreeMap<String, SecretValue> {
        &self.secret_values
    }

    pub fn into_secret_values(self) -> BTreeMap<String, SecretValue> {
        self.secret_values
    }
}

/// Identities of every secret an onboarding call created or confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnboardResponse {
    secret_refs: BTreeMap<String, SecretId>,
}

impl OnboardResponse {
    pub fn new(secret_refs: BTreeMap<String, SecretId>) -> Self {
        Self { secret_refs }
    }

    pub fn secret_refs(&self) -> &BTreeMap<String, SecretId> {
        &self.secret_refs
    }

    pub fn get(&self, name: &str) -> Option<&SecretId> {
        self.secret_refs.get(name)
    }

    pub fn into_secret_refs(self) -> BTreeMap<String, SecretId> {
        self.secret_refs
    }
}

/// Tenant lifecycle operations.
#[async_trait::async_trait]
pub trait Onboarder: Send + Sync {
    /// Create the tenant's scaffolding and seed its secrets.
    async fn onboard(&self, tenant: &Tenant, options: OnboardOptions) -> Result<OnboardResponse>;

    /// Remove the tenant and its secrets; succeeds if it never existed.
    async fn delete(&self, tenant: &Tenant) -> Result<()>;

    async fn onboard_environment(
        &self,
        env: &str,
        options: OnboardOptions,
    ) -> Result<OnboardResponse> {
        self.onboard(&Tenant::environment(env), options).await
    }

    async fn onboard_team(
        &self,
        env: &str,
        team: &str,
        options: OnboardOptions,
    ) -> Result<OnboardResponse> {
        self.onboard(&Tenant::team(env, team), options).await
    }

    async fn onboard_application(
        &self,
        env: &str,
        team: &str,
        app: &str,
        options: OnboardOptions,
    ) -> Result<OnboardResponse> {
        self.onboard(&Tenant::application(env, team, app), options)
            .await
    }

    async fn delete_environment(&self, env: &str) -> Result<()> {
        self.delete(&Tenant::environment(env)).await
    }

    async fn delete_team(&self, env: &str, team: &str) -> Result<()> {
        self.delete(&Tenant::team(env, team)).await
    }

    async fn delete_application(&self, env: &str, team: &str, app: &str) -> Result<()> {
        self.delete(&Tenant::application(env, team, app)).await
    }
}

/// Shared onboarder trait object
pub type SharedOnboarder = Arc<dyn Onboarder>;

/// Write every catalog entry through `writer` and collect the identities.
async fn write_catalog(
    writer: &dyn SecretBackend,
    tenant: &Tenant,
    entries: Vec<CatalogEntry>,
) -> Result<OnboardResponse> {
    let mut refs = BTreeMap::new();
    for entry in entries {
        let id = tenant.secret_id(&entry.name);
        debug!("Initializing secret {}", id.location());
        let secret = writer
            .set(&id, entry.value)
            .await
            .map_err(|e| e.context(format!("failed to initialize secret {}", entry.name)))?;

        for (field, value) in &entry.fields {
            let path = format!("{}/{}", entry.name, field);
            let field_id = tenant.secret_id(&path).copy_with_change_token(change_token(value));
            refs.insert(path, field_id);
        }
        refs.insert(entry.name, secret.id().clone());
    }
    Ok(OnboardResponse::new(refs))
}

/// Delete every catalog secret of `tenant` through `writer`.
async fn delete_catalog(writer: &dyn SecretBackend, tenant: &Tenant) -> Result<()> {
    for name in SecretCatalog::names(tenant.level()) {
        let id = tenant.secret_id(name);
        match writer.delete(&id).await {
            Err(e) if !e.is_not_found() => {
                return Err(e.context(format!("failed to delete secret {}", name)))
            }
            _ => debug!("Deleted secret {}", id.location()),
        }
    }
    Ok(())
}

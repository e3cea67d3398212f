use super::error::Result;
use super::id::SecretId;
use super::secret::{Secret, SecretValue};

/// Trait for secret storage engines (policy vault, in-memory store, caches over either)
#[async_trait::async_trait]
pub trait SecretBackend: Send + Sync {
    /// Parse an externally supplied identity in this backend's dialect
    fn parse_secret_id(&self, raw: &str) -> Result<SecretId> {
        SecretId::parse(raw)
    }

    /// Read the secret stored at the id's location
    async fn get(&self, id: &SecretId) -> Result<Secret>;

    /// Create or overwrite the secret at the id's location
    async fn set(&self, id: &SecretId, value: SecretValue) -> Result<Secret>;

    /// Remove the secret; succeeds if nothing was stored
    async fn delete(&self, id: &SecretId) -> Result<()>;

    /// Get the backend type name for display purposes
    fn backend_type(&self) -> &'static str;
}

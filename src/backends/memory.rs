use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use super::error::Result;
use super::id::SecretId;
use super::secret::{Secret, SecretValue};
use super::secret_backend::SecretBackend;
use super::variables::{self, VariableStore};
use crate::rotation::DEFAULT_SECRET_LENGTH;

/// Process-local secret store.
///
/// There is no scaffolding step: any variable can be written at any time.
pub struct MemoryBackend {
    variables: RwLock<HashMap<String, String>>,
    secret_length: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET_LENGTH)
    }
}

impl MemoryBackend {
    pub fn new(secret_length: usize) -> Self {
        Self {
            variables: RwLock::new(HashMap::new()),
            secret_length,
        }
    }

    /// Number of variables currently stored
    pub async fn len(&self) -> usize {
        self.variables.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.variables.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl VariableStore for MemoryBackend {
    async fn read_variable(&self, id: &SecretId) -> Result<Option<String>> {
        Ok(self.variables.read().await.get(&id.variable_key()).cloned())
    }

    async fn write_variable(&self, id: &SecretId, value: &str) -> Result<()> {
        let mut variables = self.variables.write().await;
        if value.is_empty() {
            variables.remove(&id.variable_key());
        } else {
            variables.insert(id.variable_key(), value.to_string());
        }
        Ok(())
    }

    async fn clear_variable(&self, id: &SecretId) -> Result<()> {
        self.variables.write().await.remove(&id.variable_key());
        Ok(())
    }
}

#[async_trait::async_trait]
impl SecretBackend for MemoryBackend {
    async fn get(&self, id: &SecretId) -> Result<Secret> {
        debug!("Reading secret from memory: {}", id.location());
        variables::get_secret(self, id).await
    }

    async fn set(&self, id: &SecretId, value: SecretValue) -> Result<Secret> {
        debug!("Writing secret to memory: {}", id.location());
        variables::set_secret(self, id, &value, self.secret_length).await
    }

    async fn delete(&self, id: &SecretId) -> Result<()> {
        debug!("Deleting secret from memory: {}", id.location());
        variables::delete_secret(self, id).await
    }

    fn backend_type(&self) -> &'static str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::change_token;

    fn id(path: &str) -> SecretId {
        SecretId::new("dev", "team-x", "app-1", path, "")
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let backend = MemoryBackend::default();
        let err = backend.get(&id("clientSecret")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let backend = MemoryBackend::default();
        let written = backend
            .set(&id("clientSecret"), SecretValue::parse("s1"))
            .await
            .unwrap();
        assert_eq!(written.value(), "s1");
        assert_eq!(written.id().change_token(), change_token("s1"));

        let read = backend.get(&id("clientSecret")).await.unwrap();
        assert_eq!(read, written);
    }

    #[tokio::test]
    async fn test_initial_value_does_not_overwrite() {
        let backend = MemoryBackend::default();
        backend
            .set(&id("clientSecret"), SecretValue::Literal("live".to_string()))
            .await
            .unwrap();

        let secret = backend
            .set(&id("clientSecret"), SecretValue::Initial("default".to_string()))
            .await
            .unwrap();
        assert_eq!(secret.value(), "live");
        assert_eq!(backend.get(&id("clientSecret")).await.unwrap().value(), "live");
    }

    #[tokio::test]
    async fn test_rotate_generates_value() {
        let backend = MemoryBackend::new(20);
        backend
            .set(&id("clientSecret"), SecretValue::Literal("old".to_string()))
            .await
            .unwrap();

        let rotated = backend
            .set(&id("clientSecret"), SecretValue::parse("rotate"))
            .await
            .unwrap();
        assert_eq!(rotated.value().len(), 20);
        assert_ne!(rotated.value(), "old");
        assert_ne!(rotated.value(), "rotate");
    }

    #[tokio::test]
    async fn test_sub_path_fields() {
        let backend = MemoryBackend::default();
        backend
            .set(&id("externalSecrets/key1"), SecretValue::parse("value1"))
            .await
            .unwrap();
        backend
            .set(&id("externalSecrets/key2"), SecretValue::parse("value2"))
            .await
            .unwrap();

        assert_eq!(
            backend.get(&id("externalSecrets/key1")).await.unwrap().value(),
            "value1"
        );
        let whole = backend.get(&id("externalSecrets")).await.unwrap();
        let fields: HashMap<String, String> = serde_json::from_str(whole.value()).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(backend.len().await, 1);

        backend.delete(&id("externalSecrets/key1")).await.unwrap();
        assert!(backend
            .get(&id("externalSecrets/key1"))
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(
            backend.get(&id("externalSecrets/key2")).await.unwrap().value(),
            "value2"
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = MemoryBackend::default();
        backend.delete(&id("clientSecret")).await.unwrap();

        backend
            .set(&id("clientSecret"), SecretValue::parse("s1"))
            .await
            .unwrap();
        backend.delete(&id("clientSecret")).await.unwrap();
        backend.delete(&id("clientSecret")).await.unwrap();
        assert!(backend.is_empty().await);
    }
}

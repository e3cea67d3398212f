//! Secret semantics over a plain variable store.
//!
//! Concrete backends only know how to read and write whole variables. The
//! functions here add sub-path fields, initial values, rotation and change
//! tokens on top, so every backend behaves the same way.

use super::error::{BackendError, Result};
use super::id::SecretId;
use super::secret::{parse_fields, read_field, Secret, SecretValue};
use crate::rotation::change_token;

/// Whole-variable storage addressed by a secret's variable.
#[async_trait::async_trait]
pub trait VariableStore: Send + Sync {
    /// Current content of the id's variable, `None` if nothing is stored.
    async fn read_variable(&self, id: &SecretId) -> Result<Option<String>>;

    /// Replace the content of the id's variable.
    async fn write_variable(&self, id: &SecretId, value: &str) -> Result<()>;

    /// Remove the content of the id's variable; succeeds if nothing is stored.
    async fn clear_variable(&self, id: &SecretId) -> Result<()>;
}

fn bind(id: &SecretId, value: String) -> Secret {
    Secret::new(id.copy_with_change_token(change_token(&value)), value)
}

async fn read_non_empty<S: VariableStore + ?Sized>(
    store: &S,
    id: &SecretId,
) -> Result<Option<String>> {
    Ok(store
        .read_variable(id)
        .await?
        .filter(|value| !value.is_empty()))
}

pub async fn get_secret<S: VariableStore + ?Sized>(store: &S, id: &SecretId) -> Result<Secret> {
    let current = read_non_empty(store, id)
        .await?
        .ok_or_else(|| BackendError::not_found(id.to_string()))?;

    let value = match id.sub_path() {
        Some(field) => read_field(&current, field)?
            .ok_or_else(|| BackendError::not_found(id.to_string()))?,
        None => current,
    };
    Ok(bind(id, value))
}

pub async fn set_secret<S: VariableStore + ?Sized>(
    store: &S,
    id: &SecretId,
    value: &SecretValue,
    secret_length: usize,
) -> Result<Secret> {
    let Some(field) = id.sub_path() else {
        let current = if value.allow_change() {
            None
        } else {
            read_non_empty(store, id).await?
        };
        return match value.resolve(current.as_deref(), secret_length) {
            Some(new_value) => {
                store.write_variable(id, &new_value).await?;
                Ok(bind(id, new_value))
            }
            None => Ok(bind(id, current.unwrap_or_default())),
        };
    };

    let parent = store.read_variable(id).await?.unwrap_or_default();
    let mut fields = parse_fields(&parent)?;
    let current = fields
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let Some(new_value) = value.resolve(current.as_deref(), secret_length) else {
        return Ok(bind(id, current.unwrap_or_default()));
    };
    if new_value.is_empty() {
        fields.remove(field);
    } else {
        fields.insert(
            field.to_string(),
            serde_json::Value::String(new_value.clone()),
        );
    }
    let encoded = serde_json::Value::Object(fields).to_string();
    store.write_variable(id, &encoded).await?;
    Ok(bind(id, new_value))
}

pub async fn delete_secret<S: VariableStore + ?Sized>(store: &S, id: &SecretId) -> Result<()> {
    let Some(field) = id.sub_path() else {
        return store.clear_variable(id).await;
    };

    let Some(parent) = read_non_empty(store, id).await? else {
        return Ok(());
    };
    let mut fields = parse_fields(&parent)?;
    if fields.remove(field).is_some() {
        let encoded = serde_json::Value::Object(fields).to_string();
        store.write_variable(id, &encoded).await?;
    }
    Ok(())
}

//! Secret backend implementations
//!
//! This module provides the secret identity model, the backend contract and
//! the storage engines implementing it.

pub mod cache;
mod error;
pub mod id;
mod memory;
pub mod policy;
mod secret;
mod secret_backend;
pub mod variables;
pub mod vault;

pub use cache::CachedBackend;
pub use error::{BackendError, Result, ResultExt};
pub use id::SecretId;
pub use memory::MemoryBackend;
pub use secret::{fields_to_json, parse_fields, read_field, Secret, SecretValue};
pub use secret_backend::SecretBackend;
pub use vault::{VaultApi, VaultBackend, VaultClient};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    #[default]
    Vault,
    Memory,
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vault" | "conjur" => Ok(BackendType::Vault),
            "memory" => Ok(BackendType::Memory),
            _ => Err(format!("Unknown backend type: {}. Supported: vault, memory", s)),
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Vault => f.write_str("vault"),
            BackendType::Memory => f.write_str("memory"),
        }
    }
}

/// Type alias for a shared backend trait object
pub type Backend = Arc<dyn SecretBackend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!("vault".parse::<BackendType>().unwrap(), BackendType::Vault);
        assert_eq!("Conjur".parse::<BackendType>().unwrap(), BackendType::Vault);
        assert_eq!("MEMORY".parse::<BackendType>().unwrap(), BackendType::Memory);
        assert!("aws".parse::<BackendType>().is_err());
        assert_eq!(BackendType::Memory.to_string(), "memory");
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::backends::BackendType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<VaultConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub onboarding: OnboardingConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub url: String,
    pub account: String,
    pub login: String,
    pub api_key: String,
    #[serde(default)]
    pub root_policy_path: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl VaultConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_shards")]
    pub shards: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_ttl_seconds(),
            shards: default_shards(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingConfig {
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

impl OnboardingConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            lock_timeout_seconds: default_lock_timeout_seconds(),
            queue_name: default_queue_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_secret_length")]
    pub secret_length: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            secret_length: default_secret_length(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_shards() -> usize {
    16
}

fn default_lock_timeout_seconds() -> u64 {
    30
}

fn default_queue_name() -> String {
    "default".to_string()
}

fn default_secret_length() -> usize {
    32
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Self = toml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("SECRET_BACKEND") {
            Some(value) => value
                .parse::<BackendType>()
                .map_err(anyhow::Error::msg)
                .context("Invalid SECRET_BACKEND")?,
            None => BackendType::default(),
        };

        let vault = match lookup("CONJUR_APPLIANCE_URL") {
            Some(url) => Some(VaultConfig {
                url,
                account: lookup("CONJUR_ACCOUNT")
                    .context("CONJUR_ACCOUNT environment variable not set")?,
                login: lookup("CONJUR_AUTHN_LOGIN")
                    .context("CONJUR_AUTHN_LOGIN environment variable not set")?,
                api_key: lookup("CONJUR_AUTHN_API_KEY")
                    .context("CONJUR_AUTHN_API_KEY environment variable not set")?,
                root_policy_path: lookup("CONJUR_ROOT_POLICY_PATH").unwrap_or_default(),
                timeout_seconds: default_timeout_seconds(),
            }),
            None => None,
        };

        let cache = CacheConfig {
            ttl_seconds: parse_or(lookup("CACHE_TTL_SECONDS"), default_ttl_seconds()),
            ..CacheConfig::default()
        };

        let onboarding = OnboardingConfig {
            lock_timeout_seconds: parse_or(
                lookup("ONBOARDING_LOCK_TIMEOUT_SECONDS"),
                default_lock_timeout_seconds(),
            ),
            ..OnboardingConfig::default()
        };

        let rotation = RotationConfig {
            secret_length: parse_or(lookup("SECRET_LENGTH"), default_secret_length()),
        };

        let config = Self {
            backend,
            vault,
            cache,
            onboarding,
            rotation,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.backend == BackendType::Vault && self.vault.is_none() {
            anyhow::bail!(
                "Vault configuration not found. Set CONJUR_APPLIANCE_URL or configure [vault] section"
            );
        }
        if self.cache.shards == 0 {
            anyhow::bail!("cache.shards must be greater than zero");
        }
        if self.rotation.secret_length == 0 {
            anyhow::bail!("rotation.secret_length must be greater than zero");
        }
        Ok(())
    }

    /// Create a sample configuration file
    pub fn create_sample<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample = Self {
            backend: BackendType::Vault,
            vault: Some(VaultConfig {
                url: "https://conjur.example.com".to_string(),
                account: "myorg".to_string(),
                login: "host/secret-manager".to_string(),
                api_key: "your-api-key-here".to_string(),
                root_policy_path: "controlplane".to_string(),
                timeout_seconds: default_timeout_seconds(),
            }),
            cache: CacheConfig::default(),
            onboarding: OnboardingConfig::default(),
            rotation: RotationConfig::default(),
        };

        let toml_string =
            toml::to_string_pretty(&sample).context("Failed to serialize sample config")?;
        fs::write(path.as_ref(), toml_string)
            .with_context(|| format!("Failed to write sample config to {:?}", path.as_ref()))?;

        Ok(())
    }
}

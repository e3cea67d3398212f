//! Secret management for hierarchical tenants
//!
//! Secrets are scoped to environments, teams and applications and stored in a
//! pluggable backend, optionally behind an in-memory cache. Onboarding creates
//! a tenant's scaffolding and seeds its secrets; callers address secrets with
//! tagged reference strings.

pub mod backends;
pub mod bouncer;
pub mod cli;
pub mod config;
pub mod controller;
pub mod onboarding;
pub mod reference;
pub mod rotation;
pub mod service;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use backends::{Backend, BackendError, Secret, SecretBackend, SecretId, SecretValue};
pub use bouncer::{LockNotAcquired, Locker};
pub use config::Config;
pub use controller::{ControllerError, OnboardController, SecretController};
pub use onboarding::{OnboardOptions, OnboardResponse, Onboarder, Tenant};
pub use rotation::generate_secret;
pub use service::SecretManager;

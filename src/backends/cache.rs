//! Caching decorator for secret backends.
//!
//! Entries are keyed by storage location and grouped into shards by the
//! variable they live in, so a write to a variable (or to one of its fields)
//! can evict every entry of that variable under a single shard lock. Shard
//! locks are never held across a call to the wrapped backend.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::error::Result;
use super::id::SecretId;
use super::secret::{Secret, SecretValue};
use super::secret_backend::SecretBackend;
use crate::telemetry::{self, MissReason};

pub const DEFAULT_SHARDS: usize = 16;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

const OP_GET: &str = "get";
const OP_SET: &str = "set";

struct CacheEntry {
    secret: Secret,
    variable: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Default)]
struct Shard {
    entries: HashMap<String, CacheEntry>,
    // Bumped on every write so a slow read cannot cache a value it raced with
    version: u64,
}

impl Shard {
    fn invalidate_variable(&mut self, variable: &str) {
        self.entries.retain(|_, entry| entry.variable != variable);
        self.version += 1;
    }
}

enum Lookup {
    Hit(Secret),
    Miss(MissReason),
}

/// A [`SecretBackend`] that keeps recently read and written secrets in memory.
pub struct CachedBackend {
    inner: Arc<dyn SecretBackend>,
    shards: Vec<RwLock<Shard>>,
    ttl: Duration,
}

impl CachedBackend {
    pub fn new(inner: Arc<dyn SecretBackend>, ttl: Duration) -> Self {
        Self::with_shards(inner, ttl, DEFAULT_SHARDS)
    }

    pub fn with_shards(inner: Arc<dyn SecretBackend>, ttl: Duration, shards: usize) -> Self {
        Self {
            inner,
            shards: (0..shards.max(1)).map(|_| RwLock::default()).collect(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of cached entries, expired ones included.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| read(shard).entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        for shard in &self.shards {
            let mut shard = write(shard);
            shard.entries.clear();
            shard.version += 1;
        }
    }

    fn shard(&self, variable: &str) -> &RwLock<Shard> {
        let mut hasher = DefaultHasher::new();
        variable.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn lookup(&self, shard: &RwLock<Shard>, id: &SecretId, location: &str) -> (Lookup, u64) {
        {
            let guard = read(shard);
            match guard.entries.get(location) {
                None => return (Lookup::Miss(MissReason::NotFound), guard.version),
                Some(entry) if !entry.is_expired() && entry.secret.id().same_location(id) => {
                    return (Lookup::Hit(entry.secret.clone()), guard.version)
                }
                Some(_) => {}
            }
        }

        // Stale or corrupted entry: re-check and evict under the write lock
        let mut guard = write(shard);
        let reason = match guard.entries.get(location) {
            None => MissReason::NotFound,
            Some(entry) if entry.is_expired() => MissReason::Expired,
            Some(entry) if !entry.secret.id().same_location(id) => {
                warn!(
                    "Cache entry for {} is bound to {}, evicting",
                    location,
                    entry.secret.id().location()
                );
                MissReason::IdMismatch
            }
            Some(entry) => return (Lookup::Hit(entry.secret.clone()), guard.version),
        };
        guard.entries.remove(location);
        (Lookup::Miss(reason), guard.version)
    }

    fn entry(&self, id: &SecretId, secret: Secret) -> CacheEntry {
        CacheEntry {
            secret,
            variable: id.variable_key(),
            expires_at: Instant::now() + self.ttl,
        }
    }

    fn evict(&self, shard: &RwLock<Shard>, location: &str) {
        write(shard).entries.remove(location);
    }

    /// Insert a cache entry directly under `id`'s location.
    #[cfg(test)]
    pub(crate) fn insert_entry(&self, id: &SecretId, secret: Secret) {
        let variable = id.variable_key();
        let entry = self.entry(id, secret);
        write(self.shard(&variable)).entries.insert(id.location(), entry);
    }
}

fn read(shard: &RwLock<Shard>) -> RwLockReadGuard<'_, Shard> {
    shard.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(shard: &RwLock<Shard>) -> RwLockWriteGuard<'_, Shard> {
    shard.write().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait::async_trait]
impl SecretBackend for CachedBackend {
    fn parse_secret_id(&self, raw: &str) -> Result<SecretId> {
        self.inner.parse_secret_id(raw)
    }

    async fn get(&self, id: &SecretId) -> Result<Secret> {
        let location = id.location();
        let shard = self.shard(&id.variable_key());

        let (lookup, version) = self.lookup(shard, id, &location);
        match lookup {
            Lookup::Hit(cached) => {
                telemetry::record_cache_hit(OP_GET);
                debug!("Cache hit for {}", location);
                // Never hand out the cached identity
                return Ok(Secret::new(id.clone(), cached.into_value()));
            }
            Lookup::Miss(reason) => telemetry::record_cache_miss(OP_GET, reason),
        }

        let secret = self.inner.get(id).await?;
        if !secret.value().is_empty() {
            let mut guard = write(shard);
            if guard.version == version {
                let entry = self.entry(id, secret.clone());
                guard.entries.insert(location, entry);
            }
        }
        Ok(secret)
    }

    async fn set(&self, id: &SecretId, value: SecretValue) -> Result<Secret> {
        let location = id.location();
        let shard = self.shard(&id.variable_key());

        let (lookup, _) = self.lookup(shard, id, &location);
        match lookup {
            Lookup::Hit(cached) if value.matches(cached.value()) => {
                telemetry::record_cache_hit(OP_SET);
                debug!("Value for {} unchanged, skipping write", location);
                return Ok(cached);
            }
            Lookup::Hit(_) => {
                self.evict(shard, &location);
                telemetry::record_cache_miss(OP_SET, MissReason::ValueMismatch);
            }
            Lookup::Miss(reason) => telemetry::record_cache_miss(OP_SET, reason),
        }

        let secret = self.inner.set(id, value).await?;

        let mut guard = write(shard);
        guard.invalidate_variable(&id.variable_key());
        if !secret.value().is_empty() {
            let entry = self.entry(id, secret.clone());
            guard.entries.insert(location, entry);
        }
        Ok(secret)
    }

    async fn delete(&self, id: &SecretId) -> Result<()> {
        let variable = id.variable_key();
        let shard = self.shard(&variable);

        write(shard).invalidate_variable(&variable);
        let result = self.inner.delete(id).await;
        // Reads that raced with the delete may have re-populated the entry
        write(shard).invalidate_variable(&variable);
        result
    }

    fn backend_type(&self) -> &'static str {
        self.inner.backend_type()
    }
}

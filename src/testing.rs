//! Test doubles shared by the unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use crate::backends::policy::{Policy, PolicyMode};
use crate::backends::vault::VaultApi;
use crate::backends::id::clean_path;
use crate::backends::{
    BackendError, MemoryBackend, Result, Secret, SecretBackend, SecretId, SecretValue,
};

#[derive(Default)]
struct VaultState {
    policies: BTreeSet<String>,
    // Declared variables; `None` until a value is added
    variables: BTreeMap<String, Option<String>>,
    loads: Vec<(PolicyMode, String, Policy)>,
}

/// In-memory stand-in for a policy-driven vault.
///
/// The root branch (`""`) always exists. Declaring a policy requires its
/// parent branch to exist; deleting one removes everything below it.
#[derive(Default)]
pub struct FakeVault {
    state: Mutex<VaultState>,
}

impl FakeVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a policy branch.
    pub fn with_policy(self, branch: &str) -> Self {
        self.lock().policies.insert(clean_path(&[branch]));
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VaultState> {
        self.state.lock().unwrap()
    }

    /// Declare a variable without loading a policy.
    pub fn declare(&self, variable_id: &str) {
        self.lock()
            .variables
            .entry(variable_id.to_string())
            .or_insert(None);
    }

    pub fn value(&self, variable_id: &str) -> Option<String> {
        self.lock().variables.get(variable_id).cloned().flatten()
    }

    pub fn is_declared(&self, variable_id: &str) -> bool {
        self.lock().variables.contains_key(variable_id)
    }

    pub fn has_policy(&self, branch: &str) -> bool {
        let state = self.lock();
        branch.is_empty() || state.policies.contains(branch)
    }

    /// Every policy load so far as (mode, branch, policy id).
    pub fn loads(&self) -> Vec<(PolicyMode, String, String)> {
        self.lock()
            .loads
            .iter()
            .map(|(mode, branch, policy)| (*mode, branch.clone(), policy.id().to_string()))
            .collect()
    }
}

fn is_below(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{}/", prefix))
}

#[async_trait::async_trait]
impl VaultApi for FakeVault {
    async fn retrieve_secret(&self, variable_id: &str) -> Result<Option<String>> {
        Ok(self.value(variable_id))
    }

    async fn add_secret(&self, variable_id: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        match state.variables.get_mut(variable_id) {
            Some(slot) => {
                *slot = Some(value.to_string());
                Ok(())
            }
            None => Err(BackendError::not_found(variable_id)),
        }
    }

    async fn load_policy(&self, mode: PolicyMode, branch: &str, policy: &Policy) -> Result<()> {
        let mut state = self.lock();
        if !branch.is_empty() && !state.policies.contains(branch) {
            return Err(BackendError::not_found(branch));
        }
        state.loads.push((mode, branch.to_string(), policy.clone()));

        let path = clean_path(&[branch, policy.id()]);
        match policy {
            Policy::Declare { variables, .. } => {
                for variable in variables {
                    state
                        .variables
                        .entry(clean_path(&[path.as_str(), variable.as_str()]))
                        .or_insert(None);
                }
                state.policies.insert(path);
            }
            Policy::Delete { .. } => {
                state.policies.retain(|p| !is_below(p, &path));
                state.variables.retain(|v, _| !is_below(v, &path));
            }
        }
        Ok(())
    }
}

/// Memory backend that counts the calls reaching it.
#[derive(Default)]
pub struct CountingBackend {
    inner: MemoryBackend,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
    fail_next: Mutex<Option<BackendError>>,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: BackendError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    fn check(&self) -> Result<()> {
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl SecretBackend for CountingBackend {
    async fn get(&self, id: &SecretId) -> Result<Secret> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(id).await
    }

    async fn set(&self, id: &SecretId, value: SecretValue) -> Result<Secret> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.set(id, value).await
    }

    async fn delete(&self, id: &SecretId) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.delete(id).await
    }

    fn backend_type(&self) -> &'static str {
        self.inner.backend_type()
    }
}

/// Counters recorded while running a future under [`with_metrics`].
pub struct RecordedMetrics {
    counters: Vec<(String, BTreeMap<String, String>, u64)>,
}

impl RecordedMetrics {
    /// Sum of the counters named `name` whose labels include `labels`.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .iter()
            .filter(|(n, l, _)| {
                n == name
                    && labels
                        .iter()
                        .all(|(k, v)| l.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|(_, _, count)| count)
            .sum()
    }
}

/// Run `fut` on a fresh current-thread runtime with a local metrics recorder.
pub fn with_metrics<F: Future>(fut: F) -> (F::Output, RecordedMetrics) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let output = metrics::with_local_recorder(&recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    });

    let counters = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(key, _, _, value)| match value {
            DebugValue::Counter(count) => {
                let labels = key
                    .key()
                    .labels()
                    .map(|label| (label.key().to_string(), label.value().to_string()))
                    .collect();
                Some((key.key().name().to_string(), labels, count))
            }
            _ => None,
        })
        .collect();
    (output, RecordedMetrics { counters })
}

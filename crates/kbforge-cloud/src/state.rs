//! Persisted state for provisioning units
//!
//! Identifiers produced by one invocation (collection id, knowledge base id,
//! ...) are stored as single string values so a later, independent invocation
//! can find them again. The production backend is a parameter store; a JSON
//! file backend mirrors it for local runs.

use crate::error::{ProvisionError, Result};
use crate::key::NamedResourceKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";

/// Durable key/value store for persisted attributes
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Write a value, replacing any previous one
    async fn put(&self, path: &str, value: &str) -> Result<()>;

    /// Write a value only if the path is unset. Returns whether it was written.
    async fn put_if_absent(&self, path: &str, value: &str) -> Result<bool>;

    /// Read a value. Missing paths are `ProvisionError::NotFound`.
    async fn get(&self, path: &str) -> Result<String>;

    /// Remove a value. Removing a missing path succeeds.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// In-process store, used by tests and dry runs
#[derive(Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the store were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.values.lock().await.clone()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.values.lock().await.contains_key(path)
    }

    fn check_available(&self, path: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProvisionError::persistence(path, "state store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put(&self, path: &str, value: &str) -> Result<()> {
        self.check_available(path)?;
        self.values
            .lock()
            .await
            .insert(path.to_string(), value.to_string());
        Ok(())
    }

    async fn put_if_absent(&self, path: &str, value: &str) -> Result<bool> {
        self.check_available(path)?;
        let mut values = self.values.lock().await;
        if values.contains_key(path) {
            return Ok(false);
        }
        values.insert(path.to_string(), value.to_string());
        Ok(true)
    }

    async fn get(&self, path: &str) -> Result<String> {
        self.check_available(path)?;
        self.values
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| ProvisionError::not_found(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_available(path)?;
        self.values.lock().await.remove(path);
        Ok(())
    }
}

/// On-disk state file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    updated_at: DateTime<Utc>,
    parameters: BTreeMap<String, String>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            parameters: BTreeMap::new(),
        }
    }
}

/// JSON file backed store for local runs
pub struct FileStateStore {
    dir: PathBuf,
    guard: Mutex<()>,
}

impl FileStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.dir.join(STATE_BACKUP)
    }

    async fn load(&self) -> Result<StateFile> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, starting empty");
            return Ok(StateFile::default());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(ProvisionError::persistence(
                path.display().to_string(),
                format!(
                    "state file version {} is newer than supported version {}",
                    state.version, STATE_VERSION
                ),
            ));
        }

        Ok(state)
    }

    async fn save(&self, mut state: StateFile) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            tracing::debug!("Created state directory: {}", self.dir.display());
        }

        let path = self.state_path();
        let backup = self.backup_path();
        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        state.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(&state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} parameters", state.parameters.len());
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn put(&self, path: &str, value: &str) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut state = self.load().await?;
        state.parameters.insert(path.to_string(), value.to_string());
        self.save(state).await
    }

    async fn put_if_absent(&self, path: &str, value: &str) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let mut state = self.load().await?;
        if state.parameters.contains_key(path) {
            return Ok(false);
        }
        state.parameters.insert(path.to_string(), value.to_string());
        self.save(state).await?;
        Ok(true)
    }

    async fn get(&self, path: &str) -> Result<String> {
        let _guard = self.guard.lock().await;
        let state = self.load().await?;
        state
            .parameters
            .get(path)
            .cloned()
            .ok_or_else(|| ProvisionError::not_found(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut state = self.load().await?;
        if state.parameters.remove(path).is_some() {
            self.save(state).await?;
        }
        Ok(())
    }
}

/// Contents of a lease record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// Exclusive claim on one provisioning unit for the length of an invocation.
///
/// Must be released explicitly; a lease left behind by a crashed invocation
/// is taken over once it is older than the TTL.
#[derive(Debug)]
pub struct Lease {
    path: String,
    holder: String,
}

impl Lease {
    /// Claim the lease for `key` on behalf of `holder` (the request id)
    pub async fn acquire(
        store: &dyn StateStore,
        key: &NamedResourceKey,
        holder: &str,
        ttl: Duration,
    ) -> Result<Self> {
        let path = key.lease_path();
        let info = LeaseInfo {
            holder: holder.to_string(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string(&info)?;

        if store.put_if_absent(&path, &content).await? {
            tracing::debug!(key = %key, holder, "Acquired lease");
            return Ok(Self::new(path, holder));
        }

        let existing = match store.get(&path).await {
            Ok(raw) => match serde_json::from_str::<LeaseInfo>(&raw) {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Overwriting unreadable lease record");
                    None
                }
            },
            // released between our two calls
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if let Some(existing) = existing {
            if existing.holder != holder {
                let age = Utc::now().signed_duration_since(existing.acquired_at);
                let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
                if age < ttl {
                    return Err(ProvisionError::LeaseConflict {
                        key: key.to_string(),
                        holder: existing.holder,
                        acquired_at: existing.acquired_at.to_rfc3339(),
                    });
                }
                tracing::warn!(key = %key, stale_holder = %existing.holder, "Taking over stale lease");
            } else {
                tracing::debug!(key = %key, holder, "Re-entering lease held by this request");
            }
        }

        store.put(&path, &content).await?;

        // two invocations may take over the same stale lease; the last write wins
        let current: LeaseInfo = serde_json::from_str(&store.get(&path).await?)?;
        if current.holder != holder {
            return Err(ProvisionError::LeaseConflict {
                key: key.to_string(),
                holder: current.holder,
                acquired_at: current.acquired_at.to_rfc3339(),
            });
        }
        Ok(Self::new(path, holder))
    }

    fn new(path: String, holder: &str) -> Self {
        Self {
            path,
            holder: holder.to_string(),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Drop the claim. Failures are logged; an unreleased lease expires on its own.
    pub async fn release(self, store: &dyn StateStore) {
        match store.delete(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path, "Released lease"),
            Err(e) => tracing::warn!(path = %self.path, error = %e, "Failed to release lease"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryStateStore::new();
        store.put("/acme-ab12cd/collectionId", "c-1").await.unwrap();
        store.put("/acme-ab12cd/collectionId", "c-2").await.unwrap();
        assert_eq!(store.get("/acme-ab12cd/collectionId").await.unwrap(), "c-2");

        store.delete("/acme-ab12cd/collectionId").await.unwrap();
        store.delete("/acme-ab12cd/collectionId").await.unwrap();
        let err = store.get("/acme-ab12cd/collectionId").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_memory_store_unavailable() {
        let store = MemoryStateStore::new();
        store.set_unavailable(true);
        let err = store.put("/k/collectionId", "x").await.unwrap_err();
        assert!(matches!(err, ProvisionError::Persistence { .. }));
        assert!(!store.get("/k/collectionId").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_file_store_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path().join("state"));

        store.put("/acme-ab12cd/knowledgeBaseId", "KB123").await.unwrap();
        assert!(!store.put_if_absent("/acme-ab12cd/knowledgeBaseId", "KB999").await.unwrap());

        let reopened = FileStateStore::new(temp_dir.path().join("state"));
        assert_eq!(
            reopened.get("/acme-ab12cd/knowledgeBaseId").await.unwrap(),
            "KB123"
        );
        assert!(temp_dir.path().join("state").join(STATE_BACKUP).exists());
    }

    #[tokio::test]
    async fn test_file_store_missing_key() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        assert!(store.get("/nope/dataSourceId").await.unwrap_err().is_not_found());
        store.delete("/nope/dataSourceId").await.unwrap();
    }

    #[tokio::test]
    async fn test_lease_conflict_and_reentry() {
        let store = MemoryStateStore::new();
        let key = NamedResourceKey::new("acme", "ab12cd").unwrap();
        let ttl = Duration::from_secs(1200);

        let lease = Lease::acquire(&store, &key, "req-1", ttl).await.unwrap();
        assert_eq!(lease.holder(), "req-1");

        let err = Lease::acquire(&store, &key, "req-2", ttl).await.unwrap_err();
        assert!(matches!(err, ProvisionError::LeaseConflict { ref holder, .. } if holder == "req-1"));

        // redelivery of the same request re-enters
        let again = Lease::acquire(&store, &key, "req-1", ttl).await.unwrap();
        again.release(&store).await;
        assert!(!store.contains("/acme-ab12cd/lease").await);

        let next = Lease::acquire(&store, &key, "req-2", ttl).await.unwrap();
        next.release(&store).await;
    }

    #[tokio::test]
    async fn test_stale_lease_taken_over() {
        let store = MemoryStateStore::new();
        let key = NamedResourceKey::new("acme", "ab12cd").unwrap();
        let stale = LeaseInfo {
            holder: "crashed".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        store
            .put(&key.lease_path(), &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();

        let lease = Lease::acquire(&store, &key, "req-3", Duration::from_secs(1200))
            .await
            .unwrap();
        assert_eq!(lease.holder(), "req-3");
        let raw = store.get(&key.lease_path()).await.unwrap();
        assert!(raw.contains("req-3"));
    }

    #[tokio::test]
    async fn test_unreadable_lease_taken_over() {
        let store = MemoryStateStore::new();
        let key = NamedResourceKey::new("acme", "ab12cd").unwrap();
        store.put(&key.lease_path(), "not a lease").await.unwrap();

        let lease = Lease::acquire(&store, &key, "req-4", Duration::from_secs(1200))
            .await
            .unwrap();
        assert_eq!(lease.holder(), "req-4");
    }

    /// Store where another invocation overwrites the lease right after us
    struct RacingStore {
        inner: MemoryStateStore,
    }

    #[async_trait]
    impl StateStore for RacingStore {
        async fn put(&self, path: &str, _value: &str) -> Result<()> {
            let rival = LeaseInfo {
                holder: "req-rival".to_string(),
                acquired_at: Utc::now(),
            };
            self.inner
                .put(path, &serde_json::to_string(&rival).unwrap())
                .await
        }

        async fn put_if_absent(&self, path: &str, value: &str) -> Result<bool> {
            self.inner.put_if_absent(path, value).await
        }

        async fn get(&self, path: &str) -> Result<String> {
            self.inner.get(path).await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.inner.delete(path).await
        }
    }

    #[tokio::test]
    async fn test_racing_takeover_loses() {
        let store = RacingStore {
            inner: MemoryStateStore::new(),
        };
        let key = NamedResourceKey::new("acme", "ab12cd").unwrap();
        let stale = LeaseInfo {
            holder: "crashed".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        store
            .inner
            .put(&key.lease_path(), &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();

        let err = Lease::acquire(&store, &key, "req-5", Duration::from_secs(1200))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::LeaseConflict { ref holder, .. } if holder == "req-rival"
        ));
    }
}

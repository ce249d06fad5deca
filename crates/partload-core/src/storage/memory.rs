//! In-process object store with fault injection, for tests and dry runs.

use super::{ObjectMeta, ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Put,
    Copy,
    Delete,
    Head,
    List,
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<(String, String), StoredObject>,
    failing: HashSet<StoreOp>,
    delays: HashMap<StoreOp, Duration>,
    calls: HashMap<StoreOp, usize>,
    head_misses: usize,
}

/// [`ObjectStore`] kept in memory.
///
/// Clones share state, so a test can keep one handle for assertions while the
/// pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<State>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panicking test thread must not hide the store from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.lock().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                last_modified: Utc::now(),
            },
        );
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Make every call of `op` fail with a transient error.
    pub fn fail(&self, op: StoreOp) {
        self.lock().failing.insert(op);
    }

    pub fn heal(&self, op: StoreOp) {
        self.lock().failing.remove(&op);
    }

    /// Stall every call of `op` for `delay` before answering.
    pub fn delay(&self, op: StoreOp, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    /// The next `n` head calls report the object as absent.
    pub fn hide_from_head(&self, n: usize) {
        self.lock().head_misses = n;
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: StoreOp) -> StoreResult<()> {
        let delay = {
            let mut state = self.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            state.delays.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.lock().failing.contains(&op) {
            return Err(StoreError::Transient(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.enter(StoreOp::Get).await?;
        self.body(bucket, key)
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> StoreResult<()> {
        self.enter(StoreOp::Put).await?;
        self.insert(bucket, key, body);
        Ok(())
    }

    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> StoreResult<()> {
        self.enter(StoreOp::Copy).await?;
        let mut state = self.lock();
        let object = state
            .objects
            .get(&(bucket.to_string(), src_key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, src_key))?;
        state.objects.insert(
            (bucket.to_string(), dst_key.to_string()),
            StoredObject {
                body: object.body,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.enter(StoreOp::Delete).await?;
        // S3 semantics: deleting a missing key succeeds
        self.lock()
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectMeta>> {
        self.enter(StoreOp::Head).await?;
        let mut state = self.lock();
        if state.head_misses > 0 {
            state.head_misses -= 1;
            return Ok(None);
        }
        Ok(state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| ObjectMeta {
                key: key.to_string(),
                size: o.body.len() as u64,
                last_modified: Some(o.last_modified),
            }))
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        self.enter(StoreOp::List).await?;
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), o)| ObjectMeta {
                key: k.clone(),
                size: o.body.len() as u64,
                last_modified: Some(o.last_modified),
            })
            .collect())
    }
}

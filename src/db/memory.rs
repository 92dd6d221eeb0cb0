//! In-memory backend.
//!
//! Mirrors the Redis command semantics the stores depend on (typed values,
//! `WRONGTYPE` errors, empty hashes disappearing, per-command EXEC results) so
//! tests exercise the same code paths as production.
//!
//! Every write bumps a per-key version. A transaction records the version of
//! each watched key and refuses to commit if any of them moved. Versions of
//! absent keys are only kept while some transaction watches them.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Backend, HashFields, Transaction, WriteOp};
use crate::error::{AppError, Result};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashFields),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    versions: HashMap<String, u64>,
    /// Key -> number of open transactions watching it
    watchers: HashMap<String, usize>,
    clock: u64,
}

impl State {
    fn live(&self, key: &str) -> Option<&Value> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| &e.value)
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn watch(&mut self, key: &str) -> u64 {
        *self.watchers.entry(key.to_string()).or_insert(0) += 1;
        self.version(key)
    }

    fn release(&mut self, key: &str) {
        let Some(count) = self.watchers.get_mut(key) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.watchers.remove(key);
            if !self.entries.contains_key(key) {
                self.versions.remove(key);
            }
        }
    }

    fn hash(&self, key: &str) -> Result<Option<&HashFields>> {
        match self.live(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(Value::Str(_)) => Err(AppError::Backend(WRONG_TYPE.to_string())),
        }
    }

    fn put(&mut self, key: &str, value: Value, expires_at: Option<Instant>) {
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        self.touch(key);
    }

    fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_none() {
            return;
        }
        // A watcher must still see the delete as a change
        if self.watchers.contains_key(key) {
            self.touch(key);
        } else {
            self.versions.remove(key);
        }
    }

    /// Apply one write with Redis semantics, failing only on a type mismatch
    fn apply(&mut self, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::Set { key, value } => {
                self.put(key, Value::Str(value.clone()), None);
            }
            WriteOp::Delete { key } => self.remove(key),
            WriteOp::HashSet { key, field, value } => {
                let mut fields = self.hash(key)?.cloned().unwrap_or_default();
                fields.insert(field.clone(), value.clone());
                self.put(key, Value::Hash(fields), None);
            }
            WriteOp::HashDelete { key, fields } => {
                let Some(existing) = self.hash(key)? else {
                    return Ok(());
                };
                let mut remaining = existing.clone();
                let before = remaining.len();
                for field in fields {
                    remaining.remove(field);
                }
                if remaining.len() == before {
                    return Ok(());
                }
                // Redis drops a hash once its last field is gone
                if remaining.is_empty() {
                    self.remove(key);
                } else {
                    self.put(key, Value::Hash(remaining), None);
                }
            }
        }
        Ok(())
    }

    /// Apply a batch the way EXEC does: every command runs, failures are collected
    fn apply_all(&mut self, ops: &[WriteOp]) -> Result<()> {
        let failures: Vec<String> = ops
            .iter()
            .filter_map(|op| {
                self.apply(op)
                    .err()
                    .map(|e| format!("{} on {}", e, op.key()))
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::BatchFailed(failures.join("; ")))
        }
    }
}

/// In-memory key-value backend.
///
/// Cheaply cloneable; all clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.state.read().live(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(Value::Hash(_)) => Err(AppError::Backend(WRONG_TYPE.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.state.write().apply(&WriteOp::set(key, value))
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.state.write().put(
            key,
            Value::Str(value.to_string()),
            Some(Instant::now() + ttl),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state.write().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.state.read().live(key).is_some())
    }

    async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        let mut state = self.state.write();
        let current = match state.live(key) {
            None => 0,
            Some(Value::Str(s)) => s.parse::<i64>().map_err(|_| {
                AppError::Backend("ERR value is not an integer or out of range".to_string())
            })?,
            Some(Value::Hash(_)) => return Err(AppError::Backend(WRONG_TYPE.to_string())),
        };
        let next = current.checked_add(amount).ok_or_else(|| {
            AppError::Backend("ERR increment or decrement would overflow".to_string())
        })?;
        state.put(key, Value::Str(next.to_string()), None);
        Ok(next)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashFields> {
        Ok(self.state.read().hash(key)?.cloned().unwrap_or_default())
    }

    async fn hash_get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .read()
            .hash(key)?
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.state.write().apply(&WriteOp::hash_set(key, field, value))
    }

    async fn hash_delete_fields(&self, key: &str, fields: &[String]) -> Result<()> {
        self.state
            .write()
            .apply(&WriteOp::hash_delete(key, fields.to_vec()))
    }

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .hash(key)?
            .map_or(false, |h| h.contains_key(field)))
    }

    async fn execute_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        self.state.write().apply_all(&ops)
    }

    async fn transaction(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            backend: self.clone(),
            watched: BTreeMap::new(),
            queued: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        let _unused = self.state.read();
        Ok(())
    }
}

/// Transaction over [`MemoryBackend`]
struct MemoryTransaction {
    backend: MemoryBackend,
    /// Watched key -> version observed at watch time
    watched: BTreeMap<String, u64>,
    queued: Vec<WriteOp>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn watch(&mut self, key: &str) -> Result<()> {
        if !self.watched.contains_key(key) {
            let version = self.backend.state.write().watch(key);
            self.watched.insert(key.to_string(), version);
        }
        Ok(())
    }

    async fn hash_field_exists(&mut self, key: &str, field: &str) -> Result<bool> {
        self.backend.hash_field_exists(key, field).await
    }

    fn queue(&mut self, op: WriteOp) {
        self.queued.push(op);
    }

    async fn unwatch(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.backend.state.write();

        for (key, seen) in &self.watched {
            if state.version(key) != *seen {
                tracing::debug!("Watched key {} changed before commit", key);
                return Err(AppError::ConcurrentModification);
            }
        }

        state.apply_all(&self.queued)
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        let mut state = self.backend.state.write();
        for key in self.watched.keys() {
            state.release(key);
        }
    }
}

pub mod keys;
pub mod memory;
pub mod redis;
#[cfg(test)]
pub mod testutil;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// Backend handle type (Arc-wrapped for sharing across handlers)
pub type Db = Arc<dyn Backend>;

/// Field map of a hash key
pub type HashFields = BTreeMap<String, String>;

/// A write queued into a batch or transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set { key: String, value: String },
    Delete { key: String },
    HashSet { key: String, field: String, value: String },
    HashDelete { key: String, fields: Vec<String> },
}

impl WriteOp {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        WriteOp::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        WriteOp::Delete { key: key.into() }
    }

    pub fn hash_set(
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        WriteOp::HashSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn hash_delete(key: impl Into<String>, fields: Vec<String>) -> Self {
        WriteOp::HashDelete {
            key: key.into(),
            fields,
        }
    }

    /// Key this operation writes to
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Set { key, .. }
            | WriteOp::Delete { key }
            | WriteOp::HashSet { key, .. }
            | WriteOp::HashDelete { key, .. } => key,
        }
    }
}

/// Narrow contract over the key-value store.
///
/// Every call round-trips to the store; implementations hold no cached state.
/// Connection failures and timeouts surface as
/// [`AppError::BackendUnavailable`](crate::AppError::BackendUnavailable).
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically add `amount` to an integer key (absent counts as 0)
    async fn increment(&self, key: &str, amount: i64) -> Result<i64>;

    async fn hash_get_all(&self, key: &str) -> Result<HashFields>;

    async fn hash_get_field(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hash_delete_fields(&self, key: &str, fields: &[String]) -> Result<()>;

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool>;

    /// Apply all operations as one MULTI/EXEC batch.
    ///
    /// Nothing else interleaves with the batch. If the store rejects some of
    /// its commands the rest may still have been applied; that case returns
    /// [`AppError::BatchFailed`](crate::AppError::BatchFailed).
    async fn execute_batch(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Start an optimistic transaction
    async fn transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Round-trip check used at startup and by the health endpoint
    async fn ping(&self) -> Result<()>;
}

/// Optimistic transaction scope.
///
/// Keys passed to [`watch`](Transaction::watch) are checked at commit time: if
/// any of them was written by someone else after being watched, the commit
/// applies nothing and fails with
/// [`AppError::ConcurrentModification`](crate::AppError::ConcurrentModification).
#[async_trait]
pub trait Transaction: Send {
    async fn watch(&mut self, key: &str) -> Result<()>;

    /// Read a hash field on the transaction's connection (after watching)
    async fn hash_field_exists(&mut self, key: &str, field: &str) -> Result<bool>;

    /// Buffer a write until commit
    fn queue(&mut self, op: WriteOp);

    /// Drop all watches and queued writes without applying anything
    async fn unwatch(self: Box<Self>) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

//! Test helpers for exercising optimistic-transaction contention.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::{Backend, HashFields, MemoryBackend, Transaction, WriteOp};
use crate::error::Result;

/// Wraps a [`MemoryBackend`] and lets a test schedule a rival write that lands
/// between the next transaction's watch and its commit, or right before the
/// next plain batch.
#[derive(Clone, Default)]
pub struct ContendedBackend {
    inner: MemoryBackend,
    rival: Arc<Mutex<Vec<WriteOp>>>,
}

impl ContendedBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            rival: Arc::default(),
        }
    }

    /// Writes applied by "someone else" right before the next commit or batch
    pub fn interleave(&self, ops: Vec<WriteOp>) {
        *self.rival.lock() = ops;
    }

    fn take_rival(&self) -> Vec<WriteOp> {
        std::mem::take(&mut *self.rival.lock())
    }
}

#[async_trait]
impl Backend for ContendedBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.inner.set_with_expiry(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        self.inner.increment(key, amount).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashFields> {
        self.inner.hash_get_all(key).await
    }

    async fn hash_get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.inner.hash_get_field(key, field).await
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.inner.hash_set_field(key, field, value).await
    }

    async fn hash_delete_fields(&self, key: &str, fields: &[String]) -> Result<()> {
        self.inner.hash_delete_fields(key, fields).await
    }

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool> {
        self.inner.hash_field_exists(key, field).await
    }

    async fn execute_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let rival = self.take_rival();
        if !rival.is_empty() {
            self.inner.execute_batch(rival).await?;
        }
        self.inner.execute_batch(ops).await
    }

    async fn transaction(&self) -> Result<Box<dyn Transaction>> {
        let rival = self.take_rival();
        Ok(Box::new(ContendedTransaction {
            inner: self.inner.transaction().await?,
            backend: self.inner.clone(),
            rival,
        }))
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

struct ContendedTransaction {
    inner: Box<dyn Transaction>,
    backend: MemoryBackend,
    rival: Vec<WriteOp>,
}

#[async_trait]
impl Transaction for ContendedTransaction {
    async fn watch(&mut self, key: &str) -> Result<()> {
        self.inner.watch(key).await
    }

    async fn hash_field_exists(&mut self, key: &str, field: &str) -> Result<bool> {
        self.inner.hash_field_exists(key, field).await
    }

    fn queue(&mut self, op: WriteOp) {
        self.inner.queue(op);
    }

    async fn unwatch(self: Box<Self>) -> Result<()> {
        self.inner.unwatch().await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let ContendedTransaction {
            inner,
            backend,
            rival,
        } = *self;
        if !rival.is_empty() {
            backend.execute_batch(rival).await?;
        }
        inner.commit().await
    }
}

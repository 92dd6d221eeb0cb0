use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolConfig, Runtime};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, Pipeline, RedisError};
use std::future::Future;
use std::time::Duration;

use super::{Backend, HashFields, Transaction, WriteOp};
use crate::error::{AppError, Result};

/// Map a redis error onto the application taxonomy
fn map_redis_err(error: RedisError) -> AppError {
    if error.is_timeout()
        || error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
    {
        AppError::BackendUnavailable(error.to_string())
    } else {
        AppError::Backend(error.to_string())
    }
}

/// Map an error from EXEC.
///
/// EXECABORT means the server discarded the whole batch, so nothing applied.
/// Any other server error came back from a command inside the batch after the
/// rest of it ran.
fn map_exec_err(error: RedisError) -> AppError {
    if error.kind() == ErrorKind::ExecAbortError {
        return AppError::Backend(error.to_string());
    }
    match map_redis_err(error) {
        AppError::Backend(msg) => AppError::BatchFailed(msg),
        other => other,
    }
}

/// Bound a backend call by `limit`
async fn bounded<T, F>(limit: Duration, op: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, RedisError>>,
{
    bounded_with(limit, op, fut, map_redis_err).await
}

async fn bounded_with<T, F>(
    limit: Duration,
    op: &str,
    fut: F,
    map_err: fn(RedisError) -> AppError,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, RedisError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(|e| {
            tracing::error!("Redis {} failed: {}", op, e);
            map_err(e)
        }),
        Err(_) => {
            tracing::error!("Redis {} timed out after {:?}", op, limit);
            Err(AppError::BackendUnavailable(format!(
                "{} timed out after {}ms",
                op,
                limit.as_millis()
            )))
        }
    }
}

/// Queue every write into an atomic pipeline
fn build_pipeline(ops: &[WriteOp]) -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for op in ops {
        match op {
            WriteOp::Set { key, value } => {
                pipe.set(key, value).ignore();
            }
            WriteOp::Delete { key } => {
                pipe.del(key).ignore();
            }
            WriteOp::HashSet { key, field, value } => {
                pipe.hset(key, field, value).ignore();
            }
            WriteOp::HashDelete { key, fields } => {
                pipe.hdel(key, fields).ignore();
            }
        }
    }
    pipe
}

/// Redis-backed key-value store.
///
/// Plain commands share one auto-reconnecting multiplexed connection. WATCH
/// state belongs to the connection that issued it, so optimistic transactions
/// borrow a dedicated connection from a pool instead.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    txn_pool: Pool,
    timeout: Duration,
}

impl RedisBackend {
    /// Connect to Redis and verify the connection with a PING
    pub async fn connect(url: &str, timeout: Duration, pool_size: usize) -> Result<Self> {
        tracing::info!("Connecting to Redis at {}", url);

        let client = Client::open(url)
            .map_err(|e| AppError::BackendUnavailable(format!("Invalid Redis URL: {}", e)))?;

        let conn = bounded(timeout, "connect", ConnectionManager::new(client)).await?;

        let mut pool_config = deadpool_redis::Config::from_url(url);
        pool_config.pool = Some(PoolConfig::new(pool_size.max(1)));
        let txn_pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| AppError::BackendUnavailable(format!("Redis pool: {}", e)))?;

        let backend = Self {
            conn,
            txn_pool,
            timeout,
        };
        backend.ping().await?;

        tracing::info!("Redis connection established");

        Ok(backend)
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "GET", conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "SET", conn.set(key, value)).await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "SETEX", conn.set_ex(key, value, ttl.as_secs())).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "DEL", conn.del(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "EXISTS", conn.exists(key)).await
    }

    async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "INCRBY", conn.incr(key, amount)).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashFields> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "HGETALL", conn.hgetall(key)).await
    }

    async fn hash_get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "HGET", conn.hget(key, field)).await
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "HSET", conn.hset(key, field, value)).await
    }

    async fn hash_delete_fields(&self, key: &str, fields: &[String]) -> Result<()> {
        // HDEL with no fields is a syntax error
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        bounded(self.timeout, "HDEL", conn.hdel(key, fields)).await
    }

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, "HEXISTS", conn.hexists(key, field)).await
    }

    async fn execute_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let pipe = build_pipeline(&ops);
        let mut conn = self.conn.clone();
        bounded_with(
            self.timeout,
            "EXEC",
            pipe.query_async::<_, ()>(&mut conn),
            map_exec_err,
        )
        .await
    }

    async fn transaction(&self) -> Result<Box<dyn Transaction>> {
        let conn = match tokio::time::timeout(self.timeout, self.txn_pool.get()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                tracing::error!("Redis transaction connection unavailable: {}", e);
                return Err(AppError::BackendUnavailable(e.to_string()));
            }
            Err(_) => {
                tracing::error!("Redis pool checkout timed out after {:?}", self.timeout);
                return Err(AppError::BackendUnavailable(format!(
                    "pool checkout timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        Ok(Box::new(RedisTransaction {
            conn: Some(conn),
            settled: false,
            timeout: self.timeout,
            queued: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = bounded(
            self.timeout,
            "PING",
            redis::cmd("PING").query_async(&mut conn),
        )
        .await?;
        Ok(())
    }
}

/// WATCH / MULTI / EXEC on a pooled connection.
///
/// A transaction dropped before EXEC or UNWATCH completes may leave keys
/// watched, so its connection is detached from the pool instead of returned.
struct RedisTransaction {
    conn: Option<Connection>,
    settled: bool,
    timeout: Duration,
    queued: Vec<WriteOp>,
}

impl RedisTransaction {
    fn conn(&mut self) -> Result<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| AppError::Backend("transaction connection released".to_string()))
    }
}

impl Drop for RedisTransaction {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(conn) = self.conn.take() {
            tracing::debug!("Discarding transaction connection with unknown WATCH state");
            drop(Connection::take(conn));
        }
    }
}

#[async_trait]
impl Transaction for RedisTransaction {
    async fn watch(&mut self, key: &str) -> Result<()> {
        let timeout = self.timeout;
        let conn = self.conn()?;
        bounded(
            timeout,
            "WATCH",
            redis::cmd("WATCH").arg(key).query_async(conn),
        )
        .await
    }

    async fn hash_field_exists(&mut self, key: &str, field: &str) -> Result<bool> {
        let timeout = self.timeout;
        let conn = self.conn()?;
        bounded(timeout, "HEXISTS", conn.hexists(key, field)).await
    }

    fn queue(&mut self, op: WriteOp) {
        self.queued.push(op);
    }

    async fn unwatch(mut self: Box<Self>) -> Result<()> {
        let timeout = self.timeout;
        let conn = self.conn()?;
        bounded::<(), _>(timeout, "UNWATCH", redis::cmd("UNWATCH").query_async(conn)).await?;
        self.settled = true;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let pipe = build_pipeline(&self.queued);
        let timeout = self.timeout;
        let conn = self.conn()?;

        // EXEC replies nil when a watched key changed
        let reply: Option<()> =
            bounded_with(timeout, "EXEC", pipe.query_async(conn), map_exec_err).await?;

        // Either way EXEC has cleared the watches
        self.settled = true;

        match reply {
            Some(()) => Ok(()),
            None => {
                tracing::debug!("EXEC aborted: watched key modified");
                Err(AppError::ConcurrentModification)
            }
        }
    }
}

//! Metadata store: named field maps plus an index of record names.
//!
//! A record lives in the hash `metadata_{env}_{app}` (or `metadata_{app}`);
//! the `metadata_keys` hash lists every storage key that has been written.

use serde_json::Value;

use crate::constants::METADATA_INDEX_KEY;
use crate::db::{keys, Db, HashFields, WriteOp};
use crate::error::{AppError, Result};
use crate::validation::validate_metadata_key;

/// Convert a JSON request body into a field map.
///
/// Fails with `InvalidType` unless the value is an object of string values.
pub fn fields_from_json(value: Value) -> Result<HashFields> {
    let Value::Object(map) = value else {
        return Err(AppError::InvalidType(
            "add_metadata: metadata needs to be a dictionary.".to_string(),
        ));
    };

    map.into_iter()
        .map(|(field, value)| match value {
            Value::String(s) => Ok((field, s)),
            other => Err(AppError::InvalidType(format!(
                "add_metadata: value for {} must be a string, got {}",
                field, other
            ))),
        })
        .collect()
}

#[derive(Clone)]
pub struct MetadataStore {
    db: Db,
}

impl MetadataStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Derive and validate the storage key of a record
    fn storage_key(app_name: &str, env_name: &str) -> Result<String> {
        let key = keys::metadata_record(app_name, env_name);
        validate_metadata_key(&key)?;
        Ok(key)
    }

    /// The full record index (storage key -> storage key)
    pub async fn get_metadata_keys_index(&self) -> Result<HashFields> {
        self.db.hash_get_all(METADATA_INDEX_KEY).await
    }

    /// Fields of a record; empty when the record does not exist
    pub async fn get_metadata(&self, app_name: &str, env_name: &str) -> Result<HashFields> {
        let key = Self::storage_key(app_name, env_name)?;
        self.db.hash_get_all(&key).await
    }

    /// Upsert fields into a record, creating it (and its index entry) on first write.
    ///
    /// Runs as an optimistic transaction watching the record: if another
    /// writer touches it before EXEC, nothing is applied and the call fails
    /// with `ConcurrentModification`. Retrying is left to the caller.
    pub async fn add_metadata(
        &self,
        app_name: &str,
        fields: &HashFields,
        env_name: &str,
    ) -> Result<()> {
        let key = Self::storage_key(app_name, env_name)?;
        for field in fields.keys() {
            validate_metadata_key(field)?;
        }

        let mut txn = self.db.transaction().await?;
        txn.watch(&key).await?;

        if fields.is_empty() {
            return txn.unwatch().await;
        }

        if !txn.hash_field_exists(METADATA_INDEX_KEY, &key).await? {
            txn.queue(WriteOp::hash_set(METADATA_INDEX_KEY, key.as_str(), key.as_str()));
        }
        for (field, value) in fields {
            txn.queue(WriteOp::hash_set(key.as_str(), field.as_str(), value.as_str()));
        }

        txn.commit().await.map_err(|e| {
            if e.is_retryable() {
                tracing::warn!("Metadata {} modified concurrently, update aborted", key);
            }
            e
        })?;

        tracing::info!("Metadata {} updated ({} fields)", key, fields.len());
        Ok(())
    }

    /// Remove the named fields.
    ///
    /// The index entry stays even if the record ends up empty.
    pub async fn delete_metadata(
        &self,
        app_name: &str,
        field_names: &[String],
        env_name: &str,
    ) -> Result<()> {
        let key = Self::storage_key(app_name, env_name)?;
        for field in field_names {
            validate_metadata_key(field)?;
        }

        if field_names.is_empty() {
            return Ok(());
        }

        self.db
            .execute_batch(vec![WriteOp::hash_delete(key.as_str(), field_names.to_vec())])
            .await?;

        tracing::info!("Metadata {}: removed fields {:?}", key, field_names);
        Ok(())
    }

    /// Delete the whole record and its index entry in one batch
    pub async fn delete_metadata_hashkey(&self, app_name: &str, env_name: &str) -> Result<()> {
        let key = Self::storage_key(app_name, env_name)?;

        self.db
            .execute_batch(vec![
                WriteOp::delete(key.as_str()),
                WriteOp::hash_delete(METADATA_INDEX_KEY, vec![key.clone()]),
            ])
            .await?;

        tracing::info!("Metadata {} deleted", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::ContendedBackend;
    use crate::db::{Backend, MemoryBackend};
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (MemoryBackend, MetadataStore) {
        let backend = MemoryBackend::new();
        let store = MetadataStore::new(Arc::new(backend.clone()));
        (backend, store)
    }

    fn fields(pairs: &[(&str, &str)]) -> HashFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let (_, store) = setup();

        store
            .add_metadata("checkout", &fields(&[("a", "1")]), "")
            .await
            .unwrap();

        assert_eq!(
            store.get_metadata("checkout", "").await.unwrap(),
            fields(&[("a", "1")])
        );
    }

    #[tokio::test]
    async fn test_add_merges() {
        let (_, store) = setup();

        store
            .add_metadata("checkout", &fields(&[("a", "1")]), "")
            .await
            .unwrap();
        store
            .add_metadata("checkout", &fields(&[("b", "2")]), "")
            .await
            .unwrap();
        store
            .add_metadata("checkout", &fields(&[("a", "3")]), "")
            .await
            .unwrap();

        assert_eq!(
            store.get_metadata("checkout", "").await.unwrap(),
            fields(&[("a", "3"), ("b", "2")])
        );
    }

    #[tokio::test]
    async fn test_environment_scoping() {
        let (backend, store) = setup();

        store
            .add_metadata("checkout", &fields(&[("version", "1.2.0")]), "prod")
            .await
            .unwrap();

        assert!(backend.exists("metadata_prod_checkout").await.unwrap());
        assert!(store.get_metadata("checkout", "").await.unwrap().is_empty());
        assert_eq!(
            store.get_metadata("checkout", "prod").await.unwrap(),
            fields(&[("version", "1.2.0")])
        );
    }

    #[tokio::test]
    async fn test_index_tracks_records() {
        let (_, store) = setup();

        assert!(store.get_metadata_keys_index().await.unwrap().is_empty());

        store
            .add_metadata("api", &fields(&[("a", "1")]), "")
            .await
            .unwrap();
        store
            .add_metadata("api", &fields(&[("b", "2")]), "qa")
            .await
            .unwrap();

        let index = store.get_metadata_keys_index().await.unwrap();
        assert_eq!(
            index,
            fields(&[
                ("metadata_api", "metadata_api"),
                ("metadata_qa_api", "metadata_qa_api"),
            ])
        );
    }

    #[tokio::test]
    async fn test_get_missing_record_is_empty() {
        let (_, store) = setup();
        assert!(store.get_metadata("nothing", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_add_does_not_index() {
        let (_, store) = setup();

        store
            .add_metadata("ghost", &HashFields::new(), "")
            .await
            .unwrap();

        assert!(store.get_metadata_keys_index().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_happens_before_writes() {
        let (backend, store) = setup();

        assert!(matches!(
            store
                .add_metadata("app", &fields(&[("ok", "1"), ("bad field", "2")]), "")
                .await,
            Err(AppError::InvalidFormat(_))
        ));
        assert!(matches!(
            store
                .add_metadata("app", &fields(&[("metadata_keys", "1")]), "")
                .await,
            Err(AppError::ReservedName(_))
        ));
        assert!(matches!(
            store
                .add_metadata(&"x".repeat(101), &fields(&[("a", "1")]), "")
                .await,
            Err(AppError::TooLong(_))
        ));
        assert!(matches!(
            store.add_metadata("bad/app", &fields(&[("a", "1")]), "").await,
            Err(AppError::InvalidFormat(_))
        ));

        assert!(!backend.exists("metadata_app").await.unwrap());
        assert!(!backend.exists("metadata_keys").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_name_limit() {
        let (_, store) = setup();

        // 9-char prefix + 100 chars is the longest allowed storage key
        store
            .add_metadata(&"x".repeat(100), &fields(&[("a", "1")]), "")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reserved_record_name() {
        let (_, store) = setup();

        // "keys" would map onto the index itself
        assert!(matches!(
            store.get_metadata("keys", "").await,
            Err(AppError::ReservedName(_))
        ));
        assert!(matches!(
            store.delete_metadata_hashkey("keys", "").await,
            Err(AppError::ReservedName(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_fields_keeps_index_entry() {
        let (_, store) = setup();

        store
            .add_metadata("svc", &fields(&[("a", "1"), ("b", "2")]), "")
            .await
            .unwrap();

        store
            .delete_metadata("svc", &["a".to_string()], "")
            .await
            .unwrap();
        assert_eq!(
            store.get_metadata("svc", "").await.unwrap(),
            fields(&[("b", "2")])
        );

        store
            .delete_metadata("svc", &["b".to_string()], "")
            .await
            .unwrap();
        assert!(store.get_metadata("svc", "").await.unwrap().is_empty());
        assert!(store
            .get_metadata_keys_index()
            .await
            .unwrap()
            .contains_key("metadata_svc"));
    }

    #[tokio::test]
    async fn test_delete_fields_validates_names() {
        let (_, store) = setup();

        store
            .add_metadata("svc", &fields(&[("a", "1")]), "")
            .await
            .unwrap();

        assert!(matches!(
            store
                .delete_metadata("svc", &["a".to_string(), "no good".to_string()], "")
                .await,
            Err(AppError::InvalidFormat(_))
        ));
        // Nothing removed
        assert_eq!(
            store.get_metadata("svc", "").await.unwrap(),
            fields(&[("a", "1")])
        );
    }

    #[tokio::test]
    async fn test_delete_hashkey_removes_record_and_index() {
        let (backend, store) = setup();

        store
            .add_metadata("svc", &fields(&[("a", "1")]), "prod")
            .await
            .unwrap();
        store
            .add_metadata("other", &fields(&[("a", "1")]), "")
            .await
            .unwrap();

        store.delete_metadata_hashkey("svc", "prod").await.unwrap();

        assert!(!backend.exists("metadata_prod_svc").await.unwrap());
        assert!(store.get_metadata("svc", "prod").await.unwrap().is_empty());

        let index = store.get_metadata_keys_index().await.unwrap();
        assert!(!index.contains_key("metadata_prod_svc"));
        assert!(index.contains_key("metadata_other"));
    }

    #[tokio::test]
    async fn test_contended_add_keeps_only_winner() {
        let backend = ContendedBackend::new(MemoryBackend::new());
        let store = MetadataStore::new(Arc::new(backend.clone()));

        // A rival writer lands on the record inside our watch window
        backend.interleave(vec![
            WriteOp::hash_set("metadata_keys", "metadata_race", "metadata_race"),
            WriteOp::hash_set("metadata_race", "owner", "rival"),
        ]);

        let result = store
            .add_metadata("race", &fields(&[("owner", "us"), ("extra", "x")]), "")
            .await;
        assert!(matches!(result, Err(AppError::ConcurrentModification)));

        assert_eq!(
            store.get_metadata("race", "").await.unwrap(),
            fields(&[("owner", "rival")])
        );

        // The caller may retry; with no contention it goes through
        store
            .add_metadata("race", &fields(&[("owner", "us")]), "")
            .await
            .unwrap();
        assert_eq!(
            store.get_metadata("race", "").await.unwrap(),
            fields(&[("owner", "us")])
        );
    }

    #[test]
    fn test_fields_from_json() {
        let parsed = fields_from_json(json!({"a": "1", "b": "two"})).unwrap();
        assert_eq!(parsed, fields(&[("a", "1"), ("b", "two")]));

        assert!(matches!(
            fields_from_json(json!(["a", "b"])),
            Err(AppError::InvalidType(_))
        ));
        assert!(matches!(
            fields_from_json(json!("text")),
            Err(AppError::InvalidType(_))
        ));
        assert!(matches!(
            fields_from_json(json!({"a": 1})),
            Err(AppError::InvalidType(_))
        ));
    }
}

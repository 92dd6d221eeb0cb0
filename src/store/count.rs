//! Deploy counter.
//!
//! A short monotonically increasing number handed out per deploy, with an
//! optional note attached to each value.

use crate::constants::{COUNT_KEY, ERR_NOTE_TOO_LONG, MAX_NOTE_LEN};
use crate::db::{keys, Db};
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct CountStore {
    db: Db,
}

impl CountStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Current counter value; initialises the counter to 1 on first read
    pub async fn get_current_count(&self) -> Result<i64> {
        match self.db.get(COUNT_KEY).await? {
            Some(value) => value
                .parse()
                .map_err(|_| AppError::CorruptRecord(format!("counter value {:?}", value))),
            None => self.get_next_count().await,
        }
    }

    /// Atomically increment and return the new value
    pub async fn get_next_count(&self) -> Result<i64> {
        let count = self.db.increment(COUNT_KEY, 1).await?;
        tracing::info!("Count advanced to {}", count);
        Ok(count)
    }

    pub async fn get_notes(&self, count_id: i64) -> Result<String> {
        Ok(self
            .db
            .get(&keys::count_note(count_id))
            .await?
            .unwrap_or_else(|| format!("There is no note for count id {}", count_id)))
    }

    /// Overwrite the note for a count value (the value need not have been issued)
    pub async fn set_notes(&self, count_id: i64, note: &str) -> Result<()> {
        if note.chars().count() > MAX_NOTE_LEN {
            return Err(AppError::TooLong(ERR_NOTE_TOO_LONG.to_string()));
        }
        self.db.set(&keys::count_note(count_id), note).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn setup() -> CountStore {
        CountStore::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_fresh_current_count_is_one() {
        let count = setup();

        assert_eq!(count.get_current_count().await.unwrap(), 1);
        // Reading again does not advance
        assert_eq!(count.get_current_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_next_count_steps_by_one() {
        let count = setup();

        let first = count.get_next_count().await.unwrap();
        let second = count.get_next_count().await.unwrap();
        assert_eq!(second - first, 1);
        assert_eq!(count.get_current_count().await.unwrap(), second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_counts_are_unique() {
        let count = setup();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let count = count.clone();
            handles.push(tokio::spawn(async move { count.get_next_count().await }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap().unwrap()));
        }
        assert_eq!(seen.len(), 50);
        assert_eq!(*seen.iter().max().unwrap(), 50);
    }

    #[tokio::test]
    async fn test_notes() {
        let count = setup();

        assert_eq!(
            count.get_notes(7).await.unwrap(),
            "There is no note for count id 7"
        );

        count.set_notes(7, "hotfix for checkout").await.unwrap();
        assert_eq!(count.get_notes(7).await.unwrap(), "hotfix for checkout");

        count.set_notes(7, "replaced").await.unwrap();
        assert_eq!(count.get_notes(7).await.unwrap(), "replaced");
    }

    #[tokio::test]
    async fn test_note_length_limit() {
        let count = setup();

        let exact = "n".repeat(MAX_NOTE_LEN);
        count.set_notes(3, &exact).await.unwrap();
        assert_eq!(count.get_notes(3).await.unwrap(), exact);

        let over = "n".repeat(MAX_NOTE_LEN + 1);
        assert!(matches!(
            count.set_notes(3, &over).await,
            Err(AppError::TooLong(_))
        ));
        assert_eq!(count.get_notes(3).await.unwrap(), exact);

        // Limit counts characters, not bytes
        let wide = "é".repeat(MAX_NOTE_LEN);
        count.set_notes(4, &wide).await.unwrap();
    }
}

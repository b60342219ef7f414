use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    models::Movie,
    store::{MovieStore, StoreError, StoreResult, ensure_valid_id},
};

/// Process-local twin of the `movies` table.
///
/// Each operation takes the table lock once, so the version check and the
/// increment in `update` happen atomically just like the single SQL statement.
#[derive(Default)]
pub struct InMemoryMovieStore {
    rows: RwLock<BTreeMap<i64, Movie>>,
    last_id: AtomicI64,
    statements: AtomicU64,
}

impl InMemoryMovieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of statements that reached the table.
    pub fn statements_executed(&self) -> u64 {
        self.statements.load(Ordering::SeqCst)
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn record_statement(&self) {
        self.statements.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MovieStore for InMemoryMovieStore {
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()> {
        self.record_statement();

        let mut rows = self.rows.write().await;
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;

        movie.id = id;
        movie.created_at = Utc::now();
        movie.version = 1;
        rows.insert(id, movie.clone());

        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Movie> {
        ensure_valid_id(id)?;
        self.record_statement();

        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound)
    }

    async fn update(&self, movie: &mut Movie) -> StoreResult<()> {
        self.record_statement();

        let mut rows = self.rows.write().await;
        let Some(stored) = rows
            .get_mut(&movie.id)
            .filter(|stored| stored.version == movie.version)
        else {
            return Err(StoreError::EditConflict);
        };

        stored.title.clone_from(&movie.title);
        stored.year = movie.year;
        stored.runtime = movie.runtime;
        stored.genres.clone_from(&movie.genres);
        stored.version += 1;

        movie.version = stored.version;
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        ensure_valid_id(id)?;
        self.record_statement();

        match self.rows.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::RecordNotFound),
        }
    }

    async fn health(&self) -> StoreResult<()> {
        Ok(())
    }
}

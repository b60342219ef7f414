//! Movie persistence with optimistic concurrency.
//!
//! Every operation is a single statement. `update` is a compare-and-swap on
//! the `version` column: it only applies when the caller's observed version is
//! still the stored one, and bumps it by exactly one.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Movie;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryMovieStore;
pub use postgres::PgMovieStore;

/// Upper bound for any single statement.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid id")]
    InvalidId,
    #[error("record not found")]
    RecordNotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StoreError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Storage(StorageError::Database(message.into()))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Persists a new movie and writes `id`, `created_at` and `version` back
    /// into `movie`.
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()>;

    async fn get(&self, id: i64) -> StoreResult<Movie>;

    /// Writes `movie` if its `version` is still current, then stores the new
    /// version back into it. A missing row and a stale version both surface as
    /// [`StoreError::EditConflict`].
    async fn update(&self, movie: &mut Movie) -> StoreResult<()>;

    async fn delete(&self, id: i64) -> StoreResult<()>;

    async fn health(&self) -> StoreResult<()>;
}

/// Rejects ids that can never exist before any statement is issued.
pub(crate) fn ensure_valid_id(id: i64) -> StoreResult<()> {
    if id < 1 {
        return Err(StoreError::InvalidId);
    }
    Ok(())
}

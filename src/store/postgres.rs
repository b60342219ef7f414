use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::{
    models::Movie,
    store::{
        MovieStore, QUERY_TIMEOUT, StorageError, StoreError, StoreResult, ensure_valid_id,
    },
};

#[derive(Clone)]
pub struct PgMovieStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgMovieStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Overrides the per-statement deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs one statement under the store deadline. Dropping the statement
    /// future on expiry cancels it.
    async fn run<T, F>(&self, statement: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, statement).await {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(StorageError::DeadlineExceeded(self.timeout).into()),
        }
    }
}

#[async_trait]
impl MovieStore for PgMovieStore {
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()> {
        let (id, created_at, version): (i64, DateTime<Utc>, i32) = self
            .run(
                sqlx::query_as(
                    r#"
                    INSERT INTO movies (title, year, runtime, genres)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, created_at, version
                    "#,
                )
                .bind(movie.title.as_str())
                .bind(movie.year)
                .bind(movie.runtime)
                .bind(movie.genres.as_slice())
                .fetch_one(&self.pool),
            )
            .await?;

        movie.id = id;
        movie.created_at = created_at;
        movie.version = version;
        debug!(movie_id = id, "movie inserted");
        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Movie> {
        ensure_valid_id(id)?;

        self.run(
            sqlx::query_as::<_, Movie>(
                r#"
                SELECT id, created_at, title, year, runtime, genres, version
                FROM movies
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(StoreError::RecordNotFound)
    }

    async fn update(&self, movie: &mut Movie) -> StoreResult<()> {
        let version: Option<i32> = self
            .run(
                sqlx::query_scalar(
                    r#"
                    UPDATE movies
                    SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
                    WHERE id = $5 AND version = $6
                    RETURNING version
                    "#,
                )
                .bind(movie.title.as_str())
                .bind(movie.year)
                .bind(movie.runtime)
                .bind(movie.genres.as_slice())
                .bind(movie.id)
                .bind(movie.version)
                .fetch_optional(&self.pool),
            )
            .await?;

        let Some(version) = version else {
            return Err(StoreError::EditConflict);
        };

        movie.version = version;
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        ensure_valid_id(id)?;

        let result = self
            .run(
                sqlx::query("DELETE FROM movies WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound);
        }

        Ok(())
    }

    async fn health(&self) -> StoreResult<()> {
        self.run(sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Database(db_error) => StoreError::database(db_error.to_string()),
        sqlx::Error::PoolTimedOut => StoreError::database("connection pool timed out"),
        other => StoreError::database(other.to_string()),
    }
}

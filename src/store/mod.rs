//! PostgreSQL persistence for movies, users and channels.
//!
//! All access goes through [`MovieStore`], a thin wrapper around a bounded
//! `sqlx` connection pool (1–20 connections; callers beyond the ceiling
//! queue on acquire). The public operations never panic and never bubble a
//! database error to a handler: integrity violations and connectivity
//! failures are logged here and surfaced as `false` / `None` / empty
//! results, so the calling handler only decides on user messaging.

mod models;

pub use models::{Channel, Movie, User};

use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use sqlx::postgres::{PgPool, PgPoolOptions};

const POOL_MIN_CONNECTIONS: u32 = 1;
const POOL_MAX_CONNECTIONS: u32 = 20;
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Internal store error; the public surface translates these into the
/// boolean/empty contracts described on each operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A UNIQUE constraint rejected the write (duplicate code or channel)
    #[error("unique constraint violated")]
    UniqueViolation,
    /// Any other database failure
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation;
        }
    }
    StoreError::Database(e)
}

/// Pooled store handle. Cheap to clone; constructed once in `main` and
/// injected into handlers (no ambient global).
#[derive(Clone)]
pub struct MovieStore {
    pool: PgPool,
}

impl MovieStore {
    /// Connect to PostgreSQL and build the connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable. Connection failure
    /// is fatal at startup; after startup all failures are contained.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;
        info!("Database connection pool created (1..{POOL_MAX_CONNECTIONS})");
        Ok(Self { pool })
    }

    /// Create required tables if absent and apply additive column
    /// migrations. Idempotent; safe to run on every startup.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS movies (
                id SERIAL PRIMARY KEY,
                movie_code VARCHAR(50) UNIQUE NOT NULL,
                video_id VARCHAR(255) NOT NULL,
                video_name VARCHAR(500),
                caption TEXT,
                views INTEGER NOT NULL DEFAULT 0,
                added_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Additive migration for databases created before captions existed
        sqlx::query("ALTER TABLE movies ADD COLUMN IF NOT EXISTS caption TEXT")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                user_id BIGINT PRIMARY KEY,
                joined_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                last_active TIMESTAMPTZ NOT NULL DEFAULT now(),
                is_blocked BOOLEAN NOT NULL DEFAULT FALSE
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS channels (
                id SERIAL PRIMARY KEY,
                channel_id BIGINT UNIQUE,
                channel_username VARCHAR(255),
                required BOOLEAN NOT NULL DEFAULT TRUE,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema is up to date");
        Ok(())
    }

    // ===== movies =====

    /// Insert a movie. Returns false (never an error) on a duplicate code
    /// or any other failure; the cause is logged.
    pub async fn add_movie(
        &self,
        code: &str,
        video_id: &str,
        name: &str,
        caption: Option<&str>,
    ) -> bool {
        let result: Result<(), StoreError> = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r"
                INSERT INTO movies (movie_code, video_id, video_name, caption)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(code)
            .bind(video_id)
            .bind(name)
            .bind(caption)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
            tx.commit().await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(StoreError::UniqueViolation) => {
                warn!(code, "duplicate movie code rejected");
                false
            }
            Err(e) => {
                error!(code, error = %e, "add_movie failed");
                false
            }
        }
    }

    /// Exact-match lookup by code. Absent on miss or failure.
    pub async fn movie_by_code(&self, code: &str) -> Option<Movie> {
        let result = sqlx::query_as::<_, Movie>(
            r"
            SELECT id, movie_code, video_id, video_name, caption, views, added_at
            FROM movies
            WHERE movie_code = $1
            ",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(movie) => movie,
            Err(e) => {
                error!(code, error = %e, "movie_by_code failed");
                None
            }
        }
    }

    /// Case-insensitive substring search over display names, capped at 10
    /// results in store order. Empty on failure.
    pub async fn search_movies(&self, query: &str) -> Vec<Movie> {
        let result = sqlx::query_as::<_, Movie>(
            r"
            SELECT id, movie_code, video_id, video_name, caption, views, added_at
            FROM movies
            WHERE video_name ILIKE $1
            LIMIT 10
            ",
        )
        .bind(format!("%{query}%"))
        .fetch_all(&self.pool)
        .await;

        result.unwrap_or_else(|e| {
            error!(query, error = %e, "search_movies failed");
            Vec::new()
        })
    }

    /// Atomic `views = views + 1`. Best-effort: failure is logged and
    /// swallowed, a lost count is acceptable.
    pub async fn increment_views(&self, code: &str) {
        let result = sqlx::query("UPDATE movies SET views = views + 1 WHERE movie_code = $1")
            .bind(code)
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            warn!(code, error = %e, "increment_views failed");
        }
    }

    /// Most-recently-added movies first. Empty on failure.
    pub async fn list_movies(&self, limit: i64) -> Vec<Movie> {
        let result = sqlx::query_as::<_, Movie>(
            r"
            SELECT id, movie_code, video_id, video_name, caption, views, added_at
            FROM movies
            ORDER BY id DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        result.unwrap_or_else(|e| {
            error!(error = %e, "list_movies failed");
            Vec::new()
        })
    }

    /// Total movie count; 0 on failure.
    pub async fn count_movies(&self) -> i64 {
        self.count("SELECT COUNT(*) FROM movies").await
    }

    /// Delete by code. True iff a row was removed.
    pub async fn delete_movie(&self, code: &str) -> bool {
        let result: Result<u64, StoreError> = async {
            let mut tx = self.pool.begin().await?;
            let done = sqlx::query("DELETE FROM movies WHERE movie_code = $1")
                .bind(code)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(done.rows_affected())
        }
        .await;

        match result {
            Ok(rows) => rows > 0,
            Err(e) => {
                error!(code, error = %e, "delete_movie failed");
                false
            }
        }
    }

    // ===== users =====

    /// Insert-if-absent; no-op on conflict.
    pub async fn add_user(&self, user_id: i64) {
        let result: Result<(), StoreError> = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("INSERT INTO users (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            error!(user_id, error = %e, "add_user failed");
        }
    }

    /// Update `last_active` to now; silent no-op for unknown users.
    pub async fn touch_user_activity(&self, user_id: i64) {
        let result: Result<(), StoreError> = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("UPDATE users SET last_active = now() WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            error!(user_id, error = %e, "touch_user_activity failed");
        }
    }

    /// Total user count; 0 on failure.
    pub async fn count_users(&self) -> i64 {
        self.count("SELECT COUNT(*) FROM users").await
    }

    /// Users whose last activity falls on the current calendar day
    /// (server timezone); 0 on failure.
    pub async fn count_active_users_today(&self) -> i64 {
        self.count("SELECT COUNT(*) FROM users WHERE last_active::date = CURRENT_DATE")
            .await
    }

    // ===== channels =====

    /// Insert a required channel. False on a duplicate channel id or any
    /// other failure.
    pub async fn add_channel(&self, channel_id: i64, username: Option<&str>, required: bool) -> bool {
        let result: Result<(), StoreError> = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r"
                INSERT INTO channels (channel_id, channel_username, required, is_active)
                VALUES ($1, $2, $3, TRUE)
                ",
            )
            .bind(channel_id)
            .bind(username)
            .bind(required)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
            tx.commit().await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(StoreError::UniqueViolation) => {
                warn!(channel_id, "duplicate channel rejected");
                false
            }
            Err(e) => {
                error!(channel_id, error = %e, "add_channel failed");
                false
            }
        }
    }

    /// Channels that gate access: required and active. Empty on failure,
    /// which fails open at this layer but the gate itself never sees an
    /// error — see `subscription` for the per-channel fail-closed policy.
    pub async fn required_channels(&self) -> Vec<Channel> {
        let result = sqlx::query_as::<_, Channel>(
            r"
            SELECT id, channel_id, channel_username, required, is_active
            FROM channels
            WHERE required = TRUE AND is_active = TRUE
            ",
        )
        .fetch_all(&self.pool)
        .await;

        result.unwrap_or_else(|e| {
            error!(error = %e, "required_channels failed");
            Vec::new()
        })
    }

    /// Hard delete. True iff a row was removed.
    pub async fn delete_channel(&self, channel_id: i64) -> bool {
        let result: Result<u64, StoreError> = async {
            let mut tx = self.pool.begin().await?;
            let done = sqlx::query("DELETE FROM channels WHERE channel_id = $1")
                .bind(channel_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(done.rows_affected())
        }
        .await;

        match result {
            Ok(rows) => rows > 0,
            Err(e) => {
                error!(channel_id, error = %e, "delete_channel failed");
                false
            }
        }
    }

    /// All channels in creation order. Empty on failure.
    pub async fn all_channels(&self) -> Vec<Channel> {
        let result = sqlx::query_as::<_, Channel>(
            r"
            SELECT id, channel_id, channel_username, required, is_active
            FROM channels
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await;

        result.unwrap_or_else(|e| {
            error!(error = %e, "all_channels failed");
            Vec::new()
        })
    }

    async fn count(&self, sql: &str) -> i64 {
        let result = sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool).await;
        result.unwrap_or_else(|e| {
            error!(sql, error = %e, "count query failed");
            0
        })
    }
}

//! SQLite-backed qualified sink.
//!
//! Two tables: `qualified_tokens` holds the current snapshot per identity
//! with indexed ranking columns, `qualified_history` is append-only. Each
//! snapshot is stored as JSON. Every write runs in one transaction.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::QualifiedSink;
use crate::types::{QualifiedToken, ScannerError};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS qualified_tokens (
        id            TEXT PRIMARY KEY,
        score         REAL NOT NULL,
        qualified_at  INTEGER NOT NULL,
        trading_ready INTEGER NOT NULL DEFAULT 0,
        snapshot      TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_qualified_rank
        ON qualified_tokens (score DESC, qualified_at DESC, id ASC)",
    "CREATE TABLE IF NOT EXISTS qualified_history (
        seq           INTEGER PRIMARY KEY AUTOINCREMENT,
        id            TEXT NOT NULL,
        qualified_at  INTEGER NOT NULL,
        snapshot      TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_history_id ON qualified_history (id, seq)",
];

const RANK_ORDER: &str = "ORDER BY score DESC, qualified_at DESC, id ASC";

pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Connect and create the schema if needed. `sqlite::memory:` is
    /// supported and kept on a single connection.
    pub async fn connect(url: &str) -> Result<Self, ScannerError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let in_memory = url.contains(":memory:");

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .min_connections(if in_memory { 1 } else { 0 })
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }
        debug!(url, "SQLite schema ready");

        Ok(Self { pool })
    }
}

fn decode(row: &SqliteRow) -> Result<QualifiedToken, ScannerError> {
    let snapshot: String = row.try_get("snapshot")?;
    let mut token: QualifiedToken = serde_json::from_str(&snapshot)?;
    if let Ok(flag) = row.try_get::<i64, _>("trading_ready") {
        token.trading_ready = flag != 0;
    }
    Ok(token)
}

#[async_trait]
impl QualifiedSink for SqliteSink {
    async fn upsert(&self, token: &QualifiedToken) -> Result<(), ScannerError> {
        let snapshot = serde_json::to_string(token)?;
        let micros = token.qualified_at.timestamp_micros();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO qualified_tokens (id, score, qualified_at, trading_ready, snapshot)
             VALUES (?1, ?2, ?3, 0, ?4)
             ON CONFLICT(id) DO UPDATE SET
                score = excluded.score,
                qualified_at = excluded.qualified_at,
                snapshot = excluded.snapshot",
        )
        .bind(&token.id)
        .bind(token.score)
        .bind(micros)
        .bind(&snapshot)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO qualified_history (id, qualified_at, snapshot) VALUES (?1, ?2, ?3)")
            .bind(&token.id)
            .bind(micros)
            .bind(&snapshot)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(id = %token.id, score = token.score, "Qualified token upserted");
        Ok(())
    }

    async fn history(&self, id: &str) -> Result<Vec<QualifiedToken>, ScannerError> {
        let rows = sqlx::query("SELECT snapshot FROM qualified_history WHERE id = ?1 ORDER BY seq ASC")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode).collect()
    }

    async fn query_best(&self, n: usize) -> Result<Vec<QualifiedToken>, ScannerError> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE qualified_tokens SET trading_ready = 0")
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "UPDATE qualified_tokens SET trading_ready = 1 WHERE id IN
                (SELECT id FROM qualified_tokens {RANK_ORDER} LIMIT ?1)"
        ))
        .bind(limit)
        .execute(&mut *tx)
        .await?;
        let rows = sqlx::query(&format!(
            "SELECT snapshot, trading_ready FROM qualified_tokens WHERE trading_ready = 1 {RANK_ORDER}"
        ))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.iter().map(decode).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<QualifiedToken>, ScannerError> {
        let row = sqlx::query("SELECT snapshot, trading_ready FROM qualified_tokens WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn revoke(&self, id: &str) -> Result<bool, ScannerError> {
        let res = sqlx::query("DELETE FROM qualified_tokens WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn ranked(&self, limit: usize) -> Result<Vec<QualifiedToken>, ScannerError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT snapshot, trading_ready FROM qualified_tokens {RANK_ORDER} LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode).collect()
    }

    async fn count(&self) -> Result<usize, ScannerError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM qualified_tokens")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as usize)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

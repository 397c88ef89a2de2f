//! SQLite 已用 Token 存储实现
//!
//! 使用 sqlx 提供异步支持；`try_consume` 在 `BEGIN IMMEDIATE` 事务内复核过期时间，
//! 再做一次条件写入 (`INSERT ... ON CONFLICT DO NOTHING`)，由主键约束保证原子性。
//! 写锁与清理的 `DELETE` 互斥，持锁后读取的时间不早于任何已提交的清理。

use super::backend::{ConsumeOutcome, UsedTokenStore};
use crate::clock::Clock;
use crate::error::StoreResult;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 数据库文件名，位于配置的 sqlite_path 目录下
pub const USED_TOKENS_DB_FILE: &str = "used_tokens.db";

/// SQLite 已用 Token 存储
pub struct SqliteUsedTokenStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SqliteUsedTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteUsedTokenStore").finish()
    }
}

impl SqliteUsedTokenStore {
    /// 在指定目录下打开（或创建）存储
    pub async fn new<P: AsRef<Path>>(db_dir: P, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let db_file = db_dir.as_ref().join(USED_TOKENS_DB_FILE);
        let pool = Self::init_pool(&db_file).await?;
        info!("Used-token store opened at {}", db_file.display());
        Ok(Self { pool, clock })
    }

    async fn init_pool<P: AsRef<Path>>(db_file: P) -> StoreResult<SqlitePool> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", db_file.as_ref().display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS used_tokens (
                nonce TEXT PRIMARY KEY NOT NULL,
                consumed_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_used_tokens_expires_at ON used_tokens(expires_at)",
        )
        .execute(&pool)
        .await?;

        Ok(pool)
    }

    /// 在已持有写锁的连接上复核并写入
    async fn consume_locked(
        conn: &mut SqliteConnection,
        nonce: &str,
        expires_at: i64,
        now: i64,
    ) -> StoreResult<ConsumeOutcome> {
        if expires_at < now {
            return Ok(ConsumeOutcome::Expired);
        }

        let result = sqlx::query(
            "INSERT INTO used_tokens (nonce, consumed_at, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(nonce) DO NOTHING",
        )
        .bind(nonce)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            Ok(ConsumeOutcome::Consumed)
        } else {
            Ok(ConsumeOutcome::AlreadyUsed)
        }
    }

    async fn rollback(conn: &mut SqliteConnection) {
        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            warn!("Failed to roll back used-token transaction: {}", e);
        }
    }
}

#[async_trait]
impl UsedTokenStore for SqliteUsedTokenStore {
    async fn try_consume(&self, nonce: &str, expires_at: i64) -> StoreResult<ConsumeOutcome> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let now = self.clock.now_millis();
        let outcome = match Self::consume_locked(&mut conn, nonce, expires_at, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                Self::rollback(&mut conn).await;
                return Err(e);
            }
        };

        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            Self::rollback(&mut conn).await;
            return Err(e.into());
        }

        Ok(outcome)
    }

    async fn reap_expired(&self, now_millis: i64) -> StoreResult<usize> {
        let result = sqlx::query("DELETE FROM used_tokens WHERE expires_at < ?")
            .bind(now_millis)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn len(&self) -> StoreResult<usize> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM used_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.0 as usize)
    }

    fn backend_info(&self) -> &'static str {
        "sqlite (sqlx async)"
    }
}

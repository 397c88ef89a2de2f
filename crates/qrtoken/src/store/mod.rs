//! 已用 Token 存储模块
//!
//! 提供两种后端：分片内存、SQLite
//!
//! # 设计
//!
//! - `UsedTokenStore` trait 定义统一的异步接口，`try_consume` 是唯一的共享可变操作
//! - 记录以 nonce 为键，保留到所属 Token 过期为止
//! - 通过 `StoreConfig` 配置选择和初始化后端

use std::path::Path;
use std::sync::Arc;

pub mod backend;
pub mod config;
pub mod memory;
pub mod sqlite;

use crate::clock::Clock;
use crate::error::StoreResult;

pub use backend::{ConsumeOutcome, UsedTokenStore};
pub use config::{StoreBackend, StoreConfig};
pub use memory::MemoryUsedTokenStore;
pub use sqlite::SqliteUsedTokenStore;

/// 已用记录：nonce -> (消费时间, 所属 Token 过期时间)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsedTokenRecord {
    pub consumed_at: i64,
    pub expires_at: i64,
}

/// 从配置创建存储实例
///
/// # Arguments
/// * `config` - 存储配置
/// * `db_dir` - 数据库文件目录（当 backend = "sqlite" 时使用）
/// * `clock` - 时钟
pub async fn from_config<P: AsRef<Path>>(
    config: &StoreConfig,
    db_dir: P,
    clock: Arc<dyn Clock>,
) -> StoreResult<Arc<dyn UsedTokenStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryUsedTokenStore::new(
            config.shard_count,
            config.lazy_reap_every,
            clock,
        ))),
        StoreBackend::Sqlite => Ok(Arc::new(SqliteUsedTokenStore::new(db_dir, clock).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_from_config_selects_backend() {
        let temp_dir = tempdir().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));

        let memory = from_config(&StoreConfig::default(), temp_dir.path(), clock.clone())
            .await
            .unwrap();
        assert!(memory.backend_info().starts_with("memory"));

        let sqlite_config = StoreConfig {
            backend: StoreBackend::Sqlite,
            ..Default::default()
        };
        let sqlite = from_config(&sqlite_config, temp_dir.path(), clock)
            .await
            .unwrap();
        assert!(sqlite.backend_info().starts_with("sqlite"));
        assert!(sqlite.is_empty().await.unwrap());
    }
}

//! 已用 Token 存储配置

use serde::{Deserialize, Serialize};

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 存储后端类型
    #[serde(default)]
    pub backend: StoreBackend,

    /// 内存后端分片数量
    ///
    /// 每个分片一把锁，分片越多，不同 Token 之间的锁竞争越少
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// 后台清理间隔（秒），0 表示不启动后台清理
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// 惰性清理触发频率：每 N 次消费清理一次被触及的分片，0 表示关闭
    #[serde(default = "default_lazy_reap_every")]
    pub lazy_reap_every: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            shard_count: default_shard_count(),
            reap_interval_secs: default_reap_interval_secs(),
            lazy_reap_every: default_lazy_reap_every(),
        }
    }
}

/// 存储后端类型枚举
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存（重启后丢失已用记录）
    #[default]
    Memory,
    /// SQLite 数据库（文件位于 sqlite_path 目录下）
    Sqlite,
}

fn default_shard_count() -> usize {
    16
}

fn default_reap_interval_secs() -> u64 {
    30
}

fn default_lazy_reap_every() -> u64 {
    256
}

impl StoreConfig {
    /// 校验配置，返回发现的问题列表
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.backend == StoreBackend::Memory && self.shard_count == 0 {
            errors.push("services.qr.store.shard_count must be greater than 0".to_string());
        }
        if self.reap_interval_secs == 0 {
            errors.push(
                "Warning: services.qr.store.reap_interval_secs = 0 disables background reaping"
                    .to_string(),
            );
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_store_config() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.shard_count, 16);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_deserialize_store_config() {
        let config: StoreConfig = toml::from_str(
            r#"
            backend = "sqlite"
            reap_interval_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, StoreBackend::Sqlite);
        assert_eq!(config.reap_interval_secs, 5);
        assert_eq!(config.shard_count, 16);
    }

    #[test]
    fn test_validate_zero_shards() {
        let config = StoreConfig {
            shard_count: 0,
            reap_interval_secs: 0,
            ..Default::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("shard_count")));
        assert!(errors.iter().any(|e| e.starts_with("Warning:")));
    }
}

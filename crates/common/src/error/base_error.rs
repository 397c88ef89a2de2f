//! 顶层错误枚举
//!
//! 聚合配置加载与指标注册的错误

use super::ConfigError;
use thiserror::Error;

/// 顶层错误枚举
#[derive(Error, Debug)]
pub enum BaseError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 指标注册错误
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// 统一的 Result 类型
pub type Result<T> = std::result::Result<T, BaseError>;

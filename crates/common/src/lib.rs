//! qrpass 基础设施库
//!
//! 为签到服务提供配置加载、分层错误类型与 Prometheus 指标注册

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types for convenience
pub use config::QrpassConfig;
pub use error::{BaseError, ConfigError, Result};

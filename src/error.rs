//! 统一错误处理模型
//!
//! 提供主应用 qrpass 的顶层错误类型，聚合所有子模块和依赖 crate 的错误

use thiserror::Error;

/// 主应用的统一错误枚举
#[derive(Debug, Error)]
pub enum Error {
    // ========== 配置相关错误 ==========
    /// 配置文件相关错误
    #[error("Configuration error: {0}")]
    Config(#[from] qrpass_common::ConfigError),

    // ========== 基础库错误 ==========
    /// 基础库错误（配置加载、指标注册）
    #[error("{0}")]
    Base(Box<qrpass_common::BaseError>),

    // ========== 服务相关错误 ==========
    /// QR Token 组件错误
    #[error("QR token error: {0}")]
    Qr(#[from] qrtoken::QrError),

    /// Token 签发错误
    #[error("Token issue error: {0}")]
    Issue(#[from] qrtoken::IssueError),

    // ========== 系统级错误 ==========
    /// I/O 操作错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化/反序列化错误
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // ========== 业务逻辑错误 ==========
    /// 服务启动失败
    #[error("Service startup failed: {message}")]
    ServiceStartup { message: String },

    /// 服务配置验证失败
    #[error("Service configuration validation failed: {message}")]
    ServiceValidation { message: String },

    // ========== 通用错误 ==========
    /// Anyhow 错误兼容层
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    /// 自定义错误消息
    #[error("Application error: {message}")]
    Custom { message: String },
}

impl From<qrpass_common::BaseError> for Error {
    fn from(err: qrpass_common::BaseError) -> Self {
        Error::Base(Box::new(err))
    }
}

/// 统一的 Result 类型
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 创建自定义错误
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    /// 创建服务启动失败错误
    pub fn service_startup(message: impl Into<String>) -> Self {
        Self::ServiceStartup {
            message: message.into(),
        }
    }

    /// 创建服务配置验证失败错误
    pub fn service_validation(message: impl Into<String>) -> Self {
        Self::ServiceValidation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::custom("test error");
        assert!(matches!(err, Error::Custom { .. }));

        let err = Error::service_startup("bind failed");
        assert_eq!(err.to_string(), "Service startup failed: bind failed");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = qrpass_common::BaseError::from(qrpass_common::ConfigError::MissingField {
            field: "services.qr".to_string(),
        })
        .into();
        assert!(matches!(err, Error::Base(_)));
        assert!(err.to_string().contains("services.qr"));

        let err: Error = qrtoken::IssueError::invalid_ttl(0, "must be positive").into();
        assert!(err.to_string().contains("must be positive"));
    }
}

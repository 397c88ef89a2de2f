//! QR Token 错误定义
//!
//! 按生命周期阶段划分：密钥加载、编码、解码、签发、已用记录存储

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// 密钥加载错误
#[derive(Error, Debug)]
pub enum KeyError {
    /// 密钥格式无法识别（长度既不是 hex 也不是 base64）
    #[error("Invalid secret key length: expected 64 hex chars or 44 base64 chars, got {0}")]
    InvalidLength(usize),

    #[error("Invalid secret key hex format: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Invalid secret key base64 format: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// 解码后字节数不为 32
    #[error("Invalid secret key size: expected 32 bytes, got {0}")]
    InvalidSize(usize),

    /// 从环境变量或文件读取失败
    #[error("Failed to read secret key from {source_name}: {reason}")]
    Unreadable { source_name: String, reason: String },
}

/// Token 编码错误
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Encryption failed: {0}")]
    Encryption(String),
}

/// Token 解码错误
///
/// 两种情况都是终态、不可重试，视为潜在攻击信号
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// 字符串无法拆分为 iv / 密文 / tag
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// 认证 tag 校验失败（伪造或篡改）
    #[error("Token authentication failed")]
    AuthenticationFailed,
}

/// Token 签发错误
#[derive(Error, Debug)]
pub enum IssueError {
    /// TTL 非正数、超过上限或导致时间戳溢出
    #[error("Invalid TTL {ttl_seconds}s: {reason}")]
    InvalidTtl { ttl_seconds: i64, reason: String },

    #[error("Token encoding failed: {0}")]
    Encoding(#[from] EncodeError),
}

impl IssueError {
    pub fn invalid_ttl(ttl_seconds: i64, reason: impl Into<String>) -> Self {
        Self::InvalidTtl {
            ttl_seconds,
            reason: reason.into(),
        }
    }

    /// 稳定的错误码，供边界层使用
    pub fn code(&self) -> &'static str {
        match self {
            IssueError::InvalidTtl { .. } => "INVALID_TTL",
            IssueError::Encoding(_) => "ENCODING_FAILED",
        }
    }
}

/// 已用 Token 存储错误
///
/// 存储读写失败不代表 Token 已被消费，调用方应退避重试
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Used-token store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// qrtoken crate 顶层错误，用于组件装配阶段
#[derive(Error, Debug)]
pub enum QrError {
    #[error("Secret key error: {0}")]
    Key(#[from] KeyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type QrResult<T> = Result<T, QrError>;

/// HTTP 边界错误
#[derive(Error, Debug)]
pub enum ApiError {
    /// 请求缺少必填字段
    #[error("Missing required field(s): {}", .0.join(", "))]
    MissingField(Vec<String>),

    /// 请求参数不合法
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// 稳定的错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingField(_) => "MISSING_FIELD",
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::Issue(e) => e.code(),
            ApiError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingField(_)
            | ApiError::InvalidRequest(_)
            | ApiError::Issue(IssueError::InvalidTtl { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Issue(IssueError::Encoding(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Issue(IssueError::Encoding(_)) => {
                // 不向客户端暴露内部错误详情
                tracing::error!("Internal error: {:?}", self);
                "Internal server error".to_string()
            }
            ApiError::Store(_) => {
                tracing::error!("Store error: {:?}", self);
                "Service temporarily unavailable, please retry".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "code": self.code(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

//! Token 数据结构
//!
//! `TokenPayload` 是加密前的明文结构，`Token` 是交给客户端的不透明字符串

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// nonce 固定长度（32 个十六进制字符，即 128 bit）
pub const NONCE_LEN: usize = 32;

/// Token 明文结构
///
/// 字段名使用短键，控制二维码内容长度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// 活动 ID，对核心逻辑不透明，逐字节往返
    #[serde(rename = "eid")]
    pub event_id: String,

    /// 签发时间 (epoch milliseconds)
    #[serde(rename = "iat")]
    pub issued_at: i64,

    /// 过期时间 (epoch milliseconds)
    #[serde(rename = "exp")]
    pub expires_at: i64,

    /// 每次签发唯一的随机标识，作为防重放键
    #[serde(rename = "n")]
    pub nonce: String,
}

impl TokenPayload {
    /// 使用新生成的 nonce 构造 payload
    ///
    /// 调用方负责保证 `expires_at` 由合法 TTL 计算得到
    pub fn new(event_id: impl Into<String>, issued_at: i64, expires_at: i64) -> Self {
        Self {
            event_id: event_id.into(),
            issued_at,
            expires_at,
            nonce: generate_nonce(),
        }
    }

    /// 在给定时刻是否已过期
    ///
    /// 恰好等于 `expires_at` 的时刻仍然有效
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis > self.expires_at
    }
}

/// 生成固定长度的随机 nonce
pub fn generate_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 不透明 Token 字符串（URL 安全）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 签发结果：Token 以及签发方已知的公开元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: Token,
    pub event_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_creation() {
        let payload = TokenPayload::new("event-A", 1_000, 61_000);

        assert_eq!(payload.event_id, "event-A");
        assert_eq!(payload.issued_at, 1_000);
        assert_eq!(payload.expires_at, 61_000);
        assert_eq!(payload.nonce.len(), NONCE_LEN);
    }

    #[test]
    fn test_nonce_unique_per_payload() {
        let a = TokenPayload::new("event-A", 0, 1_000);
        let b = TokenPayload::new("event-A", 0, 1_000);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a, b);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let payload = TokenPayload::new("event-A", 0, 1_000);
        assert!(!payload.is_expired_at(999));
        assert!(!payload.is_expired_at(1_000));
        assert!(payload.is_expired_at(1_001));
    }

    #[test]
    fn test_payload_short_keys() {
        let payload = TokenPayload::new("e", 1, 2);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"eid\":\"e\""));
        assert!(json.contains("\"iat\":1"));
        assert!(json.contains("\"exp\":2"));
        assert!(json.contains("\"n\":"));
    }

    #[test]
    fn test_token_serializes_as_plain_string() {
        let token = Token::from("abc-_".to_string());
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"abc-_\"");
        assert_eq!(token.to_string(), "abc-_");
    }
}

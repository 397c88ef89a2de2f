//! 校验网关
//!
//! 把未类型化的外部输入转换为对管理器的调用，并把 `Outcome`
//! 映射到封闭的响应词汇（错误码 + 描述 + 建议客户端动作）。
//! 本层不做任何安全判断。

use crate::manager::{Outcome, TokenLifecycleManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// 校验结果码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    /// 校验通过，Token 已被消费
    Ok,
    /// 缺少 event_id 或 token（前置条件失败，未调用管理器）
    MissingField,
    /// Token 格式错误或认证失败
    InvalidToken,
    /// Token 属于其他活动
    WrongEvent,
    /// Token 已过期
    Expired,
    /// Token 已被使用
    Replay,
    /// 已用存储暂不可用
    StoreUnavailable,
}

impl ResultCode {
    /// 与序列化形式一致的字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::MissingField => "MISSING_FIELD",
            ResultCode::InvalidToken => "INVALID_TOKEN",
            ResultCode::WrongEvent => "WRONG_EVENT",
            ResultCode::Expired => "EXPIRED",
            ResultCode::Replay => "REPLAY",
            ResultCode::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

/// 建议客户端采取的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAction {
    Proceed,
    FixRequest,
    RequestNewToken,
    UseMatchingEvent,
    RetryLater,
}

/// 网关响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub code: ResultCode,
    pub message: String,
    pub action: ClientAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
}

impl GatewayResponse {
    fn new(code: ResultCode, message: impl Into<String>, action: ClientAction) -> Self {
        Self {
            code,
            message: message.into(),
            action,
            event_id: None,
            issued_at: None,
            expires_at: None,
            missing_fields: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ResultCode::Ok
    }

    /// 相同请求稍后重试是否可能成功
    pub fn is_retryable(&self) -> bool {
        self.code == ResultCode::StoreUnavailable
    }

    /// 前置条件失败
    pub fn missing(fields: Vec<String>) -> Self {
        let mut response = Self::new(
            ResultCode::MissingField,
            format!("Missing required field(s): {}", fields.join(", ")),
            ClientAction::FixRequest,
        );
        response.missing_fields = fields;
        response
    }

    pub fn store_unavailable() -> Self {
        Self::new(
            ResultCode::StoreUnavailable,
            "Check-in temporarily unavailable, please retry",
            ClientAction::RetryLater,
        )
    }
}

impl From<Outcome> for GatewayResponse {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Malformed => Self::new(
                ResultCode::InvalidToken,
                "QR code is not a valid check-in token",
                ClientAction::RequestNewToken,
            ),
            Outcome::TamperedOrForged => Self::new(
                ResultCode::InvalidToken,
                "QR code could not be verified",
                ClientAction::RequestNewToken,
            ),
            Outcome::EventMismatch { .. } => Self::new(
                ResultCode::WrongEvent,
                "QR code belongs to a different event",
                ClientAction::UseMatchingEvent,
            ),
            Outcome::Expired { expires_at } => {
                let mut response = Self::new(
                    ResultCode::Expired,
                    "QR code has expired",
                    ClientAction::RequestNewToken,
                );
                response.expires_at = Some(expires_at);
                response
            }
            Outcome::AlreadyUsed => Self::new(
                ResultCode::Replay,
                "QR code has already been used",
                ClientAction::RequestNewToken,
            ),
            Outcome::Valid {
                event_id,
                issued_at,
                expires_at,
            } => {
                let mut response =
                    Self::new(ResultCode::Ok, "Check-in successful", ClientAction::Proceed);
                response.event_id = Some(event_id);
                response.issued_at = Some(issued_at);
                response.expires_at = Some(expires_at);
                response
            }
        }
    }
}

/// 校验网关
#[derive(Debug, Clone)]
pub struct ValidationGateway {
    manager: Arc<TokenLifecycleManager>,
}

impl ValidationGateway {
    pub fn new(manager: Arc<TokenLifecycleManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<TokenLifecycleManager> {
        &self.manager
    }

    /// 校验外部请求字段
    ///
    /// 空字符串等同于缺失；字段值不做裁剪或大小写归一
    pub async fn validate(&self, event_id: Option<&str>, token: Option<&str>) -> GatewayResponse {
        let event_id = event_id.filter(|v| !v.is_empty());
        let token = token.filter(|v| !v.is_empty());

        let (event_id, token) = match (event_id, token) {
            (Some(event_id), Some(token)) => (event_id, token),
            (event_id, token) => {
                let mut missing = Vec::new();
                if event_id.is_none() {
                    missing.push("event_id".to_string());
                }
                if token.is_none() {
                    missing.push("token".to_string());
                }
                return GatewayResponse::missing(missing);
            }
        };

        match self.manager.validate_and_consume(token, event_id).await {
            Ok(outcome) => outcome.into(),
            Err(e) => {
                error!("Used-token store failure during validation: {}", e);
                GatewayResponse::store_unavailable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::codec::TokenCodec;
    use crate::manager::TtlPolicy;
    use crate::store::MemoryUsedTokenStore;

    fn gateway() -> ValidationGateway {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(MemoryUsedTokenStore::new(2, 0, clock.clone()));
        let codec = TokenCodec::from_key_str(&TokenCodec::generate_key()).unwrap();
        ValidationGateway::new(Arc::new(TokenLifecycleManager::new(
            codec,
            store,
            clock,
            TtlPolicy::default(),
        )))
    }

    #[tokio::test]
    async fn test_missing_fields_reported_before_manager() {
        let gateway = gateway();

        let both = gateway.validate(None, Some("")).await;
        assert_eq!(both.code, ResultCode::MissingField);
        assert_eq!(both.missing_fields, vec!["event_id", "token"]);
        assert_eq!(both.action, ClientAction::FixRequest);

        let token_only = gateway.validate(Some("event-A"), None).await;
        assert_eq!(token_only.missing_fields, vec!["token"]);
        assert!(!token_only.is_retryable());
    }

    #[tokio::test]
    async fn test_valid_then_replay() {
        let gateway = gateway();
        let issued = gateway.manager().issue("event-A", 60).unwrap();

        let ok = gateway
            .validate(Some("event-A"), Some(issued.token.as_str()))
            .await;
        assert!(ok.is_ok());
        assert_eq!(ok.event_id.as_deref(), Some("event-A"));
        assert_eq!(ok.issued_at, Some(issued.issued_at));
        assert_eq!(ok.expires_at, Some(issued.expires_at));

        let replay = gateway
            .validate(Some("event-A"), Some(issued.token.as_str()))
            .await;
        assert_eq!(replay.code, ResultCode::Replay);
    }

    #[test]
    fn test_outcome_mapping_is_total() {
        let cases = [
            (Outcome::Malformed, ResultCode::InvalidToken),
            (Outcome::TamperedOrForged, ResultCode::InvalidToken),
            (
                Outcome::EventMismatch {
                    actual_event_id: "x".to_string(),
                },
                ResultCode::WrongEvent,
            ),
            (Outcome::Expired { expires_at: 5 }, ResultCode::Expired),
            (Outcome::AlreadyUsed, ResultCode::Replay),
        ];
        for (outcome, code) in cases {
            assert_eq!(GatewayResponse::from(outcome).code, code);
        }

        let expired = GatewayResponse::from(Outcome::Expired { expires_at: 5 });
        assert_eq!(expired.expires_at, Some(5));
    }

    #[test]
    fn test_response_serialization() {
        let json = serde_json::to_value(GatewayResponse::store_unavailable()).unwrap();
        assert_eq!(json["code"], "STORE_UNAVAILABLE");
        assert_eq!(json["action"], "retry_later");
        assert!(json.get("event_id").is_none());
        assert!(json.get("missing_fields").is_none());
    }
}

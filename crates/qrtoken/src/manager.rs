//! Token 生命周期管理
//!
//! 组合编解码器与已用存储：签发带过期时间的 Token，执行原子的"校验并消费"

use crate::clock::Clock;
use crate::codec::TokenCodec;
use crate::error::{DecodeError, IssueError, StoreResult};
use crate::payload::{IssuedToken, TokenPayload};
use crate::store::{ConsumeOutcome, UsedTokenStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// TTL 策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// 未指定 TTL 时使用的默认值（秒）
    pub default_ttl_seconds: i64,
    /// TTL 上限（秒），0 表示不限制
    pub max_ttl_seconds: i64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            max_ttl_seconds: 0,
        }
    }
}

/// 校验结果
///
/// 检查顺序: Malformed → TamperedOrForged → EventMismatch → Expired → AlreadyUsed → Valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 字符串无法解析
    Malformed,
    /// 认证失败
    TamperedOrForged,
    /// 解密成功但活动 ID 不匹配，Token 未被消费
    EventMismatch { actual_event_id: String },
    /// 已过期，不会写入已用存储
    Expired { expires_at: i64 },
    /// 已被消费（重放）
    AlreadyUsed,
    /// 本次调用成为唯一消费者
    Valid {
        event_id: String,
        issued_at: i64,
        expires_at: i64,
    },
}

impl Outcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid { .. })
    }

    /// 用于日志与指标的稳定标签
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Malformed => "malformed",
            Outcome::TamperedOrForged => "tampered_or_forged",
            Outcome::EventMismatch { .. } => "event_mismatch",
            Outcome::Expired { .. } => "expired",
            Outcome::AlreadyUsed => "already_used",
            Outcome::Valid { .. } => "valid",
        }
    }
}

/// 批量签发的单项请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub event_id: String,
    /// 为空时使用默认 TTL
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// 批量签发的单项结果
#[derive(Debug)]
pub struct BatchEntry {
    pub event_id: String,
    pub result: Result<IssuedToken, IssueError>,
}

/// Token 生命周期管理器
///
/// 唯一感知"期望活动"语义的组件
pub struct TokenLifecycleManager {
    codec: TokenCodec,
    store: Arc<dyn UsedTokenStore>,
    clock: Arc<dyn Clock>,
    policy: TtlPolicy,
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("codec", &self.codec)
            .field("store", &self.store.backend_info())
            .field("policy", &self.policy)
            .finish()
    }
}

impl TokenLifecycleManager {
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn UsedTokenStore>,
        clock: Arc<dyn Clock>,
        policy: TtlPolicy,
    ) -> Self {
        Self {
            codec,
            store,
            clock,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn UsedTokenStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    /// 签发 Token
    ///
    /// `ttl_seconds` 必须为正数且不超过策略上限
    pub fn issue(&self, event_id: &str, ttl_seconds: i64) -> Result<IssuedToken, IssueError> {
        self.check_ttl(ttl_seconds)?;

        let issued_at = self.clock.now_millis();
        let expires_at = ttl_seconds
            .checked_mul(1000)
            .and_then(|ttl_millis| issued_at.checked_add(ttl_millis))
            .ok_or_else(|| IssueError::invalid_ttl(ttl_seconds, "expiry timestamp overflows"))?;

        let payload = TokenPayload::new(event_id, issued_at, expires_at);
        let token = self.codec.encode(&payload)?;

        debug!(
            "Issued token for event {} (nonce={}, expires_at={})",
            event_id, payload.nonce, expires_at
        );

        Ok(IssuedToken {
            token,
            event_id: payload.event_id,
            issued_at,
            expires_at,
        })
    }

    /// 使用默认 TTL 签发
    pub fn issue_default(&self, event_id: &str) -> Result<IssuedToken, IssueError> {
        self.issue(event_id, self.policy.default_ttl_seconds)
    }

    /// 批量签发，所有活动使用同一 TTL
    ///
    /// 单项失败不影响其他项，结果顺序与输入一致
    pub fn issue_batch<S: AsRef<str>>(&self, event_ids: &[S], ttl_seconds: i64) -> Vec<BatchEntry> {
        event_ids
            .iter()
            .map(|event_id| BatchEntry {
                event_id: event_id.as_ref().to_string(),
                result: self.issue(event_id.as_ref(), ttl_seconds),
            })
            .collect()
    }

    /// 批量签发，每项可指定自己的 TTL
    pub fn issue_batch_items(&self, items: &[BatchItem]) -> Vec<BatchEntry> {
        items
            .iter()
            .map(|item| BatchEntry {
                event_id: item.event_id.clone(),
                result: self.issue(
                    &item.event_id,
                    item.ttl_seconds.unwrap_or(self.policy.default_ttl_seconds),
                ),
            })
            .collect()
    }

    /// 校验并消费 Token
    ///
    /// 只读检查全部通过后才调用 `try_consume`，
    /// 错误活动或已过期的 Token 永远不会被记录为已用。
    /// 存储故障以 `Err` 返回，不会被当作 `AlreadyUsed`。
    pub async fn validate_and_consume(
        &self,
        token: &str,
        expected_event_id: &str,
    ) -> StoreResult<Outcome> {
        let payload = match self.codec.decode(token) {
            Ok(payload) => payload,
            Err(DecodeError::Malformed(reason)) => {
                warn!("Rejected malformed token: {}", reason);
                return Ok(Outcome::Malformed);
            }
            Err(DecodeError::AuthenticationFailed) => {
                warn!(
                    "Rejected token failing authentication (expected event {})",
                    expected_event_id
                );
                return Ok(Outcome::TamperedOrForged);
            }
        };

        if payload.event_id != expected_event_id {
            debug!(
                "Token for event {} presented at event {}",
                payload.event_id, expected_event_id
            );
            return Ok(Outcome::EventMismatch {
                actual_event_id: payload.event_id,
            });
        }

        if payload.is_expired_at(self.clock.now_millis()) {
            debug!("Token nonce={} expired at {}", payload.nonce, payload.expires_at);
            return Ok(Outcome::Expired {
                expires_at: payload.expires_at,
            });
        }

        match self
            .store
            .try_consume(&payload.nonce, payload.expires_at)
            .await?
        {
            ConsumeOutcome::Consumed => {}
            ConsumeOutcome::AlreadyUsed => {
                warn!("Replay of consumed token nonce={}", payload.nonce);
                return Ok(Outcome::AlreadyUsed);
            }
            ConsumeOutcome::Expired => {
                debug!(
                    "Token nonce={} expired at {} before it could be consumed",
                    payload.nonce, payload.expires_at
                );
                return Ok(Outcome::Expired {
                    expires_at: payload.expires_at,
                });
            }
        }

        debug!(
            "Token nonce={} consumed for event {}",
            payload.nonce, payload.event_id
        );
        Ok(Outcome::Valid {
            event_id: payload.event_id,
            issued_at: payload.issued_at,
            expires_at: payload.expires_at,
        })
    }

    fn check_ttl(&self, ttl_seconds: i64) -> Result<(), IssueError> {
        if ttl_seconds <= 0 {
            return Err(IssueError::invalid_ttl(ttl_seconds, "must be a positive integer"));
        }
        if self.policy.max_ttl_seconds > 0 && ttl_seconds > self.policy.max_ttl_seconds {
            return Err(IssueError::invalid_ttl(
                ttl_seconds,
                format!("exceeds maximum of {}s", self.policy.max_ttl_seconds),
            ));
        }
        Ok(())
    }
}

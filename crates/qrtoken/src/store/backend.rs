//! 已用 Token 存储后端抽象接口

use crate::error::StoreResult;
use async_trait::async_trait;

/// 一次 `try_consume` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// 首次消费，调用方成为唯一的消费者
    Consumed,
    /// 已被消费过（重放）
    AlreadyUsed,
    /// 在存储内复核时已过期，未写入记录
    Expired,
}

/// 已用 Token 存储
///
/// 所有后端（内存、SQLite）都需要实现此 trait。
/// 以 nonce 为键，记录到其所属 Token 过期为止。
#[async_trait]
pub trait UsedTokenStore: Send + Sync {
    /// 原子地复核过期时间、检查并记录 nonce
    ///
    /// 过期复核与写入在同一临界区内完成：清理只会移除 `expires_at < now`
    /// 的记录，因此被清理过的 nonce 在这里必然判定为 `Expired`，不会被再次写入。
    ///
    /// # Returns
    /// * `Ok(Consumed)` - 首次消费
    /// * `Ok(AlreadyUsed)` - 重放
    /// * `Ok(Expired)` - 复核时 `now > expires_at`
    /// * `Err(...)` - 存储不可用，不能视为已消费
    ///
    /// 对同一 nonce 的并发调用至多一个返回 `Consumed`
    async fn try_consume(&self, nonce: &str, expires_at: i64) -> StoreResult<ConsumeOutcome>;

    /// 清理 `expires_at < now_millis` 的记录
    ///
    /// # Returns
    /// 被清理的记录数量
    async fn reap_expired(&self, now_millis: i64) -> StoreResult<usize>;

    /// 当前记录数量（包含尚未被清理的过期记录）
    async fn len(&self) -> StoreResult<usize>;

    async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// 后端描述信息，用于日志与健康检查
    fn backend_info(&self) -> &'static str;
}

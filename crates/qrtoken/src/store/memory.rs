//! 分片内存存储实现
//!
//! nonce 空间按 XxHash64 分片，每个分片一把 `Mutex`。
//! `try_consume` 在单个分片锁内完成过期复核、检查与插入。

use super::UsedTokenRecord;
use super::backend::{ConsumeOutcome, UsedTokenStore};
use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use twox_hash::XxHash64;

type Shard = Mutex<HashMap<String, UsedTokenRecord>>;

/// 内存已用 Token 存储
pub struct MemoryUsedTokenStore {
    shards: Vec<Shard>,
    clock: Arc<dyn Clock>,
    /// 消费计数器（用于惰性清理触发）
    consume_counter: AtomicU64,
    lazy_reap_every: u64,
}

impl std::fmt::Debug for MemoryUsedTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryUsedTokenStore")
            .field("shards", &self.shards.len())
            .field("lazy_reap_every", &self.lazy_reap_every)
            .finish()
    }
}

impl MemoryUsedTokenStore {
    /// 创建存储实例
    ///
    /// `shard_count` 为 0 时按 1 处理；`lazy_reap_every` 为 0 时关闭惰性清理
    pub fn new(shard_count: usize, lazy_reap_every: u64, clock: Arc<dyn Clock>) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect(),
            clock,
            consume_counter: AtomicU64::new(0),
            lazy_reap_every,
        }
    }

    fn shard_index(&self, nonce: &str) -> usize {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(nonce.as_bytes());
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    fn lock(shard: &Shard) -> StoreResult<MutexGuard<'_, HashMap<String, UsedTokenRecord>>> {
        shard
            .lock()
            .map_err(|_| StoreError::Unavailable("used-token shard lock poisoned".to_string()))
    }

    fn should_lazy_reap(&self) -> bool {
        if self.lazy_reap_every == 0 {
            return false;
        }
        let count = self.consume_counter.fetch_add(1, Ordering::Relaxed);
        count % self.lazy_reap_every == self.lazy_reap_every - 1
    }
}

#[async_trait]
impl UsedTokenStore for MemoryUsedTokenStore {
    async fn try_consume(&self, nonce: &str, expires_at: i64) -> StoreResult<ConsumeOutcome> {
        let lazy_reap = self.should_lazy_reap();

        let mut shard = Self::lock(&self.shards[self.shard_index(nonce)])?;
        // 持锁后读取时间，晚于任何已完成的清理
        let now = self.clock.now_millis();

        if expires_at < now {
            return Ok(ConsumeOutcome::Expired);
        }

        if lazy_reap {
            let before = shard.len();
            shard.retain(|_, record| record.expires_at >= now);
            let reaped = before - shard.len();
            if reaped > 0 {
                debug!("Lazy reap removed {} used-token records", reaped);
            }
        }

        if shard.contains_key(nonce) {
            return Ok(ConsumeOutcome::AlreadyUsed);
        }

        shard.insert(
            nonce.to_string(),
            UsedTokenRecord {
                consumed_at: now,
                expires_at,
            },
        );
        Ok(ConsumeOutcome::Consumed)
    }

    async fn reap_expired(&self, now_millis: i64) -> StoreResult<usize> {
        let mut reaped = 0;
        // 逐个分片加锁，避免长时间阻塞前台消费
        for shard in &self.shards {
            let mut shard = Self::lock(shard)?;
            let before = shard.len();
            shard.retain(|_, record| record.expires_at >= now_millis);
            reaped += before - shard.len();
        }
        Ok(reaped)
    }

    async fn len(&self) -> StoreResult<usize> {
        let mut total = 0;
        for shard in &self.shards {
            total += Self::lock(shard)?.len();
        }
        Ok(total)
    }

    fn backend_info(&self) -> &'static str {
        "memory (sharded)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store(clock: &ManualClock) -> MemoryUsedTokenStore {
        MemoryUsedTokenStore::new(4, 0, Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_first_consume_wins() {
        let clock = ManualClock::new(0);
        let store = store(&clock);

        assert_eq!(
            store.try_consume("n1", 1_000).await.unwrap(),
            ConsumeOutcome::Consumed
        );
        assert_eq!(
            store.try_consume("n1", 1_000).await.unwrap(),
            ConsumeOutcome::AlreadyUsed
        );
        assert_eq!(
            store.try_consume("n2", 1_000).await.unwrap(),
            ConsumeOutcome::Consumed
        );
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reap_only_removes_expired() {
        let clock = ManualClock::new(0);
        let store = store(&clock);

        store.try_consume("short", 100).await.unwrap();
        store.try_consume("long", 10_000).await.unwrap();

        assert_eq!(store.reap_expired(100).await.unwrap(), 0);
        assert_eq!(store.reap_expired(101).await.unwrap(), 1);
        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(
            store.try_consume("long", 10_000).await.unwrap(),
            ConsumeOutcome::AlreadyUsed
        );
    }

    #[tokio::test]
    async fn test_lazy_reap_shrinks_touched_shard() {
        let clock = ManualClock::new(0);
        // 单分片，每次消费都触发惰性清理
        let store = MemoryUsedTokenStore::new(1, 1, Arc::new(clock.clone()));

        for i in 0..50 {
            store.try_consume(&format!("n{i}"), 500).await.unwrap();
        }
        assert_eq!(store.len().await.unwrap(), 50);

        clock.set(1_000);
        store.try_consume("fresh", 5_000).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_consume_single_winner() {
        let clock = ManualClock::new(0);
        let store = Arc::new(store(&clock));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_consume("contended", 1_000).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() == ConsumeOutcome::Consumed {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_expired_at_consume_time_is_not_recorded() {
        let clock = ManualClock::new(1_000);
        let store = MemoryUsedTokenStore::new(1, 1, Arc::new(clock.clone()));

        assert_eq!(
            store.try_consume("boundary", 1_000).await.unwrap(),
            ConsumeOutcome::Consumed
        );

        // 记录被惰性清理后，同一 nonce 也不能再被写入
        clock.set(1_001);
        assert_eq!(
            store.try_consume("boundary", 1_000).await.unwrap(),
            ConsumeOutcome::Expired
        );
        assert_eq!(store.reap_expired(1_001).await.unwrap(), 1);
        assert_eq!(
            store.try_consume("boundary", 1_000).await.unwrap(),
            ConsumeOutcome::Expired
        );
        assert!(store.is_empty().await.unwrap());
    }

    #[test]
    fn test_zero_shards_is_clamped() {
        let store = MemoryUsedTokenStore::new(0, 0, Arc::new(ManualClock::new(0)));
        assert_eq!(store.shards.len(), 1);
        assert_eq!(store.shard_index("anything"), 0);
    }
}

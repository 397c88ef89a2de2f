//! 后台清理任务
//!
//! 周期性删除所属 Token 已过期的已用记录。只影响内存占用，
//! `try_consume` 会在写入前复核过期时间，被清理的 nonce 不会被重新接受。

use crate::clock::Clock;
use crate::metrics::{USED_TOKENS, USED_TOKENS_REAPED};
use crate::store::UsedTokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 执行一次清理并更新指标
pub async fn reap_once(store: &dyn UsedTokenStore, clock: &dyn Clock) -> usize {
    let reaped = match store.reap_expired(clock.now_millis()).await {
        Ok(reaped) => reaped,
        Err(e) => {
            warn!("Failed to reap expired used-token records: {}", e);
            return 0;
        }
    };

    if reaped > 0 {
        USED_TOKENS_REAPED.inc_by(reaped as u64);
        debug!("Reaped {} expired used-token records", reaped);
    }
    if let Ok(len) = store.len().await {
        USED_TOKENS.set(len as i64);
    }
    reaped
}

/// 启动后台清理任务，收到关闭信号后退出
pub fn spawn_reaper(
    store: Arc<dyn UsedTokenStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Used-token reaper started ({}, every {:?})",
            store.backend_info(),
            interval
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    reap_once(store.as_ref(), clock.as_ref()).await;
                }
                _ = shutdown.recv() => {
                    info!("Used-token reaper stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryUsedTokenStore;

    #[tokio::test]
    async fn test_reap_once() {
        let clock = ManualClock::new(0);
        let store = MemoryUsedTokenStore::new(4, 0, Arc::new(clock.clone()));
        store.try_consume("a", 100).await.unwrap();
        store.try_consume("b", 5_000).await.unwrap();

        clock.set(1_000);
        assert_eq!(reap_once(&store, &clock).await, 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_runs_until_shutdown() {
        let clock = ManualClock::new(0);
        let store: Arc<dyn UsedTokenStore> =
            Arc::new(MemoryUsedTokenStore::new(4, 0, Arc::new(clock.clone())));
        for i in 0..10 {
            store.try_consume(&format!("n{i}"), 100).await.unwrap();
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_reaper(
            store.clone(),
            Arc::new(clock.clone()),
            Duration::from_secs(1),
            shutdown_rx,
        );

        clock.set(1_000);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(store.len().await.unwrap(), 0);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}

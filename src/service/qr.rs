//! QR 签到 HTTP 服务实现
//!
//! 把 qrtoken 的状态与路由接入主程序，并负责后台清理任务

use anyhow::Result;
use axum::Router;
use qrpass_common::config::QrpassConfig;
use qrtoken::{Clock, QrState, SystemClock, create_qr_state, create_router, spawn_reaper};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// QR HTTP 服务
pub struct QrHttpService {
    config: QrpassConfig,
    clock: Arc<dyn Clock>,
    state: Option<QrState>,
}

impl std::fmt::Debug for QrHttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrHttpService")
            .field("name", &self.config.name)
            .field("ready", &self.state.is_some())
            .finish()
    }
}

impl QrHttpService {
    pub fn new(config: QrpassConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: QrpassConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: None,
        }
    }

    /// 构建 axum 路由器，同时初始化密钥与已用存储
    pub async fn build_router(&mut self) -> Result<Router> {
        info!("Building QR router");

        let qr_config = self.config.qr_config()?;
        let state = create_qr_state(qr_config, &self.config.sqlite_path, self.clock.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create QR state: {e}"))?;

        let router = create_router(state.clone());
        self.state = Some(state);

        info!("QR router built successfully");
        Ok(router)
    }

    /// 已初始化的服务状态
    pub fn state(&self) -> Option<&QrState> {
        self.state.as_ref()
    }

    /// 获取路由前缀
    pub fn route_prefix(&self) -> &str {
        "/qr"
    }

    /// 启动已用记录的后台清理任务
    ///
    /// 需要先调用 `build_router`；`reap_interval_secs = 0` 时不启动，返回 `None`
    pub fn start_reaper(
        &self,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Option<JoinHandle<()>>> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("QR service is not initialized"))?;
        let qr_config = self.config.qr_config()?;

        if qr_config.store.reap_interval_secs == 0 {
            info!("Background reaper disabled (reap_interval_secs = 0)");
            return Ok(None);
        }

        Ok(Some(spawn_reaper(
            state.manager.store().clone(),
            state.manager.clock().clone(),
            Duration::from_secs(qr_config.store.reap_interval_secs),
            shutdown_rx,
        )))
    }
}

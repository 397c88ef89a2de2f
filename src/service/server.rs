//! HTTP 服务器
//!
//! 合并各服务路由，附加全局 /metrics、追踪与 CORS 中间件，并接入关闭广播

use super::trace::http_trace_layer;
use anyhow::Result;
use axum::Router;
use qrpass_common::config::HttpBindConfig;
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// 已启动的 HTTP 服务器
#[derive(Debug)]
pub struct RunningServer {
    /// 实际监听地址（端口为 0 时由系统分配）
    pub local_addr: SocketAddr,
    pub handle: JoinHandle<()>,
}

/// 组装路由器
///
/// `routes` 中的每一项以 (前缀, 路由器) 的形式嵌套
pub fn build_app(routes: Vec<(String, Router)>) -> Router {
    let mut app = Router::new();

    for (prefix, router) in routes {
        info!("Adding route '{}'", prefix);
        app = app.nest(&prefix, router);
    }

    // 添加全局 Prometheus metrics 端点
    info!("Adding /metrics endpoint for Prometheus");
    app = app.route("/metrics", axum::routing::get(metrics_handler));

    app.layer(http_trace_layer())
        .layer(CorsLayer::permissive())
}

/// 绑定端口并在后台运行 HTTP 服务器，收到关闭广播后优雅退出
pub async fn start_http_server(
    bind: &HttpBindConfig,
    app: Router,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<RunningServer> {
    let bind_addr = bind.bind_addr();
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{bind_addr}': {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to address '{addr}': {e}"))?;
    let local_addr = listener.local_addr()?;
    info!("HTTP server listening on {}", local_addr);

    let mut shutdown_rx = shutdown_tx.subscribe();
    let handle = tokio::spawn(async move {
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("HTTP server received shutdown signal");
        });
        if let Err(e) = server.await {
            error!("HTTP server error: {}", e);
            let _ = shutdown_tx.send(());
        }
        info!("HTTP server stopped");
    });

    Ok(RunningServer { local_addr, handle })
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> String {
    qrpass_common::metrics::export_metrics()
}

//! Prometheus 监控指标模块
//!
//! 提供全局指标收集和导出功能

use lazy_static::lazy_static;
use prometheus::{IntGaugeVec, Opts, Registry};
use std::sync::Once;
use tracing::warn;

static METRICS_INIT: Once = Once::new();

lazy_static! {
    /// 全局 Prometheus Registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// 实例信息（恒为 1，标签携带实例名、环境与版本）
    pub static ref SERVICE_INFO: IntGaugeVec = IntGaugeVec::new(
        Opts::new("service_info", "Static information about this qrpass instance")
            .namespace("qrpass"),
        &["name", "env", "version"]
    ).unwrap();
}

/// 注册所有指标到全局 Registry
///
/// 幂等：只有第一次调用会真正注册，之后的调用返回 `Ok`。
pub fn register_metrics() -> crate::Result<()> {
    let mut result = Ok(());

    METRICS_INIT.call_once(|| {
        let register_result = (|| {
            REGISTRY.register(Box::new(SERVICE_INFO.clone()))?;
            qrtoken::register_qr_metrics(&REGISTRY)?;
            Ok::<(), prometheus::Error>(())
        })();

        if let Err(e) = register_result {
            result = Err(e.into());
        }
    });

    result
}

/// 记录实例信息
pub fn record_service_info(name: &str, env: &str) {
    SERVICE_INFO
        .with_label_values(&[name, env, env!("CARGO_PKG_VERSION")])
        .set(1);
}

/// 导出 Prometheus 格式的指标
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_default()
}

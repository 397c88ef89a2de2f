//! QR Token 服务指标

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

lazy_static! {
    /// Token 签发次数
    pub static ref TOKENS_ISSUED: IntCounterVec = IntCounterVec::new(
        Opts::new("tokens_issued_total", "Total number of QR tokens issued")
            .namespace("qrpass"),
        &["status"]
    ).unwrap();

    /// Token 校验次数（按结果码）
    pub static ref TOKENS_VALIDATED: IntCounterVec = IntCounterVec::new(
        Opts::new("tokens_validated_total", "Total number of QR token validations")
            .namespace("qrpass"),
        &["code"]
    ).unwrap();

    /// 被清理的已用记录数
    pub static ref USED_TOKENS_REAPED: IntCounter = IntCounter::with_opts(
        Opts::new("used_tokens_reaped_total", "Total number of reaped used-token records")
            .namespace("qrpass")
    ).unwrap();

    /// 已用存储当前记录数
    pub static ref USED_TOKENS: IntGauge = IntGauge::with_opts(
        Opts::new("used_tokens", "Current number of used-token records")
            .namespace("qrpass")
    ).unwrap();

    /// HTTP 请求延迟（秒）
    pub static ref REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("request_duration_seconds", "HTTP request duration in seconds")
            .namespace("qrpass")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["path", "status"]
    ).unwrap();
}

/// 注册 QR metrics 到给定 registry
pub fn register_qr_metrics(registry: &prometheus::Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(TOKENS_ISSUED.clone()))?;
    registry.register(Box::new(TOKENS_VALIDATED.clone()))?;
    registry.register(Box::new(USED_TOKENS_REAPED.clone()))?;
    registry.register(Box::new(USED_TOKENS.clone()))?;
    registry.register(Box::new(REQUEST_DURATION.clone()))?;
    Ok(())
}

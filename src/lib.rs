//! # qrpass
//!
//! 单次使用的活动签到二维码服务：签发、校验并消费 Token

pub mod service;

// Re-export commonly used types
pub use qrpass_common::config::QrpassConfig;
pub use service::{QrHttpService, RunningServer, build_app, start_http_server};

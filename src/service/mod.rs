//! 服务管理模块
//!
//! 把 QR 签到服务装配到 HTTP 服务器上

pub mod qr;
pub mod server;
pub mod trace;

pub use qr::QrHttpService;
pub use server::{RunningServer, build_app, start_http_server};

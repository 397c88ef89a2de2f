//! 服务配置集合

use qrtoken::QrServiceConfig;
use serde::{Deserialize, Serialize};

/// 所有服务的配置集合
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ServicesConfig {
    /// QR 签到 Token 服务配置
    #[serde(default)]
    pub qr: Option<QrServiceConfig>,
}

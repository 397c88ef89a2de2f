//! QR Token 服务配置
//!
//! 密钥与 TTL 策略在启动时读取一次，运行期只读

use crate::codec::KeySource;
use crate::manager::TtlPolicy;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};

/// QR 服务配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QrServiceConfig {
    /// Token 加密密钥 - 直接配置
    ///
    /// 支持两种格式：
    /// - 64 字符的十六进制字符串（32 字节）
    /// - 44 字符的 Base64 字符串（32 字节）
    ///
    /// 注意：直接在配置文件中存储密钥不够安全，生产环境建议使用 secret_key_env 或 secret_key_file
    #[serde(default)]
    pub secret_key: Option<String>,

    /// 密钥环境变量名称
    ///
    /// 例如：secret_key_env = "QRPASS_SECRET_KEY"
    #[serde(default)]
    pub secret_key_env: Option<String>,

    /// 密钥文件路径
    ///
    /// 文件权限应设置为 600 (仅所有者可读写)
    #[serde(default)]
    pub secret_key_file: Option<String>,

    /// 默认 TTL（秒）
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: i64,

    /// TTL 上限（秒），0 表示不限制
    #[serde(default = "default_max_ttl_seconds")]
    pub max_ttl_seconds: i64,

    /// 签到链接前缀（可选）
    ///
    /// 配置后签发响应中附带 `<link_base_url>?token=...` 形式的链接
    #[serde(default)]
    pub link_base_url: Option<String>,

    /// 已用 Token 存储配置
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for QrServiceConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            secret_key_env: None,
            secret_key_file: None,
            default_ttl_seconds: default_ttl_seconds(),
            max_ttl_seconds: default_max_ttl_seconds(),
            link_base_url: None,
            store: StoreConfig::default(),
        }
    }
}

fn default_ttl_seconds() -> i64 {
    300
}

fn default_max_ttl_seconds() -> i64 {
    86_400
}

impl QrServiceConfig {
    /// 获取密钥来源
    ///
    /// 优先级: secret_key_file > secret_key_env > secret_key
    pub fn get_key_source(&self) -> Option<KeySource> {
        if let Some(path) = &self.secret_key_file {
            return Some(KeySource::File(path.clone()));
        }

        if let Some(env_var) = &self.secret_key_env {
            return Some(KeySource::Environment(env_var.clone()));
        }

        if let Some(key) = &self.secret_key {
            return Some(KeySource::Direct(key.clone()));
        }

        None
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            default_ttl_seconds: self.default_ttl_seconds,
            max_ttl_seconds: self.max_ttl_seconds,
        }
    }

    /// 校验配置
    ///
    /// 以 "Warning:" 开头的条目为非致命问题
    pub fn validate(&self, env: &str) -> Vec<String> {
        let mut errors = Vec::new();

        match self.get_key_source() {
            None => errors.push(
                "services.qr requires one of secret_key, secret_key_env or secret_key_file"
                    .to_string(),
            ),
            Some(KeySource::Direct(_)) if env == "prod" => errors.push(
                "Warning: services.qr.secret_key is stored in the config file; prefer secret_key_env or secret_key_file in prod"
                    .to_string(),
            ),
            Some(_) => {}
        }

        if self.default_ttl_seconds <= 0 {
            errors.push("services.qr.default_ttl_seconds must be positive".to_string());
        }
        if self.max_ttl_seconds < 0 {
            errors.push("services.qr.max_ttl_seconds must not be negative".to_string());
        }
        if self.max_ttl_seconds > 0 && self.default_ttl_seconds > self.max_ttl_seconds {
            errors.push(
                "services.qr.default_ttl_seconds must not exceed max_ttl_seconds".to_string(),
            );
        }

        if let Some(base) = &self.link_base_url
            && let Err(e) = url::Url::parse(base)
        {
            errors.push(format!("services.qr.link_base_url is not a valid URL: {e}"));
        }

        errors.extend(self.store.validate());
        errors
    }
}

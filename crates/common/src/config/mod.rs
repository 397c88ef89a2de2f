//! 统一配置管理系统
//!
//! 本模块是签到服务配置的"单一真理之源"。
//! 所有配置项的定义、文档、默认值都在这里统一管理。

pub mod bind;
pub mod services;

pub use crate::config::bind::{BindConfig, HttpBindConfig};
pub use crate::config::services::ServicesConfig;
use crate::error::ConfigError;
use qrtoken::QrServiceConfig;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// qrpass 主配置结构体
///
/// 配置文件使用 TOML 格式，启动时读取一次，不支持热加载。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QrpassConfig {
    /// 服务器实例名称
    ///
    /// 用于在日志和指标中区分不同的部署实例，如 qrpass-01, checkin-east-1 等。
    pub name: String,

    /// 运行环境标识
    ///
    /// - "dev": 开发环境
    /// - "prod": 生产环境，启用额外的安全检查
    /// - "test": 测试环境，用于自动化测试
    pub env: String,

    /// 网络绑定配置
    #[serde(default)]
    pub bind: BindConfig,

    /// 服务配置集合
    #[serde(default)]
    pub services: ServicesConfig,

    /// SQLite 数据库文件存储目录路径
    ///
    /// 当已用 Token 存储使用 sqlite 后端时，数据库文件为
    /// `{sqlite_path}/used_tokens.db`。
    #[serde(
        default = "default_sqlite_path",
        serialize_with = "serialize_pathbuf",
        deserialize_with = "deserialize_pathbuf"
    )]
    pub sqlite_path: PathBuf,

    /// 可观测性配置
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别
    ///
    /// 支持 EnvFilter 语法（如 "info,sqlx=warn"）。默认值 "info"。
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// 日志输出目标
    ///
    /// - "console": 仅输出到控制台（默认）
    /// - "file": 输出到文件
    #[serde(default = "default_log_output")]
    pub output: String,

    /// 日志轮转开关
    ///
    /// 当 output = "file" 时有效：
    /// - true: 按天轮转日志文件
    /// - false: 追加到单个文件
    #[serde(default)]
    pub rotate: bool,

    /// 日志文件路径
    ///
    /// 当 output = "file" 时有效
    #[serde(default = "default_log_path")]
    pub path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter_level: default_filter_level(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
        }
    }
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

fn default_filter_level() -> String {
    "info".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("database")
}

fn serialize_pathbuf<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    path.display().to_string().serialize(serializer)
}

fn deserialize_pathbuf<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(PathBuf::from(s))
}

impl Default for QrpassConfig {
    fn default() -> Self {
        Self {
            name: "qrpass-default".to_string(),
            env: "dev".to_string(),
            bind: BindConfig::default(),
            services: ServicesConfig::default(),
            sqlite_path: default_sqlite_path(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl QrpassConfig {
    /// 返回日志配置引用
    pub fn log_config(&self) -> &LogConfig {
        &self.observability.log
    }

    /// 检查是否使用控制台日志输出
    pub fn is_console_logging(&self) -> bool {
        self.observability.log.output == "console"
    }

    /// 检查是否应该轮转日志
    pub fn should_rotate_logs(&self) -> bool {
        self.observability.log.output == "file" && self.observability.log.rotate
    }

    /// 获取日志过滤级别，优先使用 RUST_LOG
    pub fn get_filter_level(&self) -> String {
        std::env::var("RUST_LOG")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.observability.filter_level.clone())
    }

    /// 获取 QR 服务配置
    pub fn qr_config(&self) -> Result<&QrServiceConfig, ConfigError> {
        self.services
            .qr
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField {
                field: "services.qr".to_string(),
            })
    }

    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::FileNotFound {
                path: path_ref.display().to_string(),
            });
        }

        if !path_ref.is_file() {
            return Err(ConfigError::InvalidFormat {
                message: format!("Path is not a valid file: {}", path_ref.display()),
            });
        }

        let content = std::fs::read_to_string(path_ref)?;
        Self::from_toml(&content)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// 加载并验证配置
    ///
    /// 成功时同时返回非致命的 Warning 条目；存在致命问题时返回
    /// `ConfigError::Validation`，其中只包含致命条目
    pub fn load_validated<P: AsRef<Path>>(path: P) -> crate::Result<(Self, Vec<String>)> {
        let config = Self::from_file(path)?;

        match config.validate() {
            Ok(()) => Ok((config, Vec::new())),
            Err(errors) if has_fatal_errors(&errors) => Err(ConfigError::Validation {
                errors: errors
                    .into_iter()
                    .filter(|e| !e.starts_with("Warning:"))
                    .collect(),
            }
            .into()),
            Err(warnings) => Ok((config, warnings)),
        }
    }

    /// 验证配置有效性
    ///
    /// 返回发现的全部问题，以 "Warning:" 开头的条目为非致命问题
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // 验证实例名称
        if self.name.trim().is_empty() {
            errors.push("Instance name cannot be empty".to_string());
        }

        // 验证环境
        if !["dev", "prod", "test"].contains(&self.env.as_str()) {
            errors.push(format!(
                "Invalid environment '{}', must be one of: dev, prod, test",
                self.env
            ));
        }

        // 验证过滤级别（EnvFilter 语法）
        {
            let main_level = self
                .observability
                .filter_level
                .split(',')
                .next()
                .unwrap_or("")
                .trim();
            if !["trace", "debug", "info", "warn", "error"].contains(&main_level) {
                errors.push(format!(
                    "Invalid filter level '{}', must start with one of: trace, debug, info, warn, error",
                    self.observability.filter_level
                ));
            }
        }

        // 验证日志输出
        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid log output '{}' (observability.log.output), must be 'console' or 'file'",
                self.observability.log.output
            ));
        }

        // 验证 SQLite 路径
        if self
            .sqlite_path
            .to_str()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
        {
            errors.push("SQLite database path cannot be empty".to_string());
        }

        // 验证 HTTP 绑定地址
        if self.bind.http.ip.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid bind.http.ip '{}', must be a valid IP address",
                self.bind.http.ip
            ));
        }

        // 验证 QR 服务配置
        match &self.services.qr {
            Some(qr) => errors.extend(qr.validate(&self.env)),
            None => errors.push("services.qr configuration is missing".to_string()),
        }

        // 生产环境额外检查
        if self.env == "prod" {
            if self.observability.log.output == "console" {
                errors.push("Warning: Production environment should use file logging (observability.log.output = \"file\")".to_string());
            }

            if self.observability.log.output == "file" && !self.observability.log.rotate {
                errors.push("Warning: Production environment should enable log rotation (observability.log.rotate = true)".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 是否存在致命（非 Warning）问题
pub fn has_fatal_errors(errors: &[String]) -> bool {
    errors.iter().any(|e| !e.starts_with("Warning:"))
}

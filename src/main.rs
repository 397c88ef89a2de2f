//! qrpass 主程序
//!
//! 启动签到二维码服务，或执行配置检查、密钥生成、离线签发等命令

mod cli;
mod error;
mod observability;

use anyhow::Context;
use clap::Parser;
use observability::init_observability;
use qrpass::service::{QrHttpService, build_app, start_http_server};
use qrpass_common::config::QrpassConfig;
use qrpass_common::{BaseError, ConfigError};
use qrtoken::handlers::IssueResponse;
use qrtoken::{
    Clock, LinkRenderer, MemoryUsedTokenStore, SystemClock, TokenCodec, TokenLifecycleManager,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

use tracing::{error, info};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Test { config_file }) => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)
        }
        Some(Commands::GenKey) => {
            println!("{}", TokenCodec::generate_key());
            Ok(())
        }
        Some(Commands::Issue { event, ttl }) => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;
            ApplicationLauncher::issue_offline(&config_path, event, *ttl)
        }
        None => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

            // Create Tokio runtime（before running the application）
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            // Run the asynchronous application
            runtime.block_on(ApplicationLauncher::run_application(&config_path))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        // If the provided path is not the default "config.toml", check if it exists
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.clone());
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        // Otherwise, try fallback locations
        let fallback_paths = vec![
            // 1. Current working directory
            PathBuf::from("config.toml"),
            // 2. System config directory
            PathBuf::from("/etc/qrpass/config.toml"),
        ];

        bootstrap_info!("Searching for config file in default locations...");

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            } else {
                bootstrap_info!("Config not found at: {:?}", path);
            }
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: qrpass --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 加载并验证配置，Warning 条目只打印不失败
    fn load_config(config_path: &Path) -> Result<QrpassConfig> {
        match QrpassConfig::load_validated(config_path) {
            Ok((config, warnings)) => {
                if !warnings.is_empty() {
                    bootstrap_info!("配置验证发现警告:");
                }
                for (i, warning) in warnings.iter().enumerate() {
                    bootstrap_info!("  {}. ⚠️  {}", i + 1, warning);
                }
                Ok(config)
            }
            Err(BaseError::Config(ConfigError::Validation { errors })) => {
                bootstrap_error!("配置验证发现问题:");
                for (i, err) in errors.iter().enumerate() {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                }
                Err(Error::service_validation("配置验证失败，请修复上述错误"))
            }
            Err(e) => {
                bootstrap_error!("❌ 配置加载失败: {}", e);
                Err(e.into())
            }
        }
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        // Initialize basic logging for test command
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();

        let config = Self::load_config(config_path)?;
        info!("✅ 配置文件解析成功: {:?}", config_path);

        // 密钥必须能被实际加载
        let qr_config = config.qr_config()?;
        if let Some(key_source) = qr_config.get_key_source() {
            match TokenCodec::from_key_source(&key_source) {
                Ok(_) => info!("✅ 密钥加载成功"),
                Err(e) => {
                    error!("❌ 密钥加载失败: {}", e);
                    return Err(Error::service_validation(format!("密钥加载失败: {e}")));
                }
            }
        }

        info!("✅ 完整配置验证通过");
        Ok(())
    }

    /// 离线签发一个 Token 并以 JSON 输出到 stdout
    fn issue_offline(config_path: &Path, event_id: &str, ttl: Option<i64>) -> Result<()> {
        let config = Self::load_config(config_path)?;
        let qr_config = config.qr_config()?;

        let key_source = qr_config
            .get_key_source()
            .ok_or_else(|| Error::service_validation("services.qr has no secret key"))?;
        let codec = TokenCodec::from_key_source(&key_source).map_err(qrtoken::QrError::from)?;

        // 签发不会访问已用存储
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryUsedTokenStore::new(1, 0, clock.clone()));
        let manager = TokenLifecycleManager::new(codec, store, clock, qr_config.ttl_policy());

        let issued = match ttl {
            Some(ttl) => manager.issue(event_id, ttl)?,
            None => manager.issue_default(event_id)?,
        };

        let link = match &qr_config.link_base_url {
            Some(base) => Some(
                LinkRenderer::new(base)
                    .map_err(|e| Error::service_validation(e.to_string()))?
                    .link(&issued.token),
            ),
            None => None,
        };

        println!("{}", serde_json::to_string(&IssueResponse { issued, link })?);
        Ok(())
    }

    /// 运行应用程序的主入口
    async fn run_application(config_path: &Path) -> Result<()> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);
        let config = Self::load_config(config_path)?;
        bootstrap_info!("✅ 配置加载成功");

        // ensure sqlite_path directory exists
        if !config.sqlite_path.exists() {
            std::fs::create_dir_all(&config.sqlite_path).with_context(|| {
                format!(
                    "Failed to create SQLite data directory: {}",
                    config.sqlite_path.display()
                )
            })?;
        }

        // 初始化可观测性系统
        let _observability_guard = init_observability(&config)?;

        Self::run_services(config).await
    }

    /// 启动 HTTP 服务与后台清理任务，直到收到关闭信号
    async fn run_services(config: QrpassConfig) -> Result<()> {
        info!("🚀 启动 qrpass 签到服务: {}", config.name);

        // 初始化 Prometheus metrics registry
        qrpass_common::metrics::register_metrics()?;
        qrpass_common::metrics::record_service_info(&config.name, &config.env);
        info!("✅ Prometheus metrics registry 初始化成功");

        // 初始化全局关闭通道（供所有任务共享）
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(10);

        // 安装 Ctrl-C 处理器，确保任何阶段都能广播关闭
        setup_ctrl_c_handler(shutdown_tx.clone()).await;

        let mut qr_service = QrHttpService::new(config.clone());
        let router = qr_service
            .build_router()
            .await
            .map_err(|e| Error::service_startup(format!("QR 服务初始化失败: {e}")))?;

        let mut handle_futs: Vec<JoinHandle<()>> = Vec::new();
        if let Some(reaper) = qr_service.start_reaper(shutdown_tx.subscribe())? {
            handle_futs.push(reaper);
        }

        let app = build_app(vec![(qr_service.route_prefix().to_string(), router)]);
        let server = start_http_server(&config.bind.http, app, shutdown_tx.clone())
            .await
            .map_err(|e| Error::service_startup(format!("HTTP 服务器启动失败: {e}")))?;
        handle_futs.push(server.handle);

        Self::display_service_info(&config, server.local_addr, qr_service.route_prefix());

        for handle in handle_futs {
            if let Err(e) = handle.await {
                error!("Service task terminated unexpectedly: {}", e);
                let _ = shutdown_tx.send(());
            }
        }

        info!("🛑 所有服务已安全关闭");
        Ok(())
    }

    /// 显示服务信息
    fn display_service_info(config: &QrpassConfig, addr: std::net::SocketAddr, prefix: &str) {
        let http_url = format!("http://{addr}");

        info!("✅ 所有服务已启动 (env: {})", config.env);
        info!("📡 HTTP 服务器监听在: {}", http_url);
        info!("🔧 可用的API端点:");
        info!("  - {}{}/issue (POST)", http_url, prefix);
        info!("  - {}{}/issue/batch (POST)", http_url, prefix);
        info!("  - {}{}/validate (POST)", http_url, prefix);
        info!("  - {}{}/health", http_url, prefix);
        info!("  - {}/metrics", http_url);
    }
}

/// 设置Ctrl-C信号处理程序
async fn setup_ctrl_c_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听Ctrl-C信号: {}", e);
            return;
        }
        info!("收到Ctrl-C信号，开始优雅关闭...");
        let _ = shutdown_tx.send(());
    });
}

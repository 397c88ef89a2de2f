//! QR Token - 一次性签到二维码 Token
//!
//! 提供以下功能：
//! 1. 签发带活动 ID 与过期时间的加密 Token（AES-256-GCM，URL 安全）
//! 2. 原子的"校验并消费"：每个 Token 最多成功一次
//! 3. 已用记录存储：分片内存、SQLite，后台清理过期记录
//! 4. 校验网关与 axum HTTP 边界

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod manager;
pub mod metrics;
pub mod payload;
pub mod reaper;
pub mod render;
pub mod store;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{KeySource, TokenCodec};
pub use config::QrServiceConfig;
pub use error::{
    ApiError, DecodeError, EncodeError, IssueError, KeyError, QrError, QrResult, StoreError,
    StoreResult,
};
pub use gateway::{ClientAction, GatewayResponse, ResultCode, ValidationGateway};
pub use handlers::{QrState, create_qr_state, create_router};
pub use manager::{BatchEntry, BatchItem, Outcome, TokenLifecycleManager, TtlPolicy};
pub use metrics::register_qr_metrics;
pub use payload::{IssuedToken, Token, TokenPayload};
pub use reaper::{reap_once, spawn_reaper};
pub use render::{LinkRenderer, Rendered, RenderError, TokenRenderer};
pub use store::{
    MemoryUsedTokenStore, SqliteUsedTokenStore, StoreBackend, StoreConfig, UsedTokenStore,
};

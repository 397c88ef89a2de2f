//! QR HTTP 处理器

use crate::{
    clock::Clock,
    codec::TokenCodec,
    config::QrServiceConfig,
    error::{ApiError, QrError, QrResult},
    gateway::{GatewayResponse, ResultCode, ValidationGateway},
    manager::{BatchEntry, BatchItem, TokenLifecycleManager},
    metrics::{REQUEST_DURATION, TOKENS_ISSUED, TOKENS_VALIDATED},
    payload::{IssuedToken, Token},
    render::{LinkRenderer, Rendered, TokenRenderer},
    store,
};
use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 单次批量签发的最大条目数
pub const MAX_BATCH_SIZE: usize = 1000;

/// QR 服务状态
#[derive(Clone)]
pub struct QrState {
    pub manager: Arc<TokenLifecycleManager>,
    pub gateway: ValidationGateway,
    pub renderer: Option<Arc<dyn TokenRenderer>>,
}

impl QrState {
    pub fn new(
        manager: Arc<TokenLifecycleManager>,
        renderer: Option<Arc<dyn TokenRenderer>>,
    ) -> Self {
        Self {
            gateway: ValidationGateway::new(manager.clone()),
            manager,
            renderer,
        }
    }

    /// 渲染签到链接，失败只记录日志
    fn render_link(&self, token: &Token) -> Option<String> {
        let renderer = self.renderer.as_ref()?;
        match renderer.render(token) {
            Ok(Rendered::Markup(markup)) => Some(markup),
            Ok(Rendered::Image { .. }) => None,
            Err(e) => {
                warn!("Failed to render token: {}", e);
                None
            }
        }
    }
}

/// 从 QR 配置创建 QrState
pub async fn create_qr_state(
    service_config: &QrServiceConfig,
    sqlite_path: &Path,
    clock: Arc<dyn Clock>,
) -> QrResult<QrState> {
    info!("Initializing QR state from QrServiceConfig");

    let key_source = service_config.get_key_source().ok_or_else(|| {
        QrError::Config(
            "services.qr requires one of secret_key, secret_key_env or secret_key_file"
                .to_string(),
        )
    })?;
    let codec = TokenCodec::from_key_source(&key_source)?;

    let used_store = store::from_config(&service_config.store, sqlite_path, clock.clone()).await?;
    info!("Used-token store initialized: {}", used_store.backend_info());

    let renderer: Option<Arc<dyn TokenRenderer>> = match &service_config.link_base_url {
        Some(base) => {
            let renderer = LinkRenderer::new(base)
                .map_err(|e| QrError::Config(format!("services.qr.link_base_url: {e}")))?;
            Some(Arc::new(renderer))
        }
        None => None,
    };

    let manager = TokenLifecycleManager::new(
        codec,
        used_store,
        clock,
        service_config.ttl_policy(),
    );

    Ok(QrState::new(Arc::new(manager), renderer))
}

/// 创建 QR 服务的路由
pub fn create_router(state: QrState) -> Router {
    Router::new()
        .route("/issue", post(issue_handler))
        .route("/issue/batch", post(issue_batch_handler))
        .route("/validate", post(validate_handler))
        .route("/health", get(health_check_handler))
        .with_state(state)
}

/// 签发请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueRequest {
    #[serde(default)]
    pub event_id: Option<String>,
    /// 为空时使用默认 TTL
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// 签发响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResponse {
    #[serde(flatten)]
    pub issued: IssuedToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// 批量签发请求
///
/// 两种形式：逐项指定 TTL，或所有活动共用一个 TTL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchIssueRequest {
    Items {
        items: Vec<BatchItem>,
    },
    Events {
        event_ids: Vec<String>,
        #[serde(default)]
        ttl_seconds: Option<i64>,
    },
}

impl BatchIssueRequest {
    fn len(&self) -> usize {
        match self {
            BatchIssueRequest::Items { items } => items.len(),
            BatchIssueRequest::Events { event_ids, .. } => event_ids.len(),
        }
    }
}

/// 批量签发的单项错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemError {
    pub code: String,
    pub message: String,
}

/// 批量签发的单项结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultItem {
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchItemError>,
}

/// 批量签发响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchIssueResponse {
    pub issued: usize,
    pub failed: usize,
    pub results: Vec<BatchResultItem>,
}

/// 校验请求
///
/// 字段缺失由网关报告为 MISSING_FIELD
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// 校验结果码对应的 HTTP 状态
pub fn status_for(code: ResultCode) -> StatusCode {
    match code {
        ResultCode::Ok => StatusCode::OK,
        ResultCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ResultCode::MissingField
        | ResultCode::InvalidToken
        | ResultCode::WrongEvent
        | ResultCode::Expired
        | ResultCode::Replay => StatusCode::BAD_REQUEST,
    }
}

fn observe_request(path: &str, status: StatusCode, start_time: Instant) {
    REQUEST_DURATION
        .with_label_values(&[path, status.as_str()])
        .observe(start_time.elapsed().as_secs_f64());
}

fn record_issue(result: &Result<IssuedToken, crate::error::IssueError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) if e.code() == "INVALID_TTL" => "invalid_ttl",
        Err(_) => "error",
    };
    TOKENS_ISSUED.with_label_values(&[status]).inc();
}

async fn issue_handler(
    State(app_state): State<QrState>,
    Json(request): Json<IssueRequest>,
) -> Result<Json<IssueResponse>, ApiError> {
    let start_time = Instant::now();

    let result = issue_one(&app_state, request);
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_code(),
    };
    observe_request("/issue", status, start_time);

    result.map(Json)
}

fn issue_one(app_state: &QrState, request: IssueRequest) -> Result<IssueResponse, ApiError> {
    let event_id = request
        .event_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::MissingField(vec!["event_id".to_string()]))?;
    let ttl_seconds = request
        .ttl_seconds
        .unwrap_or(app_state.manager.policy().default_ttl_seconds);

    let result = app_state.manager.issue(&event_id, ttl_seconds);
    record_issue(&result);
    let issued = result?;

    info!(
        "Issued token for event {} (expires_at={})",
        issued.event_id, issued.expires_at
    );
    let link = app_state.render_link(&issued.token);
    Ok(IssueResponse { issued, link })
}

async fn issue_batch_handler(
    State(app_state): State<QrState>,
    Json(request): Json<BatchIssueRequest>,
) -> Result<Json<BatchIssueResponse>, ApiError> {
    let start_time = Instant::now();

    if request.len() > MAX_BATCH_SIZE {
        let err = ApiError::InvalidRequest(format!(
            "batch of {} exceeds the limit of {}",
            request.len(),
            MAX_BATCH_SIZE
        ));
        observe_request("/issue/batch", err.status_code(), start_time);
        return Err(err);
    }

    let entries = match &request {
        BatchIssueRequest::Items { items } => app_state.manager.issue_batch_items(items),
        BatchIssueRequest::Events {
            event_ids,
            ttl_seconds,
        } => app_state.manager.issue_batch(
            event_ids,
            ttl_seconds.unwrap_or(app_state.manager.policy().default_ttl_seconds),
        ),
    };

    let results: Vec<BatchResultItem> = entries
        .into_iter()
        .map(|entry| batch_result_item(&app_state, entry))
        .collect();
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    let issued = results.len() - failed;

    info!("Batch issued {} tokens ({} failed)", issued, failed);
    observe_request("/issue/batch", StatusCode::OK, start_time);

    Ok(Json(BatchIssueResponse {
        issued,
        failed,
        results,
    }))
}

fn batch_result_item(app_state: &QrState, entry: BatchEntry) -> BatchResultItem {
    record_issue(&entry.result);
    match entry.result {
        Ok(issued) => BatchResultItem {
            link: app_state.render_link(&issued.token),
            event_id: issued.event_id,
            token: Some(issued.token),
            issued_at: Some(issued.issued_at),
            expires_at: Some(issued.expires_at),
            error: None,
        },
        Err(e) => BatchResultItem {
            event_id: entry.event_id,
            token: None,
            issued_at: None,
            expires_at: None,
            link: None,
            error: Some(BatchItemError {
                code: e.code().to_string(),
                message: e.to_string(),
            }),
        },
    }
}

async fn validate_handler(
    State(app_state): State<QrState>,
    Json(request): Json<ValidateRequest>,
) -> (StatusCode, Json<GatewayResponse>) {
    let start_time = Instant::now();

    let response = app_state
        .gateway
        .validate(request.event_id.as_deref(), request.token.as_deref())
        .await;

    TOKENS_VALIDATED
        .with_label_values(&[response.code.as_str()])
        .inc();
    let status = status_for(response.code);
    observe_request("/validate", status, start_time);

    debug!("Validation finished with {}", response.code.as_str());
    (status, Json(response))
}

async fn health_check_handler(
    State(app_state): State<QrState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Health check requested");

    let used_store = app_state.manager.store();
    let used_tokens = used_store.len().await?;

    let response = serde_json::json!({
        "status": "healthy",
        "service": "qr",
        "store": used_store.backend_info(),
        "used_tokens": used_tokens,
        "timestamp": app_state.manager.clock().now_millis(),
    });

    Ok(Json(response))
}

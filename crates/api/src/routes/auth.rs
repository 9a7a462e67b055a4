use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiErrorResponse, CallbackQuery, LoginUrlResponse, SessionResponse};

async fn snapshot(state: &AppState) -> SessionResponse {
    SessionResponse {
        state: state.session.state(),
        token: state.session.check_token_freshness().await,
    }
}

/// 发起登录
///
/// 尝试在本机浏览器打开券商托管登录页，并返回该地址 (浏览器启动失败不影响返回)。
#[utoipa::path(
    get,
    path = "/login",
    tag = "会话 (Session)",
    responses(
        (status = 200, description = "托管登录页地址", body = LoginUrlResponse)
    )
)]
pub async fn login(State(state): State<AppState>) -> Json<LoginUrlResponse> {
    Json(LoginUrlResponse {
        login_url: state.session.begin_login(),
    })
}

/// 登录回调
///
/// 券商登录页重定向到此处并携带 `request_token`，网关用它交换当日访问令牌。
/// 交换失败不会自动重试。
#[utoipa::path(
    get,
    path = "/qiab",
    tag = "会话 (Session)",
    params(
        ("request_token" = String, Query, description = "一次性 request token")
    ),
    responses(
        (status = 200, description = "登录成功", body = SessionResponse),
        (status = 400, description = "缺少 request_token", body = ApiErrorResponse),
        (status = 401, description = "令牌交换被券商拒绝", body = ApiErrorResponse),
        (status = 502, description = "券商不可达", body = ApiErrorResponse)
    )
)]
pub async fn login_callback(
    State(state): State<AppState>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Query(query) = query?;
    let request_token = query
        .request_token
        .ok_or_else(|| ApiError::BadRequest("missing query parameter `request_token`".to_string()))?;

    state.session.complete_login(&request_token).await.map_err(|e| {
        warn!("Login callback failed: {}", e);
        ApiError::from(e)
    })?;
    info!("Login callback completed");
    Ok(Json(snapshot(&state).await))
}

/// 查询会话状态
#[utoipa::path(
    get,
    path = "/session",
    tag = "会话 (Session)",
    responses(
        (status = 200, description = "会话状态与令牌新鲜度", body = SessionResponse)
    )
)]
pub async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(snapshot(&state).await)
}

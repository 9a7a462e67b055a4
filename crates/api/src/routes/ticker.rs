use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use qiab_core::market::entity::StreamMode;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiErrorResponse, SubscribeRequest, TickerResponse, UnsubscribeRequest};

fn snapshot(state: &AppState) -> TickerResponse {
    TickerResponse {
        state: state.streamer.state(),
        subscriptions: state.streamer.subscriptions().into_iter().map(Into::into).collect(),
    }
}

/// 查询行情连接状态与订阅集合
#[utoipa::path(
    get,
    path = "/ticker",
    tag = "行情 (Ticker)",
    responses(
        (status = 200, description = "连接状态与订阅集合", body = TickerResponse)
    )
)]
pub async fn get_ticker(State(state): State<AppState>) -> Json<TickerResponse> {
    Json(snapshot(&state))
}

/// 订阅合约
///
/// 已连接时立即下发，未连接时在下一次连接建立后下发。
#[utoipa::path(
    post,
    path = "/ticker/subscribe",
    tag = "行情 (Ticker)",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "更新后的订阅集合", body = TickerResponse),
        (status = 400, description = "请求体不合法", body = ApiErrorResponse),
        (status = 502, description = "指令下发失败 (订阅已记录，重连后重放)", body = ApiErrorResponse)
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<Json<TickerResponse>, ApiError> {
    let Json(body) = body?;
    if body.tokens.is_empty() {
        return Err(ApiError::BadRequest("`tokens` must not be empty".to_string()));
    }
    let mode = body.mode.unwrap_or(StreamMode::Quote);
    state.streamer.subscribe(&body.tokens, mode).await?;
    Ok(Json(snapshot(&state)))
}

/// 退订合约
#[utoipa::path(
    post,
    path = "/ticker/unsubscribe",
    tag = "行情 (Ticker)",
    request_body = UnsubscribeRequest,
    responses(
        (status = 200, description = "更新后的订阅集合", body = TickerResponse),
        (status = 400, description = "请求体不合法", body = ApiErrorResponse),
        (status = 502, description = "指令下发失败", body = ApiErrorResponse)
    )
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    body: Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Result<Json<TickerResponse>, ApiError> {
    let Json(body) = body?;
    state.streamer.unsubscribe(&body.tokens).await?;
    Ok(Json(snapshot(&state)))
}

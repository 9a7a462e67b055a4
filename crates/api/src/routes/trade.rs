use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use qiab_core::broker::entity::OrderRecord;
use qiab_core::trade::entity::{OrderId, OrderPayload};

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiErrorResponse, PlaceOrderRequest, PlaceOrderResponse};

/// 提交新订单
///
/// 请求体必须是 JSON 对象。字段缺失或类型错误时直接返回 400，券商不会被调用；
/// 券商拒单同样返回 400，并原样携带券商的拒单原因。
#[utoipa::path(
    post,
    path = "/order",
    tag = "订单 (Order)",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "券商已受理", body = PlaceOrderResponse),
        (status = 400, description = "校验失败或券商拒单", body = ApiErrorResponse),
        (status = 401, description = "访问令牌失效", body = ApiErrorResponse),
        (status = 502, description = "券商不可达", body = ApiErrorResponse)
    )
)]
pub async fn place_order(
    State(state): State<AppState>,
    payload: Result<Json<OrderPayload>, JsonRejection>,
) -> Result<Json<PlaceOrderResponse>, ApiError> {
    let Json(payload) = payload?;
    let order_id = state.trade_port.place_order(payload).await.map_err(|e| {
        warn!("Order placement failed: {}", e);
        ApiError::from(e)
    })?;
    info!("Order placed: {}", order_id);
    Ok(Json(PlaceOrderResponse { order_id: order_id.0 }))
}

/// 查询券商当前的订单集合
///
/// 按券商返回的顺序原样输出。
#[utoipa::path(
    get,
    path = "/order",
    tag = "订单 (Order)",
    responses(
        (status = 201, description = "订单列表", body = Vec<OrderRecord>),
        (status = 401, description = "访问令牌失效", body = ApiErrorResponse),
        (status = 502, description = "券商不可达", body = ApiErrorResponse)
    )
)]
pub async fn list_orders(State(state): State<AppState>) -> Result<(StatusCode, Json<Vec<OrderRecord>>), ApiError> {
    let orders = state.trade_port.list_orders().await?;
    Ok((StatusCode::CREATED, Json(orders)))
}

/// 查询单笔订单
#[utoipa::path(
    get,
    path = "/order/{order_id}",
    tag = "订单 (Order)",
    params(
        ("order_id" = String, Path, description = "券商订单号")
    ),
    responses(
        (status = 200, description = "订单记录", body = OrderRecord),
        (status = 404, description = "订单不存在", body = ApiErrorResponse)
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderRecord>, ApiError> {
    let order = state.trade_port.get_order(&OrderId(order_id)).await?;
    Ok(Json(order))
}

/// 撤销订单
///
/// 响应为纯文本：成功时 `Closed Order ID: X`，失败时 `Failed to close order: 原因`。
#[utoipa::path(
    delete,
    path = "/order/{variety}/{order_id}",
    tag = "订单 (Order)",
    params(
        ("variety" = String, Path, description = "订单类别，如 regular"),
        ("order_id" = String, Path, description = "券商订单号")
    ),
    responses(
        (status = 202, description = "已撤销", body = String),
        (status = 400, description = "券商拒绝撤单", body = String)
    )
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path((variety, order_id)): Path<(String, String)>,
) -> Response {
    match state.trade_port.cancel_order(&variety, &OrderId(order_id)).await {
        Ok(closed) => {
            info!("Order cancelled: {}", closed);
            (StatusCode::ACCEPTED, format!("Closed Order ID: {}", closed)).into_response()
        }
        Err(e) => {
            warn!("Order cancel failed: {}", e);
            let status = ApiError::from(e.clone()).status();
            (status, format!("Failed to close order: {}", e)).into_response()
        }
    }
}

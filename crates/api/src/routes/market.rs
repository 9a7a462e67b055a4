use axum::Json;
use axum::extract::{Path, State};

use qiab_core::market::entity::Instrument;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::ApiErrorResponse;

/// 查询全部合约，按行权价降序
///
/// 每次请求都会重新从券商拉取，拉取失败返回 503，不返回旧数据。
#[utoipa::path(
    get,
    path = "/market",
    tag = "合约 (Market)",
    responses(
        (status = 200, description = "合约列表", body = Vec<Instrument>),
        (status = 503, description = "合约目录不可用", body = ApiErrorResponse)
    )
)]
pub async fn list_markets(State(state): State<AppState>) -> Result<Json<Vec<Instrument>>, ApiError> {
    Ok(Json(state.market_port.list_markets().await?))
}

/// 查询单个合约
#[utoipa::path(
    get,
    path = "/market/{market}",
    tag = "合约 (Market)",
    params(
        ("market" = String, Path, description = "instrument token 或交易代码 (不区分大小写)")
    ),
    responses(
        (status = 200, description = "合约", body = Instrument),
        (status = 404, description = "合约不存在", body = ApiErrorResponse),
        (status = 503, description = "合约目录不可用", body = ApiErrorResponse)
    )
)]
pub async fn get_market(
    State(state): State<AppState>,
    Path(market): Path<String>,
) -> Result<Json<Instrument>, ApiError> {
    Ok(Json(state.market_port.get_market(&market).await?))
}

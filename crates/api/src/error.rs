//! # API 统一错误处理
//!
//! 将下层各 crate 的错误类型统一映射到 HTTP 状态码与 JSON 响应体。

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use qiab_core::market::error::{MarketError, StreamError};
use qiab_core::session::error::SessionError;
use qiab_core::trade::port::TradeError;

use crate::types::ApiErrorResponse;

/// API 层统一错误枚举
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 请求参数错误或券商拒单 (400)
    #[error("{0}")]
    BadRequest(String),

    /// 令牌缺失或过期，需要重新登录 (401)
    #[error("{0}")]
    Unauthorized(String),

    /// 资源未找到 (404)
    #[error("{0}")]
    NotFound(String),

    /// 券商不可达或响应无法解析 (502)
    #[error("{0}")]
    BadGateway(String),

    /// 依赖的下游服务暂不可用 (503)
    #[error("{0}")]
    Unavailable(String),

    /// 网关内部错误 (500)
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 将 `ApiError` 转换为 axum 的 HTTP 响应
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(msg) => {
                // 内部错误只记录日志，不向客户端透传细节
                tracing::error!("Internal gateway error: {}", msg);
                "Internal server error".to_string()
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Unavailable(msg) => msg,
        };

        (status, Json(ApiErrorResponse::from_msg(message))).into_response()
    }
}

impl From<TradeError> for ApiError {
    fn from(err: TradeError) -> Self {
        let message = err.to_string();
        match err {
            TradeError::Validation(_) | TradeError::Rejected(_) => ApiError::BadRequest(message),
            TradeError::Authentication(_) => ApiError::Unauthorized(message),
            TradeError::NotFound(_) => ApiError::NotFound(message),
            TradeError::Unavailable(_) => ApiError::BadGateway(message),
        }
    }
}

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        let message = err.to_string();
        match err {
            MarketError::CatalogUnavailable(_) => ApiError::Unavailable(message),
            MarketError::NotFound(_) => ApiError::NotFound(message),
            MarketError::Authentication(_) => ApiError::Unauthorized(message),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::InvalidRequestToken(_) => ApiError::BadRequest(message),
            SessionError::Authentication(_) => ApiError::Unauthorized(message),
            SessionError::Remote(_) => ApiError::BadGateway(message),
            SessionError::Store(_) => ApiError::Internal(message),
        }
    }
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        let message = err.to_string();
        match err {
            StreamError::NotConnected => ApiError::Unavailable(message),
            StreamError::Transport(_) => ApiError::BadGateway(message),
        }
    }
}

/// 请求体不是合法 JSON 对象
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

//! # DTO (Data Transfer Object) 层
//!
//! 面向调用方 JSON 输入输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档。
//! 订单记录与合约直接使用核心实体 (已派生 `ToSchema`)，原样透传券商字段。

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use qiab_core::common::InstrumentToken;
use qiab_core::market::entity::{ConnectionState, StreamMode};
use qiab_core::session::entity::{SessionState, TokenFreshness};
use qiab_market::streamer::Subscription;

// ============================================================
//  订单相关 DTO
// ============================================================

/// 下单请求体 (仅用于文档)
///
/// 实际请求以原始 JSON 对象接收，字段存在性与类型由订单网关校验，
/// 缺失或类型错误的字段会在调用券商之前被拒绝。
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    #[schema(example = "NSE")]
    pub exchange: String,
    #[schema(example = "RELIANCE")]
    pub trading_symbol: String,
    /// 大小写不敏感，提交前统一转为大写
    #[schema(example = "buy")]
    pub transaction_type: String,
    /// 正整数
    #[schema(example = 1)]
    pub quantity: u32,
    #[schema(example = "MIS")]
    pub product: String,
    #[schema(example = "MARKET")]
    pub order_type: String,
    #[schema(example = "DAY")]
    pub validity: String,
    #[schema(example = "regular")]
    pub variety: String,
    pub price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub disclosed_quantity: Option<u32>,
    /// 最长 20 个字符
    pub tag: Option<String>,
}

/// 下单成功返回的券商订单号
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderResponse {
    #[schema(example = "151220000000000")]
    pub order_id: String,
}

// ============================================================
//  会话相关 DTO
// ============================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CallbackQuery {
    /// 券商登录重定向携带的一次性 request token
    pub request_token: Option<String>,
}

/// 托管登录页地址
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginUrlResponse {
    #[schema(example = "https://kite.zerodha.com/connect/login?api_key=xxx&v=3")]
    pub login_url: String,
}

/// 会话状态快照
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub state: SessionState,
    /// 持久化令牌是否为今日签发
    pub token: TokenFreshness,
}

// ============================================================
//  行情相关 DTO
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionResponse {
    #[schema(example = 408065)]
    pub instrument_token: InstrumentToken,
    pub mode: StreamMode,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            instrument_token: s.instrument_token,
            mode: s.mode,
        }
    }
}

/// 行情长连接状态与当前订阅集合
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TickerResponse {
    pub state: ConnectionState,
    pub subscriptions: Vec<SubscriptionResponse>,
}

/// 订阅请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    #[schema(example = json!([408065, 738561]))]
    pub tokens: Vec<InstrumentToken>,
    /// 推送模式，缺省为 `quote`
    #[serde(default)]
    pub mode: Option<StreamMode>,
}

/// 退订请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnsubscribeRequest {
    #[schema(example = json!([408065]))]
    pub tokens: Vec<InstrumentToken>,
}

// ============================================================
//  通用响应 DTO
// ============================================================

/// 失败响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 固定为 false
    pub success: bool,
    /// 错误描述信息
    pub error: String,
}

impl ApiErrorResponse {
    /// 从错误信息构建
    pub fn from_msg(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}

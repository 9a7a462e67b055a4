use crate::common::InstrumentToken;
use crate::session::entity::AccessToken;
use crate::trade::entity::TransactionType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// # Summary
/// 下发到券商的下单参数，已经过网关校验与规范化。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderParams {
    pub exchange: String,
    pub tradingsymbol: String,
    pub transaction_type: TransactionType,
    pub quantity: u32,
    pub product: String,
    pub order_type: String,
    pub validity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclosed_quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// # Summary
/// 券商侧的订单记录。网关只读，不做本地缓存。
///
/// # Invariants
/// - 字段与券商订单簿一一对应，网关原样透传给调用方。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderRecord {
    #[schema(example = "151220000000000")]
    pub order_id: String,
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    #[serde(default)]
    pub parent_order_id: Option<String>,
    #[schema(example = "COMPLETE")]
    pub status: String,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub order_timestamp: Option<String>,
    #[schema(example = "regular")]
    pub variety: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub tradingsymbol: String,
    #[serde(default)]
    pub instrument_token: Option<InstrumentToken>,
    #[schema(example = "MARKET")]
    pub order_type: String,
    #[serde(default)]
    pub transaction_type: String,
    #[serde(default)]
    pub validity: String,
    #[schema(example = "MIS")]
    pub product: String,
    #[serde(default)]
    pub quantity: u64,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub trigger_price: Decimal,
    #[serde(default)]
    pub average_price: Decimal,
    #[serde(default)]
    pub filled_quantity: u64,
    #[serde(default)]
    pub pending_quantity: u64,
    #[serde(default)]
    pub cancelled_quantity: u64,
    #[serde(default)]
    pub tag: Option<String>,
}

/// # Summary
/// 券商合约清单中的一行原始记录。
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerInstrument {
    pub instrument_token: InstrumentToken,
    pub exchange_token: u32,
    pub tradingsymbol: String,
    pub name: String,
    pub last_price: f64,
    pub expiry: Option<String>,
    pub strike: f64,
    pub tick_size: f64,
    pub lot_size: u32,
    pub instrument_type: String,
    pub segment: String,
    pub exchange: String,
}

/// # Summary
/// 令牌交换成功后券商返回的会话信息。
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub user_id: String,
    pub access_token: AccessToken,
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 券商分配的订单号。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Summary
/// 订单的交易方向。
///
/// # Invariants
/// - 序列化形式固定为大写 `BUY` / `SELL`，与券商接口一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    /// # Logic
    /// 先统一转为大写再匹配，`buy` / `Buy` / `BUY` 等价。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(TransactionType::Buy),
            "SELL" => Ok(TransactionType::Sell),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// 未经校验的下单请求体 (JSON 对象)。字段存在性与类型由订单网关负责检查。
pub type OrderPayload = serde_json::Map<String, serde_json::Value>;

/// # Summary
/// 经过校验的下单请求。
///
/// # Invariants
/// - 所有必填字段均存在且非空。
/// - `quantity > 0`。
/// - `transaction_type` 已规范化为大写枚举。
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub exchange: String,
    pub trading_symbol: String,
    pub transaction_type: TransactionType,
    pub quantity: u32,
    pub product: String,
    pub order_type: String,
    pub validity: String,
    pub variety: String,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub disclosed_quantity: Option<u32>,
    pub tag: Option<String>,
}

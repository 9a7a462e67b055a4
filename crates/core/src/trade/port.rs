use super::entity::{OrderId, OrderPayload};
use crate::broker::entity::OrderRecord;
use crate::broker::error::BrokerError;
use async_trait::async_trait;
use thiserror::Error;

/// # Summary
/// 订单网关的错误分类。
///
/// # Invariants
/// - `Rejected` 保留券商的原始错误文本。
/// - 所有变体都映射为非 2xx 响应，不存在被吞掉的失败路径。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradeError {
    /// 请求字段缺失或类型错误，未发起任何券商调用
    #[error("Invalid order request: {0}")]
    Validation(String),
    /// 令牌过期或无效，需要重新登录
    #[error("Authentication required: {0}")]
    Authentication(String),
    /// 券商拒绝了请求
    #[error("{0}")]
    Rejected(String),
    /// 券商不可达或响应不可解析
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
    /// 订单不存在
    #[error("Order not found: {0}")]
    NotFound(String),
}

impl From<BrokerError> for TradeError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Authentication(msg) => TradeError::Authentication(msg),
            BrokerError::Remote { message, .. } => TradeError::Rejected(message),
            BrokerError::Network(msg) | BrokerError::Parse(msg) => TradeError::Unavailable(msg),
        }
    }
}

/// # Summary
/// 订单网关抽象接口。HTTP 层通过它完成下单、查单和撤单。
///
/// # Invariants
/// - 所有操作都以请求为作用域，不维护本地订单状态，券商侧状态为准。
#[async_trait]
pub trait TradePort: Send + Sync {
    /// # Summary
    /// 校验并提交一笔订单。
    ///
    /// # Returns
    /// * `Ok(OrderId)` - 券商受理后分配的订单号
    /// * `Err(TradeError::Validation)` - 本地校验失败，券商未被调用
    /// * `Err(TradeError::Rejected)` - 券商拒单，携带原始原因
    async fn place_order(&self, payload: OrderPayload) -> Result<OrderId, TradeError>;

    /// 按券商顺序原样返回当前订单集合，失败时绝不返回部分或空结果
    async fn list_orders(&self) -> Result<Vec<OrderRecord>, TradeError>;

    /// 查询单笔订单的最新状态
    async fn get_order(&self, order_id: &OrderId) -> Result<OrderRecord, TradeError>;

    /// # Summary
    /// 撤销单腿订单 (不关联父单)。
    ///
    /// # Returns
    /// * `Ok(OrderId)` - 已撤销的订单号
    async fn cancel_order(&self, variety: &str, order_id: &OrderId) -> Result<OrderId, TradeError>;
}

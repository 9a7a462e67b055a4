use crate::validate::validate_order;
use async_trait::async_trait;
use qiab_core::broker::entity::{OrderParams, OrderRecord};
use qiab_core::broker::port::BrokerPort;
use qiab_core::trade::entity::{OrderId, OrderPayload, OrderRequest};
use qiab_core::trade::port::{TradeError, TradePort};
use std::sync::Arc;
use tracing::{info, warn};

/// # Summary
/// 订单网关，`TradePort` 的唯一实现。
///
/// # Invariants
/// - 本地校验失败时绝不调用券商 (没有部分提交)。
/// - 券商错误文本原样透传。
pub struct OrderGateway {
    broker: Arc<dyn BrokerPort>,
}

impl OrderGateway {
    pub fn new(broker: Arc<dyn BrokerPort>) -> Self {
        Self { broker }
    }
}

fn broker_params(request: &OrderRequest) -> OrderParams {
    OrderParams {
        exchange: request.exchange.clone(),
        tradingsymbol: request.trading_symbol.clone(),
        transaction_type: request.transaction_type,
        quantity: request.quantity,
        product: request.product.clone(),
        order_type: request.order_type.clone(),
        validity: request.validity.clone(),
        price: request.price,
        trigger_price: request.trigger_price,
        disclosed_quantity: request.disclosed_quantity,
        tag: request.tag.clone(),
    }
}

#[async_trait]
impl TradePort for OrderGateway {
    /// # Logic
    /// 1. 校验并规范化请求体，失败立即返回 `Validation`。
    /// 2. 按 `variety` 提交到券商。
    /// 3. 券商失败映射为 `Rejected` / `Authentication` / `Unavailable`。
    async fn place_order(&self, payload: OrderPayload) -> Result<OrderId, TradeError> {
        let request = validate_order(&payload).inspect_err(|e| {
            warn!("Order rejected locally: {}", e);
        })?;

        let params = broker_params(&request);
        match self.broker.place_order(&request.variety, &params).await {
            Ok(order_id) => {
                info!(
                    "Order placed: {} {} {} x{} ({})",
                    order_id, params.transaction_type, params.tradingsymbol, params.quantity, request.variety
                );
                Ok(order_id)
            }
            Err(e) => {
                warn!("Broker rejected {} {}: {}", params.transaction_type, params.tradingsymbol, e);
                Err(e.into())
            }
        }
    }

    async fn list_orders(&self) -> Result<Vec<OrderRecord>, TradeError> {
        self.broker.get_orders().await.map_err(|e| {
            warn!("Failed to fetch orders: {}", e);
            TradeError::from(e)
        })
    }

    /// # Logic
    /// 券商没有单笔查询接口时，在当日订单列表中按订单号过滤。
    async fn get_order(&self, order_id: &OrderId) -> Result<OrderRecord, TradeError> {
        self.list_orders()
            .await?
            .into_iter()
            .find(|o| o.order_id == order_id.0)
            .ok_or_else(|| TradeError::NotFound(order_id.to_string()))
    }

    async fn cancel_order(&self, variety: &str, order_id: &OrderId) -> Result<OrderId, TradeError> {
        if variety.trim().is_empty() || order_id.0.trim().is_empty() {
            return Err(TradeError::Validation(
                "variety and order_id are required".to_string(),
            ));
        }

        match self.broker.cancel_order(variety, order_id, None).await {
            Ok(closed) => {
                info!("Order cancelled: {} ({})", closed, variety);
                Ok(closed)
            }
            Err(e) => {
                warn!("Cancel of {} ({}) failed: {}", order_id, variety, e);
                Err(e.into())
            }
        }
    }
}

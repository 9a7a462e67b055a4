use super::entity::{BrokerInstrument, OrderParams, OrderRecord, SessionGrant};
use super::error::BrokerError;
use crate::session::entity::AccessToken;
use crate::trade::entity::OrderId;
use async_trait::async_trait;
use chrono::{DateTime, Local};

/// # Summary
/// 券商客户端句柄：代表与券商订单/数据 API 的唯一认证连接。
/// 所有组件都通过它向券商发起调用，由 DI 容器构造后注入。
///
/// # Invariants
/// - 必须线程安全 (`Send + Sync`)，同一实例被 HTTP 请求并发使用。
/// - `set_access_token` 是单次原子写，之后发起的调用立即使用新令牌。
/// - 只持有今日签发的令牌：跨日或券商判定令牌失效后不再携带旧令牌。
/// - 不定义额外超时与取消，调用在传输层默认超时内完成或失败。
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// 券商托管登录页地址
    fn login_url(&self) -> String;

    /// # Summary
    /// 安装新的访问令牌。
    ///
    /// # Returns
    /// * `false` - 令牌签发于今日零点之前，已拒绝
    fn set_access_token(&self, token: AccessToken, issued_at: DateTime<Local>) -> bool;

    /// 丢弃当前令牌
    fn clear_access_token(&self);

    /// 当前是否持有可用的 (今日签发且未被券商拒绝的) 令牌
    fn has_access_token(&self) -> bool;

    /// # Summary
    /// 使用一次性 request_token 交换当日访问令牌。
    ///
    /// # Arguments
    /// * `request_token` - 登录回调携带的一次性令牌
    /// * `api_secret` - 长期 API Secret，用于计算校验和
    async fn generate_session(
        &self,
        request_token: &str,
        api_secret: &str,
    ) -> Result<SessionGrant, BrokerError>;

    /// # Summary
    /// 提交订单。
    ///
    /// # Returns
    /// * `Ok(OrderId)` - 券商分配的订单号
    async fn place_order(&self, variety: &str, params: &OrderParams) -> Result<OrderId, BrokerError>;

    /// 按券商返回的顺序获取当日全部订单
    async fn get_orders(&self) -> Result<Vec<OrderRecord>, BrokerError>;

    /// # Summary
    /// 撤销订单。
    ///
    /// # Arguments
    /// * `parent_order_id` - 多腿订单的父单号，单腿订单传 `None`
    async fn cancel_order(
        &self,
        variety: &str,
        order_id: &OrderId,
        parent_order_id: Option<&OrderId>,
    ) -> Result<OrderId, BrokerError>;

    /// 获取可交易合约全量清单
    async fn get_instruments(&self) -> Result<Vec<BrokerInstrument>, BrokerError>;
}

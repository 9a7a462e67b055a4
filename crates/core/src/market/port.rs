use crate::common::InstrumentToken;
use crate::market::entity::{Instrument, StreamEvent, StreamMode};
use crate::market::error::{MarketError, StreamError};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tokio::sync::mpsc;

/// # Summary
/// 行情事件流别名，使用动态分发的异步流。
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// # Summary
/// 合约目录服务契约。
///
/// # Invariants
/// - 每次调用都重新向券商拉取，不做增量或缓存。
#[async_trait]
pub trait MarketPort: Send + Sync {
    /// # Summary
    /// 获取全量合约，按行权价降序排列。
    ///
    /// # Logic
    /// 1. 拉取券商合约清单。
    /// 2. 投影为 `Instrument` 视图。
    /// 3. 稳定排序，行权价相同的合约保持券商原始顺序。
    async fn list_markets(&self) -> Result<Vec<Instrument>, MarketError>;

    /// # Summary
    /// 按合约标识查询单个合约。
    ///
    /// # Arguments
    /// * `market` - 数字形式的 instrument token，或交易代码 (不区分大小写)
    async fn get_market(&self, market: &str) -> Result<Instrument, MarketError>;
}

/// # Summary
/// 券商行情长连接的传输层抽象。
///
/// # Invariants
/// - 重连策略 (退避、次数) 由实现方负责，每次 (重新) 连接成功都必须产出 `StreamEvent::Connected`。
/// - 连接断开后服务端订阅状态全部丢失，由上层在 `Connected` 时重新下发。
#[async_trait]
pub trait TickerTransport: Send + Sync {
    /// # Summary
    /// 运行连接循环，把所有连接事件与数据推入 `events`。
    ///
    /// # Logic
    /// 1. 建立连接并产出 `Connected`。
    /// 2. 持续解码消息并产出 `Tick` / `OrderUpdate` / `Error`。
    /// 3. 断开后产出 `Closed`，按重连策略重试。
    ///
    /// # Returns
    /// 传输层被关闭或 `events` 接收端被丢弃时返回。
    async fn serve(&self, events: mpsc::Sender<StreamEvent>) -> Result<(), StreamError>;

    /// 订阅一组合约
    async fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), StreamError>;

    /// 退订一组合约
    async fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), StreamError>;

    /// 设置一组合约的推送模式
    async fn set_mode(&self, mode: StreamMode, tokens: &[InstrumentToken]) -> Result<(), StreamError>;
}

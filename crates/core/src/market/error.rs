use crate::broker::error::BrokerError;
use thiserror::Error;

/// # Summary
/// 合约目录错误。
///
/// # Invariants
/// - 目录不可用时必须显式报错，绝不返回过期或缓存的数据。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// 拉取合约清单失败
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),
    /// 指定的合约不存在
    #[error("Market not found: {0}")]
    NotFound(String),
    /// 令牌过期或无效
    #[error("Authentication required: {0}")]
    Authentication(String),
}

impl From<BrokerError> for MarketError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Authentication(msg) => MarketError::Authentication(msg),
            other => MarketError::CatalogUnavailable(other.to_string()),
        }
    }
}

/// # Summary
/// 行情传输层错误。由行情推送器通过错误事件上报，不影响 REST 调用方。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// 当前没有活跃连接
    #[error("Ticker is not connected")]
    NotConnected,
    /// 连接建立、读写或指令下发失败
    #[error("Transport error: {0}")]
    Transport(String),
}

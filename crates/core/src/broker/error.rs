use thiserror::Error;

/// # Summary
/// 券商客户端句柄返回的错误。
///
/// # Invariants
/// - `Remote` 的 `message` 为券商返回的原始文本，任何上层都不得改写。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// 令牌过期或无效，需要重新登录
    #[error("{0}")]
    Authentication(String),
    /// 券商拒绝或未能处理请求
    #[error("{message}")]
    Remote {
        /// 券商侧的错误分类 (如 InputException / OrderException)
        kind: String,
        message: String,
    },
    /// 网络层错误 (连接失败、超时等)
    #[error("Network error: {0}")]
    Network(String),
    /// 响应无法解析
    #[error("Parse error: {0}")]
    Parse(String),
}

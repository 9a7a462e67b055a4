use crate::broker::error::BrokerError;
use crate::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 登录握手过程中的错误。
///
/// # Invariants
/// - 任何错误都不会自动重试，需要操作员重新走登录流程。
#[derive(Error, Debug)]
pub enum SessionError {
    /// 回调中缺少或携带了空的 request_token
    #[error("Invalid request token: {0}")]
    InvalidRequestToken(String),
    /// 券商拒绝了令牌交换 (request_token 失效、checksum 不匹配等)
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// 券商调用失败，原始错误信息原样保留
    #[error("Broker error: {0}")]
    Remote(String),
    /// 令牌持久化读写失败
    #[error("Token store error: {0}")]
    Store(#[from] StoreError),
}

impl From<BrokerError> for SessionError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Authentication(msg) => SessionError::Authentication(msg),
            other => SessionError::Remote(other.to_string()),
        }
    }
}

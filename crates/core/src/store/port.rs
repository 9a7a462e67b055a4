use super::error::StoreError;
use crate::session::entity::{AccessToken, StoredToken};
use async_trait::async_trait;

/// # Summary
/// 访问令牌的持久化接口，是令牌耐久状态的唯一所有者。
///
/// # Invariants
/// - 只保存一个令牌值，新的写入整体覆盖旧值。
/// - 令牌的签发时间由实现方记录 (文件实现使用修改时间)，调用方不可伪造。
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// # Summary
    /// 读取当前持久化的令牌及其签发时间。
    ///
    /// # Returns
    /// * `Ok(None)` - 从未保存过令牌
    /// * `Ok(Some(StoredToken))` - 令牌值与记录的签发时间
    async fn load(&self) -> Result<Option<StoredToken>, StoreError>;

    /// # Summary
    /// 持久化新签发的令牌，签发时间记为写入时刻。
    ///
    /// # Arguments
    /// * `token` - 券商刚刚签发的访问令牌
    async fn save(&self, token: &AccessToken) -> Result<(), StoreError>;
}

use crate::common::redact;
use crate::common::time::{RealTimeProvider, TimeProvider, start_of_day};
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use utoipa::ToSchema;

/// # Summary
/// 券商签发的当日访问令牌。
///
/// # Invariants
/// - 只在签发当日 (本地自然日) 有效，跨日后必须视为过期。
/// - `Debug` 输出经过脱敏，避免令牌进入日志。
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken({})", redact(&self.0))
    }
}

/// # Summary
/// 从持久化介质中读出的令牌及其记录的签发时间。
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub token: AccessToken,
    pub issued_at: DateTime<Local>,
}

/// # Summary
/// 令牌新鲜度检查结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum TokenFreshness {
    /// 今日签发，可直接使用
    Fresh,
    /// 不存在或签发于今日零点之前
    Stale,
}

/// # Summary
/// 根据签发时间判断令牌是否新鲜。
///
/// # Logic
/// 1. 没有签发记录 -> Stale。
/// 2. 签发时间严格早于 `now` 所在自然日的零点 -> Stale。
/// 3. 其余 -> Fresh。
pub fn token_freshness<Tz: TimeZone>(
    issued_at: Option<&DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> TokenFreshness {
    match issued_at {
        Some(issued) if *issued >= start_of_day(now) => TokenFreshness::Fresh,
        _ => TokenFreshness::Stale,
    }
}

/// # Summary
/// 会话状态机。进程启动时根据令牌有效性确定初始状态。
///
/// # Invariants
/// - 只有令牌交换成功 (或直接装载了今日令牌) 后才进入 `Authenticated`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SessionState {
    Unauthenticated,
    AwaitingCallback,
    Authenticated,
}

/// # Summary
/// 计算令牌的失效时刻，即签发日次日零点。
///
/// # Logic
/// 取次日正午定位时区偏移，再截断到当日零点，夏令时切换日同样成立。
pub fn token_expiry<Tz: TimeZone>(issued_at: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let next_midday = issued_at.date_naive().succ_opt()?.and_hms_opt(12, 0, 0)?;
    let anchor = issued_at.timezone().from_local_datetime(&next_midday).earliest()?;
    Some(start_of_day(&anchor))
}

/// # Summary
/// REST 与行情两条链路共享的访问令牌单元。
///
/// # Invariants
/// - 写入是单次原子替换，写入后所有新的读取立即可见。
/// - 只保存今日签发的令牌：安装时拒绝过期令牌，读取时发现跨日则清空。
/// - 订阅方可通过 `watch()` 感知令牌变化 (行情连接据此重连或断开)。
pub struct CredentialCell {
    tx: watch::Sender<Option<StoredToken>>,
    clock: Arc<dyn TimeProvider>,
}

impl CredentialCell {
    /// 使用系统时钟判断令牌是否跨日
    pub fn new() -> Self {
        Self::with_clock(Arc::new(RealTimeProvider))
    }

    pub fn with_clock(clock: Arc<dyn TimeProvider>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx, clock }
    }

    /// # Summary
    /// 原子地替换当前令牌。
    ///
    /// # Returns
    /// * `false` - 令牌签发于今日零点之前，未安装，原有令牌保持不变
    pub fn install(&self, token: AccessToken, issued_at: DateTime<Local>) -> bool {
        if token_freshness(Some(&issued_at), &self.clock.now()) == TokenFreshness::Stale {
            return false;
        }
        self.tx.send_replace(Some(StoredToken { token, issued_at }));
        true
    }

    /// 清除当前令牌，只有确实持有令牌时才通知订阅方
    pub fn clear(&self) -> bool {
        self.tx.send_if_modified(|slot| slot.take().is_some())
    }

    /// # Summary
    /// 读取当前令牌的快照。
    ///
    /// # Logic
    /// 1. 令牌仍为今日签发 -> 返回令牌。
    /// 2. 令牌已跨日 -> 清空单元 (行情连接随之断开) 并返回 `None`。
    pub fn current(&self) -> Option<AccessToken> {
        let now = self.clock.now();
        let snapshot = self.tx.borrow().clone()?;
        if token_freshness(Some(&snapshot.issued_at), &now) == TokenFreshness::Fresh {
            return Some(snapshot.token);
        }
        // 只清除已过期的值，避免覆盖并发安装的新令牌
        self.tx.send_if_modified(|slot| {
            let stale = slot
                .as_ref()
                .is_some_and(|s| token_freshness(Some(&s.issued_at), &now) == TokenFreshness::Stale);
            if stale {
                *slot = None;
            }
            stale
        });
        None
    }

    /// 距当前令牌失效的剩余时长，没有令牌时返回 `None`
    pub fn expires_in(&self) -> Option<std::time::Duration> {
        let issued_at = self.tx.borrow().as_ref()?.issued_at;
        let remaining = token_expiry(&issued_at)? - self.clock.now();
        Some(remaining.to_std().unwrap_or(std::time::Duration::ZERO))
    }

    /// 获取变化通知接收端
    pub fn watch(&self) -> watch::Receiver<Option<StoredToken>> {
        self.tx.subscribe()
    }
}

impl Default for CredentialCell {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCell")
            .field("token", &*self.tx.borrow())
            .finish()
    }
}

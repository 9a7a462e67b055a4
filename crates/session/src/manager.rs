use chrono::{DateTime, Local};
use qiab_core::broker::port::BrokerPort;
use qiab_core::common::redact;
use qiab_core::common::time::TimeProvider;
use qiab_core::session::entity::{AccessToken, SessionState, StoredToken, TokenFreshness, token_freshness};
use qiab_core::session::error::SessionError;
use qiab_core::session::port::BrowserLauncher;
use qiab_core::store::port::TokenStore;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// 会话状态与已认证令牌的签发时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionSlot {
    state: SessionState,
    issued_at: Option<DateTime<Local>>,
}

impl SessionSlot {
    fn new(state: SessionState) -> Self {
        Self { state, issued_at: None }
    }
}

/// # Summary
/// 会话管理器：编排登录握手并维护会话状态机。
///
/// # Invariants
/// - 只有令牌交换成功或装载了今日令牌后才进入 `Authenticated`。
/// - 跨过零点或券商拒绝令牌后，`Authenticated` 立即降级为 `Unauthenticated`。
/// - 令牌失败不做自动重试。
/// - 令牌与 API Secret 不以明文进入日志。
pub struct SessionManager {
    broker: Arc<dyn BrokerPort>,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn TimeProvider>,
    launcher: Arc<dyn BrowserLauncher>,
    api_secret: String,
    slot: RwLock<SessionSlot>,
}

impl SessionManager {
    pub fn new(
        broker: Arc<dyn BrokerPort>,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn TimeProvider>,
        launcher: Arc<dyn BrowserLauncher>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            store,
            clock,
            launcher,
            api_secret: api_secret.into(),
            slot: RwLock::new(SessionSlot::new(SessionState::Unauthenticated)),
        }
    }

    /// # Summary
    /// 当前会话状态。
    ///
    /// # Logic
    /// 1. 非 `Authenticated` 原样返回。
    /// 2. 令牌签发于今日零点之前：丢弃券商句柄中的令牌，降级为 `Unauthenticated`。
    /// 3. 券商句柄已不持有令牌 (被券商拒绝)：降级为 `Unauthenticated`。
    pub fn state(&self) -> SessionState {
        let observed = *self.slot.read().unwrap_or_else(PoisonError::into_inner);
        if observed.state != SessionState::Authenticated {
            return observed.state;
        }

        let fresh = token_freshness(observed.issued_at.as_ref(), &self.clock.now()) == TokenFreshness::Fresh;
        if fresh && self.broker.has_access_token() {
            return SessionState::Authenticated;
        }

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        // 期间已有新的登录完成
        if *slot != observed {
            return slot.state;
        }
        if fresh {
            info!("Broker rejected the access token, login required");
        } else {
            info!("Access token issued at {:?} expired at midnight, login required", observed.issued_at);
            self.broker.clear_access_token();
        }
        *slot = SessionSlot::new(SessionState::Unauthenticated);
        slot.state
    }

    fn set_state(&self, next: SessionState) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = SessionSlot::new(next);
    }

    fn set_authenticated(&self, issued_at: DateTime<Local>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = SessionSlot {
            state: SessionState::Authenticated,
            issued_at: Some(issued_at),
        };
    }

    /// 读取持久化令牌；读取失败按"无令牌"处理
    async fn load_stored(&self) -> Option<StoredToken> {
        match self.store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to read stored access token: {}", e);
                None
            }
        }
    }

    /// # Summary
    /// 检查持久化令牌是否为今日签发。
    ///
    /// # Logic
    /// 以本地时区当日零点为界：签发时间早于零点或令牌不存在均为 `Stale`。
    pub async fn check_token_freshness(&self) -> TokenFreshness {
        let stored = self.load_stored().await;
        token_freshness(stored.as_ref().map(|s| &s.issued_at), &self.clock.now())
    }

    /// # Summary
    /// 发起托管登录。
    ///
    /// # Logic
    /// 1. 取得券商登录页地址。
    /// 2. 尝试在外部浏览器打开，失败只记录日志。
    /// 3. 未认证时进入 `AwaitingCallback`。
    ///
    /// # Returns
    /// 登录页 URL，调用方可自行展示给操作员。
    pub fn begin_login(&self) -> String {
        let url = self.broker.login_url();
        info!("Login required, open {} in a browser", url);
        if let Err(e) = self.launcher.open(&url) {
            warn!("Failed to launch browser for login: {}", e);
        }
        if self.state() != SessionState::Authenticated {
            self.set_state(SessionState::AwaitingCallback);
        }
        url
    }

    /// # Summary
    /// 用登录回调中的一次性 request_token 换取当日访问令牌。
    ///
    /// # Logic
    /// 1. 空令牌直接拒绝，不调用券商。
    /// 2. 调用券商交换令牌，失败时回到 `Unauthenticated` (已认证的会话保持不变)。
    /// 3. 成功后以当前时刻为签发时间原子安装到客户端句柄，再持久化；持久化失败只告警，当前会话仍可用。
    ///
    /// # Returns
    /// * `Ok(AccessToken)` - 新签发的访问令牌
    /// * `Err(SessionError)` - 失败原因原样返回给调用方
    pub async fn complete_login(&self, request_token: &str) -> Result<AccessToken, SessionError> {
        let request_token = request_token.trim();
        if request_token.is_empty() {
            return Err(SessionError::InvalidRequestToken(
                "request_token is missing or empty".to_string(),
            ));
        }

        let grant = match self.broker.generate_session(request_token, &self.api_secret).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!("Token exchange failed: {}", e);
                if self.state() != SessionState::Authenticated {
                    self.set_state(SessionState::Unauthenticated);
                }
                return Err(e.into());
            }
        };

        let issued_at = self.clock.now();
        if !self.broker.set_access_token(grant.access_token.clone(), issued_at) {
            self.set_state(SessionState::Unauthenticated);
            return Err(SessionError::Authentication(
                "Broker client refused the new access token".to_string(),
            ));
        }
        if let Err(e) = self.store.save(&grant.access_token).await {
            warn!("Access token installed but not persisted: {}", e);
        }
        self.set_authenticated(issued_at);
        info!(
            "Session authenticated for user {} (token {})",
            grant.user_id,
            redact(grant.access_token.as_str())
        );

        Ok(grant.access_token)
    }

    /// # Summary
    /// 进程启动时建立初始会话。
    ///
    /// # Logic
    /// 1. 持久化令牌为今日签发：直接安装，不访问券商，也不打开登录页。
    /// 2. 否则 (或客户端句柄拒绝安装) 发起托管登录，等待回调。
    pub async fn initialize(&self) -> SessionState {
        let now = self.clock.now();
        match self.load_stored().await {
            Some(stored) if token_freshness(Some(&stored.issued_at), &now) == TokenFreshness::Fresh => {
                info!(
                    "Reusing access token issued at {} ({})",
                    stored.issued_at,
                    redact(stored.token.as_str())
                );
                if self.broker.set_access_token(stored.token, stored.issued_at) {
                    self.set_authenticated(stored.issued_at);
                } else {
                    warn!("Broker client refused the stored access token");
                    self.begin_login();
                }
            }
            Some(stored) => {
                info!("Stored access token issued at {} has expired", stored.issued_at);
                self.begin_login();
            }
            None => {
                info!("No stored access token");
                self.begin_login();
            }
        }
        self.state()
    }
}

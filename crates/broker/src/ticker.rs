use crate::codec::{decode_binary, decode_text, mode_command, subscribe_command, unsubscribe_command};
use crate::reconnect::{ReconnectConfig, ReconnectPolicy};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use qiab_core::common::InstrumentToken;
use qiab_core::common::tls::ensure_crypto_provider;
use qiab_core::config::{BrokerConfig, TickerConfig};
use qiab_core::market::entity::{StreamEvent, StreamMode};
use qiab_core::market::error::StreamError;
use qiab_core::market::port::TickerTransport;
use qiab_core::session::entity::{AccessToken, CredentialCell, StoredToken};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 未收到关闭帧就断开时使用的关闭码
const ABNORMAL_CLOSURE: u16 = 1006;

/// 单次连接结束的原因
enum SessionEnd {
    /// 进程关闭或事件接收端已丢弃
    Stopped,
    /// 访问令牌被替换、清除或跨日失效
    TokenChanged,
    /// 服务端关闭或连接中断
    Closed { code: u16, reason: String },
}

/// # Summary
/// Kite 行情 websocket 传输层。
///
/// # Invariants
/// - 使用与 REST 客户端相同的 `CredentialCell`，令牌未就绪或已跨日时不发起连接。
/// - 令牌变化时主动断开并以新令牌重连；令牌被清除或到达次日零点时断开并等待重新登录。
/// - 每次连接成功都产出 `StreamEvent::Connected`，订阅恢复由上层负责。
/// - 指令只在存在活跃连接时下发，否则返回 `StreamError::NotConnected`。
pub struct KiteTicker {
    ws_root: String,
    api_key: String,
    credential: Arc<CredentialCell>,
    reconnect: ReconnectConfig,
    /// 当前连接的写端队列，断开后置空
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    shutdown: CancellationToken,
}

impl KiteTicker {
    /// # Arguments
    /// * `shutdown` - 取消后连接循环在当前 I/O 完成后退出
    pub fn new(
        broker: &BrokerConfig,
        ticker: &TickerConfig,
        credential: Arc<CredentialCell>,
        shutdown: CancellationToken,
    ) -> Self {
        ensure_crypto_provider();
        Self {
            ws_root: broker.ws_root.clone(),
            api_key: broker.api_key.clone(),
            credential,
            reconnect: ReconnectConfig::from(ticker),
            writer: Mutex::new(None),
            shutdown,
        }
    }

    fn socket_url(&self, token: &AccessToken) -> Result<Url, StreamError> {
        let mut url = Url::parse(&self.ws_root)
            .map_err(|e| StreamError::Transport(format!("Invalid ticker url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .append_pair("access_token", token.as_str());
        Ok(url)
    }

    /// 等待今日令牌就绪，进程关闭时返回 `None`
    async fn wait_for_token(
        &self,
        token_rx: &mut watch::Receiver<Option<StoredToken>>,
    ) -> Option<AccessToken> {
        loop {
            token_rx.mark_unchanged();
            if let Some(token) = self.credential.current() {
                return Some(token);
            }
            info!("Ticker waiting for access token");
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                changed = token_rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// # Summary
    /// 建立一次连接并持续收发，直到连接结束。
    ///
    /// # Logic
    /// 1. 握手成功后重置退避进度，登记写端，产出 `Connected`。
    /// 2. 同时监听：关闭信号、令牌变化、令牌到期、待发指令、服务端消息。
    /// 3. 二进制帧解码为 `Tick`，文本帧解码为订单推送或错误。
    async fn run_session(
        &self,
        token: &AccessToken,
        events: &mpsc::Sender<StreamEvent>,
        token_rx: &mut watch::Receiver<Option<StoredToken>>,
        policy: &mut ReconnectPolicy,
    ) -> Result<SessionEnd, StreamError> {
        let url = self.socket_url(token)?;
        info!("Connecting to ticker at {}", self.ws_root);
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        policy.reset();

        let (mut write, mut read) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Message>();
        *self.writer.lock().await = Some(cmd_tx);

        info!("Ticker connected");
        if events.send(StreamEvent::Connected).await.is_err() {
            return Ok(SessionEnd::Stopped);
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("Ticker close frame not sent: {}", e);
                    }
                    return Ok(SessionEnd::Stopped);
                }
                changed = token_rx.changed() => {
                    if changed.is_err() {
                        return Ok(SessionEnd::Stopped);
                    }
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("Ticker close frame not sent: {}", e);
                    }
                    return Ok(SessionEnd::TokenChanged);
                }
                () = until_expiry(self.credential.expires_in()) => {
                    // 读取时跨日令牌被清空
                    if self.credential.current().is_none() {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!("Ticker close frame not sent: {}", e);
                        }
                        return Ok(SessionEnd::TokenChanged);
                    }
                }
                Some(command) = cmd_rx.recv() => {
                    write
                        .send(command)
                        .await
                        .map_err(|e| StreamError::Transport(e.to_string()))?;
                }
                frame = read.next() => match frame {
                    None => {
                        return Ok(SessionEnd::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: "connection dropped".to_string(),
                        });
                    }
                    Some(Err(e)) => return Err(StreamError::Transport(e.to_string())),
                    Some(Ok(Message::Binary(data))) => {
                        for tick in decode_binary(&data) {
                            if events.send(StreamEvent::Tick(tick)).await.is_err() {
                                return Ok(SessionEnd::Stopped);
                            }
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = decode_text(text.as_str())
                            && events.send(event).await.is_err()
                        {
                            return Ok(SessionEnd::Stopped);
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        write
                            .send(Message::Pong(payload))
                            .await
                            .map_err(|e| StreamError::Transport(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((ABNORMAL_CLOSURE, String::new()));
                        return Ok(SessionEnd::Closed { code, reason });
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    async fn send_command(&self, command: String) -> Result<(), StreamError> {
        let guard = self.writer.lock().await;
        let writer = guard.as_ref().ok_or(StreamError::NotConnected)?;
        writer
            .send(Message::Text(command.into()))
            .map_err(|_| StreamError::NotConnected)
    }
}

/// 等到令牌失效时刻，没有令牌时永不完成
async fn until_expiry(remaining: Option<Duration>) {
    match remaining {
        Some(remaining) => tokio::time::sleep(remaining).await,
        None => std::future::pending::<()>().await,
    }
}

#[async_trait]
impl TickerTransport for KiteTicker {
    /// # Logic
    /// 1. 等待令牌就绪后连接。
    /// 2. 连接结束后产出 `Closed` / `Error`，按退避策略等待并产出 `Reconnecting`。
    /// 3. 令牌变化时跳过退避立即重连。
    /// 4. 超过最大重连次数时返回错误。
    async fn serve(&self, events: mpsc::Sender<StreamEvent>) -> Result<(), StreamError> {
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());
        let mut token_rx = self.credential.watch();

        loop {
            let Some(token) = self.wait_for_token(&mut token_rx).await else {
                return Ok(());
            };

            let outcome = self
                .run_session(&token, &events, &mut token_rx, &mut policy)
                .await;
            *self.writer.lock().await = None;

            let event = match outcome {
                Ok(SessionEnd::Stopped) => return Ok(()),
                Ok(SessionEnd::TokenChanged) => {
                    policy.reset();
                    let reason = if self.credential.current().is_some() {
                        info!("Access token changed, reconnecting ticker");
                        "access token changed"
                    } else {
                        info!("Access token expired or revoked, ticker waits for login");
                        "access token cleared"
                    };
                    let closed = StreamEvent::Closed {
                        code: 1000,
                        reason: reason.to_string(),
                    };
                    if events.send(closed).await.is_err() {
                        return Ok(());
                    }
                    continue;
                }
                Ok(SessionEnd::Closed { code, reason }) => {
                    warn!("Ticker closed: code={} reason={}", code, reason);
                    StreamEvent::Closed { code, reason }
                }
                Err(e) => {
                    warn!("Ticker connection failed: {}", e);
                    StreamEvent::Error(e.to_string())
                }
            };
            if events.send(event).await.is_err() {
                return Ok(());
            }

            let Some(delay) = policy.next_delay() else {
                error!("Ticker gave up after {} reconnect attempts", policy.attempt());
                return Err(StreamError::Transport(format!(
                    "gave up after {} reconnect attempts",
                    policy.attempt()
                )));
            };
            let attempt = policy.attempt();
            info!("Ticker reconnecting in {:?} (attempt {})", delay, attempt);
            if events.send(StreamEvent::Reconnecting { attempt }).await.is_err() {
                return Ok(());
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), StreamError> {
        if tokens.is_empty() {
            return Ok(());
        }
        self.send_command(subscribe_command(tokens)).await
    }

    async fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), StreamError> {
        if tokens.is_empty() {
            return Ok(());
        }
        self.send_command(unsubscribe_command(tokens)).await
    }

    async fn set_mode(&self, mode: StreamMode, tokens: &[InstrumentToken]) -> Result<(), StreamError> {
        if tokens.is_empty() {
            return Ok(());
        }
        self.send_command(mode_command(mode, tokens)).await
    }
}

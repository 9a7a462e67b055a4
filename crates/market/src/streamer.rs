use futures::StreamExt;
use qiab_core::common::InstrumentToken;
use qiab_core::market::entity::{ConnectionState, StreamEvent, StreamMode};
use qiab_core::market::error::StreamError;
use qiab_core::market::port::{StreamEventStream, TickerTransport};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, trace, warn};

/// 传输层到分发循环的缓冲
const TRANSPORT_BUFFER: usize = 1024;
/// 每个消费者可以落后的事件数
const BROADCAST_CAPACITY: usize = 4096;

/// # Summary
/// 行情推送器：持有订阅集合与连接状态，把传输层事件分发给所有消费者。
///
/// # Invariants
/// - 订阅集合只由本组件修改，不会被隐式裁剪。
/// - 每次进入 `Connected` 都完整重放订阅集合：一次订阅指令覆盖全部合约，
///   再按模式分组各下发一次模式指令。
/// - 单条指令失败只产出 `StreamEvent::Error`，不断开连接。
pub struct MarketDataStreamer {
    transport: Arc<dyn TickerTransport>,
    subscriptions: Mutex<BTreeMap<InstrumentToken, StreamMode>>,
    state: RwLock<ConnectionState>,
    events: broadcast::Sender<StreamEvent>,
}

/// 订阅集合的只读快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub instrument_token: InstrumentToken,
    pub mode: StreamMode,
}

impl MarketDataStreamer {
    pub fn new(transport: Arc<dyn TickerTransport>) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            transport,
            subscriptions: Mutex::new(BTreeMap::new()),
            state: RwLock::new(ConnectionState::Disconnected),
            events,
        }
    }

    /// 预置启动订阅 (首次连接时下发)
    pub fn with_subscriptions(self, tokens: &[InstrumentToken], mode: StreamMode) -> Self {
        {
            let mut subs = self.lock_subscriptions();
            for token in tokens {
                subs.insert(*token, mode);
            }
        }
        self
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, BTreeMap<InstrumentToken, StreamMode>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            debug!("Ticker state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// 当前订阅集合，按 instrument token 升序
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock_subscriptions()
            .iter()
            .map(|(token, mode)| Subscription {
                instrument_token: *token,
                mode: *mode,
            })
            .collect()
    }

    /// # Summary
    /// 订阅事件流。每个调用方获得独立的、从订阅时刻开始的无限事件序列。
    ///
    /// # Invariants
    /// - 消费过慢导致落后时丢弃最旧的事件并记录告警，不会阻塞推送器。
    pub fn events(&self) -> StreamEventStream {
        let stream = BroadcastStream::new(self.events.subscribe()).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Stream consumer lagged, {} events dropped", skipped);
                    None
                }
            }
        });
        Box::pin(stream)
    }

    fn publish(&self, event: StreamEvent) {
        if self.events.send(event).is_err() {
            trace!("No stream consumers attached");
        }
    }

    fn report(&self, err: &StreamError) {
        warn!("Ticker command failed: {}", err);
        self.publish(StreamEvent::Error(err.to_string()));
    }

    /// # Summary
    /// 运行推送器：驱动传输层连接循环并分发其事件，直到传输层退出。
    pub async fn run(&self) -> Result<(), StreamError> {
        let (tx, mut rx) = mpsc::channel(TRANSPORT_BUFFER);
        self.set_state(ConnectionState::Connecting);

        let serve = self.transport.serve(tx);
        let dispatch = async {
            while let Some(event) = rx.recv().await {
                self.dispatch(event).await;
            }
        };
        let (result, ()) = tokio::join!(serve, dispatch);

        self.set_state(ConnectionState::Disconnected);
        match &result {
            Ok(()) => info!("Market data streamer stopped"),
            Err(e) => warn!("Market data streamer stopped: {}", e),
        }
        result
    }

    /// # Summary
    /// 处理一条传输层事件并转发给所有消费者。
    ///
    /// # Logic
    /// 1. `Connected`：更新状态并重放全部订阅 (先于事件转发完成)。
    /// 2. `Closed` / `Reconnecting`：更新状态。
    /// 3. 其余事件原样转发，推送器本身不做任何行情处理。
    pub async fn dispatch(&self, event: StreamEvent) {
        match &event {
            StreamEvent::Connected => {
                self.set_state(ConnectionState::Connected);
                self.apply_subscriptions().await;
            }
            StreamEvent::Closed { .. } => self.set_state(ConnectionState::Disconnected),
            StreamEvent::Reconnecting { .. } => self.set_state(ConnectionState::Reconnecting),
            StreamEvent::Error(_) | StreamEvent::Tick(_) | StreamEvent::OrderUpdate(_) => {}
        }
        self.publish(event);
    }

    async fn apply_subscriptions(&self) {
        let snapshot = self.lock_subscriptions().clone();
        if snapshot.is_empty() {
            return;
        }

        let tokens: Vec<InstrumentToken> = snapshot.keys().copied().collect();
        if let Err(e) = self.transport.subscribe(&tokens).await {
            self.report(&e);
        }

        let mut by_mode: BTreeMap<StreamMode, Vec<InstrumentToken>> = BTreeMap::new();
        for (token, mode) in &snapshot {
            by_mode.entry(*mode).or_default().push(*token);
        }
        for (mode, group) in &by_mode {
            if let Err(e) = self.transport.set_mode(*mode, group).await {
                self.report(&e);
            }
        }
        info!("Resubscribed {} instruments", tokens.len());
    }

    /// # Summary
    /// 订阅合约 (已订阅的合约更新模式)。
    ///
    /// # Logic
    /// 1. 先写入订阅集合。
    /// 2. 已连接时立即下发；未连接时推迟到下一次 `Connected`。
    ///
    /// # Returns
    /// * `Err(StreamError)` - 指令下发失败 (订阅集合已更新，重连后仍会重放)
    pub async fn subscribe(&self, tokens: &[InstrumentToken], mode: StreamMode) -> Result<(), StreamError> {
        let tokens: Vec<InstrumentToken> = tokens.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if tokens.is_empty() {
            return Ok(());
        }
        {
            let mut subs = self.lock_subscriptions();
            for token in &tokens {
                subs.insert(*token, mode);
            }
        }

        if self.state() != ConnectionState::Connected {
            debug!("Ticker not connected, deferring subscribe of {:?}", tokens);
            return Ok(());
        }
        self.push(self.transport.subscribe(&tokens).await)?;
        self.push(self.transport.set_mode(mode, &tokens).await)
    }

    /// # Summary
    /// 退订合约。未连接时只修改订阅集合。
    pub async fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), StreamError> {
        let removed: Vec<InstrumentToken> = {
            let mut subs = self.lock_subscriptions();
            tokens
                .iter()
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .filter(|t| subs.remove(t).is_some())
                .collect()
        };
        if removed.is_empty() || self.state() != ConnectionState::Connected {
            return Ok(());
        }
        self.push(self.transport.unsubscribe(&removed).await)
    }

    /// 即时下发的结果：连接恰好断开视为推迟，其余失败上报后返回
    fn push(&self, result: Result<(), StreamError>) -> Result<(), StreamError> {
        match result {
            Ok(()) => Ok(()),
            Err(StreamError::NotConnected) => {
                debug!("Ticker disconnected mid-command, change deferred");
                Ok(())
            }
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }
}

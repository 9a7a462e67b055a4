//! # 测试替身
//!
//! 供各 crate 集成测试使用的内存实现，通过 `test-utils` feature 启用。

use crate::broker::entity::{BrokerInstrument, OrderParams, OrderRecord, SessionGrant};
use crate::broker::error::BrokerError;
use crate::broker::port::BrokerPort;
use crate::common::InstrumentToken;
use crate::common::time::TimeProvider;
use crate::market::entity::{StreamEvent, StreamMode};
use crate::market::error::StreamError;
use crate::market::port::TickerTransport;
use crate::session::entity::{AccessToken, StoredToken};
use crate::session::port::BrowserLauncher;
use crate::store::error::StoreError;
use crate::store::port::TokenStore;
use crate::trade::entity::OrderId;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// 构造一条最小可用的订单记录
pub fn sample_order(order_id: &str, status: &str) -> OrderRecord {
    OrderRecord {
        order_id: order_id.to_string(),
        exchange_order_id: None,
        parent_order_id: None,
        status: status.to_string(),
        status_message: None,
        order_timestamp: None,
        variety: "regular".to_string(),
        exchange: "NSE".to_string(),
        tradingsymbol: "RELIANCE".to_string(),
        instrument_token: Some(738561),
        order_type: "MARKET".to_string(),
        transaction_type: "BUY".to_string(),
        validity: "DAY".to_string(),
        product: "MIS".to_string(),
        quantity: 1,
        price: Decimal::ZERO,
        trigger_price: Decimal::ZERO,
        average_price: Decimal::ZERO,
        filled_quantity: 0,
        pending_quantity: 1,
        cancelled_quantity: 0,
        tag: None,
    }
}

/// 构造一条合约清单记录
pub fn sample_instrument(token: InstrumentToken, symbol: &str, strike: f64) -> BrokerInstrument {
    BrokerInstrument {
        instrument_token: token,
        exchange_token: token >> 8,
        tradingsymbol: symbol.to_string(),
        name: symbol.to_string(),
        last_price: 0.0,
        expiry: None,
        strike,
        tick_size: 0.05,
        lot_size: 1,
        instrument_type: "EQ".to_string(),
        segment: "NSE".to_string(),
        exchange: "NSE".to_string(),
    }
}

/// # Summary
/// 可编排结果的券商句柄替身，按操作名统计调用次数。
pub struct MockBroker {
    calls: DashMap<&'static str, usize>,
    access_token: Mutex<Option<AccessToken>>,
    placed: Mutex<Vec<(String, OrderParams)>>,
    cancelled: Mutex<Vec<(String, OrderId, Option<OrderId>)>>,
    session_result: Mutex<Result<SessionGrant, BrokerError>>,
    place_result: Mutex<Result<OrderId, BrokerError>>,
    orders_result: Mutex<Result<Vec<OrderRecord>, BrokerError>>,
    cancel_result: Mutex<Option<BrokerError>>,
    instruments_result: Mutex<Result<Vec<BrokerInstrument>, BrokerError>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            calls: DashMap::new(),
            access_token: Mutex::new(None),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            session_result: Mutex::new(Ok(SessionGrant {
                user_id: "AB1234".to_string(),
                access_token: AccessToken("mock_access_token".to_string()),
            })),
            place_result: Mutex::new(Ok(OrderId("151220000000000".to_string()))),
            orders_result: Mutex::new(Ok(Vec::new())),
            cancel_result: Mutex::new(None),
            instruments_result: Mutex::new(Ok(Vec::new())),
        }
    }

    fn record(&self, op: &'static str) {
        *self.calls.entry(op).or_insert(0) += 1;
    }

    /// 指定操作的调用次数
    pub fn calls_to(&self, op: &str) -> usize {
        self.calls.get(op).map(|c| *c).unwrap_or(0)
    }

    /// 所有远程调用的总次数 (不含本地的令牌与登录页操作)
    pub fn remote_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|e| !matches!(*e.key(), "login_url" | "set_access_token" | "clear_access_token"))
            .map(|e| *e.value())
            .sum()
    }

    pub fn installed_token(&self) -> Option<AccessToken> {
        lock(&self.access_token).clone()
    }

    pub fn placed_orders(&self) -> Vec<(String, OrderParams)> {
        lock(&self.placed).clone()
    }

    pub fn cancelled_orders(&self) -> Vec<(String, OrderId, Option<OrderId>)> {
        lock(&self.cancelled).clone()
    }

    /// 与真实客户端一致：券商判定令牌失效时丢弃已安装的令牌
    fn settle<T>(&self, result: Result<T, BrokerError>) -> Result<T, BrokerError> {
        if let Err(BrokerError::Authentication(_)) = &result {
            *lock(&self.access_token) = None;
        }
        result
    }

    pub fn set_session_result(&self, result: Result<SessionGrant, BrokerError>) {
        *lock(&self.session_result) = result;
    }

    pub fn set_place_result(&self, result: Result<OrderId, BrokerError>) {
        *lock(&self.place_result) = result;
    }

    pub fn set_orders_result(&self, result: Result<Vec<OrderRecord>, BrokerError>) {
        *lock(&self.orders_result) = result;
    }

    pub fn set_cancel_error(&self, err: Option<BrokerError>) {
        *lock(&self.cancel_result) = err;
    }

    pub fn set_instruments_result(&self, result: Result<Vec<BrokerInstrument>, BrokerError>) {
        *lock(&self.instruments_result) = result;
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerPort for MockBroker {
    fn login_url(&self) -> String {
        self.record("login_url");
        "https://kite.zerodha.com/connect/login?api_key=mock&v=3".to_string()
    }

    fn set_access_token(&self, token: AccessToken, _issued_at: DateTime<Local>) -> bool {
        self.record("set_access_token");
        *lock(&self.access_token) = Some(token);
        true
    }

    fn clear_access_token(&self) {
        self.record("clear_access_token");
        *lock(&self.access_token) = None;
    }

    fn has_access_token(&self) -> bool {
        lock(&self.access_token).is_some()
    }

    async fn generate_session(
        &self,
        _request_token: &str,
        _api_secret: &str,
    ) -> Result<SessionGrant, BrokerError> {
        self.record("generate_session");
        lock(&self.session_result).clone()
    }

    async fn place_order(&self, variety: &str, params: &OrderParams) -> Result<OrderId, BrokerError> {
        self.record("place_order");
        lock(&self.placed).push((variety.to_string(), params.clone()));
        let result = lock(&self.place_result).clone();
        self.settle(result)
    }

    async fn get_orders(&self) -> Result<Vec<OrderRecord>, BrokerError> {
        self.record("get_orders");
        let result = lock(&self.orders_result).clone();
        self.settle(result)
    }

    async fn cancel_order(
        &self,
        variety: &str,
        order_id: &OrderId,
        parent_order_id: Option<&OrderId>,
    ) -> Result<OrderId, BrokerError> {
        self.record("cancel_order");
        lock(&self.cancelled).push((variety.to_string(), order_id.clone(), parent_order_id.cloned()));
        let result = match lock(&self.cancel_result).clone() {
            Some(err) => Err(err),
            None => Ok(order_id.clone()),
        };
        self.settle(result)
    }

    async fn get_instruments(&self) -> Result<Vec<BrokerInstrument>, BrokerError> {
        self.record("get_instruments");
        let result = lock(&self.instruments_result).clone();
        self.settle(result)
    }
}

/// # Summary
/// 基于内存的令牌存储，写入时间取自注入的时钟。
pub struct MemoryTokenStore {
    clock: Arc<dyn TimeProvider>,
    stored: Mutex<Option<StoredToken>>,
    saves: Mutex<usize>,
    fail_saves: AtomicBool,
}

impl MemoryTokenStore {
    pub fn new(clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            clock,
            stored: Mutex::new(None),
            saves: Mutex::new(0),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// 预置一个指定签发时间的令牌
    pub fn with_token(self, token: &str, issued_at: DateTime<Local>) -> Self {
        *lock(&self.stored) = Some(StoredToken {
            token: AccessToken(token.to_string()),
            issued_at,
        });
        self
    }

    pub fn save_count(&self) -> usize {
        *lock(&self.saves)
    }

    pub fn stored(&self) -> Option<StoredToken> {
        lock(&self.stored).clone()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>, StoreError> {
        Ok(lock(&self.stored).clone())
    }

    async fn save(&self, token: &AccessToken) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io("disk full".to_string()));
        }
        *lock(&self.saves) += 1;
        *lock(&self.stored) = Some(StoredToken {
            token: token.clone(),
            issued_at: self.clock.now(),
        });
        Ok(())
    }
}

/// # Summary
/// 记录所有被打开 URL 的浏览器替身。
#[derive(Default)]
pub struct RecordingLauncher {
    opened: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingLauncher {
    pub fn failing() -> Self {
        let launcher = Self::default();
        launcher.fail.store(true, Ordering::SeqCst);
        launcher
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

impl BrowserLauncher for RecordingLauncher {
    fn open(&self, url: &str) -> std::io::Result<()> {
        lock(&self.opened).push(url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "xdg-open not found"));
        }
        Ok(())
    }
}

/// 传输层收到的指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Subscribe(Vec<InstrumentToken>),
    Unsubscribe(Vec<InstrumentToken>),
    SetMode(StreamMode, Vec<InstrumentToken>),
}

/// # Summary
/// 记录指令并允许测试主动注入事件的行情传输替身。
#[derive(Default)]
pub struct MockTickerTransport {
    calls: Mutex<Vec<TransportCall>>,
    sink: Mutex<Option<mpsc::Sender<StreamEvent>>>,
    fail_commands: AtomicBool,
}

impl MockTickerTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// 让后续所有指令返回错误
    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// 向 `serve` 的事件通道注入一个事件，`serve` 尚未运行时返回 false
    pub async fn push(&self, event: StreamEvent) -> bool {
        let sink = lock(&self.sink).clone();
        match sink {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    fn command(&self, call: TransportCall) -> Result<(), StreamError> {
        lock(&self.calls).push(call);
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(StreamError::Transport("rejected by mock".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TickerTransport for MockTickerTransport {
    async fn serve(&self, events: mpsc::Sender<StreamEvent>) -> Result<(), StreamError> {
        *lock(&self.sink) = Some(events.clone());
        events.closed().await;
        Ok(())
    }

    async fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), StreamError> {
        self.command(TransportCall::Subscribe(tokens.to_vec()))
    }

    async fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), StreamError> {
        self.command(TransportCall::Unsubscribe(tokens.to_vec()))
    }

    async fn set_mode(&self, mode: StreamMode, tokens: &[InstrumentToken]) -> Result<(), StreamError> {
        self.command(TransportCall::SetMode(mode, tokens.to_vec()))
    }
}

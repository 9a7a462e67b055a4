use crate::broker::entity::{BrokerInstrument, OrderRecord};
use crate::common::InstrumentToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

/// # Summary
/// 面向调用方的合约精简视图。
///
/// # Invariants
/// - 每次目录查询时重新生成，不跨请求缓存。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Instrument {
    #[schema(example = "RELIANCE")]
    pub name: String,
    #[schema(example = 738561)]
    pub instrument_token: InstrumentToken,
    #[schema(example = 2885)]
    pub exchange_token: u32,
    #[schema(example = "RELIANCE")]
    pub trading_symbol: String,
    #[schema(example = 2894.55)]
    pub last_price: f64,
    #[schema(example = "NSE")]
    pub exchange: String,
    #[schema(example = 0.0)]
    pub strike_price: f64,
}

impl From<BrokerInstrument> for Instrument {
    fn from(raw: BrokerInstrument) -> Self {
        Self {
            name: raw.name,
            instrument_token: raw.instrument_token,
            exchange_token: raw.exchange_token,
            trading_symbol: raw.tradingsymbol,
            last_price: raw.last_price,
            exchange: raw.exchange,
            strike_price: raw.strike,
        }
    }
}

/// # Summary
/// 行情订阅的详细程度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// 仅最新成交价
    Ltp,
    /// 报价 (OHLC、成交量等，不含深度)
    Quote,
    /// 全量 (含 5 档深度)
    Full,
}

impl StreamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMode::Ltp => "ltp",
            StreamMode::Quote => "quote",
            StreamMode::Full => "full",
        }
    }
}

impl FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ltp" => Ok(StreamMode::Ltp),
            "quote" => Ok(StreamMode::Quote),
            "full" => Ok(StreamMode::Full),
            _ => Err(format!("Unknown StreamMode: {}", s)),
        }
    }
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// 开高低收价格。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// # Summary
/// 单档盘口。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthItem {
    pub price: f64,
    pub quantity: u32,
    pub orders: u16,
}

/// # Summary
/// 买卖各 5 档盘口深度。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub buy: Vec<DepthItem>,
    pub sell: Vec<DepthItem>,
}

/// # Summary
/// 单个合约的一次行情更新。
///
/// # Invariants
/// - 只在内存中流转，不做持久化与重放。
/// - 未在当前模式中下发的字段保持默认值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument_token: InstrumentToken,
    pub mode: StreamMode,
    /// 指数类合约不可交易
    pub tradable: bool,
    pub last_price: f64,
    pub last_traded_quantity: u32,
    pub average_trade_price: f64,
    pub volume_traded: u32,
    pub total_buy_quantity: u32,
    pub total_sell_quantity: u32,
    pub ohlc: Ohlc,
    /// 相对昨收的涨跌幅 (百分比)
    pub net_change: f64,
    pub last_trade_time: Option<DateTime<Utc>>,
    pub oi: u32,
    pub oi_day_high: u32,
    pub oi_day_low: u32,
    pub exchange_timestamp: Option<DateTime<Utc>>,
    pub depth: Option<MarketDepth>,
}

impl Tick {
    /// # Logic
    /// 构造只含合约标识与最新价的空白 Tick，其余字段待解码器补齐。
    pub fn new(instrument_token: InstrumentToken, mode: StreamMode, tradable: bool) -> Self {
        Self {
            instrument_token,
            mode,
            tradable,
            last_price: 0.0,
            last_traded_quantity: 0,
            average_trade_price: 0.0,
            volume_traded: 0,
            total_buy_quantity: 0,
            total_sell_quantity: 0,
            ohlc: Ohlc::default(),
            net_change: 0.0,
            last_trade_time: None,
            oi: 0,
            oi_day_high: 0,
            oi_day_low: 0,
            exchange_timestamp: None,
            depth: None,
        }
    }
}

/// # Summary
/// 行情长连接的状态机。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// # Summary
/// 行情连接产出的类型化事件。传输层产出，行情推送器转发给所有订阅者。
///
/// # Invariants
/// - 同一连接内 `Tick` / `OrderUpdate` 按传输层接收顺序投递，至多一次。
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// 连接建立 (含重连成功)
    Connected,
    /// 连接被关闭
    Closed { code: u16, reason: String },
    /// 传输层正在进行第 N 次重连
    Reconnecting { attempt: u32 },
    /// 非致命错误 (订阅指令失败、服务端错误消息等)
    Error(String),
    /// 行情更新
    Tick(Tick),
    /// 订单状态推送
    OrderUpdate(OrderRecord),
}

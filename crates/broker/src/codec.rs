//! Kite 行情 websocket 报文编解码。
//!
//! 二进制帧结构：
//! - `[0..2]` 包数量 (u16, 大端)
//! - 之后每个包：`[2 字节长度][包体]`
//!
//! 包体长度决定推送模式：8 = ltp，28/32 = 指数，44 = quote，184 = full。

use chrono::{DateTime, Utc};
use qiab_core::broker::entity::OrderRecord;
use qiab_core::common::InstrumentToken;
use qiab_core::market::entity::{DepthItem, MarketDepth, Ohlc, StreamEvent, StreamMode, Tick};
use serde_json::{Value, json};
use tracing::{debug, warn};

const SEGMENT_CDS: u32 = 3;
const SEGMENT_BCD: u32 = 6;
const SEGMENT_INDICES: u32 = 9;

const LTP_PACKET: usize = 8;
const INDEX_QUOTE_PACKET: usize = 28;
const INDEX_FULL_PACKET: usize = 32;
const QUOTE_PACKET: usize = 44;
const FULL_PACKET: usize = 184;

const DEPTH_OFFSET: usize = 64;
const DEPTH_ENTRY: usize = 12;
const DEPTH_LEVELS: usize = 5;

/// 订阅指令
pub fn subscribe_command(tokens: &[InstrumentToken]) -> String {
    json!({ "a": "subscribe", "v": tokens }).to_string()
}

/// 退订指令
pub fn unsubscribe_command(tokens: &[InstrumentToken]) -> String {
    json!({ "a": "unsubscribe", "v": tokens }).to_string()
}

/// 模式切换指令，如 `{"a":"mode","v":["full",[408065]]}`
pub fn mode_command(mode: StreamMode, tokens: &[InstrumentToken]) -> String {
    json!({ "a": "mode", "v": [mode.as_str(), tokens] }).to_string()
}

/// # Summary
/// 解码一个二进制行情帧。
///
/// # Logic
/// 1. 不足 2 字节的帧视为心跳，返回空。
/// 2. 按声明的包数量逐个切分，遇到截断立即停止。
/// 3. 无法识别长度的包被跳过，不影响同帧其他包。
pub fn decode_binary(frame: &[u8]) -> Vec<Tick> {
    let Some(count) = read_u16(frame, 0) else {
        return Vec::new();
    };

    let mut ticks = Vec::with_capacity(usize::from(count));
    let mut offset = 2usize;
    for _ in 0..count {
        let Some(len) = read_u16(frame, offset) else {
            warn!("Truncated ticker frame at offset {}", offset);
            break;
        };
        let start = offset + 2;
        let end = start + usize::from(len);
        let Some(packet) = frame.get(start..end) else {
            warn!("Truncated ticker packet: need {} bytes, frame has {}", end, frame.len());
            break;
        };
        offset = end;

        match decode_packet(packet) {
            Some(tick) => ticks.push(tick),
            None => debug!("Ignoring ticker packet of {} bytes", packet.len()),
        }
    }
    ticks
}

/// # Summary
/// 解码单个行情包。
///
/// # Invariants
/// - 价格字段为整数，需按合约所属板块换算：CDS 除以 1e7，BCD 除以 1e4，其余除以 100。
/// - 指数板块 (segment 9) 的合约不可交易。
pub fn decode_packet(packet: &[u8]) -> Option<Tick> {
    let token = read_u32(packet, 0)?;
    let segment = token & 0xff;
    let divisor = match segment {
        SEGMENT_CDS => 10_000_000.0,
        SEGMENT_BCD => 10_000.0,
        _ => 100.0,
    };
    let tradable = segment != SEGMENT_INDICES;
    let price = |at: usize| read_i32(packet, at).map(|v| f64::from(v) / divisor);

    match packet.len() {
        LTP_PACKET => {
            let mut tick = Tick::new(token, StreamMode::Ltp, tradable);
            tick.last_price = price(4)?;
            Some(tick)
        }
        INDEX_QUOTE_PACKET | INDEX_FULL_PACKET => {
            let mode = if packet.len() == INDEX_FULL_PACKET {
                StreamMode::Full
            } else {
                StreamMode::Quote
            };
            let mut tick = Tick::new(token, mode, tradable);
            tick.last_price = price(4)?;
            tick.ohlc = Ohlc {
                high: price(8)?,
                low: price(12)?,
                open: price(16)?,
                close: price(20)?,
            };
            tick.net_change = net_change(tick.last_price, tick.ohlc.close);
            if packet.len() == INDEX_FULL_PACKET {
                tick.exchange_timestamp = read_time(packet, 28);
            }
            Some(tick)
        }
        QUOTE_PACKET | FULL_PACKET => {
            let mode = if packet.len() == FULL_PACKET {
                StreamMode::Full
            } else {
                StreamMode::Quote
            };
            let mut tick = Tick::new(token, mode, tradable);
            tick.last_price = price(4)?;
            tick.last_traded_quantity = read_u32(packet, 8)?;
            tick.average_trade_price = price(12)?;
            tick.volume_traded = read_u32(packet, 16)?;
            tick.total_buy_quantity = read_u32(packet, 20)?;
            tick.total_sell_quantity = read_u32(packet, 24)?;
            tick.ohlc = Ohlc {
                open: price(28)?,
                high: price(32)?,
                low: price(36)?,
                close: price(40)?,
            };
            tick.net_change = net_change(tick.last_price, tick.ohlc.close);

            if packet.len() == FULL_PACKET {
                tick.last_trade_time = read_time(packet, 44);
                tick.oi = read_u32(packet, 48)?;
                tick.oi_day_high = read_u32(packet, 52)?;
                tick.oi_day_low = read_u32(packet, 56)?;
                tick.exchange_timestamp = read_time(packet, 60);
                tick.depth = Some(decode_depth(packet, divisor)?);
            }
            Some(tick)
        }
        _ => None,
    }
}

fn decode_depth(packet: &[u8], divisor: f64) -> Option<MarketDepth> {
    let mut levels = Vec::with_capacity(DEPTH_LEVELS * 2);
    for i in 0..DEPTH_LEVELS * 2 {
        let at = DEPTH_OFFSET + i * DEPTH_ENTRY;
        levels.push(DepthItem {
            quantity: read_u32(packet, at)?,
            price: f64::from(read_i32(packet, at + 4)?) / divisor,
            orders: read_u16(packet, at + 8)?,
        });
    }
    let sell = levels.split_off(DEPTH_LEVELS);
    Some(MarketDepth { buy: levels, sell })
}

/// # Summary
/// 解码文本帧 (订单推送、错误消息等)。
///
/// # Returns
/// * `Some(StreamEvent::OrderUpdate)` - `{"type":"order","data":{..}}`
/// * `Some(StreamEvent::Error)` - `{"type":"error","data":".."}`
/// * `None` - 其他类型或无法解析
pub fn decode_text(text: &str) -> Option<StreamEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Unparseable ticker text message: {}", e);
            return None;
        }
    };

    let data = value.get("data").cloned().unwrap_or(Value::Null);
    match value.get("type").and_then(Value::as_str) {
        Some("order") => match serde_json::from_value::<OrderRecord>(data) {
            Ok(order) => Some(StreamEvent::OrderUpdate(order)),
            Err(e) => {
                warn!("Malformed order update: {}", e);
                None
            }
        },
        Some("error") => {
            let message = match data {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some(StreamEvent::Error(message))
        }
        other => {
            debug!("Ignoring ticker message of type {:?}", other);
            None
        }
    }
}

fn net_change(last: f64, close: f64) -> f64 {
    if close == 0.0 {
        0.0
    } else {
        (last - close) * 100.0 / close
    }
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(at..at + 2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn read_i32(buf: &[u8], at: usize) -> Option<i32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(i32::from_be_bytes(bytes))
}

/// 读取 Unix 秒级时间戳，0 表示缺失
fn read_time(buf: &[u8], at: usize) -> Option<DateTime<Utc>> {
    let secs = read_u32(buf, at)?;
    if secs == 0 {
        return None;
    }
    DateTime::from_timestamp(i64::from(secs), 0)
}

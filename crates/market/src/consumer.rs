use futures::StreamExt;
use qiab_core::market::entity::StreamEvent;
use qiab_core::market::port::StreamEventStream;
use tracing::{debug, info, warn};

/// # Summary
/// 默认的事件消费者：把行情事件写入日志。
///
/// # Logic
/// - `Tick` 记为 debug，订单推送记为 info，错误与断开记为 warn。
/// - 事件流结束 (推送器被丢弃) 时返回。
pub async fn log_events(mut events: StreamEventStream) {
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Connected => info!("Ticker connected"),
            StreamEvent::Reconnecting { attempt } => info!("Ticker reconnecting, attempt {}", attempt),
            StreamEvent::Closed { code, reason } => warn!("Ticker closed: {} {}", code, reason),
            StreamEvent::Error(err) => warn!("Ticker error: {}", err),
            StreamEvent::Tick(tick) => debug!(
                token = tick.instrument_token,
                mode = %tick.mode,
                last_price = tick.last_price,
                volume = tick.volume_traded,
                "tick"
            ),
            StreamEvent::OrderUpdate(order) => info!(
                order_id = %order.order_id,
                status = %order.status,
                symbol = %order.tradingsymbol,
                filled = order.filled_quantity,
                "Order update"
            ),
        }
    }
    debug!("Stream event consumer finished");
}

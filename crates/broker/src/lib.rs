//! # `qiab-broker` - 券商适配层
//!
//! Kite Connect v3 的具体实现：
//! - [`kite::KiteClient`]：REST 订单/会话/合约接口，实现 `BrokerPort`
//! - [`ticker::KiteTicker`]：websocket 行情长连接，实现 `TickerTransport`
//!
//! 两者共享同一个 `CredentialCell`，令牌刷新对两条链路同时可见。

pub mod codec;
pub mod instruments;
pub mod kite;
pub mod reconnect;
pub mod ticker;

//! # `qiab-market` - 合约目录与行情推送
//!
//! - [`catalog::InstrumentCatalog`]：每次查询都向券商重新拉取合约清单
//! - [`streamer::MarketDataStreamer`]：维护订阅集合，在每次连接建立时重新下发，
//!   并把传输层事件广播给所有消费者
//! - [`consumer::log_events`]：默认的日志消费者

pub mod catalog;
pub mod consumer;
pub mod streamer;

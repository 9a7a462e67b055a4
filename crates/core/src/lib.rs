//! # `qiab-core` - 领域核心
//!
//! 网关所有组件共享的实体、端口 (Port) 与错误定义。
//! 本 crate 不依赖任何具体的券商协议或 HTTP 框架，
//! 具体实现由 `qiab-broker`、`qiab-store` 等适配器 crate 提供，并在 `qiab-app` 中注入。

pub mod broker;
pub mod common;
pub mod config;
pub mod market;
pub mod session;
pub mod store;
pub mod trade;

#[cfg(feature = "test-utils")]
pub mod testing;

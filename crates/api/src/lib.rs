//! # `qiab-api` - HTTP API 网关
//!
//! 交易网关的 HTTP/REST 服务入口。
//! 使用 `axum` 构建路由与控制器，通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档。
//!
//! ## 架构职责
//! - 接收策略、看板或操作员的 HTTP 请求
//! - 调用下层 `TradePort` / `MarketPort` / `SessionManager` / `MarketDataStreamer` 完成业务操作
//! - 把每一种失败映射为明确的非 2xx 响应，不存在无响应的返回路径

pub mod error;
pub mod routes;
pub mod server;
pub mod types;

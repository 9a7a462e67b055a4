//! # `qiab-session` - 会话管理
//!
//! 负责每日访问令牌的生命周期：新鲜度检查、托管登录、回调换取令牌，
//! 并把令牌同时安装到券商客户端句柄与持久化存储。

pub mod browser;
pub mod manager;

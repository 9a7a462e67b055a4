//! # `qiab-trade` - 订单网关
//!
//! 校验并规范化下单请求，通过券商客户端句柄转发，并把券商结果映射为网关结果。
//! 不维护任何本地订单状态，券商侧为唯一事实来源。

pub mod gateway;
pub mod validate;

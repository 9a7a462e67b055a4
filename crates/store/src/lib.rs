//! # `qiab-store` - 凭证存储
//!
//! 当日访问令牌的持久化实现。令牌文件的修改时间是推断签发日期的唯一依据。

pub mod token;

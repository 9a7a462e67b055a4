pub mod time;
pub mod tls;

/// # Summary
/// 券商分配的合约数值标识 (instrument token)，行情订阅以此为键。
pub type InstrumentToken = u32;

/// # Summary
/// 对敏感凭证做脱敏处理，只保留前 4 个字符，用于日志输出。
///
/// # Logic
/// 1. 长度不超过 4 的值整体打码。
/// 2. 否则保留前缀并以 `****` 结尾。
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    if prefix.chars().count() == secret.chars().count() {
        "****".to_string()
    } else {
        format!("{}****", prefix)
    }
}

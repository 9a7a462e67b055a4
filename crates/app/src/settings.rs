//! # 配置装载
//!
//! 分层顺序：内置默认值 -> 可选的 `qiab.toml` -> 环境变量 `QIAB__SECTION__KEY`，
//! 最后由 `API_KEY` / `API_SECRET` 覆盖券商凭证。

use config::{Config, ConfigError, Environment, File};
use qiab_core::config::AppConfig;

/// 默认配置文件名 (不含扩展名)
pub const CONFIG_FILE: &str = "qiab";

/// # Summary
/// 读取分层配置。
///
/// # Arguments
/// * `file` - 配置文件路径 (扩展名可省略)，文件不存在时跳过
///
/// # Returns
/// * `Err(ConfigError)` - 文件格式错误或字段类型不匹配
pub fn load(file: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix("QIAB")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ticker.instrument_tokens"),
        )
        .build()?
        .try_deserialize()?;

    Ok(with_credentials(
        config,
        std::env::var("API_KEY").ok(),
        std::env::var("API_SECRET").ok(),
    ))
}

/// 用进程环境中的 API Key/Secret 覆盖配置值，空字符串视为未设置
pub fn with_credentials(mut config: AppConfig, api_key: Option<String>, api_secret: Option<String>) -> AppConfig {
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        config.broker.api_key = key.trim().to_string();
    }
    if let Some(secret) = api_secret.filter(|s| !s.trim().is_empty()) {
        config.broker.api_secret = secret.trim().to_string();
    }
    config
}

/// 缺失的凭证项名称，供启动时告警
pub fn missing_credentials(config: &AppConfig) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if config.broker.api_key.is_empty() {
        missing.push("API_KEY");
    }
    if config.broker.api_secret.is_empty() {
        missing.push("API_SECRET");
    }
    missing
}

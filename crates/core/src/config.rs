use crate::market::entity::StreamMode;
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub ticker: TickerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 券商接入配置。API Key/Secret 在启动时从环境变量装载一次。
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub api_key: String,
    pub api_secret: String,
    /// REST API 根地址
    pub api_root: String,
    /// 托管登录页根地址
    pub login_root: String,
    /// 行情 websocket 根地址
    pub ws_root: String,
    /// 单次 REST 调用超时 (秒)
    pub timeout_secs: u64,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &crate::common::redact(&self.api_secret))
            .field("api_root", &self.api_root)
            .field("login_root", &self.login_root)
            .field("ws_root", &self.ws_root)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: String,
    /// 令牌文件名，相对于 `data_dir`
    pub token_file: String,
}

/// 行情长连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// 启动时订阅的合约
    pub instrument_tokens: Vec<u32>,
    /// 启动订阅使用的推送模式
    pub mode: StreamMode,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// 最大重连次数 (0 = 不限)
    pub max_reconnect_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            api_root: "https://api.kite.trade".to_string(),
            login_root: "https://kite.zerodha.com/connect/login".to_string(),
            ws_root: "wss://ws.kite.trade".to_string(),
            timeout_secs: 7,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
            token_file: "token.txt".to_string(),
        }
    }
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            instrument_tokens: vec![281854981],
            mode: StreamMode::Full,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 60_000,
            max_reconnect_attempts: 0,
        }
    }
}

impl ServerConfig {
    /// 监听地址，如 `127.0.0.1:8000`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr(), "127.0.0.1:8000");
        assert_eq!(config.store.token_file, "token.txt");
        assert_eq!(config.broker.api_root, "https://api.kite.trade");
        assert_eq!(config.ticker.instrument_tokens, vec![281854981]);
        assert_eq!(config.ticker.mode, StreamMode::Full);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"server": {"port": 9000}, "ticker": {"mode": "quote"}}"#).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.ticker.mode, StreamMode::Quote);
        assert_eq!(config.ticker.reconnect_initial_ms, 1_000);
    }

    #[test]
    fn test_broker_config_debug_hides_secret() {
        let mut broker = BrokerConfig::default();
        broker.api_secret = "verysecretvalue".into();
        let rendered = format!("{:?}", broker);
        assert!(!rendered.contains("verysecretvalue"));
    }
}

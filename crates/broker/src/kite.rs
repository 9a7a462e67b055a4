use crate::instruments::parse_instruments_csv;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use qiab_core::broker::entity::{BrokerInstrument, OrderParams, OrderRecord, SessionGrant};
use qiab_core::broker::error::BrokerError;
use qiab_core::broker::port::BrokerPort;
use qiab_core::common::tls::ensure_crypto_provider;
use qiab_core::config::BrokerConfig;
use qiab_core::session::entity::{AccessToken, CredentialCell};
use qiab_core::trade::entity::OrderId;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const KITE_VERSION: &str = "3";

/// # Summary
/// Kite Connect v3 REST 客户端，即网关唯一的券商客户端句柄。
///
/// # Invariants
/// - 访问令牌保存在共享的 `CredentialCell` 中，每次请求时读取快照，跨日令牌不会被发送。
/// - 券商判定令牌失效后立即清空单元，后续请求在本地直接失败。
/// - 除 `generate_session` 外的所有请求都必须携带 `Authorization: token key:access_token`。
/// - 不做客户端重试，失败原样上报。
#[derive(Clone)]
pub struct KiteClient {
    client: Client,
    api_key: String,
    api_root: String,
    login_root: String,
    credential: Arc<CredentialCell>,
}

/// 订单类接口的 `data` 部分
#[derive(Deserialize)]
struct OrderIdData {
    order_id: String,
}

/// 会话交换接口的 `data` 部分
#[derive(Deserialize)]
struct SessionData {
    #[serde(default)]
    user_id: String,
    access_token: String,
}

impl KiteClient {
    /// # Summary
    /// 根据券商配置创建客户端。
    ///
    /// # Logic
    /// 1. 确保 rustls 加密后端已安装。
    /// 2. 配置超时与 `X-Kite-Version` 默认头。
    ///
    /// # Arguments
    /// * `config` - 券商接入配置
    /// * `credential` - 与行情连接共享的令牌单元
    pub fn new(config: &BrokerConfig, credential: Arc<CredentialCell>) -> Result<Self, BrokerError> {
        ensure_crypto_provider();

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "X-Kite-Version",
            reqwest::header::HeaderValue::from_static(KITE_VERSION),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_root: config.api_root.trim_end_matches('/').to_string(),
            login_root: config.login_root.clone(),
            credential,
        })
    }

    /// 拼接 REST 地址，路径段逐段转义
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BrokerError> {
        let mut url = Url::parse(&self.api_root)
            .map_err(|e| BrokerError::Network(format!("Invalid api root: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| BrokerError::Network("Invalid api root".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorization(&self) -> Result<String, BrokerError> {
        let token = self.credential.current().ok_or_else(|| {
            BrokerError::Authentication("Access token is not set, please login".to_string())
        })?;
        Ok(format!("token {}:{}", self.api_key, token.as_str()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, BrokerError> {
        request
            .send()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))
    }

    /// 券商拒绝令牌时清空共享单元，行情连接随之断开
    fn settle<T>(&self, result: Result<T, BrokerError>) -> Result<T, BrokerError> {
        if let Err(BrokerError::Authentication(_)) = &result
            && self.credential.clear()
        {
            warn!("Access token discarded, login required");
        }
        result
    }
}

/// # Summary
/// 计算会话交换校验和：`sha256(api_key + request_token + api_secret)` 的十六进制形式。
pub fn session_checksum(api_key: &str, request_token: &str, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update(request_token.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// # Summary
/// 把错误信封映射为 `BrokerError`。
///
/// # Logic
/// 1. `TokenException` 或 HTTP 403 -> `Authentication`。
/// 2. 其余 -> `Remote`，保留券商原始 `message`。
fn envelope_error(status: StatusCode, body: &Value) -> BrokerError {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown broker error")
        .to_string();
    let kind = body
        .get("error_type")
        .and_then(Value::as_str)
        .unwrap_or("GeneralException")
        .to_string();

    if kind == "TokenException" || status == StatusCode::FORBIDDEN {
        return BrokerError::Authentication(message);
    }
    BrokerError::Remote { kind, message }
}

/// # Summary
/// 非 JSON 的失败响应：5xx 多为网关或负载均衡页面，按网络故障处理；其余保留原文。
fn non_json_error(status: StatusCode, body: &str) -> BrokerError {
    if status.is_server_error() {
        return BrokerError::Network(format!("HTTP {} from broker", status.as_u16()));
    }
    BrokerError::Remote {
        kind: format!("HTTP {}", status.as_u16()),
        message: body.trim().to_string(),
    }
}

/// # Summary
/// 解析 Kite 的 JSON 信封 `{status, data, message, error_type}`。
///
/// # Returns
/// * `Ok(T)` - `status == "success"` 时的 `data`
/// * `Err(BrokerError)` - 错误信封、非 JSON 响应或 `data` 结构不符
pub(crate) fn parse_envelope<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<T, BrokerError> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if !status.is_success() => return Err(non_json_error(status, body)),
        Err(e) => return Err(BrokerError::Parse(e.to_string())),
    };

    let ok = status.is_success() && value.get("status").and_then(Value::as_str) == Some("success");
    if !ok {
        return Err(envelope_error(status, &value));
    }

    let data = value.get("data").cloned().unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(|e| BrokerError::Parse(e.to_string()))
}

async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T, BrokerError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BrokerError::Network(e.to_string()))?;
    let result = parse_envelope(status, &body);
    if let Err(BrokerError::Authentication(msg)) = &result {
        warn!("Broker rejected access token: {}", msg);
    }
    result
}

fn order_form(params: &OrderParams) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("exchange", params.exchange.clone()),
        ("tradingsymbol", params.tradingsymbol.clone()),
        ("transaction_type", params.transaction_type.as_str().to_string()),
        ("quantity", params.quantity.to_string()),
        ("product", params.product.clone()),
        ("order_type", params.order_type.clone()),
        ("validity", params.validity.clone()),
    ];
    if let Some(price) = params.price {
        form.push(("price", price.to_string()));
    }
    if let Some(trigger) = params.trigger_price {
        form.push(("trigger_price", trigger.to_string()));
    }
    if let Some(disclosed) = params.disclosed_quantity {
        form.push(("disclosed_quantity", disclosed.to_string()));
    }
    if let Some(tag) = &params.tag {
        form.push(("tag", tag.clone()));
    }
    form
}

#[async_trait]
impl BrokerPort for KiteClient {
    fn login_url(&self) -> String {
        format!("{}?api_key={}&v={}", self.login_root, self.api_key, KITE_VERSION)
    }

    fn set_access_token(&self, token: AccessToken, issued_at: DateTime<Local>) -> bool {
        let installed = self.credential.install(token, issued_at);
        if !installed {
            warn!("Refused to install access token issued at {}", issued_at);
        }
        installed
    }

    fn clear_access_token(&self) {
        self.credential.clear();
    }

    fn has_access_token(&self) -> bool {
        self.credential.current().is_some()
    }

    async fn generate_session(
        &self,
        request_token: &str,
        api_secret: &str,
    ) -> Result<SessionGrant, BrokerError> {
        let url = self.endpoint(&["session", "token"])?;
        let checksum = session_checksum(&self.api_key, request_token, api_secret);
        let form = [
            ("api_key", self.api_key.as_str()),
            ("request_token", request_token),
            ("checksum", checksum.as_str()),
        ];

        let response = self.send(self.client.post(url).form(&form)).await?;
        let data: SessionData = read_envelope(response).await?;
        debug!("Session generated for user {}", data.user_id);

        Ok(SessionGrant {
            user_id: data.user_id,
            access_token: AccessToken(data.access_token),
        })
    }

    async fn place_order(&self, variety: &str, params: &OrderParams) -> Result<OrderId, BrokerError> {
        let auth = self.authorization()?;
        let url = self.endpoint(&["orders", variety])?;
        let request = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .form(&order_form(params));

        let data: OrderIdData = self.settle(read_envelope(self.send(request).await?).await)?;
        Ok(OrderId(data.order_id))
    }

    async fn get_orders(&self) -> Result<Vec<OrderRecord>, BrokerError> {
        let auth = self.authorization()?;
        let url = self.endpoint(&["orders"])?;
        let request = self.client.get(url).header(reqwest::header::AUTHORIZATION, auth);

        let orders: Option<Vec<OrderRecord>> = self.settle(read_envelope(self.send(request).await?).await)?;
        Ok(orders.unwrap_or_default())
    }

    async fn cancel_order(
        &self,
        variety: &str,
        order_id: &OrderId,
        parent_order_id: Option<&OrderId>,
    ) -> Result<OrderId, BrokerError> {
        let auth = self.authorization()?;
        let url = self.endpoint(&["orders", variety, &order_id.0])?;
        let mut request = self.client.delete(url).header(reqwest::header::AUTHORIZATION, auth);
        if let Some(parent) = parent_order_id {
            request = request.query(&[("parent_order_id", parent.0.as_str())]);
        }

        let data: OrderIdData = self.settle(read_envelope(self.send(request).await?).await)?;
        Ok(OrderId(data.order_id))
    }

    async fn get_instruments(&self) -> Result<Vec<BrokerInstrument>, BrokerError> {
        let auth = self.authorization()?;
        let url = self.endpoint(&["instruments"])?;
        let request = self.client.get(url).header(reqwest::header::AUTHORIZATION, auth);

        let response = self.send(request).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        if !status.is_success() {
            // 失败时券商返回 JSON 错误信封而不是 CSV
            let err = parse_envelope::<Value>(status, &body)
                .err()
                .unwrap_or_else(|| non_json_error(status, &body));
            return self.settle(Err(err));
        }

        parse_instruments_csv(&body)
    }
}

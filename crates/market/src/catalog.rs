use async_trait::async_trait;
use qiab_core::broker::port::BrokerPort;
use qiab_core::common::InstrumentToken;
use qiab_core::market::entity::Instrument;
use qiab_core::market::error::MarketError;
use qiab_core::market::port::MarketPort;
use std::sync::Arc;
use tracing::{debug, warn};

/// # Summary
/// 合约目录，`MarketPort` 的实现。
///
/// # Invariants
/// - 不缓存：每次查询都是一次完整的券商拉取。
/// - 拉取失败显式报错，不返回旧数据。
pub struct InstrumentCatalog {
    broker: Arc<dyn BrokerPort>,
}

impl InstrumentCatalog {
    pub fn new(broker: Arc<dyn BrokerPort>) -> Self {
        Self { broker }
    }

    async fn fetch(&self) -> Result<Vec<Instrument>, MarketError> {
        let raw = self.broker.get_instruments().await.map_err(|e| {
            warn!("Instrument fetch failed: {}", e);
            MarketError::from(e)
        })?;
        debug!("Fetched {} instruments", raw.len());
        Ok(raw.into_iter().map(Instrument::from).collect())
    }
}

/// # Summary
/// 按行权价降序稳定排序，行权价相同保持原始顺序。
///
/// # Invariants
/// - `-0.0` 与 `0.0` 视为相等，不改变相对顺序。
/// - 比较是全序，NaN 排在最前。
pub fn sort_by_strike_desc(instruments: &mut [Instrument]) {
    instruments.sort_by(|a, b| strike_key(b.strike_price).total_cmp(&strike_key(a.strike_price)));
}

/// 把负零归一为正零
fn strike_key(strike: f64) -> f64 {
    if strike == 0.0 { 0.0 } else { strike }
}

#[async_trait]
impl MarketPort for InstrumentCatalog {
    async fn list_markets(&self) -> Result<Vec<Instrument>, MarketError> {
        let mut instruments = self.fetch().await?;
        sort_by_strike_desc(&mut instruments);
        Ok(instruments)
    }

    /// # Logic
    /// 1. 纯数字按 instrument token 精确匹配。
    /// 2. 否则按交易代码匹配，不区分大小写。
    /// 3. 多条命中时返回券商清单中的第一条。
    async fn get_market(&self, market: &str) -> Result<Instrument, MarketError> {
        let key = market.trim();
        if key.is_empty() {
            return Err(MarketError::NotFound(market.to_string()));
        }

        let token = key.parse::<InstrumentToken>().ok();
        self.fetch()
            .await?
            .into_iter()
            .find(|i| match token {
                Some(t) => i.instrument_token == t,
                None => i.trading_symbol.eq_ignore_ascii_case(key),
            })
            .ok_or_else(|| MarketError::NotFound(key.to_string()))
    }
}

use qiab_core::broker::entity::BrokerInstrument;
use qiab_core::broker::error::BrokerError;
use std::collections::HashMap;
use tracing::{debug, warn};

/// # Summary
/// 解析券商 `/instruments` 接口返回的 CSV 合约清单。
///
/// # Logic
/// 1. 第一行为表头，按列名定位字段，列顺序变化不影响解析。
/// 2. 逐行解析，字段支持双引号包裹 (名称中可能含逗号)。
/// 3. 数值列为空时取 0；无法解析的行跳过并计数。
///
/// # Returns
/// * `Ok(Vec<BrokerInstrument>)` - 保持券商原始行顺序
/// * `Err(BrokerError::Parse)` - 缺少表头或必需列
pub fn parse_instruments_csv(body: &str) -> Result<Vec<BrokerInstrument>, BrokerError> {
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| BrokerError::Parse("Empty instruments dump".to_string()))?;

    let columns: HashMap<String, usize> = split_record(header)
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_string(), i))
        .collect();
    let index = |name: &str| {
        columns
            .get(name)
            .copied()
            .ok_or_else(|| BrokerError::Parse(format!("Missing column: {}", name)))
    };

    let layout = Layout {
        instrument_token: index("instrument_token")?,
        exchange_token: index("exchange_token")?,
        tradingsymbol: index("tradingsymbol")?,
        name: index("name")?,
        last_price: index("last_price")?,
        expiry: index("expiry")?,
        strike: index("strike")?,
        tick_size: index("tick_size")?,
        lot_size: index("lot_size")?,
        instrument_type: index("instrument_type")?,
        segment: index("segment")?,
        exchange: index("exchange")?,
    };

    let mut instruments = Vec::new();
    let mut skipped = 0usize;
    for line in lines {
        let fields = split_record(line);
        match layout.read(&fields) {
            Some(instrument) => instruments.push(instrument),
            None => {
                skipped += 1;
                debug!("Skipping malformed instrument row: {}", line);
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} malformed instrument rows", skipped);
    }
    Ok(instruments)
}

/// 各列在记录中的位置
struct Layout {
    instrument_token: usize,
    exchange_token: usize,
    tradingsymbol: usize,
    name: usize,
    last_price: usize,
    expiry: usize,
    strike: usize,
    tick_size: usize,
    lot_size: usize,
    instrument_type: usize,
    segment: usize,
    exchange: usize,
}

impl Layout {
    fn read(&self, fields: &[String]) -> Option<BrokerInstrument> {
        let text = |i: usize| fields.get(i).map(|s| s.trim().to_string());
        let float = |i: usize| -> Option<f64> {
            let raw = fields.get(i)?.trim();
            if raw.is_empty() { Some(0.0) } else { raw.parse().ok() }
        };
        let int = |i: usize| -> Option<u32> {
            let raw = fields.get(i)?.trim();
            if raw.is_empty() { Some(0) } else { raw.parse().ok() }
        };

        let expiry = text(self.expiry)?;
        Some(BrokerInstrument {
            instrument_token: int(self.instrument_token)?,
            exchange_token: int(self.exchange_token)?,
            tradingsymbol: text(self.tradingsymbol)?,
            name: text(self.name)?,
            last_price: float(self.last_price)?,
            expiry: (!expiry.is_empty()).then_some(expiry),
            strike: float(self.strike)?,
            tick_size: float(self.tick_size)?,
            lot_size: int(self.lot_size)?,
            instrument_type: text(self.instrument_type)?,
            segment: text(self.segment)?,
            exchange: text(self.exchange)?,
        })
    }
}

/// 按 RFC 4180 规则切分一行：逗号分隔，双引号包裹，`""` 转义为 `"`
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "instrument_token,exchange_token,tradingsymbol,name,last_price,expiry,strike,tick_size,lot_size,instrument_type,segment,exchange";

    #[test]
    fn test_parse_instruments_rows_in_order() {
        let body = format!(
            "{}\n738561,2885,RELIANCE,\"RELIANCE INDUSTRIES\",2894.55,,0,0.05,1,EQ,NSE,NSE\n\
             12073986,47164,NIFTY25JUN24500CE,\"NIFTY\",120.5,2025-06-26,24500,0.05,75,CE,NFO-OPT,NFO\n",
            HEADER
        );

        let instruments = parse_instruments_csv(&body).unwrap();
        assert_eq!(instruments.len(), 2);

        let first = &instruments[0];
        assert_eq!(first.instrument_token, 738561);
        assert_eq!(first.exchange_token, 2885);
        assert_eq!(first.tradingsymbol, "RELIANCE");
        assert_eq!(first.name, "RELIANCE INDUSTRIES");
        assert_eq!(first.expiry, None);
        assert_eq!(first.strike, 0.0);

        let second = &instruments[1];
        assert_eq!(second.strike, 24500.0);
        assert_eq!(second.expiry.as_deref(), Some("2025-06-26"));
        assert_eq!(second.lot_size, 75);
        assert_eq!(second.exchange, "NFO");
    }

    #[test]
    fn test_quoted_name_with_comma() {
        let body = format!("{}\r\n1,2,ABC,\"ABC, LTD \"\"A\"\"\",1.5,,0,0.05,1,EQ,BSE,BSE\r\n", HEADER);
        let instruments = parse_instruments_csv(&body).unwrap();
        assert_eq!(instruments[0].name, "ABC, LTD \"A\"");
        assert_eq!(instruments[0].exchange, "BSE");
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let body = format!("{}\nnot-a-number,2,X,X,1,,0,0.05,1,EQ,NSE,NSE\n5,6,Y,Y,2,,0,0.05,1,EQ,NSE,NSE\n", HEADER);
        let instruments = parse_instruments_csv(&body).unwrap();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].instrument_token, 5);
    }

    #[test]
    fn test_missing_column_is_parse_error() {
        let err = parse_instruments_csv("instrument_token,name\n1,A\n").unwrap_err();
        assert!(matches!(err, BrokerError::Parse(_)));
        assert!(parse_instruments_csv("").is_err());
    }
}

use qiab_core::trade::entity::{OrderPayload, OrderRequest, TransactionType};
use qiab_core::trade::port::TradeError;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use std::str::FromStr;

/// Kite 允许的标签最大长度
const MAX_TAG_LEN: usize = 20;

fn invalid(msg: String) -> TradeError {
    TradeError::Validation(msg)
}

/// 必填的非空字符串字段
fn required_str(payload: &OrderPayload, key: &str) -> Result<String, TradeError> {
    match payload.get(key) {
        None | Some(Value::Null) => Err(invalid(format!("missing field `{}`", key))),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(invalid(format!("field `{}` must not be empty", key)))
        }
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(invalid(format!("field `{}` must be a string", key))),
    }
}

/// 整数字段；`allow_zero` 控制是否接受 0
fn integer(key: &str, value: &Value, allow_zero: bool) -> Result<u32, TradeError> {
    let Value::Number(n) = value else {
        return Err(invalid(format!("field `{}` must be an integer", key)));
    };
    let Some(raw) = n.as_u64() else {
        return Err(if n.as_i64().is_some_and(|v| v < 0) {
            invalid(format!("field `{}` must not be negative", key))
        } else {
            invalid(format!("field `{}` must be an integer", key))
        });
    };
    if raw == 0 && !allow_zero {
        return Err(invalid(format!("field `{}` must be greater than 0", key)));
    }
    u32::try_from(raw).map_err(|_| invalid(format!("field `{}` is too large", key)))
}

fn decimal(key: &str, n: &Number) -> Result<Decimal, TradeError> {
    let text = n.to_string();
    let value = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid(format!("field `{}` is not a valid price", key)))?;
    if value.is_sign_negative() {
        return Err(invalid(format!("field `{}` must not be negative", key)));
    }
    Ok(value)
}

/// 可选字段：缺失或 `null` 视为未提供，存在时必须类型正确
fn optional<'a>(payload: &'a OrderPayload, key: &str) -> Option<&'a Value> {
    payload.get(key).filter(|v| !v.is_null())
}

/// # Summary
/// 把原始 JSON 请求体校验为 `OrderRequest`。
///
/// # Logic
/// 1. 必填字符串字段 (exchange、trading_symbol、transaction_type、product、
///    order_type、validity、variety) 必须存在且非空。
/// 2. `transaction_type` 先转为大写，只接受 BUY / SELL。
/// 3. `quantity` 必须是大于 0 的整数 (JSON 数字)。
/// 4. 可选字段 price / trigger_price / disclosed_quantity / tag 出现时必须类型正确。
///
/// # Returns
/// * `Ok(OrderRequest)` - 规范化后的请求
/// * `Err(TradeError::Validation)` - 第一处不合法字段的说明
pub fn validate_order(payload: &OrderPayload) -> Result<OrderRequest, TradeError> {
    let exchange = required_str(payload, "exchange")?;
    let trading_symbol = required_str(payload, "trading_symbol")?;
    let transaction_type = required_str(payload, "transaction_type")?;
    let transaction_type = TransactionType::from_str(&transaction_type).map_err(|_| {
        invalid(format!(
            "field `transaction_type` must be BUY or SELL, got `{}`",
            transaction_type
        ))
    })?;

    let quantity = match payload.get("quantity") {
        None | Some(Value::Null) => return Err(invalid("missing field `quantity`".to_string())),
        Some(v) => integer("quantity", v, false)?,
    };

    let product = required_str(payload, "product")?;
    let order_type = required_str(payload, "order_type")?;
    let validity = required_str(payload, "validity")?;
    let variety = required_str(payload, "variety")?;

    let price = optional(payload, "price")
        .map(|v| match v {
            Value::Number(n) => decimal("price", n),
            _ => Err(invalid("field `price` must be a number".to_string())),
        })
        .transpose()?;
    let trigger_price = optional(payload, "trigger_price")
        .map(|v| match v {
            Value::Number(n) => decimal("trigger_price", n),
            _ => Err(invalid("field `trigger_price` must be a number".to_string())),
        })
        .transpose()?;
    let disclosed_quantity = optional(payload, "disclosed_quantity")
        .map(|v| integer("disclosed_quantity", v, true))
        .transpose()?;
    let tag = optional(payload, "tag")
        .map(|v| match v {
            Value::String(s) if s.chars().count() <= MAX_TAG_LEN => Ok(s.clone()),
            Value::String(_) => Err(invalid(format!(
                "field `tag` must be at most {} characters",
                MAX_TAG_LEN
            ))),
            _ => Err(invalid("field `tag` must be a string".to_string())),
        })
        .transpose()?;

    Ok(OrderRequest {
        exchange,
        trading_symbol,
        transaction_type,
        quantity,
        product,
        order_type,
        validity,
        variety,
        price,
        trigger_price,
        disclosed_quantity,
        tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> OrderPayload {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    fn base() -> Value {
        json!({
            "exchange": "NSE",
            "trading_symbol": "RELIANCE",
            "transaction_type": "buy",
            "quantity": 1,
            "product": "MIS",
            "order_type": "MARKET",
            "validity": "DAY",
            "variety": "regular"
        })
    }

    fn with(key: &str, value: Value) -> OrderPayload {
        let mut p = payload(base());
        p.insert(key.to_string(), value);
        p
    }

    fn without(key: &str) -> OrderPayload {
        let mut p = payload(base());
        p.remove(key);
        p
    }

    #[test]
    fn test_valid_request_is_normalised() {
        let req = validate_order(&payload(base())).unwrap();
        assert_eq!(req.transaction_type, TransactionType::Buy);
        assert_eq!(req.trading_symbol, "RELIANCE");
        assert_eq!(req.quantity, 1);
        assert_eq!(req.variety, "regular");
        assert_eq!(req.price, None);
    }

    #[test]
    fn test_every_required_field_is_enforced() {
        for key in [
            "exchange",
            "trading_symbol",
            "transaction_type",
            "quantity",
            "product",
            "order_type",
            "validity",
            "variety",
        ] {
            let err = validate_order(&without(key)).unwrap_err();
            assert_eq!(err, TradeError::Validation(format!("missing field `{}`", key)));
        }
    }

    #[test]
    fn test_mistyped_fields_are_rejected() {
        assert!(validate_order(&with("exchange", json!(1))).is_err());
        assert!(validate_order(&with("exchange", json!(""))).is_err());
        assert!(validate_order(&with("quantity", json!("1"))).is_err());
        assert!(validate_order(&with("quantity", json!(1.5))).is_err());
        assert!(validate_order(&with("quantity", json!(0))).is_err());
        assert!(validate_order(&with("quantity", json!(-3))).is_err());
        assert!(validate_order(&with("quantity", json!(u64::MAX))).is_err());
        assert!(validate_order(&with("transaction_type", json!("hold"))).is_err());
        assert!(validate_order(&with("price", json!("100"))).is_err());
        assert!(validate_order(&with("price", json!(-1))).is_err());
        assert!(validate_order(&with("tag", json!(42))).is_err());
        assert!(validate_order(&with("tag", json!("x".repeat(21)))).is_err());
    }

    #[test]
    fn test_optional_fields() {
        let mut p = payload(base());
        p.insert("price".into(), json!(2894.55));
        p.insert("trigger_price".into(), Value::Null);
        p.insert("disclosed_quantity".into(), json!(0));
        p.insert("tag".into(), json!("strategy-a"));

        let req = validate_order(&p).unwrap();
        assert_eq!(req.price, Some(Decimal::from_str("2894.55").unwrap()));
        assert_eq!(req.trigger_price, None);
        assert_eq!(req.disclosed_quantity, Some(0));
        assert_eq!(req.tag.as_deref(), Some("strategy-a"));
    }

    #[test]
    fn test_transaction_type_case_is_normalised() {
        let req = validate_order(&with("transaction_type", json!("Sell"))).unwrap();
        assert_eq!(req.transaction_type, TransactionType::Sell);
    }
}

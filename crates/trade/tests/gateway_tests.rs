use qiab_core::broker::error::BrokerError;
use qiab_core::testing::{MockBroker, sample_order};
use qiab_core::trade::entity::{OrderId, OrderPayload, TransactionType};
use qiab_core::trade::port::{TradeError, TradePort};
use qiab_trade::gateway::OrderGateway;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;

fn payload(value: Value) -> OrderPayload {
    match value {
        Value::Object(map) => map,
        _ => panic!("payload must be an object"),
    }
}

fn reliance_buy() -> OrderPayload {
    payload(json!({
        "exchange": "NSE",
        "trading_symbol": "RELIANCE",
        "transaction_type": "buy",
        "quantity": 1,
        "product": "MIS",
        "order_type": "MARKET",
        "validity": "DAY",
        "variety": "regular"
    }))
}

fn setup() -> (Arc<MockBroker>, OrderGateway) {
    let broker = Arc::new(MockBroker::new());
    let gateway = OrderGateway::new(broker.clone());
    (broker, gateway)
}

#[tokio::test]
async fn test_place_order_end_to_end_payload() -> anyhow::Result<()> {
    let (broker, gateway) = setup();

    let id = gateway.place_order(reliance_buy()).await?;
    assert_eq!(id, OrderId("151220000000000".into()));
    assert_eq!(broker.calls_to("place_order"), 1);

    let placed = broker.placed_orders();
    let (variety, params) = &placed[0];
    assert_eq!(variety, "regular");
    assert_eq!(params.transaction_type, TransactionType::Buy);
    assert_eq!(params.transaction_type.as_str(), "BUY");
    assert_eq!(params.tradingsymbol, "RELIANCE");
    assert_eq!(params.quantity, 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_field_makes_no_remote_call() {
    let (broker, gateway) = setup();

    for key in ["exchange", "trading_symbol", "quantity", "variety"] {
        let mut p = reliance_buy();
        p.remove(key);
        let err = gateway.place_order(p).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)), "{key}: {err:?}");
    }

    let mut p = reliance_buy();
    p.insert("quantity".into(), json!("one"));
    assert!(matches!(gateway.place_order(p).await, Err(TradeError::Validation(_))));

    assert_eq!(broker.remote_calls(), 0);
}

#[tokio::test]
async fn test_limit_order_passes_optional_fields() -> anyhow::Result<()> {
    let (broker, gateway) = setup();
    let mut p = reliance_buy();
    p.insert("order_type".into(), json!("LIMIT"));
    p.insert("price".into(), json!(2894.5));
    p.insert("tag".into(), json!("desk1"));

    gateway.place_order(p).await?;
    let (_, params) = &broker.placed_orders()[0];
    assert_eq!(params.price, Some(dec!(2894.5)));
    assert_eq!(params.tag.as_deref(), Some("desk1"));
    Ok(())
}

#[tokio::test]
async fn test_broker_rejection_preserves_reason() {
    let (broker, gateway) = setup();
    broker.set_place_result(Err(BrokerError::Remote {
        kind: "InputException".into(),
        message: "Markets are closed right now.".into(),
    }));

    let err = gateway.place_order(reliance_buy()).await.unwrap_err();
    assert_eq!(err, TradeError::Rejected("Markets are closed right now.".into()));
    assert_eq!(err.to_string(), "Markets are closed right now.");
}

#[tokio::test]
async fn test_expired_token_is_authentication_error() {
    let (broker, gateway) = setup();
    broker.set_place_result(Err(BrokerError::Authentication("Incorrect access_token".into())));

    let err = gateway.place_order(reliance_buy()).await.unwrap_err();
    assert!(matches!(err, TradeError::Authentication(_)));
    // 不自动重试
    assert_eq!(broker.calls_to("place_order"), 1);
}

#[tokio::test]
async fn test_list_orders_verbatim_and_failure() -> anyhow::Result<()> {
    let (broker, gateway) = setup();
    let orders = vec![sample_order("2", "OPEN"), sample_order("1", "COMPLETE")];
    broker.set_orders_result(Ok(orders.clone()));
    assert_eq!(gateway.list_orders().await?, orders);

    broker.set_orders_result(Err(BrokerError::Network("connection reset".into())));
    assert_eq!(
        gateway.list_orders().await,
        Err(TradeError::Unavailable("connection reset".into()))
    );
    Ok(())
}

#[tokio::test]
async fn test_get_order_filters_list() -> anyhow::Result<()> {
    let (broker, gateway) = setup();
    broker.set_orders_result(Ok(vec![sample_order("a", "OPEN"), sample_order("b", "COMPLETE")]));

    let order = gateway.get_order(&OrderId("b".into())).await?;
    assert_eq!(order.status, "COMPLETE");

    let missing = gateway.get_order(&OrderId("zzz".into())).await;
    assert_eq!(missing, Err(TradeError::NotFound("zzz".into())));
    Ok(())
}

#[tokio::test]
async fn test_cancel_order_has_no_parent_linkage() -> anyhow::Result<()> {
    let (broker, gateway) = setup();
    let closed = gateway.cancel_order("regular", &OrderId("151".into())).await?;
    assert_eq!(closed, OrderId("151".into()));

    let cancelled = broker.cancelled_orders();
    assert_eq!(cancelled, vec![("regular".to_string(), OrderId("151".into()), None)]);
    Ok(())
}

#[tokio::test]
async fn test_cancel_rejection_is_never_success() {
    let (broker, gateway) = setup();
    broker.set_cancel_error(Some(BrokerError::Remote {
        kind: "InputException".into(),
        message: "Invalid `order_id`.".into(),
    }));

    let err = gateway.cancel_order("bogus", &OrderId("nope".into())).await.unwrap_err();
    assert_eq!(err, TradeError::Rejected("Invalid `order_id`.".into()));
}

use qiab_core::broker::error::BrokerError;
use qiab_core::market::error::MarketError;
use qiab_core::market::port::MarketPort;
use qiab_core::testing::{MockBroker, sample_instrument};
use qiab_core::market::entity::Instrument;
use qiab_market::catalog::{InstrumentCatalog, sort_by_strike_desc};
use std::sync::Arc;

fn setup() -> (Arc<MockBroker>, InstrumentCatalog) {
    let broker = Arc::new(MockBroker::new());
    let catalog = InstrumentCatalog::new(broker.clone());
    (broker, catalog)
}

#[tokio::test]
async fn test_list_markets_sorted_by_strike_desc_and_stable() -> anyhow::Result<()> {
    let (broker, catalog) = setup();
    broker.set_instruments_result(Ok(vec![
        sample_instrument(1, "A", 100.0),
        sample_instrument(2, "B", 300.0),
        sample_instrument(3, "C", 100.0),
        sample_instrument(4, "D", 0.0),
        sample_instrument(5, "E", 300.0),
        sample_instrument(6, "F", 100.0),
    ]));

    let markets = catalog.list_markets().await?;
    let order: Vec<u32> = markets.iter().map(|m| m.instrument_token).collect();
    assert_eq!(order, vec![2, 5, 1, 3, 6, 4]);
    assert!(markets.windows(2).all(|w| w[0].strike_price >= w[1].strike_price));
    assert_eq!(markets[0].trading_symbol, "B");
    assert_eq!(markets[0].exchange_token, 0);
    Ok(())
}

#[tokio::test]
async fn test_every_query_fetches_fresh() -> anyhow::Result<()> {
    let (broker, catalog) = setup();
    broker.set_instruments_result(Ok(vec![sample_instrument(1, "A", 1.0)]));
    catalog.list_markets().await?;

    broker.set_instruments_result(Ok(vec![sample_instrument(9, "Z", 1.0)]));
    let markets = catalog.list_markets().await?;
    assert_eq!(markets[0].instrument_token, 9);
    assert_eq!(broker.calls_to("get_instruments"), 2);
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_is_catalog_unavailable() {
    let (broker, catalog) = setup();
    broker.set_instruments_result(Ok(vec![sample_instrument(1, "A", 1.0)]));
    assert!(catalog.list_markets().await.is_ok());

    broker.set_instruments_result(Err(BrokerError::Network("timed out".into())));
    assert!(matches!(
        catalog.list_markets().await,
        Err(MarketError::CatalogUnavailable(_))
    ));

    broker.set_instruments_result(Err(BrokerError::Authentication("expired".into())));
    assert_eq!(
        catalog.list_markets().await,
        Err(MarketError::Authentication("expired".into()))
    );
}

#[tokio::test]
async fn test_get_market_by_token_or_symbol() -> anyhow::Result<()> {
    let (broker, catalog) = setup();
    broker.set_instruments_result(Ok(vec![
        sample_instrument(738561, "RELIANCE", 0.0),
        sample_instrument(408065, "INFY", 0.0),
    ]));

    assert_eq!(catalog.get_market("408065").await?.trading_symbol, "INFY");
    assert_eq!(catalog.get_market("reliance").await?.instrument_token, 738561);
    assert_eq!(
        catalog.get_market("TCS").await,
        Err(MarketError::NotFound("TCS".into()))
    );
    assert!(matches!(catalog.get_market("1").await, Err(MarketError::NotFound(_))));
    Ok(())
}

#[test]
fn test_signed_zero_strikes_keep_broker_order() {
    let mut instruments: Vec<Instrument> = vec![
        sample_instrument(1, "NEG", -0.0),
        sample_instrument(2, "POS", 0.0),
        sample_instrument(3, "NEG2", -0.0),
        sample_instrument(4, "HIGH", 50.0),
    ]
    .into_iter()
    .map(Instrument::from)
    .collect();

    sort_by_strike_desc(&mut instruments);
    let order: Vec<u32> = instruments.iter().map(|m| m.instrument_token).collect();
    assert_eq!(order, vec![4, 1, 2, 3]);
}

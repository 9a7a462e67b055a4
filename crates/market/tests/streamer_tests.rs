use futures::StreamExt;
use qiab_core::market::entity::{ConnectionState, StreamEvent, StreamMode, Tick};
use qiab_core::market::error::StreamError;
use qiab_core::market::port::StreamEventStream;
use qiab_core::testing::{MockTickerTransport, TransportCall, sample_order};
use qiab_market::streamer::{MarketDataStreamer, Subscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const T1: u32 = 408065;
const T2: u32 = 738561;

async fn next_event(events: &mut StreamEventStream) -> StreamEvent {
    timeout(Duration::from_secs(5), events.next()).await.unwrap().unwrap()
}

fn setup() -> (Arc<MockTickerTransport>, MarketDataStreamer) {
    let transport = Arc::new(MockTickerTransport::new());
    let streamer = MarketDataStreamer::new(transport.clone());
    (transport, streamer)
}

#[tokio::test]
async fn test_connect_replays_subscriptions_once() {
    let (transport, streamer) = setup();
    let streamer = streamer.with_subscriptions(&[T2, T1], StreamMode::Full);

    streamer.dispatch(StreamEvent::Connected).await;

    assert_eq!(streamer.state(), ConnectionState::Connected);
    assert_eq!(
        transport.calls(),
        vec![
            TransportCall::Subscribe(vec![T1, T2]),
            TransportCall::SetMode(StreamMode::Full, vec![T1, T2]),
        ]
    );
}

#[tokio::test]
async fn test_connect_groups_modes() {
    let (transport, streamer) = setup();
    streamer.subscribe(&[T1], StreamMode::Full).await.unwrap();
    streamer.subscribe(&[T2], StreamMode::Ltp).await.unwrap();
    assert!(transport.calls().is_empty());

    streamer.dispatch(StreamEvent::Connected).await;
    assert_eq!(
        transport.calls(),
        vec![
            TransportCall::Subscribe(vec![T1, T2]),
            TransportCall::SetMode(StreamMode::Ltp, vec![T2]),
            TransportCall::SetMode(StreamMode::Full, vec![T1]),
        ]
    );
}

#[tokio::test]
async fn test_reconnect_replays_full_state() {
    let (transport, streamer) = setup();
    let streamer = streamer.with_subscriptions(&[T1], StreamMode::Quote);

    streamer.dispatch(StreamEvent::Connected).await;
    streamer.dispatch(StreamEvent::Closed { code: 1006, reason: "dropped".into() }).await;
    assert_eq!(streamer.state(), ConnectionState::Disconnected);

    streamer.subscribe(&[T2], StreamMode::Quote).await.unwrap();
    streamer.dispatch(StreamEvent::Reconnecting { attempt: 1 }).await;
    assert_eq!(streamer.state(), ConnectionState::Reconnecting);

    transport.clear_calls();
    streamer.dispatch(StreamEvent::Connected).await;
    assert_eq!(
        transport.calls(),
        vec![
            TransportCall::Subscribe(vec![T1, T2]),
            TransportCall::SetMode(StreamMode::Quote, vec![T1, T2]),
        ]
    );
}

#[tokio::test]
async fn test_subscribe_while_connected_is_immediate() {
    let (transport, streamer) = setup();
    streamer.dispatch(StreamEvent::Connected).await;
    assert!(transport.calls().is_empty());

    streamer.subscribe(&[T1, T1], StreamMode::Ltp).await.unwrap();
    assert_eq!(
        transport.calls(),
        vec![
            TransportCall::Subscribe(vec![T1]),
            TransportCall::SetMode(StreamMode::Ltp, vec![T1]),
        ]
    );

    transport.clear_calls();
    streamer.unsubscribe(&[T1, T2]).await.unwrap();
    assert_eq!(transport.calls(), vec![TransportCall::Unsubscribe(vec![T1])]);
    assert!(streamer.subscriptions().is_empty());
}

#[tokio::test]
async fn test_resubscribe_replaces_mode() {
    let (_transport, streamer) = setup();
    streamer.subscribe(&[T1], StreamMode::Ltp).await.unwrap();
    streamer.subscribe(&[T1], StreamMode::Full).await.unwrap();
    assert_eq!(
        streamer.subscriptions(),
        vec![Subscription {
            instrument_token: T1,
            mode: StreamMode::Full
        }]
    );
}

#[tokio::test]
async fn test_command_failure_reported_without_disconnect() {
    let (transport, streamer) = setup();
    let streamer = streamer.with_subscriptions(&[T1], StreamMode::Full);
    let mut events = streamer.events();
    transport.fail_commands(true);

    streamer.dispatch(StreamEvent::Connected).await;
    assert_eq!(streamer.state(), ConnectionState::Connected);

    // subscribe 与 set_mode 各报告一次错误，随后转发 Connected
    let first = events.next().await.unwrap();
    let second = events.next().await.unwrap();
    let third = events.next().await.unwrap();
    assert!(matches!(first, StreamEvent::Error(_)));
    assert!(matches!(second, StreamEvent::Error(_)));
    assert_eq!(third, StreamEvent::Connected);

    let err = streamer.subscribe(&[T2], StreamMode::Ltp).await.unwrap_err();
    assert!(matches!(err, StreamError::Transport(_)));
    assert_eq!(streamer.state(), ConnectionState::Connected);
    // 失败的订阅仍保留在集合中，重连时重放
    assert_eq!(streamer.subscriptions().len(), 2);
}

#[tokio::test]
async fn test_run_forwards_events_in_order() {
    let transport = Arc::new(MockTickerTransport::new());
    let streamer = Arc::new(MarketDataStreamer::new(transport.clone()).with_subscriptions(&[T1, T2], StreamMode::Full));
    let mut events = streamer.events();

    let running = {
        let streamer = streamer.clone();
        tokio::spawn(async move { streamer.run().await })
    };

    // 等待传输层开始服务
    timeout(Duration::from_secs(5), async {
        while !transport.push(StreamEvent::Connected).await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(transport.push(StreamEvent::Tick(Tick::new(T1, StreamMode::Full, true))).await);
    assert!(transport.push(StreamEvent::OrderUpdate(sample_order("1", "COMPLETE"))).await);

    assert_eq!(next_event(&mut events).await, StreamEvent::Connected);
    assert!(matches!(next_event(&mut events).await, StreamEvent::Tick(t) if t.instrument_token == T1));
    assert!(matches!(next_event(&mut events).await, StreamEvent::OrderUpdate(o) if o.order_id == "1"));

    assert_eq!(streamer.state(), ConnectionState::Connected);
    assert_eq!(
        transport.calls(),
        vec![
            TransportCall::Subscribe(vec![T1, T2]),
            TransportCall::SetMode(StreamMode::Full, vec![T1, T2]),
        ]
    );

    running.abort();
}

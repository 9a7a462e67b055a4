use chrono::Local;
use futures::{SinkExt, StreamExt};
use qiab_broker::ticker::KiteTicker;
use qiab_core::config::{BrokerConfig, TickerConfig};
use qiab_core::market::entity::{StreamEvent, StreamMode};
use qiab_core::market::error::StreamError;
use qiab_core::market::port::TickerTransport;
use qiab_core::session::entity::{AccessToken, CredentialCell};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;

fn ticker_for(port: u16, cell: Arc<CredentialCell>, shutdown: CancellationToken, attempts: u32) -> Arc<KiteTicker> {
    let broker = BrokerConfig {
        api_key: "kitekey".into(),
        ws_root: format!("ws://127.0.0.1:{}", port),
        ..BrokerConfig::default()
    };
    let ticker = TickerConfig {
        reconnect_initial_ms: 10,
        reconnect_max_ms: 20,
        max_reconnect_attempts: attempts,
        ..TickerConfig::default()
    };
    Arc::new(KiteTicker::new(&broker, &ticker, cell, shutdown))
}

fn cell_with(token: &str) -> Arc<CredentialCell> {
    let cell = Arc::new(CredentialCell::new());
    assert!(cell.install(AccessToken(token.into()), Local::now()));
    cell
}

fn ltp_frame(token: u32, price: i32) -> Vec<u8> {
    let mut frame = 1u16.to_be_bytes().to_vec();
    frame.extend_from_slice(&8u16.to_be_bytes());
    frame.extend_from_slice(&token.to_be_bytes());
    frame.extend_from_slice(&price.to_be_bytes());
    frame
}

async fn next_event(rx: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_ticker_delivers_ticks_orders_and_commands() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen_uri = Arc::new(Mutex::new(String::new()));
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<String>();

    let uri_slot = seen_uri.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            *uri_slot.lock().unwrap() = req.uri().to_string();
            Ok(resp)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();
        let (mut write, mut read) = ws.split();

        write.send(Message::Binary(ltp_frame(408065, 150_025).into())).await.unwrap();
        let order = r#"{"type":"order","data":{"order_id":"9","status":"COMPLETE","variety":"regular","order_type":"MARKET","product":"MIS"}}"#;
        write.send(Message::Text(order.to_string().into())).await.unwrap();

        while let Some(Ok(msg)) = read.next().await {
            if let Message::Text(text) = msg {
                cmd_tx.send(text.to_string()).unwrap();
            }
        }
    });

    let cell = cell_with("daytoken");
    let shutdown = CancellationToken::new();
    let ticker = ticker_for(port, cell, shutdown.clone(), 0);

    let (tx, mut rx) = mpsc::channel(16);
    let serving = {
        let ticker = ticker.clone();
        tokio::spawn(async move { ticker.serve(tx).await })
    };

    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    match next_event(&mut rx).await {
        StreamEvent::Tick(tick) => {
            assert_eq!(tick.instrument_token, 408065);
            assert!((tick.last_price - 1500.25).abs() < 1e-9);
        }
        other => panic!("expected tick, got {:?}", other),
    }
    match next_event(&mut rx).await {
        StreamEvent::OrderUpdate(order) => assert_eq!(order.order_id, "9"),
        other => panic!("expected order update, got {:?}", other),
    }

    let uri = seen_uri.lock().unwrap().clone();
    assert!(uri.contains("api_key=kitekey"));
    assert!(uri.contains("access_token=daytoken"));

    ticker.subscribe(&[408065, 738561]).await.unwrap();
    ticker.set_mode(StreamMode::Full, &[408065]).await.unwrap();
    let first = timeout(Duration::from_secs(5), cmd_rx.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(5), cmd_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, r#"{"a":"subscribe","v":[408065,738561]}"#);
    assert_eq!(second, r#"{"a":"mode","v":["full",[408065]]}"#);

    shutdown.cancel();
    let result = timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_ticker_reconnects_after_server_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        // 第一次连接立即关闭
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}

        // 第二次连接保持
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let cell = cell_with("daytoken");
    let shutdown = CancellationToken::new();
    let ticker = ticker_for(port, cell, shutdown.clone(), 0);

    let (tx, mut rx) = mpsc::channel(16);
    let serving = {
        let ticker = ticker.clone();
        tokio::spawn(async move { ticker.serve(tx).await })
    };

    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    assert!(matches!(next_event(&mut rx).await, StreamEvent::Closed { .. }));
    assert_eq!(next_event(&mut rx).await, StreamEvent::Reconnecting { attempt: 1 });
    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);

    shutdown.cancel();
    assert!(timeout(Duration::from_secs(5), serving).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn test_commands_without_connection_fail() {
    let cell = Arc::new(CredentialCell::new());
    let shutdown = CancellationToken::new();
    let ticker = ticker_for(1, cell, shutdown.clone(), 0);

    assert_eq!(ticker.subscribe(&[1]).await, Err(StreamError::NotConnected));
    assert_eq!(
        ticker.set_mode(StreamMode::Ltp, &[1]).await,
        Err(StreamError::NotConnected)
    );
    // 空列表不下发任何指令
    assert_eq!(ticker.unsubscribe(&[]).await, Ok(()));

    // 没有令牌时连接循环只等待，关闭后正常退出
    let (tx, _rx) = mpsc::channel(4);
    let serving = {
        let ticker = ticker.clone();
        tokio::spawn(async move { ticker.serve(tx).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!serving.is_finished());
    shutdown.cancel();
    assert!(timeout(Duration::from_secs(5), serving).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn test_ticker_gives_up_after_max_attempts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let cell = cell_with("daytoken");
    let ticker = ticker_for(port, cell, CancellationToken::new(), 2);

    let (tx, mut rx) = mpsc::channel(16);
    let result = timeout(Duration::from_secs(5), ticker.serve(tx)).await.unwrap();
    assert!(matches!(result, Err(StreamError::Transport(_))));

    let mut reconnecting = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, StreamEvent::Reconnecting { .. }) {
            reconnecting += 1;
        }
    }
    assert_eq!(reconnecting, 2);
}

#[tokio::test]
async fn test_ticker_reconnects_when_token_changes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (uri_tx, mut uri_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            let uri_tx = uri_tx.clone();
            tokio::spawn(async move {
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    uri_tx.send(req.uri().to_string()).unwrap();
                    Ok(resp)
                };
                if let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                    while ws.next().await.is_some() {}
                }
            });
        }
    });

    let cell = cell_with("first");
    let shutdown = CancellationToken::new();
    let ticker = ticker_for(port, cell.clone(), shutdown.clone(), 0);

    let (tx, mut rx) = mpsc::channel(16);
    let serving = {
        let ticker = ticker.clone();
        tokio::spawn(async move { ticker.serve(tx).await })
    };

    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    assert!(uri_rx.recv().await.unwrap().contains("access_token=first"));

    assert!(cell.install(AccessToken("second".into()), Local::now()));
    assert!(matches!(next_event(&mut rx).await, StreamEvent::Closed { code: 1000, .. }));
    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    assert!(uri_rx.recv().await.unwrap().contains("access_token=second"));

    shutdown.cancel();
    assert!(timeout(Duration::from_secs(5), serving).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn test_ticker_waits_for_login_after_token_cleared() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (uri_tx, mut uri_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            let uri_tx = uri_tx.clone();
            tokio::spawn(async move {
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    uri_tx.send(req.uri().to_string()).unwrap();
                    Ok(resp)
                };
                if let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                    while ws.next().await.is_some() {}
                }
            });
        }
    });

    let cell = cell_with("day1");
    let shutdown = CancellationToken::new();
    let ticker = ticker_for(port, cell.clone(), shutdown.clone(), 0);

    let (tx, mut rx) = mpsc::channel(16);
    let serving = {
        let ticker = ticker.clone();
        tokio::spawn(async move { ticker.serve(tx).await })
    };

    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    assert!(uri_rx.recv().await.unwrap().contains("access_token=day1"));

    assert!(cell.clear());
    assert_eq!(
        next_event(&mut rx).await,
        StreamEvent::Closed {
            code: 1000,
            reason: "access token cleared".into()
        }
    );

    // 没有令牌时不重连，也不产出重连事件
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert!(uri_rx.try_recv().is_err());

    assert!(cell.install(AccessToken("day2".into()), Local::now()));
    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    assert!(uri_rx.recv().await.unwrap().contains("access_token=day2"));

    shutdown.cancel();
    assert!(timeout(Duration::from_secs(5), serving).await.unwrap().unwrap().is_ok());
}

mod settings;

use std::path::Path;
use std::sync::Arc;

use qiab_api::server::{AppState, start_server};
use qiab_broker::kite::KiteClient;
use qiab_broker::ticker::KiteTicker;
use qiab_core::broker::port::BrokerPort;
use qiab_core::common::time::{RealTimeProvider, TimeProvider};
use qiab_core::common::tls::ensure_crypto_provider;
use qiab_core::session::entity::CredentialCell;
use qiab_market::catalog::InstrumentCatalog;
use qiab_market::consumer::log_events;
use qiab_market::streamer::MarketDataStreamer;
use qiab_session::browser::SystemBrowser;
use qiab_session::manager::SessionManager;
use qiab_store::token::FileTokenStore;
use qiab_trade::gateway::OrderGateway;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 `Arc<dyn Trait>` 注入到各个服务。
///
/// # Logic
/// 1. 装载 `.env` 与分层配置，初始化全局日志。
/// 2. 实例化基础设施层 (券商客户端句柄、令牌存储、浏览器)。
/// 3. 实例化领域服务 (会话、订单网关、合约目录、行情推送器)。
/// 4. 启动行情长连接任务与默认事件消费者。
/// 5. 检查令牌新鲜度：今日令牌直接装载，否则发起登录。
/// 6. 提供 HTTP 服务，收到退出信号后优雅关闭。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置与日志
    let dotenv_loaded = dotenvy::dotenv().is_ok();
    let config = settings::load(settings::CONFIG_FILE)?;
    let _log_guard = init_tracing(&config.store.data_dir);
    info!("Qiab gateway starting...");
    if !dotenv_loaded {
        info!("No .env file found, using process environment");
    }
    let missing = settings::missing_credentials(&config);
    if !missing.is_empty() {
        warn!("{} not set, broker calls will fail until configured", missing.join(" / "));
    }
    ensure_crypto_provider();

    let shutdown = CancellationToken::new();

    // 2. 基础设施层
    // 令牌单元与会话管理器按同一时钟判断跨日
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let credential = Arc::new(CredentialCell::with_clock(clock.clone()));
    let broker: Arc<dyn BrokerPort> = Arc::new(KiteClient::new(&config.broker, credential.clone())?);
    let store = Arc::new(FileTokenStore::from_config(&config.store));
    info!("Token file: {}", store.path().display());

    // 3. 领域服务
    let session = Arc::new(SessionManager::new(
        broker.clone(),
        store,
        clock,
        Arc::new(SystemBrowser),
        config.broker.api_secret.clone(),
    ));
    let ticker = Arc::new(KiteTicker::new(&config.broker, &config.ticker, credential, shutdown.clone()));
    let streamer = Arc::new(
        MarketDataStreamer::new(ticker).with_subscriptions(&config.ticker.instrument_tokens, config.ticker.mode),
    );

    // 4. 行情任务
    let consumer = tokio::spawn(log_events(streamer.events()));
    let stream_task = {
        let streamer = streamer.clone();
        tokio::spawn(async move {
            if let Err(e) = streamer.run().await {
                error!("Market data streamer exited: {}", e);
            }
        })
    };

    // 5. 会话初始化
    let state = session.initialize().await;
    info!("Session initialised: {:?}", state);

    // 6. HTTP 服务
    let app_state = AppState {
        trade_port: Arc::new(OrderGateway::new(broker.clone())),
        market_port: Arc::new(InstrumentCatalog::new(broker)),
        session,
        streamer,
    };
    tokio::spawn(await_shutdown(shutdown.clone()));
    let server_shutdown = shutdown.clone();
    let served = start_server(app_state, config.server.bind_addr(), async move {
        server_shutdown.cancelled().await;
    })
    .await;

    // 服务退出 (含绑定失败) 后停止行情连接
    shutdown.cancel();
    if let Err(e) = stream_task.await {
        warn!("Market data task ended abnormally: {}", e);
    }
    consumer.abort();
    info!("Qiab gateway stopped");

    served?;
    Ok(())
}

/// # Summary
/// 初始化全局日志：控制台 + 按天滚动的文件。
///
/// # Logic
/// 1. 过滤级别取 `RUST_LOG`，缺省为 `info`。
/// 2. 文件写入 `<data_dir>/logs/qiab.log.YYYY-MM-DD`，经后台线程非阻塞落盘。
///
/// # Returns
/// 文件写入器的守卫，必须存活到进程退出，否则缓冲日志会丢失。
fn init_tracing(data_dir: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(Path::new(data_dir).join("logs"), "qiab.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}

/// 等待 Ctrl-C 或 SIGTERM，随后触发全局取消
async fn await_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
    shutdown.cancel();
}

//! # API 服务启动器
//!
//! 组装 axum 路由、挂载 Swagger UI、配置 CORS 并绑定 TCP 端口对外提供服务。
//! 本模块不直接启动 `main()`, 而是由 `crates/app` 的 DI 容器持有并调用。

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use qiab_core::market::port::MarketPort;
use qiab_core::trade::port::TradePort;
use qiab_market::streamer::MarketDataStreamer;
use qiab_session::manager::SessionManager;

use crate::routes::{auth, market, ticker, trade};

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 所有组件在服务启动前由 DI 容器注入，生命周期与进程等同。
/// - 各组件共享同一个券商客户端句柄，令牌刷新对所有请求立即可见。
#[derive(Clone)]
pub struct AppState {
    /// 订单网关
    pub trade_port: Arc<dyn TradePort>,
    /// 合约目录
    pub market_port: Arc<dyn MarketPort>,
    /// 会话管理器 (登录握手)
    pub session: Arc<SessionManager>,
    /// 行情推送器 (订阅集合与连接状态)
    pub streamer: Arc<MarketDataStreamer>,
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Qiab 交易网关 API",
        version = "0.1.0",
        description = "券商交易网关的 RESTful API。提供下单、查单、撤单、合约目录、登录回调与行情订阅控制。",
        license(name = "MIT")
    ),
    tags(
        (name = "订单 (Order)", description = "下单、查单与撤单，全部转发至券商"),
        (name = "合约 (Market)", description = "券商合约清单查询"),
        (name = "会话 (Session)", description = "托管登录与当日访问令牌"),
        (name = "行情 (Ticker)", description = "行情长连接状态与订阅控制")
    )
)]
pub struct ApiDoc;

// ============================================================
//  服务构建与启动
// ============================================================

/// 构建完整的 axum 应用路由树 (含 Swagger UI 与 CORS)。
pub fn build_router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(trade::place_order, trade::list_orders))
        .routes(routes!(trade::get_order))
        .routes(routes!(trade::cancel_order))
        .routes(routes!(market::list_markets))
        .routes(routes!(market::get_market))
        .routes(routes!(auth::login))
        .routes(routes!(auth::login_callback))
        .routes(routes!(auth::get_session))
        .routes(routes!(ticker::get_ticker))
        .routes(routes!(ticker::subscribe))
        .routes(routes!(ticker::unsubscribe))
        .with_state(state)
        .split_for_parts();

    // 本地网关，允许所有来源
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(cors)
}

/// # Summary
/// 在已绑定的监听器上提供服务，直到 `shutdown` 完成。
///
/// # Logic
/// 1. `shutdown` 完成后停止接受新连接，等待在途请求结束后返回。
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

/// 绑定端口并启动 HTTP 服务。
///
/// # Arguments
/// * `state` - 由外部 DI 容器注入的共享状态
/// * `bind_addr` - 监听的地址与端口，如 `"127.0.0.1:8000"`
/// * `shutdown` - 优雅退出信号
///
/// # Returns
/// * `Err` - 端口绑定失败或服务异常退出
pub async fn start_server<A, F>(state: AppState, bind_addr: A, shutdown: F) -> std::io::Result<()>
where
    A: ToSocketAddrs,
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind_addr).await?;
    let local = listener.local_addr()?;
    tracing::info!("Qiab gateway listening on {}", local);
    tracing::info!("Swagger UI: http://{}/swagger-ui/", local);

    serve(listener, state, shutdown).await
}

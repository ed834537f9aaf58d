//! MongoDB 指标采集服务
//!
//! 定期连接 MongoDB，采集并展平状态指标：
//! - serverStatus 服务器级指标
//! - dbStats 数据库级指标
//! - 上报采集结果并通过 HTTP 提供最新快照

mod connection;
mod database_stats;
mod document;
mod handlers;
mod mapping;
mod poller;
mod reporter;
mod routes;
mod server_stats;
mod state;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id_middleware;
use connection::MongoConnector;
use poller::Poller;
use reporter::{HttpReporter, LogReporter, Reporter, SnapshotReporter};
use state::AppState;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "collector-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "采集服务 API",
        version = "0.1.0",
        description = "MongoDB 指标采集微服务"
    ),
    paths(
        handlers::health_check,
        handlers::latest_metrics,
    ),
    components(schemas(
        common::models::CycleReport,
        common::models::Measurement,
        common::models::MeasurementValue,
        common::models::MetricDescriptor,
        common::models::MetricKind,
        handlers::HealthResponse,
    )),
    tags(
        (name = "metrics", description = "采集结果端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if present) before anything else
    load_dotenv();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME).context("加载配置失败")?;

    // 组装上报器
    let snapshot = SnapshotReporter::default();
    let mut reporters: Vec<Arc<dyn Reporter>> =
        vec![Arc::new(LogReporter), Arc::new(snapshot.clone())];
    if let Some(endpoint) = &config.report_endpoint {
        let timeout = Duration::from_secs(config.report_timeout_secs);
        reporters.push(Arc::new(HttpReporter::new(endpoint.clone(), timeout)?));
        info!(endpoint = %endpoint, "上报地址已配置");
    }

    // 启动采集循环
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = Poller::new(MongoConnector, config.mongodb.clone(), reporters);
    let interval = Duration::from_secs(config.poll_interval_secs);
    let poller_task = tokio::spawn(async move { poller.run(interval, shutdown_rx).await });

    // 启动服务
    let app = create_router(AppState::new(config.clone(), snapshot));
    let addr = format!("{}:{}", config.host, config.port);
    info!(
        service = SERVICE_NAME,
        address = %addr,
        target = %format!("{}:{}", config.mongodb.host, config.mongodb.port),
        databases = config.mongodb.databases.len(),
        "启动服务"
    );

    let listener = TcpListener::bind(&addr).await.context("绑定地址失败")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务启动失败")?;

    // 停止采集循环，等待当前周期结束
    let _ = shutdown_tx.send(true);
    poller_task.await.context("采集任务异常退出")?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "无法监听退出信号");
    }
    info!("收到退出信号");
}

/// Load .env file from the working directory (best-effort, no error if missing).
fn load_dotenv() {
    let Ok(content) = std::fs::read_to_string(".env") else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            // Only set if not already set by the environment
            if std::env::var(key).is_err() {
                std::env::set_var(key, value.trim().trim_matches('"'));
            }
        }
    }
}

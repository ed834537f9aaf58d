//! Handler模块

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::middleware::RequestId;
use common::models::CycleReport;
use common::response::ApiResponse;
use crate::state::AppState;

/// 健康检查
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "服务健康", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let last = state.snapshot.latest().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        started_at: state.started_at,
        target: format!("{}:{}", state.config.mongodb.host, state.config.mongodb.port),
        last_cycle_at: last.as_ref().map(|r| r.started_at),
        last_cycle_connected: last.as_ref().map(|r| r.connected),
    })
}

/// 获取最近一次采集周期的指标
#[utoipa::path(
    get,
    path = "/api/metrics",
    tag = "metrics",
    responses(
        (status = 200, description = "最近一次采集结果", body = ApiResponse<CycleReport>),
        (status = 404, description = "尚未完成任何采集周期")
    )
)]
pub async fn latest_metrics(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<CycleReport>>, AppError> {
    let report = state
        .snapshot
        .latest()
        .await
        .ok_or_else(|| AppError::NotFound("no poll cycle has completed yet".into()))?;

    Ok(Json(
        ApiResponse::ok_with_service(report.as_ref().clone(), state.config.service_name.clone())
            .with_request_id(request_id.as_str()),
    ))
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_connected: Option<bool>,
}

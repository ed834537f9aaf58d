//! Reporters receive each finished poll cycle.
//!
//! Reporters never retry; a failed transmission is logged by the poller
//! and the next cycle carries fresh values anyway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{CycleReport, MeasurementValue};
use tokio::sync::RwLock;

/// Receives finished poll cycles.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn report(&self, report: &Arc<CycleReport>) -> AppResult<()>;
}

/// Writes measurements to the log.
#[derive(Debug, Default, Clone)]
pub struct LogReporter;

#[async_trait]
impl Reporter for LogReporter {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn report(&self, report: &Arc<CycleReport>) -> AppResult<()> {
        for m in &report.measurements {
            match m.value {
                MeasurementValue::Scalar { value } => tracing::debug!(
                    name = %m.descriptor.name,
                    unit = %m.descriptor.unit,
                    kind = %m.descriptor.kind,
                    value,
                    "metric"
                ),
                MeasurementValue::Timing { count, total, latest } => tracing::debug!(
                    name = %m.descriptor.name,
                    unit = %m.descriptor.unit,
                    kind = %m.descriptor.kind,
                    count,
                    total,
                    latest,
                    average = m.value.average().unwrap_or(0.0),
                    "metric"
                ),
            }
        }
        Ok(())
    }
}

/// POSTs each cycle as JSON to an upstream endpoint.
#[derive(Debug, Clone)]
pub struct HttpReporter {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpReporter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn report(&self, report: &Arc<CycleReport>) -> AppResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(report.as_ref())
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("cannot reach {}: {}", self.endpoint, e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "{} answered {}",
                self.endpoint,
                response.status()
            )));
        }
        tracing::debug!(endpoint = %self.endpoint, "Cycle reported upstream");
        Ok(())
    }
}

/// Keeps the latest cycle for the HTTP API.
#[derive(Debug, Default, Clone)]
pub struct SnapshotReporter {
    latest: Arc<RwLock<Option<Arc<CycleReport>>>>,
}

impl SnapshotReporter {
    pub async fn latest(&self) -> Option<Arc<CycleReport>> {
        self.latest.read().await.clone()
    }
}

#[async_trait]
impl Reporter for SnapshotReporter {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn report(&self, report: &Arc<CycleReport>) -> AppResult<()> {
        *self.latest.write().await = Some(Arc::clone(report));
        Ok(())
    }
}

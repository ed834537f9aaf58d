//! 采集服务的应用状态

use chrono::{DateTime, Utc};
use common::config::AppConfig;

use crate::reporter::SnapshotReporter;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub snapshot: SnapshotReporter,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig, snapshot: SnapshotReporter) -> Self {
        Self {
            config,
            snapshot,
            started_at: Utc::now(),
        }
    }
}

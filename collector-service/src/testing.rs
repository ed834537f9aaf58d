//! In-memory data source and log capture used by unit tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::config::{Credential, MongoConfig};
use common::errors::{AppError, AppResult};
use mongodb::bson::Document;

use crate::connection::{Connector, StatsSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ServerStatus,
    DatabaseStats(String),
    Authenticate(String, String),
    Logout(String),
}

/// Records every call and answers from canned documents.
#[derive(Debug, Clone, Default)]
pub struct FakeSource {
    calls: Arc<Mutex<Vec<Call>>>,
    server_status: Option<Document>,
    databases: HashMap<String, Document>,
    failing: HashSet<String>,
}

impl FakeSource {
    pub fn with_server_status(mut self, status: Document) -> Self {
        self.server_status = Some(status);
        self
    }

    pub fn with_database(mut self, name: &str, stats: Document) -> Self {
        self.databases.insert(name.to_string(), stats);
        self
    }

    pub fn failing_database(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StatsSource for FakeSource {
    async fn server_status(&self) -> AppResult<Document> {
        self.push(Call::ServerStatus);
        self.server_status
            .clone()
            .ok_or_else(|| AppError::QueryFailure("serverStatus not authorized".into()))
    }

    async fn database_stats(&self, database: &str) -> AppResult<Document> {
        self.push(Call::DatabaseStats(database.to_string()));
        if self.failing.contains(database) {
            return Err(AppError::QueryFailure(format!("not authorized on {}", database)));
        }
        Ok(self.databases.get(database).cloned().unwrap_or_default())
    }

    async fn authenticate(&self, database: &str, credential: &Credential) -> AppResult<()> {
        self.push(Call::Authenticate(database.to_string(), credential.username.clone()));
        Ok(())
    }

    async fn logout(&self, database: &str) {
        self.push(Call::Logout(database.to_string()));
    }
}

/// Hands out clones of one [`FakeSource`], or refuses to connect.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub source: FakeSource,
    pub refuse: bool,
}

#[async_trait]
impl Connector for FakeConnector {
    type Source = FakeSource;

    async fn connect(&self, _config: &MongoConfig) -> AppResult<FakeSource> {
        if self.refuse {
            return Err(AppError::ConnectionUnavailable("connection refused".into()));
        }
        Ok(self.source.clone())
    }
}

/// Collects formatted log output for assertions.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// A plain-text subscriber writing into this capture. Install it with
    /// `tracing::subscriber::set_default` for the duration of a test.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let writer = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish()
    }

    pub fn lines(&self) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer).lines().map(str::to_string).collect()
    }

    /// Lines logged at `level`, e.g. `"ERROR"`.
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.split_whitespace().any(|word| word == level))
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

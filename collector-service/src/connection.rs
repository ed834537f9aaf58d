//! Connection provider.
//!
//! Opens an authenticated client against the polled server and exposes the
//! two administrative queries the extractors need. Everything behind the
//! [`StatsSource`] trait so extraction can run against any data source.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use common::config::{Credential, MongoConfig, TlsSettings};
use common::errors::{AppError, AppResult};
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, Credential as MongoCredential, ServerAddress, Tls, TlsOptions};
use mongodb::Client;
use tokio::sync::Mutex;

/// Administrative queries consumed by the extractors.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Runs `serverStatus`.
    async fn server_status(&self) -> AppResult<Document>;

    /// Runs `dbStats` against `database`.
    async fn database_stats(&self, database: &str) -> AppResult<Document>;

    /// Logs into `database` with a credential scoped to it.
    async fn authenticate(&self, database: &str, credential: &Credential) -> AppResult<()>;

    /// Drops a login made by [`StatsSource::authenticate`].
    async fn logout(&self, database: &str);
}

/// Produces a connected [`StatsSource`] for one poll cycle.
#[async_trait]
pub trait Connector: Send + Sync {
    type Source: StatsSource;

    async fn connect(&self, config: &MongoConfig) -> AppResult<Self::Source>;
}

/// Runs `op` between a login to `database` and a logout from it.
///
/// The logout happens whatever `op` returns.
pub async fn with_scoped_login<S, F, Fut, T>(
    source: &S,
    database: &str,
    credential: &Credential,
    op: F,
) -> AppResult<T>
where
    S: StatsSource + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    source.authenticate(database, credential).await?;
    let result = op().await;
    source.logout(database).await;
    result
}

/// Connector backed by the official MongoDB driver.
#[derive(Debug, Default, Clone)]
pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    type Source = MongoConnection;

    async fn connect(&self, config: &MongoConfig) -> AppResult<MongoConnection> {
        let options = client_options(config);
        let client = Client::with_options(options.clone())
            .map_err(|e| AppError::ConnectionUnavailable(e.to_string()))?;

        // The driver authenticates lazily; ping forces the handshake now.
        client
            .database(&config.auth_db)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| AppError::ConnectionUnavailable(e.to_string()))?;

        tracing::debug!(host = %config.host, port = config.port, "Connected to MongoDB");
        Ok(MongoConnection {
            client,
            options,
            scoped: Mutex::new(HashMap::new()),
        })
    }
}

/// Builds driver options from the config, passing TLS keys through only
/// when they are present.
fn client_options(config: &MongoConfig) -> ClientOptions {
    let mut options = ClientOptions::default();
    options.hosts = vec![ServerAddress::Tcp {
        host: config.host.clone(),
        port: Some(config.port),
    }];
    options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
    options.tls = tls_options(&config.tls);

    let mut credential = MongoCredential::default();
    credential.username = Some(config.admin_username.clone());
    credential.password = Some(config.admin_password.clone());
    credential.source = Some(config.auth_db.clone());
    options.credential = Some(credential);
    options
}

fn tls_options(settings: &TlsSettings) -> Option<Tls> {
    if settings.is_empty() {
        return None;
    }
    if settings.ssl == Some(false) {
        return Some(Tls::Disabled);
    }

    let mut tls = TlsOptions::default();
    tls.ca_file_path = settings.ssl_ca_certs.as_ref().map(Into::into);
    // The driver reads key and certificate from one PEM file.
    if let Some(cert) = settings.ssl_certfile.as_ref().or(settings.ssl_keyfile.as_ref()) {
        tls.cert_key_file_path = Some(cert.into());
    }
    if let (Some(cert), Some(key)) = (&settings.ssl_certfile, &settings.ssl_keyfile) {
        if cert != key {
            tracing::warn!(
                certfile = %cert,
                keyfile = %key,
                "ssl_keyfile differs from ssl_certfile; the certificate file must contain the key"
            );
        }
    }
    tls.allow_invalid_certificates = settings.allow_invalid_certificates();
    Some(Tls::Enabled(tls))
}

/// Live connection for one poll cycle.
pub struct MongoConnection {
    client: Client,
    options: ClientOptions,
    /// Clients logged into a single database, keyed by database name.
    scoped: Mutex<HashMap<String, Client>>,
}

impl MongoConnection {
    async fn run(client: &Client, database: &str, command: Document) -> AppResult<Document> {
        client
            .database(database)
            .run_command(command)
            .await
            .map_err(|e| AppError::QueryFailure(e.to_string()))
    }
}

#[async_trait]
impl StatsSource for MongoConnection {
    async fn server_status(&self) -> AppResult<Document> {
        Self::run(&self.client, "admin", doc! { "serverStatus": 1 }).await
    }

    async fn database_stats(&self, database: &str) -> AppResult<Document> {
        let scoped = self.scoped.lock().await.get(database).cloned();
        let client = scoped.as_ref().unwrap_or(&self.client);
        Self::run(client, database, doc! { "dbStats": 1 }).await
    }

    async fn authenticate(&self, database: &str, credential: &Credential) -> AppResult<()> {
        let mut options = self.options.clone();
        let mut scoped_credential = MongoCredential::default();
        scoped_credential.username = Some(credential.username.clone());
        scoped_credential.password = credential.password.clone();
        scoped_credential.source = Some(database.to_string());
        options.credential = Some(scoped_credential);

        let client =
            Client::with_options(options).map_err(|e| AppError::QueryFailure(e.to_string()))?;
        Self::run(&client, database, doc! { "ping": 1 }).await?;

        tracing::debug!(database = %database, user = %credential.username, "Scoped login");
        self.scoped.lock().await.insert(database.to_string(), client);
        Ok(())
    }

    async fn logout(&self, database: &str) {
        let client = self.scoped.lock().await.remove(database);
        if let Some(client) = client {
            client.shutdown().await;
            tracing::debug!(database = %database, "Scoped logout");
        }
    }
}

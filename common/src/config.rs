//! Collector configuration.
//!
//! Values come from environment variables (optionally seeded from a `.env`
//! file by the binary). The `mongodb` section can instead be read from a
//! JSON file named by `COLLECTOR_CONFIG`, using the plugin-style keys
//! (`host`, `port`, `ssl*`, `admin_username`, `admin_password`, `authDB`,
//! `databases`).

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use validator::Validate;

use crate::errors::{AppError, AppResult};

const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
const DEFAULT_SERVER_PORT: u16 = 8090;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_REPORT_TIMEOUT_SECS: u64 = 30;

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_admin_username() -> String {
    "root".to_string()
}

fn default_admin_password() -> String {
    "password".to_string()
}

fn default_auth_db() -> String {
    "admin".to_string()
}

/// Process-level configuration.
#[derive(Debug, Clone, Validate)]
pub struct AppConfig {
    /// Service name used in logs and responses.
    pub service_name: String,
    /// HTTP bind host.
    pub host: String,
    /// HTTP bind port.
    pub port: u16,
    /// Seconds between two poll cycles.
    #[validate(range(min = 1, max = 86400, message = "poll interval must be 1-86400 seconds"))]
    pub poll_interval_secs: u64,
    /// Optional upstream URL receiving each cycle as JSON.
    pub report_endpoint: Option<String>,
    /// Timeout for one upstream report request.
    #[validate(range(min = 1, message = "report timeout must be positive"))]
    pub report_timeout_secs: u64,
    /// Target server settings.
    #[validate(nested)]
    pub mongodb: MongoConfig,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn load_with_service(service_name: &str) -> AppResult<Self> {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mongodb = match lookup("COLLECTOR_CONFIG") {
            Some(path) => MongoConfig::from_file(path)?,
            None => MongoConfig::from_lookup(&lookup)?,
        };

        let config = Self {
            service_name: service_name.to_string(),
            host: lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
            port: parse_or(&lookup, "SERVER_PORT", DEFAULT_SERVER_PORT)?,
            poll_interval_secs: parse_or(&lookup, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            report_endpoint: lookup("REPORT_ENDPOINT").filter(|v| !v.trim().is_empty()),
            report_timeout_secs: parse_or(&lookup, "REPORT_TIMEOUT_SECS", DEFAULT_REPORT_TIMEOUT_SECS)?,
            mongodb,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

/// Connection settings for the polled server.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MongoConfig {
    #[serde(default = "default_host")]
    #[validate(length(min = 1, message = "host must not be empty"))]
    pub host: String,
    #[serde(default = "default_port")]
    #[validate(range(min = 1, message = "port must be non-zero"))]
    pub port: u16,
    /// TLS keys, passed through only when present.
    #[serde(flatten)]
    pub tls: TlsSettings,
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    /// Database the admin credential authenticates against.
    #[serde(rename = "authDB", default = "default_auth_db")]
    #[validate(length(min = 1, message = "authDB must not be empty"))]
    pub auth_db: String,
    #[serde(default)]
    pub databases: DatabaseTargets,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: TlsSettings::default(),
            admin_username: default_admin_username(),
            admin_password: default_admin_password(),
            auth_db: default_auth_db(),
            databases: DatabaseTargets::default(),
        }
    }
}

impl MongoConfig {
    /// Reads the section from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn from_lookup<F>(lookup: &F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let ssl = match lookup("MONGODB_SSL") {
            Some(raw) => Some(parse_bool(&raw).ok_or_else(|| {
                AppError::Configuration(format!("MONGODB_SSL has an invalid value: {}", raw))
            })?),
            None => None,
        };
        let databases = match lookup("MONGODB_DATABASES") {
            Some(raw) => DatabaseTargets::parse(&raw)?,
            None => DatabaseTargets::default(),
        };

        Ok(Self {
            host: lookup("MONGODB_HOST").unwrap_or(defaults.host),
            port: parse_or(lookup, "MONGODB_PORT", defaults.port)?,
            tls: TlsSettings {
                ssl,
                ssl_keyfile: lookup("MONGODB_SSL_KEYFILE"),
                ssl_certfile: lookup("MONGODB_SSL_CERTFILE"),
                ssl_cert_reqs: lookup("MONGODB_SSL_CERT_REQS"),
                ssl_ca_certs: lookup("MONGODB_SSL_CA_CERTS"),
            },
            admin_username: lookup("MONGODB_ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_password: lookup("MONGODB_ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            auth_db: lookup("MONGODB_AUTH_DB").unwrap_or(defaults.auth_db),
            databases,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// TLS-related keys. Absent keys stay `None` and are never defaulted.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TlsSettings {
    pub ssl: Option<bool>,
    pub ssl_keyfile: Option<String>,
    pub ssl_certfile: Option<String>,
    /// `CERT_*` name or the numeric `ssl.CERT_*` constant, kept as text.
    #[serde(default, deserialize_with = "text_or_number")]
    pub ssl_cert_reqs: Option<String>,
    pub ssl_ca_certs: Option<String>,
}

impl TlsSettings {
    /// True when no TLS key was given at all.
    pub fn is_empty(&self) -> bool {
        self.ssl.is_none()
            && self.ssl_keyfile.is_none()
            && self.ssl_certfile.is_none()
            && self.ssl_cert_reqs.is_none()
            && self.ssl_ca_certs.is_none()
    }

    /// Whether the peer certificate may go unverified (`CERT_NONE`).
    ///
    /// `None` when `ssl_cert_reqs` is absent or unrecognised.
    pub fn allow_invalid_certificates(&self) -> Option<bool> {
        let raw = self.ssl_cert_reqs.as_deref()?;
        match raw.trim().to_uppercase().as_str() {
            "0" | "CERT_NONE" | "NONE" => Some(true),
            "1" | "2" | "CERT_OPTIONAL" | "CERT_REQUIRED" | "OPTIONAL" | "REQUIRED" => Some(false),
            _ => None,
        }
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}

/// Username/password pair scoped to one database.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Databases whose stats are collected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTargets")]
pub enum DatabaseTargets {
    /// Plain names; stats are read with the admin connection.
    Simple(Vec<String>),
    /// Names with an optional per-database credential, in config order.
    Credentialed(Vec<(String, Option<Credential>)>),
}

impl Default for DatabaseTargets {
    fn default() -> Self {
        DatabaseTargets::Simple(Vec::new())
    }
}

impl DatabaseTargets {
    /// Parses a JSON list, a JSON object, or a comma-separated list.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            return Ok(serde_json::from_str(trimmed)?);
        }
        Ok(DatabaseTargets::Simple(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect(),
        ))
    }

    /// Number of configured databases.
    pub fn len(&self) -> usize {
        match self {
            DatabaseTargets::Simple(names) => names.len(),
            DatabaseTargets::Credentialed(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates `(name, credential)` pairs in processing order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (&str, Option<&Credential>)> + Send + '_> {
        match self {
            DatabaseTargets::Simple(names) => Box::new(names.iter().map(|n| (n.as_str(), None))),
            DatabaseTargets::Credentialed(entries) => {
                Box::new(entries.iter().map(|(n, c)| (n.as_str(), c.as_ref())))
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTargets {
    List(Vec<String>),
    Map(OrderedEntries),
}

/// Map entries in document order. A repeated name keeps its first
/// position and its last value.
struct OrderedEntries(Vec<(String, Option<RawCredential>)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of database names to credentials")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(String, Option<RawCredential>)> =
                    Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, credential)) = map.next_entry::<String, Option<RawCredential>>()? {
                    match entries.iter_mut().find(|(existing, _)| *existing == name) {
                        Some(entry) => entry.1 = credential,
                        None => entries.push((name, credential)),
                    }
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Deserialize)]
struct RawCredential {
    username: Option<String>,
    password: Option<String>,
}

impl From<RawTargets> for DatabaseTargets {
    fn from(raw: RawTargets) -> Self {
        match raw {
            RawTargets::List(names) => DatabaseTargets::Simple(names),
            RawTargets::Map(OrderedEntries(entries)) => DatabaseTargets::Credentialed(
                entries
                    .into_iter()
                    .map(|(name, entry)| {
                        let credential = entry.and_then(|c| {
                            c.username.map(|username| Credential {
                                username,
                                password: c.password,
                            })
                        });
                        (name, credential)
                    })
                    .collect(),
            ),
        }
    }
}

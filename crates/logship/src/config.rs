// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shipping configuration.
//!
//! [`IndexerConfig`] selects one backend and carries its fields. It doubles as
//! the cache key of [`crate::indexer::IndexerCache`], so equality is structural
//! over every field. [`ShipperConfig`] is the persisted configuration of the
//! whole pipeline and can be loaded from `LOGSHIP_*` environment variables.
//!
//! Validation happens here, at configuration time. A configuration that passes
//! [`ShipperConfig::validate`] can still fail at send time, but only with a
//! transport error.

use std::env;
use std::fmt;
use std::fs;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_AMQP_CONNECTION_TIMEOUT_SECS, DEFAULT_AMQP_PORT, DEFAULT_AMQP_VIRTUAL_HOST,
    DEFAULT_HTTP_CONNECT_TIMEOUT_SECS, DEFAULT_HTTP_MIME_TYPE, DEFAULT_HTTP_REQUEST_TIMEOUT_SECS,
    DEFAULT_SYSLOG_PORT,
};
use crate::error::ConfigError;
use crate::indexer::IndexerKind;
use crate::transform::ProcessingRule;

const PEM_CERTIFICATE_HEADER: &str = "-----BEGIN CERTIFICATE-----";
const REDACTED: &str = "redacted";

/// Backend selection plus its fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexerConfig {
    Tcp(TcpConfig),
    Amqp(AmqpConfig),
    Http(HttpConfig),
    Syslog(SyslogConfig),
    Memory,
}

impl IndexerConfig {
    #[must_use]
    pub fn kind(&self) -> IndexerKind {
        match self {
            Self::Tcp(_) => IndexerKind::Tcp,
            Self::Amqp(_) => IndexerKind::Amqp,
            Self::Http(_) => IndexerKind::Http,
            Self::Syslog(_) => IndexerKind::Syslog,
            Self::Memory => IndexerKind::Memory,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Tcp(config) => config.validate(),
            Self::Amqp(config) => config.validate(),
            Self::Http(config) => config.validate(),
            Self::Syslog(config) => config.validate(),
            Self::Memory => Ok(()),
        }
    }
}

/// Newline-delimited JSON over a fresh TCP connection per payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
}

impl TcpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(IndexerKind::Tcp, "host", &self.host)?;
        require_port(IndexerKind::Tcp, self.port)
    }
}

/// Publishes to a named durable queue on an AMQP 0-9-1 broker.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AmqpConfig {
    pub host: String,
    #[serde(default = "default_amqp_port")]
    pub port: u16,
    pub queue: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_virtual_host")]
    pub virtual_host: String,
    #[serde(default = "default_amqp_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl AmqpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(IndexerKind::Amqp, "host", &self.host)?;
        require_port(IndexerKind::Amqp, self.port)?;
        require(IndexerKind::Amqp, "queue name", &self.queue)
    }
}

/// POSTs each payload as a document to `uri`.
///
/// The path of `uri` is the document key (index/type) and must not be empty.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpConfig {
    pub uri: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// PEM encoded certificate trusted in addition to the built-in roots.
    #[serde(default)]
    pub ca_certificate: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            username: String::new(),
            password: String::new(),
            mime_type: default_mime_type(),
            ca_certificate: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_uri().map(|_| ())?;
        require(IndexerKind::Http, "MIME type", &self.mime_type)?;
        if let Some(pem) = &self.ca_certificate {
            if !pem.contains(PEM_CERTIFICATE_HEADER) {
                return Err(ConfigError::TrustMaterial(
                    "no PEM encoded certificate found".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Parses and checks `uri`: http(s) scheme, a host and a non-root path.
    pub fn parsed_uri(&self) -> Result<reqwest::Url, ConfigError> {
        require(IndexerKind::Http, "URI", &self.uri)?;
        let invalid = |reason: &str| ConfigError::InvalidUri {
            indexer: IndexerKind::Http,
            uri: self.uri.clone(),
            reason: reason.to_string(),
        };
        let url = reqwest::Url::parse(self.uri.trim()).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().map_or(true, |host| host.trim().is_empty()) {
            return Err(ConfigError::Required {
                indexer: IndexerKind::Http,
                field: "host",
            });
        }
        if url.path().trim_matches('/').trim().is_empty() {
            return Err(ConfigError::Required {
                indexer: IndexerKind::Http,
                field: "index key",
            });
        }
        Ok(url)
    }
}

/// The two historical syslog framings.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum SyslogFormat {
    /// BSD syslog.
    #[display("RFC3164")]
    Rfc3164,
    #[default]
    #[display("RFC5424")]
    Rfc5424,
}

impl FromStr for SyslogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().replace('_', "").as_str() {
            "rfc3164" => Ok(Self::Rfc3164),
            "rfc5424" => Ok(Self::Rfc5424),
            _ => Err(ConfigError::Env {
                name: "LOGSHIP_SYSLOG_FORMAT",
                value: value.to_string(),
            }),
        }
    }
}

/// Sends each payload as one UDP datagram framed as syslog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyslogConfig {
    pub host: String,
    #[serde(default = "default_syslog_port")]
    pub port: u16,
    #[serde(default)]
    pub format: SyslogFormat,
}

impl SyslogConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(IndexerKind::Syslog, "host", &self.host)?;
        require_port(IndexerKind::Syslog, self.port)
    }
}

/// Precision of the `@timestamp` and `@buildTimestamp` payload fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPrecision {
    #[default]
    Milliseconds,
    Seconds,
}

/// Persisted configuration of the shipping pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipperConfig {
    pub enabled: bool,
    pub indexer: IndexerConfig,
    pub timestamps: TimestampPrecision,
    /// Base URL of the orchestrating host, shipped as `source_host`.
    pub source_host: String,
    /// Environment variable names never shipped.
    pub sensitive_variables: Vec<String>,
    /// Trailing lines shipped by a post-run send; negative means all.
    pub max_lines: i64,
    /// Callers should fail the job when shipping ended broken.
    pub fail_on_broken: bool,
    /// Push the transformer's final payload even after the breaker tripped.
    pub finalize_when_broken: bool,
    /// Line filtering and masking applied before anything is shipped.
    #[serde(default)]
    pub processing_rules: Vec<ProcessingRule>,
    pub log_level: String,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            indexer: IndexerConfig::Memory,
            timestamps: TimestampPrecision::Milliseconds,
            source_host: String::new(),
            sensitive_variables: Vec::new(),
            max_lines: -1,
            fail_on_broken: false,
            finalize_when_broken: true,
            processing_rules: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl ShipperConfig {
    /// Create configuration from `LOGSHIP_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str, default: bool| {
            lookup(name)
                .map(|val| val.trim().to_lowercase() != "false")
                .unwrap_or(default)
        };

        let enabled = flag("LOGSHIP_ENABLED", true);
        let indexer = match lookup("LOGSHIP_INDEXER") {
            Some(kind) => indexer_from_lookup(&kind, &lookup)?,
            None if enabled => {
                return Err(ConfigError::Invalid(
                    "LOGSHIP_INDEXER must be set when shipping is enabled".to_string(),
                ))
            }
            None => IndexerConfig::Memory,
        };

        let timestamps = if flag("LOGSHIP_MILLISECOND_TIMESTAMPS", true) {
            TimestampPrecision::Milliseconds
        } else {
            TimestampPrecision::Seconds
        };

        let sensitive_variables = lookup("LOGSHIP_SENSITIVE_VARIABLES")
            .map(|val| {
                val.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let max_lines = match lookup("LOGSHIP_MAX_LINES") {
            Some(val) => val.trim().parse::<i64>().map_err(|_| ConfigError::Env {
                name: "LOGSHIP_MAX_LINES",
                value: val.clone(),
            })?,
            None => -1,
        };

        let processing_rules = match lookup("LOGSHIP_PROCESSING_RULES") {
            Some(val) if !val.trim().is_empty() => {
                serde_json::from_str(&val).map_err(|_| ConfigError::Env {
                    name: "LOGSHIP_PROCESSING_RULES",
                    value: val.clone(),
                })?
            }
            _ => Vec::new(),
        };

        let config = Self {
            enabled,
            indexer,
            timestamps,
            source_host: lookup("LOGSHIP_SOURCE_HOST").unwrap_or_default(),
            sensitive_variables,
            max_lines,
            fail_on_broken: flag("LOGSHIP_FAIL_ON_BROKEN", false),
            finalize_when_broken: flag("LOGSHIP_FINALIZE_WHEN_BROKEN", true),
            processing_rules,
            log_level: lookup("LOGSHIP_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if self.enabled {
            self.indexer.validate()?;
        }
        Ok(())
    }
}

fn indexer_from_lookup<F>(kind: &str, lookup: &F) -> Result<IndexerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).unwrap_or_default();
    let port = |name: &'static str, default: Option<u16>| -> Result<u16, ConfigError> {
        match lookup(name) {
            Some(val) => val.trim().parse::<u16>().map_err(|_| ConfigError::Env {
                name,
                value: val.clone(),
            }),
            None => Ok(default.unwrap_or(0)),
        }
    };

    match kind.trim().to_lowercase().as_str() {
        "tcp" => Ok(IndexerConfig::Tcp(TcpConfig {
            host: string("LOGSHIP_HOST"),
            port: port("LOGSHIP_PORT", None)?,
        })),
        "amqp" => Ok(IndexerConfig::Amqp(AmqpConfig {
            host: string("LOGSHIP_HOST"),
            port: port("LOGSHIP_PORT", Some(DEFAULT_AMQP_PORT))?,
            queue: string("LOGSHIP_QUEUE"),
            username: string("LOGSHIP_USERNAME"),
            password: string("LOGSHIP_PASSWORD"),
            virtual_host: lookup("LOGSHIP_VIRTUAL_HOST").unwrap_or_else(default_virtual_host),
            connection_timeout_secs: DEFAULT_AMQP_CONNECTION_TIMEOUT_SECS,
        })),
        "http" => {
            let ca_certificate = match lookup("LOGSHIP_CA_CERT") {
                Some(path) => Some(fs::read_to_string(&path).map_err(|e| {
                    ConfigError::TrustMaterial(format!("unable to read '{path}': {e}"))
                })?),
                None => None,
            };
            Ok(IndexerConfig::Http(HttpConfig {
                username: string("LOGSHIP_USERNAME"),
                password: string("LOGSHIP_PASSWORD"),
                mime_type: lookup("LOGSHIP_MIME_TYPE").unwrap_or_else(default_mime_type),
                ca_certificate,
                ..HttpConfig::new(string("LOGSHIP_URI"))
            }))
        }
        "syslog" => Ok(IndexerConfig::Syslog(SyslogConfig {
            host: string("LOGSHIP_HOST"),
            port: port("LOGSHIP_PORT", Some(DEFAULT_SYSLOG_PORT))?,
            format: match lookup("LOGSHIP_SYSLOG_FORMAT") {
                Some(val) => val.parse()?,
                None => SyslogFormat::default(),
            },
        })),
        "memory" => Ok(IndexerConfig::Memory),
        _ => Err(ConfigError::Env {
            name: "LOGSHIP_INDEXER",
            value: kind.to_string(),
        }),
    }
}

impl fmt::Debug for AmqpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("queue", &self.queue)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("virtual_host", &self.virtual_host)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .finish()
    }
}

impl fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfig")
            .field("uri", &redact_uri(&self.uri))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("mime_type", &self.mime_type)
            .field("ca_certificate", &self.ca_certificate.is_some())
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn redact(secret: &str) -> &str {
    if secret.is_empty() {
        ""
    } else {
        REDACTED
    }
}

/// `uri` with any user-info password replaced.
fn redact_uri(uri: &str) -> String {
    match reqwest::Url::parse(uri.trim()) {
        Ok(mut url) if url.password().is_some() => match url.set_password(Some(REDACTED)) {
            Ok(()) => url.to_string(),
            Err(()) => REDACTED.to_string(),
        },
        Ok(_) => uri.to_string(),
        // Unparseable URIs may still hold credentials.
        Err(_) if uri.contains('@') => REDACTED.to_string(),
        Err(_) => uri.to_string(),
    }
}

fn require(indexer: IndexerKind, field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Required { indexer, field });
    }
    Ok(())
}

fn require_port(indexer: IndexerKind, port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::InvalidPort { indexer });
    }
    Ok(())
}

fn default_amqp_port() -> u16 {
    DEFAULT_AMQP_PORT
}

fn default_virtual_host() -> String {
    DEFAULT_AMQP_VIRTUAL_HOST.to_string()
}

fn default_amqp_connection_timeout() -> u64 {
    DEFAULT_AMQP_CONNECTION_TIMEOUT_SECS
}

fn default_mime_type() -> String {
    DEFAULT_HTTP_MIME_TYPE.to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_HTTP_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_HTTP_REQUEST_TIMEOUT_SECS
}

fn default_syslog_port() -> u16 {
    DEFAULT_SYSLOG_PORT
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP structured syslog sender.
//!
//! The payload travels as the MSG part of a single datagram, prefixed with the
//! CEE marker so receivers parse it as structured data:
//!
//! ```text
//! RFC5424: <14>1 2024-05-17T08:30:15.250Z build-01 logship - - - @cee: {...}
//! RFC3164: <14>May 17 08:30:15 build-01 logship: @cee: {...}
//! ```

use std::env;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::config::{SyslogConfig, SyslogFormat};
use crate::constants::{
    SYSLOG_APP_NAME, SYSLOG_FACILITY_USER, SYSLOG_SEVERITY_INFORMATIONAL,
    SYSLOG_STRUCTURED_DATA_MARKER,
};
use crate::error::{ConfigError, TransportError};
use crate::indexer::{Indexer, IndexerKind};

const NIL_VALUE: &str = "-";

#[derive(Debug, Clone)]
pub struct SyslogIndexer {
    config: SyslogConfig,
    hostname: String,
}

impl SyslogIndexer {
    pub fn new(config: SyslogConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            hostname: local_hostname(),
        })
    }

    fn target(&self) -> Result<SocketAddr, TransportError> {
        let endpoint = self.describe();
        let mut addrs = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;
        addrs.next().ok_or_else(|| TransportError::Connect {
            endpoint,
            source: std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "host resolved to no addresses",
            ),
        })
    }
}

/// Name of this machine as it appears in the syslog header.
fn local_hostname() -> String {
    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.trim().is_empty() {
            return hostname.trim().to_string();
        }
    }
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn priority() -> u8 {
    SYSLOG_FACILITY_USER * 8 + SYSLOG_SEVERITY_INFORMATIONAL
}

/// Frames `payload` as one syslog message.
#[must_use]
pub fn format_frame(
    format: SyslogFormat,
    hostname: &str,
    timestamp: DateTime<Utc>,
    payload: &str,
) -> String {
    let pri = priority();
    match format {
        SyslogFormat::Rfc3164 => format!(
            "<{pri}>{} {hostname} {SYSLOG_APP_NAME}: {SYSLOG_STRUCTURED_DATA_MARKER} {payload}",
            timestamp.format("%b %e %H:%M:%S"),
        ),
        SyslogFormat::Rfc5424 => format!(
            "<{pri}>1 {} {hostname} {SYSLOG_APP_NAME} {NIL_VALUE} {NIL_VALUE} {NIL_VALUE} \
             {SYSLOG_STRUCTURED_DATA_MARKER} {payload}",
            timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
    }
}

impl Indexer for SyslogIndexer {
    fn kind(&self) -> IndexerKind {
        IndexerKind::Syslog
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn push(&self, payload: &str) -> Result<(), TransportError> {
        let target = self.target()?;
        let bind: SocketAddr = if target.is_ipv6() {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind)?;

        let frame = format_frame(self.config.format, &self.hostname, Utc::now(), payload);
        let sent = socket.send_to(frame.as_bytes(), target)?;
        debug!(
            "LOGSHIP | Sent {sent} byte {} datagram to {target}",
            self.config.format
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 7, 8, 30, 15).unwrap() + chrono::Duration::milliseconds(250)
    }

    #[test]
    fn test_rfc5424_frame() {
        let frame = format_frame(SyslogFormat::Rfc5424, "build-01", timestamp(), "{}");
        assert_eq!(
            frame,
            "<14>1 2024-05-07T08:30:15.250Z build-01 logship - - - @cee: {}"
        );
    }

    #[test]
    fn test_rfc3164_frame() {
        let frame = format_frame(SyslogFormat::Rfc3164, "build-01", timestamp(), "{}");
        assert_eq!(frame, "<14>May  7 08:30:15 build-01 logship: @cee: {}");
    }

    #[test]
    fn test_push_sends_one_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let indexer = SyslogIndexer::new(SyslogConfig {
            host: "127.0.0.1".to_string(),
            port: receiver.local_addr().unwrap().port(),
            format: SyslogFormat::Rfc3164,
        })
        .unwrap();

        indexer.push(r#"{"message":["hello"]}"#).unwrap();

        let mut buf = [0u8; 2048];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let datagram = std::str::from_utf8(&buf[..len]).unwrap();
        assert!(datagram.starts_with("<14>"));
        assert!(datagram.ends_with(r#" logship: @cee: {"message":["hello"]}"#));
    }

    #[test]
    fn test_blank_host_is_rejected() {
        let error = SyslogIndexer::new(SyslogConfig {
            host: String::new(),
            port: 514,
            format: SyslogFormat::default(),
        })
        .unwrap_err();
        assert_eq!(error.to_string(), "SYSLOG indexer: host is required");
    }
}

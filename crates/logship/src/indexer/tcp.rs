// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::net::{Shutdown, TcpStream};

use tracing::trace;

use crate::config::TcpConfig;
use crate::error::{ConfigError, TransportError};
use crate::indexer::{Indexer, IndexerKind};

/// Line oriented TCP sender.
///
/// Every push opens its own connection, writes the payload followed by a
/// newline, and closes it again, so concurrent pushes never share a socket.
#[derive(Debug, Clone)]
pub struct TcpIndexer {
    config: TcpConfig,
}

impl TcpIndexer {
    pub fn new(config: TcpConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl Indexer for TcpIndexer {
    fn kind(&self) -> IndexerKind {
        IndexerKind::Tcp
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn push(&self, payload: &str) -> Result<(), TransportError> {
        let mut stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .map_err(|source| TransportError::Connect {
                endpoint: self.describe(),
                source,
            })?;

        stream.write_all(payload.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        // The peer may already be gone; the bytes are written either way.
        if let Err(e) = stream.shutdown(Shutdown::Write) {
            trace!("LOGSHIP | TCP shutdown after push failed: {e}");
        }
        Ok(())
    }
}

//! Raw request/reply exchange with the device's management port.
//!
//! The device speaks a one-shot protocol: open a TCP connection, write one
//! request, read one reply line, close. Every exchange is bounded by a
//! timeout. Failing to reach the device surfaces as
//! [`WhatsminerError::Connectivity`]; a reply that arrives but is not a
//! sane line of text is [`WhatsminerError::InvalidResponse`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time;

use crate::error::{Result, WhatsminerError};
use crate::tracing::prelude::*;

/// Default per-exchange timeout.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest reply accepted. Real replies are a few kilobytes at most.
pub const MAX_REPLY_BYTES: u64 = 64 * 1024;

/// Something that can carry one request to the device and return its reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, payload: &str) -> Result<String>;
}

/// TCP transport to a single device.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exchange_inner(&self, payload: &str) -> std::io::Result<Vec<u8>> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_all(payload.as_bytes()).await?;

        // The device closes the connection after replying, so a missing
        // newline just means we read to EOF.
        let mut line = Vec::new();
        BufReader::new((&mut stream).take(MAX_REPLY_BYTES))
            .read_until(b'\n', &mut line)
            .await?;
        Ok(line)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn exchange(&self, payload: &str) -> Result<String> {
        trace!(host = %self.host, port = self.port, payload, "Sending request");

        let reply = time::timeout(self.timeout, self.exchange_inner(payload))
            .await
            .map_err(|_| {
                WhatsminerError::Connectivity(format!(
                    "{}:{} did not reply within {:?}",
                    self.host, self.port, self.timeout
                ))
            })??;

        if reply.len() as u64 >= MAX_REPLY_BYTES && reply.last() != Some(&b'\n') {
            return Err(WhatsminerError::InvalidResponse(format!(
                "reply exceeds {MAX_REPLY_BYTES} bytes"
            )));
        }
        let reply = String::from_utf8(reply)
            .map_err(|e| WhatsminerError::InvalidResponse(format!("reply is not UTF-8: {e}")))?;
        let reply = reply.trim().to_string();
        trace!(host = %self.host, reply = %reply, "Received reply");
        Ok(reply)
    }
}

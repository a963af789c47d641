//! One device: transport plus authenticated-session state.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::codec::{self, SessionKeys, TokenGrant};
use crate::config::ConnectionDescriptor;
use crate::error::{Result, WhatsminerError};
use crate::tracing::prelude::*;
use crate::transport::{TcpTransport, Transport};

/// Tokens are good for 30 minutes on the device; refresh a little early.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(29 * 60);

#[derive(Debug)]
struct Session {
    keys: SessionKeys,
    issued: Instant,
}

/// Connection to one device.
///
/// Owns the cached session token. The session lock is held while a token is
/// fetched, so concurrent encrypted commands never race two `get_token`
/// calls against each other.
pub struct Machine {
    transport: Arc<dyn Transport>,
    password: String,
    session: Mutex<Option<Session>>,
}

impl Machine {
    /// Machine talking TCP to the device in `descriptor`.
    pub fn connect(descriptor: &ConnectionDescriptor, timeout: Duration) -> Self {
        let transport = TcpTransport::new(&descriptor.host, descriptor.port).with_timeout(timeout);
        Self::with_transport(Arc::new(transport), &descriptor.password)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, password: &str) -> Self {
        Self {
            transport,
            password: password.to_string(),
            session: Mutex::new(None),
        }
    }

    /// Reachability and credential probe: obtains a session token.
    pub async fn check(&self) -> Result<()> {
        self.session_keys().await.map(|_| ())
    }

    /// Drop the cached token so the next encrypted call re-authenticates.
    pub async fn invalidate_session(&self) {
        self.session.lock().await.take();
    }

    /// Send a command and return the decoded, status-checked reply.
    pub async fn communicate(
        &self,
        cmd: &str,
        params: Option<Map<String, Value>>,
        encrypted: bool,
    ) -> Result<Value> {
        let result = if encrypted {
            self.communicate_encrypted(cmd, params.as_ref()).await
        } else {
            let request = codec::encode_request(cmd, params.as_ref(), None);
            let reply = codec::parse_reply(&self.transport.exchange(&request).await?)?;
            codec::check_reply(cmd, &reply).map(|_| reply)
        };

        if let Err(ref e) = result {
            debug!(cmd, error = %e, "Command failed");
        }
        result
    }

    async fn communicate_encrypted(
        &self,
        cmd: &str,
        params: Option<&Map<String, Value>>,
    ) -> Result<Value> {
        let keys = self.session_keys().await?;
        let plaintext = codec::encode_request(cmd, params, Some(&keys.token));
        let envelope = codec::seal_request(&keys.cipher, &plaintext);

        let reply = codec::parse_reply(&self.transport.exchange(&envelope).await?)?;
        let result = codec::open_reply(cmd, &keys.cipher, &reply)
            .and_then(|body| codec::check_reply(cmd, &body).map(|_| body));

        if let Err(ref e) = result {
            if e.is_token_failure() {
                info!(cmd, error = %e, "Session token rejected, will re-authenticate");
                self.invalidate_session().await;
            }
        }
        result
    }

    async fn session_keys(&self) -> Result<SessionKeys> {
        let mut session = self.session.lock().await;

        if let Some(current) = session.as_ref() {
            if current.issued.elapsed() < TOKEN_LIFETIME {
                return Ok(current.keys.clone());
            }
        }

        let request = codec::encode_request("get_token", None, None);
        let reply = codec::parse_reply(&self.transport.exchange(&request).await?)?;
        codec::check_reply("get_token", &reply)?;

        let grant: TokenGrant = reply
            .get("Msg")
            .cloned()
            .ok_or_else(|| WhatsminerError::InvalidResponse(reply.to_string()))
            .and_then(|msg| {
                serde_json::from_value(msg)
                    .map_err(|e| WhatsminerError::InvalidResponse(e.to_string()))
            })?;

        let keys = SessionKeys::derive(&self.password, &grant)?;
        debug!("Obtained new session token");
        *session = Some(Session {
            keys: keys.clone(),
            issued: Instant::now(),
        });
        Ok(keys)
    }
}

//! Wire format for the Whatsminer management API.
//!
//! Requests are single JSON objects, `{"cmd": "<name>", ...params}`. Replies
//! are a single line of JSON carrying a `STATUS` field (`"S"` on success,
//! `"E"` with a numeric `Code` on failure).
//!
//! Privileged commands go through an encrypted envelope:
//!
//! ```text
//! client                                   device
//!   | {"cmd":"get_token"}                     |
//!   |---------------------------------------->|
//!   |        {"Msg":{time, salt, newsalt}}    |
//!   |<----------------------------------------|
//!   |  key   = md5crypt(password, salt)       |
//!   |  token = md5crypt(key + time, newsalt)  |
//!   |                                         |
//!   | {"enc":1,"data":b64(aes(key, {..token}))}
//!   |---------------------------------------->|
//!   |              {"enc": b64(aes(key, ..))} |
//!   |<----------------------------------------|
//! ```

mod cipher;
pub mod crypt;

pub use cipher::SessionCipher;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::{Result, WhatsminerError};

/// Body sent by the device's API proxy when btminer itself is not running.
pub const OFFLINE_REPLY: &str = "Socket connect failed: Connection refused";

/// Salts and timestamp handed out by `get_token`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub time: String,
    pub salt: String,
    pub newsalt: String,
}

/// Token plus cipher for one authenticated session.
#[derive(Debug, Clone)]
pub struct SessionKeys {
    pub token: String,
    pub cipher: SessionCipher,
}

impl SessionKeys {
    /// Fails only if the device hands out a salt md5-crypt cannot use.
    pub fn derive(password: &str, grant: &TokenGrant) -> Result<Self> {
        let key = crypt::md5_crypt_hash(password.as_bytes(), &grant.salt)?;
        let token =
            crypt::md5_crypt_hash(format!("{key}{}", grant.time).as_bytes(), &grant.newsalt)?;
        Ok(Self {
            token,
            cipher: SessionCipher::from_key(&key),
        })
    }
}

/// Build the plaintext JSON for a command.
pub fn encode_request(cmd: &str, params: Option<&Map<String, Value>>, token: Option<&str>) -> String {
    let mut body = params.cloned().unwrap_or_default();
    body.insert("cmd".into(), Value::from(cmd));
    if let Some(token) = token {
        body.insert("token".into(), Value::from(token));
    }
    Value::Object(body).to_string()
}

/// Wrap an encrypted request in the envelope the device expects.
pub fn seal_request(cipher: &SessionCipher, plaintext: &str) -> String {
    json!({ "enc": 1, "data": cipher.encrypt(plaintext) }).to_string()
}

/// Parse a raw reply line.
pub fn parse_reply(raw: &str) -> Result<Value> {
    let raw = raw.trim();
    if raw == OFFLINE_REPLY {
        return Err(WhatsminerError::MinerOffline);
    }
    // Some firmware emits a trailing comma before the closing brace.
    let cleaned = raw.replace(",}", "}");
    serde_json::from_str(&cleaned)
        .map_err(|e| WhatsminerError::InvalidResponse(format!("{e}: {raw}")))
}

/// Decrypt the body of an encrypted reply.
///
/// A device that cannot decrypt the request answers in plaintext, so an
/// unsealed reply is status-checked before it is rejected.
pub fn open_reply(cmd: &str, cipher: &SessionCipher, reply: &Value) -> Result<Value> {
    if reply_code(reply) == Some(23) {
        return Err(WhatsminerError::InvalidAuth);
    }
    let Some(sealed) = reply.get("enc").and_then(Value::as_str) else {
        check_reply(cmd, reply)?;
        return Err(WhatsminerError::InvalidResponse(reply.to_string()));
    };
    let plaintext = cipher.decrypt(sealed)?;
    if plaintext.is_empty() {
        return Err(WhatsminerError::InvalidResponse(
            "empty encrypted reply".into(),
        ));
    }
    serde_json::from_str(&plaintext).map_err(|e| WhatsminerError::DecodeError(e.to_string()))
}

/// Map a decoded reply's status onto the error taxonomy.
pub fn check_reply(cmd: &str, reply: &Value) -> Result<()> {
    let Some(status) = reply.get("STATUS") else {
        return Err(WhatsminerError::InvalidResponse(reply.to_string()));
    };
    if status.as_str() != Some("E") {
        return Ok(());
    }

    let message = reply
        .get("Msg")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Err(match reply_code(reply) {
        Some(14) => WhatsminerError::InvalidCommand {
            command: cmd.to_string(),
            message,
        },
        Some(23) => WhatsminerError::InvalidMessage(cmd.to_string()),
        Some(45) => WhatsminerError::ApiPermissionDenied(cmd.to_string()),
        Some(132) => WhatsminerError::CommandError(format!("{cmd}: {reply}")),
        Some(135) => WhatsminerError::TokenError,
        Some(136) => WhatsminerError::TokenExceeded,
        Some(137) => WhatsminerError::DecodeError(cmd.to_string()),
        _ => WhatsminerError::InvalidResponse(reply.to_string()),
    })
}

fn reply_code(reply: &Value) -> Option<i64> {
    reply.get("Code").and_then(Value::as_i64)
}

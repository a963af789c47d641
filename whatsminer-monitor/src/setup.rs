//! First-contact validation of a new device.
//!
//! Whoever collects host, port and password from the user calls
//! [`validate`] before saving them. On success the device's MAC becomes its
//! durable identity; on failure the returned [`SetupError::key`] names what
//! to tell the user.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::api::{Dialect, Version};
use crate::config::ConnectionDescriptor;
use crate::detect::{self, MachineFactory};
use crate::error::{Result, WhatsminerError};
use crate::machine::Machine;
use crate::tracing::prelude::*;

pub const DEFAULT_TITLE: &str = "Whatsminer";

#[derive(Error, Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SetupError {
    #[error("cannot connect to miner: {0}")]
    CannotConnect(String),

    #[error("miner rejected the password")]
    InvalidAuth,

    #[error("API access is disabled on the miner")]
    ApiDenied,

    #[error("miner token budget exceeded, try again later")]
    TokenExceeded,

    #[error("miner is offline")]
    MinerOffline,

    #[error("unsupported API version {0:?}")]
    UnsupportedVersion(String),

    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl SetupError {
    /// Stable identifier for user-facing messages.
    pub fn key(&self) -> &'static str {
        self.into()
    }
}

impl From<WhatsminerError> for SetupError {
    fn from(err: WhatsminerError) -> Self {
        match err {
            WhatsminerError::Connectivity(reason) => Self::CannotConnect(reason),
            WhatsminerError::DecodeError(_)
            | WhatsminerError::TokenError
            | WhatsminerError::InvalidAuth => Self::InvalidAuth,
            WhatsminerError::ApiPermissionDenied(_) => Self::ApiDenied,
            WhatsminerError::TokenExceeded => Self::TokenExceeded,
            WhatsminerError::MinerOffline => Self::MinerOffline,
            WhatsminerError::UnsupportedVersion(version) => Self::UnsupportedVersion(version),
            other => {
                info!(error = %other, "Unexpected miner error during setup");
                Self::Unknown(other.to_string())
            }
        }
    }
}

/// What a successful validation learned about the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    /// Lowercase, colon-separated.
    pub mac: String,
    pub title: String,
    pub version: Version,
    pub dialect: Dialect,
}

/// Validate connection settings against the live device.
pub async fn validate(
    descriptor: &ConnectionDescriptor,
    timeout: Duration,
) -> std::result::Result<Validated, SetupError> {
    let machine = Arc::new(Machine::connect(descriptor, timeout));
    let validated = validate_machine(machine).await?;
    info!(host = %descriptor, mac = %validated.mac, dialect = %validated.dialect, "Miner validated");
    Ok(validated)
}

pub(crate) async fn validate_machine(
    machine: Arc<Machine>,
) -> std::result::Result<Validated, SetupError> {
    Ok(probe(machine).await?)
}

async fn probe(machine: Arc<Machine>) -> Result<Validated> {
    machine.check().await?;
    let detected = detect::detect(&MachineFactory::new(machine)).await?;
    let version = detected.api.get_version().await?;
    let summary = detected.api.get_summary().await?;

    Ok(Validated {
        mac: format_mac(&summary.mac),
        title: DEFAULT_TITLE.to_string(),
        version,
        dialect: detected.dialect(),
    })
}

/// Normalise a MAC address to lowercase colon form.
///
/// Accepts colon, dash, dotted-quad (`aabb.ccdd.eeff`) and bare hex input.
/// Anything else is returned unchanged.
pub fn format_mac(mac: &str) -> String {
    let mac = mac.trim();
    let bare: String = match mac.len() {
        17 if mac.contains(':') => return mac.to_lowercase(),
        17 if mac.contains('-') => mac.replace('-', ""),
        14 if mac.matches('.').count() == 2 => mac.replace('.', ""),
        12 if !mac.contains([':', '-', '.']) => mac.to_string(),
        _ => return mac.to_string(),
    };

    if bare.len() != 12 || !bare.chars().all(|c| c.is_ascii_hexdigit()) {
        return mac.to_string();
    }
    bare.to_lowercase()
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

//! Dialect detection.
//!
//! `get_version` works on both APIs without authentication, so the v1.4.0
//! client is always built first and asked which API the device actually
//! speaks. The answer decides the client every later call goes through.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::api::{ApiV1, ApiV2, Dialect, MinerApi, Version};
use crate::config::ConnectionDescriptor;
use crate::error::{Result, WhatsminerError};
use crate::machine::Machine;
use crate::tracing::prelude::*;

/// `api_ver` reported by v1.4.0 firmware.
pub const V1_API_VERSION: &str = "whatsminer v1.4.0";

/// Every 2.0.x firmware reports an `api_ver` starting with this.
pub const V2_API_PREFIX: &str = "2.0.";

/// Map an `api_ver` string onto a dialect.
pub fn classify(api_version: &str) -> Result<Dialect> {
    if api_version == V1_API_VERSION {
        Ok(Dialect::V1)
    } else if api_version.starts_with(V2_API_PREFIX) {
        Ok(Dialect::V2)
    } else {
        Err(WhatsminerError::UnsupportedVersion(api_version.to_string()))
    }
}

/// Builds clients of a given dialect, all sharing one device session.
pub trait ClientFactory: Send + Sync {
    fn create(&self, dialect: Dialect) -> Arc<dyn MinerApi>;
}

/// Factory over a real [`Machine`].
pub struct MachineFactory {
    machine: Arc<Machine>,
}

impl MachineFactory {
    pub fn new(machine: Arc<Machine>) -> Self {
        Self { machine }
    }

    pub fn for_descriptor(descriptor: &ConnectionDescriptor, timeout: Duration) -> Self {
        Self::new(Arc::new(Machine::connect(descriptor, timeout)))
    }
}

impl ClientFactory for MachineFactory {
    fn create(&self, dialect: Dialect) -> Arc<dyn MinerApi> {
        match dialect {
            Dialect::V1 => Arc::new(ApiV1::new(self.machine.clone())),
            Dialect::V2 => Arc::new(ApiV2::new(self.machine.clone())),
        }
    }
}

/// Outcome of a successful detection.
#[derive(Clone)]
pub struct Detected {
    pub api: Arc<dyn MinerApi>,
    pub version: Version,
}

impl Detected {
    pub fn dialect(&self) -> Dialect {
        self.api.dialect()
    }
}

/// Probe the device and return a client for the dialect it speaks.
pub async fn detect(factory: &dyn ClientFactory) -> Result<Detected> {
    let probe = factory.create(Dialect::V1);
    let version = probe.get_version().await?;

    let api = match classify(&version.api_version)? {
        Dialect::V1 => probe,
        Dialect::V2 => factory.create(Dialect::V2),
    };

    debug!(
        api_version = %version.api_version,
        firmware = %version.firmware_version,
        dialect = %api.dialect(),
        "Detected API dialect"
    );
    Ok(Detected { api, version })
}

/// Detection over a fresh TCP connection to `descriptor`.
pub async fn detect_descriptor(
    descriptor: &ConnectionDescriptor,
    timeout: Duration,
) -> Result<Detected> {
    detect(&MachineFactory::for_descriptor(descriptor, timeout)).await
}

/// The selected client for one device, shared between polling and control.
///
/// Detection runs under the slot lock, so a control operation issued while
/// the poller is still detecting waits for the result instead of detecting
/// again. Clones share the same slot.
#[derive(Clone)]
pub struct ClientSlot {
    factory: Arc<dyn ClientFactory>,
    detected: Arc<Mutex<Option<Detected>>>,
}

impl ClientSlot {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            detected: Arc::new(Mutex::new(None)),
        }
    }

    pub fn for_descriptor(descriptor: &ConnectionDescriptor, timeout: Duration) -> Self {
        Self::new(Arc::new(MachineFactory::for_descriptor(descriptor, timeout)))
    }

    /// Cached client, detecting first if there is none.
    ///
    /// A failed detection leaves the slot empty.
    pub async fn acquire(&self) -> Result<Detected> {
        let mut detected = self.detected.lock().await;
        if let Some(current) = detected.as_ref() {
            return Ok(current.clone());
        }

        let fresh = detect(self.factory.as_ref()).await?;
        *detected = Some(fresh.clone());
        Ok(fresh)
    }

    /// Cached client without triggering detection.
    pub async fn current(&self) -> Option<Detected> {
        self.detected.lock().await.clone()
    }

    /// Forget the client so the next `acquire` re-detects.
    ///
    /// Crate-internal: external callers go through
    /// [`Coordinator::reset_client`](crate::coordinator::Coordinator::reset_client),
    /// which also clears the coordinator's cached version.
    pub(crate) async fn reset(&self) {
        self.detected.lock().await.take();
    }
}

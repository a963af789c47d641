//! Dialect-specific protocol clients.
//!
//! Whatsminer firmware ships one of two incompatible management APIs. Both
//! expose the same capabilities, so callers hold an `Arc<dyn MinerApi>` and
//! never care which one they got. [`crate::detect`] picks the variant.

mod types;
mod v1;
mod v2;

pub use types::{DeviceDetails, MinerStatus, PowerUnitDetails, Summary, Version};
pub use v1::ApiV1;
pub use v2::ApiV2;

#[cfg(test)]
pub(crate) use types::fixtures;

use async_trait::async_trait;

use crate::error::Result;

/// Which management API the device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Dialect {
    /// Original firmware, `api_ver == "whatsminer v1.4.0"`.
    #[strum(to_string = "v1.4.0")]
    V1,
    /// API 2.0.x.
    #[strum(to_string = "2.0.x")]
    V2,
}

/// Capabilities shared by both dialects.
///
/// Reads are idempotent. Control operations change device state and go
/// through the encrypted channel.
#[async_trait]
pub trait MinerApi: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Valid before authentication; used for dialect detection.
    async fn get_version(&self) -> Result<Version>;

    async fn get_status(&self) -> Result<MinerStatus>;

    async fn get_summary(&self) -> Result<Summary>;

    /// At least one entry; entry 0 carries the authoritative model.
    async fn get_device_details(&self) -> Result<Vec<DeviceDetails>>;

    async fn get_psu(&self) -> Result<PowerUnitDetails>;

    async fn power_on_miner(&self) -> Result<()>;

    async fn power_off_miner(&self) -> Result<()>;

    /// Restart the btminer process (not the whole controller).
    async fn restart_miner(&self) -> Result<()>;

    async fn reload_config(&self) -> Result<()>;

    /// Reboot the control board.
    async fn reboot(&self) -> Result<()>;

    /// Switch to low-power mode.
    async fn set_power_mode(&self) -> Result<()>;

    /// Frequency offset in percent, -10..=100.
    async fn set_target_frequency(&self, percent: i32) -> Result<()>;

    /// Power limit in percent, 0..=100.
    async fn set_power_percent(&self, percent: u8) -> Result<()>;

    async fn set_fast_boot(&self, enable: bool) -> Result<()>;
}

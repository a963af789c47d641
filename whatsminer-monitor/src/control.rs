//! User-triggered operations on a device.
//!
//! A [`ControlHandle`] shares its [`ClientSlot`] with the device's
//! coordinator, so control calls reuse the detected dialect and session
//! token instead of negotiating their own.

use crate::detect::ClientSlot;
use crate::error::Result;
use crate::setup::format_mac;
use crate::tracing::prelude::*;

/// Operations exposed to the user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum ControlKey {
    /// Switch: on starts hashing, off stops it.
    Power,
    RestartMiner,
    ReloadConfiguration,
}

impl ControlKey {
    pub fn label(self) -> &'static str {
        match self {
            Self::Power => "Power",
            Self::RestartMiner => "Restart Miner",
            Self::ReloadConfiguration => "Reload Miner Configuration",
        }
    }
}

/// `<device_mac>_<operation_key>`
pub fn unique_id(device_mac: &str, key: ControlKey) -> String {
    format!("{device_mac}_{key}")
}

#[derive(Clone)]
pub struct ControlHandle {
    device_mac: String,
    slot: ClientSlot,
}

impl ControlHandle {
    pub fn new(device_mac: impl Into<String>, slot: ClientSlot) -> Self {
        Self {
            device_mac: device_mac.into(),
            slot,
        }
    }

    /// Build a handle for the device behind `slot`.
    ///
    /// Uses `known_mac` when setup already recorded one, otherwise asks the
    /// device for its summary MAC.
    pub async fn resolve(slot: ClientSlot, known_mac: Option<&str>) -> Result<Self> {
        let device_mac = match known_mac {
            Some(mac) => format_mac(mac),
            None => format_mac(&slot.acquire().await?.api.get_summary().await?.mac),
        };
        Ok(Self::new(device_mac, slot))
    }

    pub fn device_mac(&self) -> &str {
        &self.device_mac
    }

    pub fn unique_id(&self, key: ControlKey) -> String {
        unique_id(&self.device_mac, key)
    }

    pub async fn power_on(&self) -> Result<()> {
        info!(mac = %self.device_mac, "Powering miner on");
        self.slot.acquire().await?.api.power_on_miner().await
    }

    pub async fn power_off(&self) -> Result<()> {
        info!(mac = %self.device_mac, "Powering miner off");
        self.slot.acquire().await?.api.power_off_miner().await
    }

    pub async fn restart(&self) -> Result<()> {
        info!(mac = %self.device_mac, "Restarting miner");
        self.slot.acquire().await?.api.restart_miner().await
    }

    pub async fn reload_configuration(&self) -> Result<()> {
        info!(mac = %self.device_mac, "Reloading miner configuration");
        self.slot.acquire().await?.api.reload_config().await
    }

    /// Set the power switch. Button-style keys act on any value.
    pub async fn trigger(&self, key: ControlKey, on: bool) -> Result<()> {
        match key {
            ControlKey::Power if on => self.power_on().await,
            ControlKey::Power => self.power_off().await,
            ControlKey::RestartMiner => self.restart().await,
            ControlKey::ReloadConfiguration => self.reload_configuration().await,
        }
    }
}

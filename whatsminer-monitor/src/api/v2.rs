//! Client for the 2.0.x API.
//!
//! Mostly identical to v1.4.0. The status reply renames the firmware field,
//! the summary renames the power-rate field and drops the MAC, which has to
//! be fetched separately through `get_miner_info`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::types::msg_str;
use super::{
    ApiV1, DeviceDetails, Dialect, MinerApi, MinerStatus, PowerUnitDetails, Summary, Version,
};
use crate::error::{Result, WhatsminerError};
use crate::machine::Machine;

#[derive(Clone)]
pub struct ApiV2 {
    base: ApiV1,
}

impl ApiV2 {
    pub fn new(machine: Arc<Machine>) -> Self {
        Self {
            base: ApiV1::new(machine),
        }
    }

    async fn read_mac(&self) -> Result<String> {
        let mut params = Map::new();
        params.insert("info".into(), Value::from("mac"));
        let reply = self
            .base
            .machine()
            .communicate("get_miner_info", Some(params), false)
            .await?;
        msg_str(&reply, "mac").map(str::to_string)
    }
}

#[async_trait]
impl MinerApi for ApiV2 {
    fn dialect(&self) -> Dialect {
        Dialect::V2
    }

    async fn get_version(&self) -> Result<Version> {
        self.base.get_version().await
    }

    async fn get_status(&self) -> Result<MinerStatus> {
        self.base.read_status("FirmwareVersion").await
    }

    async fn get_summary(&self) -> Result<Summary> {
        let record = self.base.read_summary_record().await?;
        let mac = self.read_mac().await?;
        let power_rate = record
            .power_rate
            .ok_or_else(|| WhatsminerError::InvalidResponse("missing Power Rate".into()))?;
        Ok(record.into_summary(power_rate, mac))
    }

    async fn get_device_details(&self) -> Result<Vec<DeviceDetails>> {
        self.base.get_device_details().await
    }

    async fn get_psu(&self) -> Result<PowerUnitDetails> {
        self.base.get_psu().await
    }

    async fn power_on_miner(&self) -> Result<()> {
        self.base.power_on_miner().await
    }

    async fn power_off_miner(&self) -> Result<()> {
        self.base.power_off_miner().await
    }

    async fn restart_miner(&self) -> Result<()> {
        self.base.restart_miner().await
    }

    async fn reload_config(&self) -> Result<()> {
        self.base.reload_config().await
    }

    async fn reboot(&self) -> Result<()> {
        self.base.reboot().await
    }

    async fn set_power_mode(&self) -> Result<()> {
        self.base.set_power_mode().await
    }

    async fn set_target_frequency(&self, percent: i32) -> Result<()> {
        self.base.set_target_frequency(percent).await
    }

    async fn set_power_percent(&self, percent: u8) -> Result<()> {
        self.base.set_power_percent(percent).await
    }

    async fn set_fast_boot(&self, enable: bool) -> Result<()> {
        self.base.set_fast_boot(enable).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fixtures;
    use crate::testing::FakeDevice;
    use serde_json::json;

    #[tokio::test]
    async fn status_reads_renamed_firmware_field() {
        let device = FakeDevice::new("admin");
        device.on(
            "status",
            json!({"STATUS": "S", "Msg": {"btmineroff": "false", "FirmwareVersion": "'20220105.22.REL'"}}),
        );

        let status = ApiV2::new(device.machine()).get_status().await.unwrap();
        assert!(status.miner_online);
        assert_eq!(status.firmware_version, "20220105.22.REL");
    }

    #[tokio::test]
    async fn summary_fetches_mac_separately() {
        let device = FakeDevice::new("admin");
        device.on("summary", fixtures::summary_reply("Power Rate", None));
        device.on(
            "get_miner_info",
            json!({"STATUS": "S", "Msg": {"mac": "C4:AA:BB:CC:DD:EE"}}),
        );

        let summary = ApiV2::new(device.machine()).get_summary().await.unwrap();

        assert_eq!(summary.mac, "C4:AA:BB:CC:DD:EE");
        assert_eq!(summary.power_rate, 39.0);
        assert_eq!(device.commands(), vec!["summary", "get_miner_info"]);
        assert_eq!(device.last_params()["info"], json!("mac"));
    }

    #[tokio::test]
    async fn v1_status_shape_is_rejected() {
        let device = FakeDevice::new("admin");
        device.on(
            "status",
            json!({"STATUS": "S", "Msg": {"btmineroff": "false", "Firmware Version": "x"}}),
        );

        assert!(matches!(
            ApiV2::new(device.machine()).get_status().await,
            Err(WhatsminerError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn control_operations_share_v1_commands() {
        let device = FakeDevice::new("admin");
        device.on("restart_btminer", json!({"STATUS": "S"}));
        device.on("reload_config", json!({"STATUS": "S"}));

        let api = ApiV2::new(device.machine());
        api.restart_miner().await.unwrap();
        api.reload_config().await.unwrap();

        assert_eq!(device.commands(), vec!["restart_btminer", "reload_config"]);
        assert_eq!(device.token_requests(), 1);
    }
}

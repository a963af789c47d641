//! Client for the `whatsminer v1.4.0` API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::types::{SummaryRecord, decode_at, msg_str};
use super::{DeviceDetails, Dialect, MinerApi, MinerStatus, PowerUnitDetails, Summary, Version};
use crate::error::{Result, WhatsminerError};
use crate::machine::Machine;

/// v1.4.0 client. Also the base that [`ApiV2`](super::ApiV2) builds on.
#[derive(Clone)]
pub struct ApiV1 {
    machine: Arc<Machine>,
}

impl ApiV1 {
    pub fn new(machine: Arc<Machine>) -> Self {
        Self { machine }
    }

    pub(crate) fn machine(&self) -> &Machine {
        &self.machine
    }

    pub(crate) async fn read_status(&self, firmware_key: &str) -> Result<MinerStatus> {
        let reply = self.machine.communicate("status", None, false).await?;
        Ok(MinerStatus {
            miner_online: msg_str(&reply, "btmineroff")? == "false",
            firmware_version: msg_str(&reply, firmware_key)?.trim_matches('\'').to_string(),
        })
    }

    pub(crate) async fn read_summary_record(&self) -> Result<SummaryRecord> {
        let reply = self.machine.communicate("summary", None, false).await?;
        decode_at(&reply, "/SUMMARY/0")
    }

    async fn privileged(&self, cmd: &str, params: Option<Map<String, Value>>) -> Result<()> {
        self.machine.communicate(cmd, params, true).await.map(|_| ())
    }

    fn percent_param(percent: impl ToString) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("percent".into(), Value::from(percent.to_string()));
        params
    }
}

#[async_trait]
impl MinerApi for ApiV1 {
    fn dialect(&self) -> Dialect {
        Dialect::V1
    }

    async fn get_version(&self) -> Result<Version> {
        let reply = self.machine.communicate("get_version", None, false).await?;
        decode_at(&reply, "/Msg")
    }

    async fn get_status(&self) -> Result<MinerStatus> {
        self.read_status("Firmware Version").await
    }

    async fn get_summary(&self) -> Result<Summary> {
        let record = self.read_summary_record().await?;
        let power_rate = record
            .power_rt
            .ok_or_else(|| WhatsminerError::InvalidResponse("missing Power_RT".into()))?;
        let mac = record
            .mac
            .clone()
            .ok_or_else(|| WhatsminerError::InvalidResponse("missing MAC".into()))?;
        Ok(record.into_summary(power_rate, mac))
    }

    async fn get_device_details(&self) -> Result<Vec<DeviceDetails>> {
        let reply = self.machine.communicate("devdetails", None, false).await?;
        let details: Vec<DeviceDetails> = decode_at(&reply, "/DEVDETAILS")?;
        if details.is_empty() {
            return Err(WhatsminerError::InvalidResponse(
                "devdetails returned no devices".into(),
            ));
        }
        Ok(details)
    }

    async fn get_psu(&self) -> Result<PowerUnitDetails> {
        let reply = self.machine.communicate("get_psu", None, false).await?;
        decode_at(&reply, "/Msg")
    }

    async fn power_on_miner(&self) -> Result<()> {
        self.privileged("power_on", None).await
    }

    async fn power_off_miner(&self) -> Result<()> {
        let mut params = Map::new();
        params.insert("respbefore".into(), Value::from("true"));
        self.privileged("power_off", Some(params)).await
    }

    async fn restart_miner(&self) -> Result<()> {
        self.privileged("restart_btminer", None).await
    }

    async fn reload_config(&self) -> Result<()> {
        self.privileged("reload_config", None).await
    }

    async fn reboot(&self) -> Result<()> {
        self.privileged("reboot", None).await
    }

    async fn set_power_mode(&self) -> Result<()> {
        self.privileged("set_lower_power", None).await
    }

    async fn set_target_frequency(&self, percent: i32) -> Result<()> {
        if !(-10..=100).contains(&percent) {
            return Err(WhatsminerError::InvalidArgument(format!(
                "target frequency {percent}% outside -10..=100"
            )));
        }
        self.privileged("set_target_freq", Some(Self::percent_param(percent)))
            .await
    }

    async fn set_power_percent(&self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(WhatsminerError::InvalidArgument(format!(
                "power percent {percent} outside 0..=100"
            )));
        }
        self.privileged("set_power_pct", Some(Self::percent_param(percent)))
            .await
    }

    async fn set_fast_boot(&self, enable: bool) -> Result<()> {
        let cmd = if enable {
            "enable_cgminer_fast_boot"
        } else {
            "disable_cgminer_fast_boot"
        };
        self.privileged(cmd, None).await
    }
}

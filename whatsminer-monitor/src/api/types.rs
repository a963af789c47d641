//! Data returned by the device, plus the raw wire records they are decoded
//! from.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, WhatsminerError};

/// API and firmware version as reported by `get_version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "api_ver")]
    pub api_version: String,
    #[serde(rename = "fw_ver")]
    pub firmware_version: String,
}

/// Momentary liveness of the mining process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MinerStatus {
    pub miner_online: bool,
    pub firmware_version: String,
}

/// Steady-state telemetry. Hash rates are in GH/s.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub elapsed: u64,
    pub average_hash_rate: f64,
    pub hash_rate_5s: f64,
    pub hash_rate_1m: f64,
    pub hash_rate_5m: f64,
    pub hash_rate_15m: f64,
    pub average_frequency: f64,
    pub target_frequency: f64,
    pub target_hash_rate: f64,

    pub accepted: u64,
    pub rejected: u64,

    pub temperature: f64,
    pub chip_temperature_minimum: f64,
    pub chip_temperature_maximum: f64,
    pub chip_temperature_average: f64,
    pub environment_temperature: f64,
    pub fan_speed_in: u64,
    pub fan_speed_out: u64,

    pub power: u64,
    pub power_rate: f64,
    pub power_mode: String,

    pub pool_rejected_percent: f64,
    pub pool_stale_percent: f64,

    pub uptime: u64,
    pub security_mode: bool,
    /// Durable identity of the device.
    pub mac: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    #[serde(rename = "DEVDETAILS")]
    pub index: u32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ID")]
    pub identifier: u32,
    #[serde(rename = "Driver")]
    pub driver: String,
    #[serde(rename = "Kernel")]
    pub kernel: String,
    #[serde(rename = "Model")]
    pub model: String,
}

/// Power supply descriptors and, where the firmware reports it, telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUnitDetails {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "hw_version", deserialize_with = "lenient_string")]
    pub hardware_version: String,
    #[serde(rename = "sw_version", deserialize_with = "lenient_string")]
    pub software_version: String,
    #[serde(deserialize_with = "lenient_string")]
    pub model: String,
    #[serde(rename = "iin", default, deserialize_with = "lenient_opt_string")]
    pub current_in: Option<String>,
    #[serde(rename = "vin", default, deserialize_with = "lenient_opt_string")]
    pub voltage_in: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub fan_speed: Option<String>,
    #[serde(rename = "serial_no", default, deserialize_with = "lenient_opt_string")]
    pub serial_number: Option<String>,
}

/// `SUMMARY[0]` as the device sends it.
///
/// The two dialects disagree on the power-rate key and on where the MAC
/// lives, so both candidates are optional here and the dialect picks.
#[derive(Debug, Deserialize)]
pub(crate) struct SummaryRecord {
    #[serde(rename = "Elapsed")]
    elapsed: u64,
    #[serde(rename = "MHS av")]
    mhs_average: f64,
    #[serde(rename = "MHS 5s")]
    mhs_5s: f64,
    #[serde(rename = "MHS 1m")]
    mhs_1m: f64,
    #[serde(rename = "MHS 5m")]
    mhs_5m: f64,
    #[serde(rename = "MHS 15m")]
    mhs_15m: f64,
    #[serde(rename = "Accepted")]
    accepted: u64,
    #[serde(rename = "Rejected")]
    rejected: u64,
    #[serde(rename = "Temperature")]
    temperature: f64,
    #[serde(rename = "freq_avg")]
    frequency_average: f64,
    #[serde(rename = "Fan Speed In")]
    fan_speed_in: u64,
    #[serde(rename = "Fan Speed Out")]
    fan_speed_out: u64,
    #[serde(rename = "Power")]
    power: u64,
    #[serde(rename = "Power_RT")]
    pub(crate) power_rt: Option<f64>,
    #[serde(rename = "Power Rate")]
    pub(crate) power_rate: Option<f64>,
    #[serde(rename = "Pool Rejected%")]
    pool_rejected_percent: f64,
    #[serde(rename = "Pool Stale%")]
    pool_stale_percent: f64,
    #[serde(rename = "Uptime")]
    uptime: u64,
    #[serde(rename = "Security Mode")]
    security_mode: i64,
    #[serde(rename = "Target Freq")]
    target_frequency: f64,
    #[serde(rename = "Target MHS")]
    target_mhs: f64,
    #[serde(rename = "Env Temp")]
    environment_temperature: f64,
    #[serde(rename = "Power Mode")]
    power_mode: String,
    #[serde(rename = "Chip Temp Min")]
    chip_temperature_minimum: f64,
    #[serde(rename = "Chip Temp Max")]
    chip_temperature_maximum: f64,
    #[serde(rename = "Chip Temp Avg")]
    chip_temperature_average: f64,
    #[serde(rename = "MAC")]
    pub(crate) mac: Option<String>,
}

impl SummaryRecord {
    pub(crate) fn into_summary(self, power_rate: f64, mac: String) -> Summary {
        Summary {
            elapsed: self.elapsed,
            average_hash_rate: mhs_to_ghs(self.mhs_average).round_ties_even(),
            hash_rate_5s: mhs_to_ghs(self.mhs_5s).round_ties_even(),
            hash_rate_1m: mhs_to_ghs(self.mhs_1m).round_ties_even(),
            hash_rate_5m: mhs_to_ghs(self.mhs_5m).round_ties_even(),
            hash_rate_15m: mhs_to_ghs(self.mhs_15m).round_ties_even(),
            average_frequency: self.frequency_average,
            target_frequency: self.target_frequency,
            target_hash_rate: mhs_to_ghs(self.target_mhs),
            accepted: self.accepted,
            rejected: self.rejected,
            temperature: self.temperature,
            chip_temperature_minimum: self.chip_temperature_minimum,
            chip_temperature_maximum: self.chip_temperature_maximum,
            chip_temperature_average: self.chip_temperature_average,
            environment_temperature: self.environment_temperature,
            fan_speed_in: self.fan_speed_in,
            fan_speed_out: self.fan_speed_out,
            power: self.power,
            power_rate,
            power_mode: self.power_mode,
            pool_rejected_percent: self.pool_rejected_percent,
            pool_stale_percent: self.pool_stale_percent,
            uptime: self.uptime,
            security_mode: self.security_mode == 0,
            mac,
        }
    }
}

fn mhs_to_ghs(mhs: f64) -> f64 {
    mhs / 1000.0
}

/// Decode the node at `pointer` (RFC 6901) of a reply.
pub(crate) fn decode_at<T: DeserializeOwned>(reply: &Value, pointer: &str) -> Result<T> {
    let node = reply
        .pointer(pointer)
        .ok_or_else(|| WhatsminerError::InvalidResponse(format!("missing {pointer}")))?;
    T::deserialize(node).map_err(|e| WhatsminerError::InvalidResponse(format!("{pointer}: {e}")))
}

/// String field of the reply's `Msg` object.
pub(crate) fn msg_str<'a>(reply: &'a Value, key: &str) -> Result<&'a str> {
    reply
        .get("Msg")
        .and_then(|msg| msg.get(key))
        .and_then(Value::as_str)
        .ok_or_else(|| WhatsminerError::InvalidResponse(format!("missing Msg.{key}")))
}

/// Firmware reports some PSU fields as numbers on some models.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

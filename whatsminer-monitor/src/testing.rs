//! Scripted stand-ins for the device, used by unit tests.
//!
//! [`FakeDevice`] sits behind the [`Transport`] seam and speaks the real wire
//! format, encryption included, so `Machine` and the dialect clients are
//! exercised end to end. [`FakeApi`] sits behind the [`MinerApi`] seam for
//! coordinator, setup and control tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::api::{
    DeviceDetails, Dialect, MinerApi, MinerStatus, PowerUnitDetails, Summary, Version,
};
use crate::codec::{SessionKeys, TokenGrant};
use crate::detect::ClientFactory;
use crate::error::{Result, WhatsminerError};
use crate::machine::Machine;
use crate::transport::Transport;

#[derive(Clone)]
enum Reply {
    Json(Value),
    Raw(String),
}

struct DeviceState {
    password: String,
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<Value>>,
    token_requests: AtomicUsize,
}

/// A device that answers each command with a canned reply.
///
/// Encrypted requests are decrypted with the device's own password, so a
/// client with the wrong password gets the same decode error a real miner
/// would send.
pub struct FakeDevice {
    state: Arc<DeviceState>,
}

impl FakeDevice {
    pub fn new(password: &str) -> Self {
        Self {
            state: Arc::new(DeviceState {
                password: password.to_string(),
                replies: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                token_requests: AtomicUsize::new(0),
            }),
        }
    }

    pub fn grant() -> TokenGrant {
        TokenGrant {
            time: "4937".into(),
            salt: "BQ5hoXV9".into(),
            newsalt: "jbzkfQls".into(),
        }
    }

    pub fn on(&self, cmd: &str, reply: Value) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(cmd.to_string(), Reply::Json(reply));
    }

    /// Reply with a raw, non-JSON body.
    pub fn on_raw(&self, cmd: &str, body: &str) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(cmd.to_string(), Reply::Raw(body.to_string()));
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.state.clone()
    }

    /// Machine that knows the right password.
    pub fn machine(&self) -> Arc<Machine> {
        Arc::new(Machine::with_transport(self.transport(), &self.state.password))
    }

    /// Commands received, in order, excluding `get_token`.
    pub fn commands(&self) -> Vec<String> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r["cmd"].as_str().map(str::to_string))
            .collect()
    }

    /// Parameters of the last command, without `cmd` and `token`.
    pub fn last_params(&self) -> Value {
        let requests = self.state.requests.lock().unwrap();
        let mut params = requests
            .last()
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        params.remove("cmd");
        params.remove("token");
        Value::Object(params)
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }
}

impl DeviceState {
    fn dispatch(&self, request: &Value) -> Reply {
        self.requests.lock().unwrap().push(request.clone());
        let cmd = request["cmd"].as_str().unwrap_or_default();
        self.replies
            .lock()
            .unwrap()
            .get(cmd)
            .cloned()
            .unwrap_or_else(|| {
                Reply::Json(json!({"STATUS": "E", "Code": 14, "Msg": "invalid cmd"}))
            })
    }

    fn decode_error() -> String {
        json!({"STATUS": "E", "Code": 137, "Msg": "decode error"}).to_string()
    }

    fn exchange_encrypted(&self, request: &Value) -> String {
        let Ok(keys) = SessionKeys::derive(&self.password, &FakeDevice::grant()) else {
            return Self::decode_error();
        };
        let sealed = request["data"].as_str().unwrap_or_default();

        let Ok(plaintext) = keys.cipher.decrypt(sealed) else {
            return Self::decode_error();
        };
        let Ok(inner) = serde_json::from_str::<Value>(&plaintext) else {
            return Self::decode_error();
        };
        if inner["token"].as_str() != Some(keys.token.as_str()) {
            return json!({"STATUS": "E", "Code": 135, "Msg": "token error"}).to_string();
        }

        match self.dispatch(&inner) {
            Reply::Json(reply) => json!({"enc": keys.cipher.encrypt(&reply.to_string())}).to_string(),
            Reply::Raw(body) => body,
        }
    }
}

#[async_trait]
impl Transport for DeviceState {
    async fn exchange(&self, payload: &str) -> Result<String> {
        let request: Value = serde_json::from_str(payload)
            .map_err(|e| WhatsminerError::InvalidResponse(format!("fake device got {payload}: {e}")))?;

        if request.get("enc").is_some() {
            return Ok(self.exchange_encrypted(&request));
        }
        if request["cmd"] == "get_token" {
            self.token_requests.fetch_add(1, Ordering::SeqCst);
            let grant = FakeDevice::grant();
            return Ok(json!({"STATUS": "S", "Msg": {
                "time": grant.time, "salt": grant.salt, "newsalt": grant.newsalt
            }})
            .to_string());
        }

        Ok(match self.dispatch(&request) {
            Reply::Json(reply) => reply.to_string(),
            Reply::Raw(body) => body,
        })
    }
}

struct Script {
    api_version: String,
    online: bool,
    model: String,
    failures: HashMap<&'static str, WhatsminerError>,
    delays: HashMap<&'static str, Duration>,
    calls: Vec<&'static str>,
}

/// Client whose answers are set by the test.
///
/// Every operation is named after its trait method. Clones share the same
/// script and call log.
#[derive(Clone)]
pub struct FakeApi {
    script: Arc<Mutex<Script>>,
    dialect: Dialect,
}

impl FakeApi {
    pub const MAC: &'static str = "C4:11:22:33:44:55";
    pub const PSU_MODEL: &'static str = "P21-GB-12-3300";

    /// An online device reporting `api_version`.
    pub fn with_version(api_version: &str) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                api_version: api_version.to_string(),
                online: true,
                model: "M30S".into(),
                failures: HashMap::new(),
                delays: HashMap::new(),
                calls: Vec::new(),
            })),
            dialect: Dialect::V1,
        }
    }

    fn as_dialect(&self, dialect: Dialect) -> Self {
        Self {
            script: self.script.clone(),
            dialect,
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn set_version(&self, api_version: &str) {
        self.script().api_version = api_version.to_string();
    }

    pub fn set_online(&self, online: bool) {
        self.script().online = online;
    }

    pub fn set_model(&self, model: &str) {
        self.script().model = model.to_string();
    }

    pub fn fail(&self, op: &'static str, err: WhatsminerError) {
        self.script().failures.insert(op, err);
    }

    pub fn clear_failure(&self, op: &'static str) {
        self.script().failures.remove(op);
    }

    pub fn delay(&self, op: &'static str, delay: Duration) {
        self.script().delays.insert(op, delay);
    }

    pub fn clear_delay(&self, op: &'static str) {
        self.script().delays.remove(op);
    }

    pub fn count(&self, op: &str) -> usize {
        self.script().calls.iter().filter(|c| **c == op).count()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.script().calls.clone()
    }

    async fn enter(&self, op: &'static str) -> Result<()> {
        let (delay, failure) = {
            let mut script = self.script();
            script.calls.push(op);
            (script.delays.get(op).copied(), script.failures.get(op).cloned())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl MinerApi for FakeApi {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn get_version(&self) -> Result<Version> {
        self.enter("get_version").await?;
        Ok(Version {
            api_version: self.script().api_version.clone(),
            firmware_version: "20220105.22.REL".into(),
        })
    }

    async fn get_status(&self) -> Result<MinerStatus> {
        self.enter("get_status").await?;
        Ok(MinerStatus {
            miner_online: self.script().online,
            firmware_version: "20220105.22.REL".into(),
        })
    }

    async fn get_summary(&self) -> Result<Summary> {
        self.enter("get_summary").await?;
        Ok(Summary {
            average_hash_rate: 86_012.0,
            power_rate: 39.0,
            mac: Self::MAC.into(),
            ..Default::default()
        })
    }

    async fn get_device_details(&self) -> Result<Vec<DeviceDetails>> {
        self.enter("get_device_details").await?;
        Ok(vec![DeviceDetails {
            name: "SM".into(),
            driver: "bitmicro".into(),
            model: self.script().model.clone(),
            ..Default::default()
        }])
    }

    async fn get_psu(&self) -> Result<PowerUnitDetails> {
        self.enter("get_psu").await?;
        Ok(PowerUnitDetails {
            name: "P21".into(),
            model: Self::PSU_MODEL.into(),
            ..Default::default()
        })
    }

    async fn power_on_miner(&self) -> Result<()> {
        self.enter("power_on_miner").await
    }

    async fn power_off_miner(&self) -> Result<()> {
        self.enter("power_off_miner").await
    }

    async fn restart_miner(&self) -> Result<()> {
        self.enter("restart_miner").await
    }

    async fn reload_config(&self) -> Result<()> {
        self.enter("reload_config").await
    }

    async fn reboot(&self) -> Result<()> {
        self.enter("reboot").await
    }

    async fn set_power_mode(&self) -> Result<()> {
        self.enter("set_power_mode").await
    }

    async fn set_target_frequency(&self, _percent: i32) -> Result<()> {
        self.enter("set_target_frequency").await
    }

    async fn set_power_percent(&self, _percent: u8) -> Result<()> {
        self.enter("set_power_percent").await
    }

    async fn set_fast_boot(&self, _enable: bool) -> Result<()> {
        self.enter("set_fast_boot").await
    }
}

/// Factory handing out views of one [`FakeApi`], recording each dialect
/// requested.
pub struct FakeFactory {
    api: FakeApi,
    created: Mutex<Vec<Dialect>>,
}

impl FakeFactory {
    pub fn new(api: FakeApi) -> Self {
        Self {
            api,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<Dialect> {
        self.created.lock().unwrap().clone()
    }
}

impl ClientFactory for FakeFactory {
    fn create(&self, dialect: Dialect) -> Arc<dyn MinerApi> {
        self.created.lock().unwrap().push(dialect);
        Arc::new(self.api.as_dialect(dialect))
    }
}

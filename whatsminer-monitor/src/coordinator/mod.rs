//! Periodic polling of one device.
//!
//! Each cycle detects the dialect (first cycle only), reads the mining
//! status, fills the identity cache, and, if the miner is running, fetches
//! telemetry. The outcome of every cycle is either a [`MinerData`] snapshot
//! or a classified [`UpdateError`]:
//!
//! ```text
//!   Uninitialized -> Detecting -> Polling -+-> Online
//!                                 ^        +-> Offline
//!                                 |        +-> Failed
//!                                 +--- next tick ---+
//! ```
//!
//! A device that is reachable but not mining is not an error; it yields
//! [`MinerData::Base`]. Credential failures stop the run loop, everything
//! else is retried on the next tick.

mod cache;
mod snapshot;

pub use cache::IdentityCache;
pub use snapshot::{MinerData, UNKNOWN_MODEL};

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{ConnectionDescriptor, CoordinatorConfig};
use crate::detect::{ClientSlot, Detected};
use crate::error::{Result, WhatsminerError};
use crate::tracing::prelude::*;

/// Why a cycle produced no snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Stored credentials stopped working. Polling must not continue with
    /// them.
    #[error("authentication failed: {0}")]
    AuthFailed(#[source] WhatsminerError),

    /// Transient or device-side failure; the next cycle retries.
    #[error("update failed: {0}")]
    UpdateFailed(#[source] WhatsminerError),
}

impl UpdateError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailed(_))
    }

    pub fn cause(&self) -> &WhatsminerError {
        match self {
            Self::AuthFailed(e) | Self::UpdateFailed(e) => e,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    #[default]
    Uninitialized,
    Detecting,
    Polling,
    Online,
    Offline,
    Failed,
}

/// What the run loop publishes after every cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollState {
    /// Most recent snapshot. Kept across failed cycles.
    pub data: Option<MinerData>,
    /// Error of the most recent cycle, cleared by the next success.
    pub last_error: Option<UpdateError>,
    pub phase: Phase,
    pub cycles: u64,
    pub failures: u64,
}

impl PollState {
    fn record(&mut self, outcome: &std::result::Result<MinerData, UpdateError>, phase: Phase) {
        self.cycles += 1;
        self.phase = phase;
        match outcome {
            Ok(data) => {
                self.data = Some(data.clone());
                self.last_error = None;
            }
            Err(e) => {
                self.failures += 1;
                self.last_error = Some(e.clone());
            }
        }
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    slot: ClientSlot,
    cache: IdentityCache,
    phase: Phase,
}

impl Coordinator {
    pub fn new(descriptor: &ConnectionDescriptor, config: CoordinatorConfig) -> Self {
        Self::with_slot(
            ClientSlot::for_descriptor(descriptor, config.call_timeout),
            config,
        )
    }

    pub fn with_slot(slot: ClientSlot, config: CoordinatorConfig) -> Self {
        Self {
            config,
            slot,
            cache: IdentityCache::default(),
            phase: Phase::Uninitialized,
        }
    }

    /// Client slot, for sharing with control handles.
    pub fn slot(&self) -> &ClientSlot {
        &self.slot
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn identity(&self) -> &IdentityCache {
        &self.cache
    }

    /// Drop the detected client so the next cycle detects again.
    pub async fn reset_client(&mut self) {
        self.slot.reset().await;
        self.cache.forget_version();
        self.phase = Phase::Uninitialized;
    }

    /// Run one polling cycle.
    pub async fn refresh(&mut self) -> std::result::Result<MinerData, UpdateError> {
        let outcome = match self.poll().await {
            Ok(data) => Ok(data),
            Err(WhatsminerError::MinerOffline) => Ok(self.base()),
            Err(e) if e.is_auth_failure() => Err(UpdateError::AuthFailed(e)),
            Err(e) => Err(UpdateError::UpdateFailed(e)),
        };

        self.phase = match &outcome {
            Ok(data) if data.is_online() => Phase::Online,
            Ok(_) => Phase::Offline,
            Err(_) => Phase::Failed,
        };

        match &outcome {
            Ok(data) => debug!(
                online = data.is_online(),
                model = data.model_or_unknown(),
                "Poll complete"
            ),
            Err(UpdateError::AuthFailed(e)) => error!(error = %e, "Authentication failed"),
            Err(UpdateError::UpdateFailed(e)) => warn!(error = %e, "Update failed"),
        }
        outcome
    }

    /// Poll every `update_interval` until cancelled or credentials fail.
    ///
    /// Each cycle's outcome is published on `state`. Returns the auth
    /// failure that stopped the loop, if any.
    pub async fn run(
        mut self,
        shutdown: CancellationToken,
        state: watch::Sender<PollState>,
    ) -> std::result::Result<(), UpdateError> {
        let mut interval = time::interval(self.config.update_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.refresh() => outcome,
            };

            let phase = self.phase;
            state.send_modify(|s| s.record(&outcome, phase));

            if let Err(e) = outcome {
                if e.is_auth_failure() {
                    error!(error = %e, "Stopping poller until credentials are fixed");
                    return Err(e);
                }
            }
        }

        debug!("Poller stopped");
        Ok(())
    }

    fn base(&self) -> MinerData {
        MinerData::Base {
            device_model: self.cache.model().map(str::to_string),
        }
    }

    async fn poll(&mut self) -> Result<MinerData> {
        let limit = self.config.call_timeout;

        if self.cache.version().is_none() {
            self.phase = Phase::Detecting;
        }
        let Detected { api, version } = bounded(limit, "detection", self.slot.acquire()).await?;
        self.cache.set_version(&version);
        self.phase = Phase::Polling;

        let status = bounded(limit, "get_status", api.get_status()).await?;

        if !self.cache.has_model() {
            let details = bounded(limit, "get_device_details", api.get_device_details()).await?;
            if let Some(first) = details.first() {
                debug!(model = %first.model, "Cached device model");
                self.cache.remember_model(first.model.clone());
            }
        }

        if !status.miner_online {
            return Ok(self.base());
        }

        let summary = bounded(limit, "get_summary", api.get_summary()).await?;
        let power_unit = bounded(limit, "get_psu", api.get_psu()).await?;

        Ok(MinerData::Online {
            device_model: self.cache.model().unwrap_or(UNKNOWN_MODEL).to_string(),
            summary,
            power_unit,
            version,
        })
    }
}

async fn bounded<T>(
    limit: Duration,
    call: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    time::timeout(limit, fut).await.map_err(|_| {
        WhatsminerError::Connectivity(format!("{call} timed out after {limit:?}"))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApi, FakeFactory};
    use std::sync::Arc;

    fn coordinator(api: &FakeApi) -> Coordinator {
        let slot = ClientSlot::new(Arc::new(FakeFactory::new(api.clone())));
        Coordinator::with_slot(slot, CoordinatorConfig::default())
    }

    #[tokio::test]
    async fn offline_v1_device_yields_base_with_unknown_model() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        api.set_online(false);
        api.fail("get_device_details", WhatsminerError::MinerOffline);
        let mut coordinator = coordinator(&api);

        let data = coordinator.refresh().await.unwrap();

        assert_eq!(data, MinerData::Base { device_model: None });
        assert_eq!(data.model_or_unknown(), "unknown");
        assert_eq!(coordinator.phase(), Phase::Offline);
        assert_eq!(api.count("get_summary"), 0);
        assert_eq!(api.count("get_psu"), 0);

        // Repeated offline cycles give the same answer.
        assert_eq!(coordinator.refresh().await.unwrap(), data);
    }

    #[tokio::test(start_paused = true)]
    async fn summary_timeout_fails_cycle_but_keeps_model() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        api.set_model("M30S");
        api.delay("get_summary", Duration::from_secs(11));
        let mut coordinator = coordinator(&api);

        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            UpdateError::UpdateFailed(WhatsminerError::Connectivity(_))
        ));
        assert_eq!(coordinator.phase(), Phase::Failed);
        assert_eq!(coordinator.identity().model(), Some("M30S"));

        api.clear_delay("get_summary");
        let data = coordinator.refresh().await.unwrap();
        assert_eq!(data.device_model(), Some("M30S"));
        assert_eq!(api.count("get_device_details"), 1);
    }

    #[tokio::test]
    async fn v2_device_full_cycle_is_online() {
        let api = FakeApi::with_version("2.0.3");
        api.set_model("M50S");
        let mut coordinator = coordinator(&api);

        let data = coordinator.refresh().await.unwrap();

        let MinerData::Online {
            device_model,
            summary,
            power_unit,
            version,
        } = data
        else {
            panic!("expected online snapshot");
        };
        assert_eq!(device_model, "M50S");
        assert_eq!(summary.mac, FakeApi::MAC);
        assert_eq!(power_unit.model, FakeApi::PSU_MODEL);
        assert_eq!(version.api_version, "2.0.3");
        assert_eq!(coordinator.phase(), Phase::Online);
    }

    #[tokio::test]
    async fn unsupported_version_fails_cycle() {
        let api = FakeApi::with_version("9.9.9");
        let mut coordinator = coordinator(&api);

        assert_eq!(
            coordinator.refresh().await,
            Err(UpdateError::UpdateFailed(WhatsminerError::UnsupportedVersion(
                "9.9.9".into()
            )))
        );
        assert!(coordinator.identity().version().is_none());
    }

    #[tokio::test]
    async fn psu_failure_means_no_online_snapshot() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        api.fail("get_psu", WhatsminerError::CommandError("psu".into()));
        let mut coordinator = coordinator(&api);

        assert!(matches!(
            coordinator.refresh().await,
            Err(UpdateError::UpdateFailed(WhatsminerError::CommandError(_)))
        ));
        assert_eq!(api.count("get_summary"), 1);
    }

    #[tokio::test]
    async fn credential_errors_are_auth_failures() {
        for err in [
            WhatsminerError::DecodeError("summary".into()),
            WhatsminerError::TokenExceeded,
            WhatsminerError::TokenError,
        ] {
            let api = FakeApi::with_version("2.0.3");
            api.fail("get_summary", err.clone());
            let mut coordinator = coordinator(&api);

            assert_eq!(coordinator.refresh().await, Err(UpdateError::AuthFailed(err)));
        }
    }

    #[tokio::test]
    async fn miner_offline_mid_cycle_becomes_base_with_cached_model() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        api.set_model("M30S");
        let mut coordinator = coordinator(&api);
        assert!(coordinator.refresh().await.unwrap().is_online());

        api.fail("get_summary", WhatsminerError::MinerOffline);
        assert_eq!(
            coordinator.refresh().await.unwrap(),
            MinerData::Base {
                device_model: Some("M30S".into())
            }
        );
    }

    #[tokio::test]
    async fn model_survives_failed_and_offline_cycles() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        api.set_model("M30S");
        let mut coordinator = coordinator(&api);
        coordinator.refresh().await.unwrap();

        api.fail("get_status", WhatsminerError::Connectivity("reset".into()));
        assert!(coordinator.refresh().await.is_err());

        api.clear_failure("get_status");
        api.set_online(false);
        let data = coordinator.refresh().await.unwrap();

        assert_eq!(data.device_model(), Some("M30S"));
        assert_eq!(api.count("get_device_details"), 1);
    }

    #[tokio::test]
    async fn detection_runs_once() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        let mut coordinator = coordinator(&api);

        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();

        assert_eq!(api.count("get_version"), 1);
    }

    #[tokio::test]
    async fn reset_client_detects_again() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        let mut coordinator = coordinator(&api);
        coordinator.refresh().await.unwrap();

        coordinator.reset_client().await;
        assert_eq!(coordinator.phase(), Phase::Uninitialized);
        api.set_version("2.0.5");
        let data = coordinator.refresh().await.unwrap();

        let MinerData::Online { version, .. } = data else {
            panic!("expected online snapshot");
        };
        assert_eq!(version.api_version, "2.0.5");
        assert_eq!(api.count("get_version"), 2);
    }

    #[tokio::test]
    async fn slot_reset_refreshes_cached_version() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        let mut coordinator = coordinator(&api);
        coordinator.refresh().await.unwrap();

        // A control handle sharing the slot may reset it on its own.
        coordinator.slot().clone().reset().await;
        api.set_version("2.0.5");
        let data = coordinator.refresh().await.unwrap();

        let MinerData::Online { version, .. } = data else {
            panic!("expected online snapshot");
        };
        assert_eq!(version.api_version, "2.0.5");
        assert_eq!(
            coordinator.identity().version().unwrap().api_version,
            "2.0.5"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_publishes_each_cycle_until_cancelled() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        let (tx, mut rx) = watch::channel(PollState::default());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(coordinator(&api).run(shutdown.clone(), tx));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().cycles, 1);
        assert_eq!(rx.borrow().phase, Phase::Online);

        api.fail("get_status", WhatsminerError::Connectivity("refused".into()));
        rx.changed().await.unwrap();
        {
            let state = rx.borrow();
            assert_eq!(state.cycles, 2);
            assert_eq!(state.failures, 1);
            assert!(state.data.as_ref().is_some_and(MinerData::is_online));
            assert!(matches!(state.last_error, Some(UpdateError::UpdateFailed(_))));
        }

        shutdown.cancel();
        assert_eq!(task.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_auth_failure() {
        let api = FakeApi::with_version("whatsminer v1.4.0");
        api.fail("get_status", WhatsminerError::TokenExceeded);
        let (tx, rx) = watch::channel(PollState::default());

        let result = coordinator(&api).run(CancellationToken::new(), tx).await;

        assert_eq!(
            result,
            Err(UpdateError::AuthFailed(WhatsminerError::TokenExceeded))
        );
        assert_eq!(rx.borrow().cycles, 1);
        assert_eq!(api.count("get_status"), 1);
    }
}

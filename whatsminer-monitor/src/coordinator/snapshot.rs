use serde::Serialize;

use crate::api::{PowerUnitDetails, Summary, Version};

/// Shown when the model has not been fetched yet.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Result of one polling cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MinerData {
    /// Device is reachable but not mining. Carries only what is already
    /// known about the device.
    Base { device_model: Option<String> },

    /// Full telemetry from a cycle in which every fetch succeeded.
    Online {
        device_model: String,
        summary: Summary,
        power_unit: PowerUnitDetails,
        version: Version,
    },
}

impl MinerData {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }

    pub fn device_model(&self) -> Option<&str> {
        match self {
            Self::Base { device_model } => device_model.as_deref(),
            Self::Online { device_model, .. } => Some(device_model),
        }
    }

    pub fn model_or_unknown(&self) -> &str {
        self.device_model().unwrap_or(UNKNOWN_MODEL)
    }

    pub fn summary(&self) -> Option<&Summary> {
        match self {
            Self::Online { summary, .. } => Some(summary),
            Self::Base { .. } => None,
        }
    }

    pub fn power_unit(&self) -> Option<&PowerUnitDetails> {
        match self {
            Self::Online { power_unit, .. } => Some(power_unit),
            Self::Base { .. } => None,
        }
    }
}

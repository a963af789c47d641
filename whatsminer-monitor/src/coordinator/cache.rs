use crate::api::Version;

/// Facts about the device that do not change between cycles.
///
/// The version mirrors whatever client the slot currently holds. The model
/// is filled once and never forgotten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityCache {
    version: Option<Version>,
    model: Option<String>,
}

impl IdentityCache {
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Record the version of the client in use.
    pub fn set_version(&mut self, version: &Version) {
        self.version = Some(version.clone());
    }

    pub fn remember_model(&mut self, model: impl Into<String>) {
        if self.model.is_none() {
            self.model = Some(model.into());
        }
    }

    pub(super) fn forget_version(&mut self) {
        self.version = None;
    }
}

use serde::Serialize;
use strum::Display;

use super::error::LifecycleError;

/// Where a bag directory sits in its custody lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BagState {
    Unpackaged,
    Packaged,
    Registered,
    Validated,
    Replicated,
    Failed,
}

impl BagState {
    /// The state a directory is in before any operation runs, read from its
    /// on-disk structure and catalog tag.
    #[must_use]
    pub fn observe(is_package: bool, registered: bool) -> Self {
        match (is_package, registered) {
            (false, _) => Self::Unpackaged,
            (true, false) => Self::Packaged,
            (true, true) => Self::Registered,
        }
    }

    #[must_use]
    pub fn allows(self, next: BagState) -> bool {
        use BagState::{Failed, Packaged, Registered, Replicated, Unpackaged, Validated};
        match (self, next) {
            (_, Failed)
            | (Unpackaged | Packaged | Registered | Validated, Packaged)
            | (Packaged, Registered)
            | (Packaged | Registered, Validated)
            | (Validated, Replicated) => true,
            _ => false,
        }
    }

    pub fn advance(self, next: BagState) -> Result<BagState, LifecycleError> {
        if self.allows(next) {
            Ok(next)
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

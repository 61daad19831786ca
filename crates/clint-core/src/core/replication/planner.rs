use std::path::Path;

use serde::Serialize;
use tracing::info;

use super::probe::{local_size, ProbeError, RemoteProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientSpace { required: u64 },
    /// The destination is not writable and elevation is disabled.
    PermissionDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyPlan {
    Skip(SkipReason),
    DirectCopy,
    ElevatedCopy,
}

impl CopyPlan {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip(_) => "skip",
            Self::DirectCopy => "direct",
            Self::ElevatedCopy => "elevated",
        }
    }

    #[must_use]
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::ElevatedCopy)
    }
}

pub struct ReplicationPlanner<'a> {
    probe: RemoteProbe<'a>,
    allow_elevation: bool,
}

impl<'a> ReplicationPlanner<'a> {
    pub fn new(probe: RemoteProbe<'a>, allow_elevation: bool) -> Self {
        Self {
            probe,
            allow_elevation,
        }
    }

    #[must_use]
    pub fn probe(&self) -> &RemoteProbe<'a> {
        &self.probe
    }

    /// Space is checked before permissions, so a full volume is reported as
    /// such even when the destination is also read-only.
    pub fn plan_copy(
        &self,
        local_bag: &Path,
        destination: &str,
        volume: &str,
    ) -> Result<CopyPlan, ProbeError> {
        let required = local_size(local_bag)?;
        let plan = if !self.probe.space_available(required, volume)? {
            CopyPlan::Skip(SkipReason::InsufficientSpace { required })
        } else if self.probe.is_writable(destination)? {
            CopyPlan::DirectCopy
        } else if self.allow_elevation {
            CopyPlan::ElevatedCopy
        } else {
            CopyPlan::Skip(SkipReason::PermissionDenied)
        };
        info!(
            bag = %local_bag.display(),
            host = %self.probe.host().label(),
            destination,
            volume,
            required,
            plan = plan.as_str(),
            "planned copy"
        );
        Ok(plan)
    }
}

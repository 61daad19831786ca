use std::path::PathBuf;

use clint_domain::EntityError;
use serde::Serialize;
use serde_json::{json, Map, Value};
use strum::Display;
use thiserror::Error;

use super::state::BagState;
use crate::core::bagit::PackagingError;
use crate::core::replication::ProbeError;

/// Whether registration created the Item or attached to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemOrigin {
    Created,
    Reused,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Packaging(#[from] PackagingError),
    #[error("{} is already a bag", path.display())]
    AlreadyPackaged {
        path: PathBuf,
        bag_id: Option<String>,
    },
    #[error("{} is not a bag", path.display())]
    NotPackaged { path: PathBuf },
    #[error("{} has no catalog bag id", path.display())]
    NotRegistered { path: PathBuf },
    #[error("{} is already registered as bag {bag_id}", path.display())]
    AlreadyRegistered { path: PathBuf, bag_id: String },
    #[error("{} failed validation ({} problems)", path.display(), problems.len())]
    InvalidPackage {
        path: PathBuf,
        bag_id: Option<String>,
        problems: Vec<String>,
    },
    #[error("not enough space on {volume} for {required} bytes")]
    InsufficientSpace { volume: String, required: u64 },
    #[error("{destination} is not writable and elevated copies are disabled")]
    PermissionDenied { destination: String },
    #[error("registration stopped at '{step}'; item {item_id} was {item_origin}")]
    PartialRegistration {
        step: &'static str,
        item_id: String,
        item_origin: ItemOrigin,
        bag_id: Option<String>,
        #[source]
        source: anyhow::Error,
    },
    #[error("bag {bag_id} was not fully updated: '{step}' failed")]
    PartialUpdate {
        bag_id: String,
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("{step}: {source}")]
    Catalog {
        step: &'static str,
        #[source]
        source: EntityError,
    },
    #[error("copy to {destination} failed")]
    Transfer {
        destination: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("a {from} bag cannot become {to}")]
    InvalidTransition { from: BagState, to: BagState },
}

impl LifecycleError {
    /// The state the bag is left in.
    #[must_use]
    pub fn state(&self) -> BagState {
        match self {
            Self::AlreadyPackaged { bag_id: None, .. } | Self::NotRegistered { .. } => {
                BagState::Packaged
            }
            Self::AlreadyPackaged {
                bag_id: Some(_), ..
            }
            | Self::AlreadyRegistered { .. } => BagState::Registered,
            Self::NotPackaged { .. } => BagState::Unpackaged,
            Self::InvalidTransition { from, .. } => *from,
            _ => BagState::Failed,
        }
    }

    /// Whether the operator can resolve this without anything on the
    /// catalog or network side changing.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::Packaging(err) => !matches!(err, PackagingError::Io { .. }),
            Self::Catalog { source, .. } => source.is_caller_error(),
            Self::PartialRegistration { .. }
            | Self::PartialUpdate { .. }
            | Self::Transfer { .. }
            | Self::Probe(_) => false,
            _ => true,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Packaging(PackagingError::NotADirectory { .. }) => "not_a_directory",
            Self::Packaging(PackagingError::Malformed { .. }) => "malformed_bag",
            Self::Packaging(_) => "packaging_failed",
            Self::AlreadyPackaged { .. } => "already_packaged",
            Self::NotPackaged { .. } => "not_packaged",
            Self::NotRegistered { .. } => "not_registered",
            Self::AlreadyRegistered { .. } => "already_registered",
            Self::InvalidPackage { .. } => "invalid_bag",
            Self::InsufficientSpace { .. } => "insufficient_space",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::PartialRegistration { .. } => "partial_registration",
            Self::PartialUpdate { .. } => "partial_update",
            Self::Catalog { source, .. } => source.reason(),
            Self::Transfer { .. } => "transfer_failed",
            Self::Probe(_) => "probe_failed",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// Machine-readable details: `reason`, `state`, every identity involved,
    /// and a `hint` when there is an obvious next step.
    #[must_use]
    pub fn details(&self) -> Value {
        let mut map = Map::new();
        map.insert("reason".into(), json!(self.reason()));
        map.insert("state".into(), json!(self.state()));
        let mut put = |key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };
        match self {
            Self::Packaging(err) => {
                if let PackagingError::Malformed { reason, .. } = err {
                    put("error", json!(reason));
                }
            }
            Self::AlreadyPackaged { path, bag_id } => {
                put("path", json!(path));
                put("bag_id", json!(bag_id));
                put(
                    "hint",
                    json!(match bag_id {
                        Some(_) => "Use `clint rebag` to refresh a registered bag.",
                        None => "Re-run with --force to re-package the directory.",
                    }),
                );
            }
            Self::NotPackaged { path } => {
                put("path", json!(path));
                put("hint", json!("Run `clint bag <dir>` first."));
            }
            Self::NotRegistered { path } => {
                put("path", json!(path));
                put(
                    "hint",
                    json!("Register the bag with `clint bag` before this step."),
                );
            }
            Self::AlreadyRegistered { path, bag_id } => {
                put("path", json!(path));
                put("bag_id", json!(bag_id));
                put("hint", json!("Use `clint rebag` to refresh a registered bag."));
            }
            Self::InvalidPackage {
                path,
                bag_id,
                problems,
            } => {
                put("path", json!(path));
                put("bag_id", json!(bag_id));
                put("problems", json!(problems));
                put(
                    "hint",
                    json!("Restore the listed files, or run `clint rebag` if the changes are intended."),
                );
            }
            Self::InsufficientSpace { volume, required } => {
                put("volume", json!(volume));
                put("required", json!(required));
                put(
                    "hint",
                    json!("Free space on the volume or choose another destination."),
                );
            }
            Self::PermissionDenied { destination } => {
                put("destination", json!(destination));
                put(
                    "hint",
                    json!("Pick a writable destination or set [replication].allow_elevation."),
                );
            }
            Self::PartialRegistration {
                step,
                item_id,
                item_origin,
                bag_id,
                ..
            } => {
                put("step", json!(step));
                put("item_id", json!(item_id));
                put("item_origin", json!(item_origin));
                put("bag_id", json!(bag_id));
                let hint = match item_origin {
                    ItemOrigin::Created => format!(
                        "Item {item_id} is already in the catalog; pass --item {item_id} when retrying."
                    ),
                    ItemOrigin::Reused => format!("Retry with --item {item_id}."),
                };
                put("hint", json!(hint));
            }
            Self::PartialUpdate { bag_id, step, .. } => {
                put("bag_id", json!(bag_id));
                put("step", json!(step));
                let hint = if *step == "package" {
                    "The bag directory was left as it was; re-run `clint rebag` once the error is fixed."
                } else {
                    "The files changed but the catalog record did not; check the bag in the catalog."
                };
                put("hint", json!(hint));
            }
            Self::Catalog { step, source } => {
                put("step", json!(step));
                if let Some(status) = source.status() {
                    put("status", json!(status));
                }
            }
            Self::Transfer { destination, .. } => {
                put("destination", json!(destination));
            }
            Self::Probe(_) => {}
            Self::InvalidTransition { from, to } => {
                put("from", json!(from));
                put("to", json!(to));
            }
        }
        let issues: Vec<String> = std::iter::successors(
            std::error::Error::source(self),
            |err| err.source(),
        )
        .map(ToString::to_string)
        .collect();
        if !issues.is_empty() {
            map.insert("issues".into(), json!(issues));
        }
        Value::Object(map)
    }
}

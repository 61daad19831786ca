//! The custody lifecycle of one bag directory.
//!
//! Each transition is a method on [`BagController`] that takes the result of
//! the previous one (or reads the directory fresh via [`BagController::open`])
//! and returns a typed result naming every identity it produced. Nothing is
//! carried between transitions implicitly.

mod error;
mod state;
#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use clint_domain::{Bag, BagAction, EntityError, EntityKind, Item, Record, SharedCatalog};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

pub use error::{ItemOrigin, LifecycleError};
pub use state::BagState;

use crate::core::bagit::{
    find_tag, Manifest, PackageParams, Packager, PackagingError, StagedBag, Tags, BAG_ID_TAG,
    ITEM_ID_TAG,
};
use crate::core::config::{BaggingConfig, ReplicationConfig};
use crate::core::replication::{CopyPlan, RemoteProbe, ReplicationPlanner, SkipReason};
use crate::core::runtime::{HostContext, RemoteShell};

const DEFAULT_BAG_TYPE: &str = "preservation";
const CONTACT_NAME: &str = "Contact-Name";

/// A bag directory as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BagHandle {
    pub path: PathBuf,
    pub state: BagState,
    pub bag_id: Option<String>,
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackagedBag {
    pub path: PathBuf,
    pub manifest: Manifest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredBag {
    pub path: PathBuf,
    pub bagname: String,
    pub item_id: String,
    pub bag_id: String,
    pub action_id: Option<String>,
}

/// A bag whose payload matched its manifest. `bag_id` is `None` when the
/// directory has never been registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedBag {
    pub path: PathBuf,
    pub bag_id: Option<String>,
    pub action_id: Option<String>,
}

impl ValidatedBag {
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.bag_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicatedBag {
    pub bag_id: String,
    pub host: HostContext,
    pub destination: String,
    pub plan: CopyPlan,
    pub action_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepackagedBag {
    pub bag_id: String,
    pub manifest: Manifest,
    pub action_id: Option<String>,
}

/// Catalog fields for a new registration. Anything unset falls back to the
/// bag directory name or configured defaults.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub bagname: Option<String>,
    pub bag_type: Option<String>,
    /// Attach the bag to this existing item instead of creating one.
    pub item: Option<String>,
    pub title: Option<String>,
    pub local_id: Option<String>,
    pub collection: Option<String>,
    pub project: Option<String>,
    pub item_type: Option<String>,
    pub machine: Option<String>,
    /// Path recorded in the catalog when it differs from the local one.
    pub access_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CopyTarget {
    pub host: HostContext,
    pub destination: String,
    pub volume: String,
    /// Machine record hosting the replica.
    pub machine: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ControllerSettings {
    pub replication: ReplicationConfig,
    pub bagging: BaggingConfig,
}

pub struct BagController<'a> {
    catalog: SharedCatalog,
    packager: &'a dyn Packager,
    shell: &'a dyn RemoteShell,
    settings: ControllerSettings,
}

impl<'a> BagController<'a> {
    pub fn new(
        catalog: SharedCatalog,
        packager: &'a dyn Packager,
        shell: &'a dyn RemoteShell,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            catalog,
            packager,
            shell,
            settings,
        }
    }

    /// Reads a directory's state and catalog tags without changing anything.
    pub fn open(&self, path: &Path) -> Result<BagHandle, LifecycleError> {
        if !path.is_dir() {
            return Err(LifecycleError::Packaging(PackagingError::NotADirectory {
                path: path.to_path_buf(),
            }));
        }
        let is_package = self.packager.is_package(path);
        let tags = if is_package {
            self.packager.read_tags(path)?
        } else {
            Tags::new()
        };
        let bag_id = find_tag(&tags, BAG_ID_TAG).map(str::to_string);
        let item_id = find_tag(&tags, ITEM_ID_TAG).map(str::to_string);
        Ok(BagHandle {
            path: path.to_path_buf(),
            state: BagState::observe(is_package, bag_id.is_some()),
            bag_id,
            item_id,
        })
    }

    /// Packages `path`. An existing bag is only re-packaged with `force`, and
    /// a registered one never is: that is [`BagController::repackage`].
    pub fn package(&self, path: &Path, force: bool) -> Result<PackagedBag, LifecycleError> {
        let handle = self.open(path)?;
        if let Some(bag_id) = &handle.bag_id {
            if force {
                return Err(LifecycleError::AlreadyRegistered {
                    path: handle.path,
                    bag_id: bag_id.clone(),
                });
            }
        }
        if handle.state != BagState::Unpackaged && !force {
            return Err(LifecycleError::AlreadyPackaged {
                path: handle.path,
                bag_id: handle.bag_id,
            });
        }
        let next = handle.state.advance(BagState::Packaged)?;

        let mut tags = Tags::new();
        if let Some(contact) = &self.settings.bagging.contact {
            tags.insert(CONTACT_NAME.to_string(), contact.clone());
        }
        let manifest = self
            .packager
            .make_package(path, &PackageParams { tags, force })?;
        info!(
            path = %path.display(),
            from = %handle.state,
            to = %next,
            files = manifest.entries.len(),
            "bag transition"
        );
        Ok(PackagedBag {
            path: path.to_path_buf(),
            manifest,
        })
    }

    /// Creates (or reuses) the Item, creates the Bag, tags the directory with
    /// both identities and records an `added` action.
    ///
    /// Once the Item is saved every later failure is a
    /// [`LifecycleError::PartialRegistration`] naming the step that failed.
    pub fn register(
        &self,
        packaged: &PackagedBag,
        registration: &Registration,
    ) -> Result<RegisteredBag, LifecycleError> {
        let path = packaged.path.as_path();
        let existing = self.packager.read_tags(path)?;
        if let Some(bag_id) = find_tag(&existing, BAG_ID_TAG) {
            return Err(LifecycleError::AlreadyRegistered {
                path: path.to_path_buf(),
                bag_id: bag_id.to_string(),
            });
        }
        let next = BagState::Packaged.advance(BagState::Registered)?;
        let bagname = registration
            .bagname
            .clone()
            .unwrap_or_else(|| directory_name(path));
        let catalog_error = |step| move |source| LifecycleError::Catalog { step, source };

        // Everything that can be rejected locally is checked before the
        // first catalog write.
        let mut bag = self
            .bag_draft(packaged, registration, &bagname)
            .map_err(catalog_error("prepare bag"))?;
        let mut item = self
            .item_draft(registration, &bagname)
            .map_err(catalog_error("prepare item"))?;
        let item_origin = if registration.item.is_some() {
            ItemOrigin::Reused
        } else {
            ItemOrigin::Created
        };
        if item.is_modified() {
            item.save().map_err(catalog_error("save item"))?;
        }
        let item_id = item
            .id()
            .map(str::to_string)
            .ok_or(LifecycleError::Catalog {
                step: "save item",
                source: EntityError::MissingLocation {
                    kind: EntityKind::Item,
                },
            })?;

        let partial = |step: &'static str, bag_id: Option<&str>| {
            let item_id = item_id.clone();
            let bag_id = bag_id.map(str::to_string);
            move |source: anyhow::Error| LifecycleError::PartialRegistration {
                step,
                item_id,
                item_origin,
                bag_id,
                source,
            }
        };

        bag.set_item(&item_id)
            .map_err(|err| partial("create bag", None)(err.into()))?;
        bag.save()
            .map_err(|err| partial("create bag", None)(err.into()))?;
        let bag_id = bag
            .id()
            .map(str::to_string)
            .ok_or_else(|| partial("create bag", None)(anyhow::anyhow!("bag has no id")))?;

        let mut tags = Tags::new();
        tags.insert(BAG_ID_TAG.to_string(), bag_id.clone());
        tags.insert(ITEM_ID_TAG.to_string(), item_id.clone());
        self.packager
            .write_tags(path, &tags)
            .map_err(|err| partial("write tags", Some(&bag_id))(err.into()))?;

        let action = self
            .record(&bag_id, "added", &format!("registered {bagname} from {}", path.display()))
            .map_err(|err| partial("record action", Some(&bag_id))(err.into()))?;

        info!(
            path = %path.display(),
            from = %BagState::Packaged,
            to = %next,
            item = %item_id,
            bag = %bag_id,
            "bag transition"
        );
        Ok(RegisteredBag {
            path: path.to_path_buf(),
            bagname,
            item_id,
            bag_id,
            action_id: action.id().map(str::to_string),
        })
    }

    /// Runs a fixity check. A registered bag gets a `validated` action; an
    /// unregistered one passes without touching the catalog.
    pub fn validate(&self, path: &Path) -> Result<ValidatedBag, LifecycleError> {
        let handle = self.open(path)?;
        if handle.state == BagState::Unpackaged {
            return Err(LifecycleError::NotPackaged { path: handle.path });
        }
        let next = handle.state.advance(BagState::Validated)?;
        let report = self.packager.validate(path)?;
        if !report.is_valid() {
            warn!(
                path = %path.display(),
                bag = handle.bag_id.as_deref().unwrap_or("-"),
                problems = report.problems.len(),
                "bag failed validation"
            );
            return Err(LifecycleError::InvalidPackage {
                path: handle.path,
                bag_id: handle.bag_id,
                problems: report.problems,
            });
        }
        let action_id = match &handle.bag_id {
            Some(bag_id) => {
                let action = self
                    .record(bag_id, "validated", &format!("validated {}", path.display()))
                    .map_err(|source| LifecycleError::Catalog {
                        step: "record action",
                        source,
                    })?;
                action.id().map(str::to_string)
            }
            None => None,
        };
        info!(
            path = %path.display(),
            from = %handle.state,
            to = %next,
            registered = handle.bag_id.is_some(),
            "bag transition"
        );
        Ok(ValidatedBag {
            path: handle.path,
            bag_id: handle.bag_id,
            action_id,
        })
    }

    /// Checks that `path` could be copied to `target` without recording
    /// anything: the bag is registered, the volume has room, and the
    /// destination is writable (or elevation is allowed).
    pub fn preflight(&self, path: &Path, target: &CopyTarget) -> Result<CopyPlan, LifecycleError> {
        let handle = self.open(path)?;
        match handle.state {
            BagState::Unpackaged => Err(LifecycleError::NotPackaged { path: handle.path }),
            _ if handle.bag_id.is_none() => Err(LifecycleError::NotRegistered { path: handle.path }),
            _ => self.plan(path, target),
        }
    }

    /// Plans and performs a copy of a validated bag, then points the Bag
    /// record at the replica. A skipped plan changes nothing anywhere.
    pub fn copy(
        &self,
        validated: &ValidatedBag,
        target: &CopyTarget,
    ) -> Result<ReplicatedBag, LifecycleError> {
        if !validated.is_registered() {
            return Err(LifecycleError::NotRegistered {
                path: validated.path.clone(),
            });
        }
        let plan = self.plan(&validated.path, target)?;
        self.copy_planned(validated, target, plan)
    }

    /// Performs a copy [`BagController::preflight`] already planned.
    pub fn copy_planned(
        &self,
        validated: &ValidatedBag,
        target: &CopyTarget,
        plan: CopyPlan,
    ) -> Result<ReplicatedBag, LifecycleError> {
        let bag_id = validated
            .bag_id
            .clone()
            .ok_or_else(|| LifecycleError::NotRegistered {
                path: validated.path.clone(),
            })?;
        let next = BagState::Validated.advance(BagState::Replicated)?;
        if let CopyPlan::Skip(reason) = plan {
            return Err(skipped(reason, target));
        }

        self.shell
            .copy_path(
                &target.host,
                &validated.path,
                &target.destination,
                plan.is_elevated(),
            )
            .map_err(|source| LifecycleError::Transfer {
                destination: target.destination.clone(),
                source,
            })?;

        let partial = |step: &'static str| {
            let bag_id = bag_id.clone();
            move |source: EntityError| LifecycleError::PartialUpdate {
                bag_id,
                step,
                source: source.into(),
            }
        };
        let mut bag = Record::<Bag>::load(self.catalog.clone(), &bag_id)
            .map_err(partial("load bag"))?;
        bag.set_path(&target.destination)
            .map_err(partial("update bag"))?;
        if let Some(machine) = &target.machine {
            bag.set_machine(machine).map_err(partial("update bag"))?;
        }
        bag.save().map_err(partial("update bag"))?;
        let action = self
            .record(
                &bag_id,
                "copied",
                &format!("copied to {}:{}", target.host.label(), target.destination),
            )
            .map_err(partial("record action"))?;

        info!(
            bag = %bag_id,
            from = %BagState::Validated,
            to = %next,
            host = %target.host.label(),
            destination = %target.destination,
            plan = plan.as_str(),
            "bag transition"
        );
        Ok(ReplicatedBag {
            bag_id,
            host: target.host.clone(),
            destination: target.destination.clone(),
            plan,
            action_id: action.id().map(str::to_string),
        })
    }

    /// Strips and rebuilds a registered bag in place, then updates its
    /// existing Bag record and records an `updated` action.
    pub fn repackage(&self, path: &Path) -> Result<RepackagedBag, LifecycleError> {
        let handle = self.open(path)?;
        if handle.state == BagState::Unpackaged {
            return Err(LifecycleError::NotPackaged { path: handle.path });
        }
        let Some(bag_id) = handle.bag_id.clone() else {
            return Err(LifecycleError::NotRegistered { path: handle.path });
        };
        let next = handle.state.advance(BagState::Packaged)?;

        // Fetch first so an unknown bag fails before the directory changes.
        let mut bag = Record::<Bag>::load(self.catalog.clone(), &bag_id).map_err(|source| {
            LifecycleError::Catalog {
                step: "load bag",
                source,
            }
        })?;
        let partial = |step: &'static str| {
            let bag_id = bag_id.clone();
            move |source: EntityError| LifecycleError::PartialUpdate {
                bag_id,
                step,
                source: source.into(),
            }
        };
        // The rebuild runs on a staged copy; the original keeps its tags,
        // catalog id included, until the new bag is complete.
        let rebuild = |staged: &StagedBag| -> Result<Manifest, PackagingError> {
            let tags = self.packager.unpackage(staged.path())?;
            self.packager
                .make_package(staged.path(), &PackageParams { tags, force: false })
        };
        let package_failed = |source: PackagingError| LifecycleError::PartialUpdate {
            bag_id: bag_id.clone(),
            step: "package",
            source: source.into(),
        };
        let staged = StagedBag::create(path).map_err(package_failed)?;
        let mut manifest = rebuild(&staged).map_err(package_failed)?;
        staged.replace_original().map_err(package_failed)?;
        manifest.root = path.to_path_buf();

        bag.set_files(self.packager.payload_files(&manifest))
            .map_err(partial("update bag"))?;
        bag.save().map_err(partial("update bag"))?;
        let action = self
            .record(&bag_id, "updated", &format!("re-packaged {}", path.display()))
            .map_err(partial("record action"))?;

        info!(
            path = %path.display(),
            bag = %bag_id,
            from = %handle.state,
            to = %next,
            files = manifest.entries.len(),
            "bag transition"
        );
        Ok(RepackagedBag {
            bag_id,
            manifest,
            action_id: action.id().map(str::to_string),
        })
    }

    fn plan(&self, path: &Path, target: &CopyTarget) -> Result<CopyPlan, LifecycleError> {
        let replication = self.settings.replication;
        let probe = RemoteProbe::new(self.shell, target.host.clone(), replication.reserved_percent);
        let planner = ReplicationPlanner::new(probe, replication.allow_elevation);
        match planner.plan_copy(path, &target.destination, &target.volume)? {
            CopyPlan::Skip(reason) => Err(skipped(reason, target)),
            plan => Ok(plan),
        }
    }

    fn item_draft(
        &self,
        registration: &Registration,
        bagname: &str,
    ) -> Result<Record<Item>, EntityError> {
        let mut item = match &registration.item {
            Some(id) => Record::<Item>::load(self.catalog.clone(), id)?,
            None => {
                let mut item = Record::<Item>::new(self.catalog.clone());
                item.set_title(bagname)?;
                item.set_local_id(bagname)?;
                item
            }
        };
        if let Some(title) = &registration.title {
            item.set_title(title)?;
        }
        if let Some(local_id) = &registration.local_id {
            item.set_local_id(local_id)?;
        }
        if let Some(collection) = &registration.collection {
            item.set_collection(collection)?;
        }
        if let Some(project) = &registration.project {
            item.set_project(project)?;
        }
        if let Some(item_type) = &registration.item_type {
            item.set_item_type(item_type)?;
        }
        Ok(item)
    }

    fn bag_draft(
        &self,
        packaged: &PackagedBag,
        registration: &Registration,
        bagname: &str,
    ) -> Result<Record<Bag>, EntityError> {
        let mut bag = Record::<Bag>::new(self.catalog.clone());
        bag.set_bagname(bagname)?;
        let recorded_path = registration
            .access_path
            .clone()
            .unwrap_or_else(|| packaged.path.display().to_string());
        bag.set_path(&recorded_path)?;
        bag.set_bag_type(registration.bag_type.as_deref().unwrap_or(DEFAULT_BAG_TYPE))?;
        if let Some(machine) = registration
            .machine
            .as_ref()
            .or(self.settings.bagging.default_machine.as_ref())
        {
            bag.set_machine(machine)?;
        }
        bag.set_files(self.packager.payload_files(&packaged.manifest))?;
        Ok(bag)
    }

    fn record(
        &self,
        bag_id: &str,
        action: &str,
        note: &str,
    ) -> Result<Record<BagAction>, EntityError> {
        Record::<BagAction>::record_action(self.catalog.clone(), bag_id, action, note, &now())
    }
}

fn skipped(reason: SkipReason, target: &CopyTarget) -> LifecycleError {
    match reason {
        SkipReason::InsufficientSpace { required } => LifecycleError::InsufficientSpace {
            volume: target.volume.clone(),
            required,
        },
        SkipReason::PermissionDenied => LifecycleError::PermissionDenied {
            destination: target.destination.clone(),
        },
    }
}

fn directory_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().to_string(),
    )
}

fn now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

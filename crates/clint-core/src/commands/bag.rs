use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clint_domain::{MemoryCatalog, SharedCatalog};
use serde_json::json;

use crate::core::bagit::{find_tag, BAG_ID_TAG};
use crate::core::config::CommandContext;
use crate::core::lifecycle::{
    BagController, BagState, ControllerSettings, CopyTarget, Registration,
};
use crate::core::runtime::HostContext;
use crate::core::tooling::ExecutionOutcome;

#[derive(Clone, Debug, Default)]
pub struct BagRequest {
    pub path: PathBuf,
    pub force: bool,
    pub bagname: Option<String>,
    pub bag_type: Option<String>,
    pub item: Option<String>,
    pub title: Option<String>,
    pub local_id: Option<String>,
    pub collection: Option<String>,
    pub project: Option<String>,
    pub item_type: Option<String>,
    pub machine: Option<String>,
    pub access_path: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RebagRequest {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ValidateRequest {
    pub path: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct CopyRequest {
    pub path: PathBuf,
    /// Full path of the replica on the destination host.
    pub destination: String,
    /// Mount point whose free space gates the copy.
    pub volume: String,
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub machine: Option<String>,
}

/// Packages a directory and registers it. A registered bag passed with
/// `--force` is re-packaged in place instead.
pub fn bag_package(ctx: &CommandContext, request: &BagRequest) -> Result<ExecutionOutcome> {
    let catalog = ctx.catalog()?;
    let controller = controller(ctx, catalog);
    let context = json!({ "path": request.path });

    let handle = match controller.open(&request.path) {
        Ok(handle) => handle,
        Err(err) => return Ok(ExecutionOutcome::from_error(&err, context)),
    };
    if request.force && handle.bag_id.is_some() {
        return bag_rebag(
            ctx,
            &RebagRequest {
                path: request.path.clone(),
            },
        );
    }

    let packaged = match controller.package(&request.path, request.force) {
        Ok(packaged) => packaged,
        Err(err) => return Ok(ExecutionOutcome::from_error(&err, context)),
    };
    let registered = match controller.register(&packaged, &registration(request)) {
        Ok(registered) => registered,
        Err(err) => return Ok(ExecutionOutcome::from_error(&err, context)),
    };
    Ok(ExecutionOutcome::reached(
        BagState::Registered,
        format!(
            "registered bag {} for item {}",
            registered.bag_id, registered.item_id
        ),
        json!({
            "path": registered.path,
            "bagname": registered.bagname,
            "bag_id": registered.bag_id,
            "item_id": registered.item_id,
            "action_id": registered.action_id,
            "files": packaged.manifest.entries.len(),
            "oxum": packaged.manifest.oxum(),
        }),
    ))
}

pub fn bag_rebag(ctx: &CommandContext, request: &RebagRequest) -> Result<ExecutionOutcome> {
    let catalog = ctx.catalog()?;
    let controller = controller(ctx, catalog);
    match controller.repackage(&request.path) {
        Ok(repackaged) => Ok(ExecutionOutcome::reached(
            BagState::Registered,
            format!("re-packaged bag {}", repackaged.bag_id),
            json!({
                "path": request.path,
                "bag_id": repackaged.bag_id,
                "action_id": repackaged.action_id,
                "files": repackaged.manifest.entries.len(),
                "oxum": repackaged.manifest.oxum(),
            }),
        )),
        Err(err) => Ok(ExecutionOutcome::from_error(
            &err,
            json!({ "path": request.path }),
        )),
    }
}

/// Checks fixity. The catalog is only opened for registered bags, so an
/// unregistered bag validates without one configured.
pub fn bag_validate(ctx: &CommandContext, request: &ValidateRequest) -> Result<ExecutionOutcome> {
    let catalog = if is_registered(ctx, &request.path) {
        ctx.catalog()?
    } else {
        offline_catalog()
    };
    let controller = controller(ctx, catalog);
    match controller.validate(&request.path) {
        Ok(validated) => Ok(ExecutionOutcome::reached(
            BagState::Validated,
            match &validated.bag_id {
                Some(bag_id) => format!("bag {bag_id} is valid"),
                None => "bag is valid".to_string(),
            },
            json!({
                "path": validated.path,
                "registered": validated.is_registered(),
                "bag_id": validated.bag_id,
                "action_id": validated.action_id,
            }),
        )),
        Err(err) => Ok(ExecutionOutcome::from_error(
            &err,
            json!({ "path": request.path }),
        )),
    }
}

/// Plans, validates and copies a registered bag to its destination. The
/// plan is checked first so a copy that cannot happen records nothing.
pub fn bag_copy(ctx: &CommandContext, request: &CopyRequest) -> Result<ExecutionOutcome> {
    let catalog = ctx.catalog()?;
    let controller = controller(ctx, catalog);
    let target = copy_target(ctx, request);
    let context = json!({
        "path": request.path,
        "host": target.host.label(),
        "destination": target.destination,
        "volume": target.volume,
    });

    let plan = match controller.preflight(&request.path, &target) {
        Ok(plan) => plan,
        Err(err) => return Ok(ExecutionOutcome::from_error(&err, context)),
    };
    let validated = match controller.validate(&request.path) {
        Ok(validated) => validated,
        Err(err) => return Ok(ExecutionOutcome::from_error(&err, context)),
    };
    match controller.copy_planned(&validated, &target, plan) {
        Ok(replicated) => Ok(ExecutionOutcome::reached(
            BagState::Replicated,
            format!(
                "copied bag {} to {}:{}",
                replicated.bag_id,
                replicated.host.label(),
                replicated.destination
            ),
            json!({
                "path": request.path,
                "bag_id": replicated.bag_id,
                "host": replicated.host.label(),
                "destination": replicated.destination,
                "plan": replicated.plan.as_str(),
                "validation_action_id": validated.action_id,
                "action_id": replicated.action_id,
            }),
        )),
        Err(err) => Ok(ExecutionOutcome::from_error(&err, context)),
    }
}

fn controller<'a>(ctx: &'a CommandContext, catalog: SharedCatalog) -> BagController<'a> {
    let config = ctx.config();
    BagController::new(
        catalog,
        ctx.packager(),
        ctx.shell(),
        ControllerSettings {
            replication: config.replication(),
            bagging: config.bagging().clone(),
        },
    )
}

fn is_registered(ctx: &CommandContext, path: &std::path::Path) -> bool {
    let packager = ctx.packager();
    packager.is_package(path)
        && packager
            .read_tags(path)
            .map(|tags| find_tag(&tags, BAG_ID_TAG).is_some())
            .unwrap_or(false)
}

/// Stand-in for transitions that never reach the catalog.
fn offline_catalog() -> SharedCatalog {
    Arc::new(MemoryCatalog::new())
}

fn registration(request: &BagRequest) -> Registration {
    Registration {
        bagname: request.bagname.clone(),
        bag_type: request.bag_type.clone(),
        item: request.item.clone(),
        title: request.title.clone(),
        local_id: request.local_id.clone(),
        collection: request.collection.clone(),
        project: request.project.clone(),
        item_type: request.item_type.clone(),
        machine: request.machine.clone(),
        access_path: request.access_path.clone(),
    }
}

fn copy_target(ctx: &CommandContext, request: &CopyRequest) -> CopyTarget {
    let remote = ctx.config().remote();
    let host = match request.host.clone().or_else(|| remote.host.clone()) {
        Some(host) => HostContext {
            host: Some(host),
            user: request.user.clone().or_else(|| remote.user.clone()),
            port: request.port.or(remote.port),
        },
        None => HostContext::local(),
    };
    CopyTarget {
        host,
        destination: request.destination.clone(),
        volume: request.volume.clone(),
        machine: request.machine.clone(),
    }
}

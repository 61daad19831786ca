use std::io::{self, BufRead, Write};

use atty::Stream;
use clint_core::{
    bag_copy, bag_package, bag_rebag, bag_validate, entity_add, entity_edit, entity_show,
    error_outcome, AddRequest, BagRequest, CommandContext, CommandGroup, CommandInfo,
    CommandStatus, CopyRequest, EditRequest, ExecutionOutcome, RebagRequest, ShowRequest,
    ValidateRequest,
};
use serde_json::Value;

use crate::cli::{BagArgs, CommandGroupCli, CopyArgs};

pub fn command_info(group: &CommandGroupCli) -> CommandInfo {
    match group {
        CommandGroupCli::Show(_) => CommandInfo::new(CommandGroup::Show, "show"),
        CommandGroupCli::Add(_) => CommandInfo::new(CommandGroup::Add, "add"),
        CommandGroupCli::Edit(_) => CommandInfo::new(CommandGroup::Edit, "edit"),
        CommandGroupCli::Bag(_) => CommandInfo::new(CommandGroup::Bag, "bag"),
        CommandGroupCli::Rebag(_) => CommandInfo::new(CommandGroup::Rebag, "rebag"),
        CommandGroupCli::Validate(_) => CommandInfo::new(CommandGroup::Validate, "validate"),
        CommandGroupCli::Copy(_) => CommandInfo::new(CommandGroup::Copy, "copy"),
    }
}

pub fn dispatch_command(ctx: &CommandContext, group: &CommandGroupCli) -> ExecutionOutcome {
    match group {
        CommandGroupCli::Show(args) => core_call(|| {
            entity_show(
                ctx,
                &ShowRequest {
                    kind: args.kind.into(),
                    id: args.id.clone(),
                    expand: args.expand,
                },
            )
        }),
        CommandGroupCli::Add(args) => core_call(|| {
            entity_add(
                ctx,
                &AddRequest {
                    kind: args.kind.into(),
                    fields: args.fields.set.clone(),
                },
            )
        }),
        CommandGroupCli::Edit(args) => core_call(|| {
            entity_edit(
                ctx,
                &EditRequest {
                    kind: args.kind.into(),
                    id: args.id.clone(),
                    fields: args.fields.set.clone(),
                },
            )
        }),
        CommandGroupCli::Bag(args) => dispatch_bag(ctx, args),
        CommandGroupCli::Rebag(args) => core_call(|| {
            bag_rebag(
                ctx,
                &RebagRequest {
                    path: args.path.clone(),
                },
            )
        }),
        CommandGroupCli::Validate(args) => core_call(|| {
            bag_validate(
                ctx,
                &ValidateRequest {
                    path: args.path.clone(),
                },
            )
        }),
        CommandGroupCli::Copy(args) => core_call(|| bag_copy(ctx, &copy_request_from_args(args))),
    }
}

/// Runs `bag`, and when the directory turns out to be an unregistered bag
/// already, asks before re-packaging it.
fn dispatch_bag(ctx: &CommandContext, args: &BagArgs) -> ExecutionOutcome {
    let request = bag_request_from_args(args);
    let attempt = core_call(|| bag_package(ctx, &request));
    if request.force || !is_repackage_prompt(&attempt) {
        return attempt;
    }
    if !args.yes {
        if !can_prompt(ctx) {
            return attempt;
        }
        eprint!(
            "{} is already a bag. Re-package it? (y/N) ",
            args.path.display()
        );
        io::stderr().flush().ok();
        let mut answer = String::new();
        let _ = io::stdin().lock().read_line(&mut answer);
        if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            return attempt;
        }
    }
    let forced = BagRequest {
        force: true,
        ..request
    };
    core_call(|| bag_package(ctx, &forced))
}

fn can_prompt(ctx: &CommandContext) -> bool {
    if ctx.global.json || ctx.is_ci() {
        return false;
    }
    atty::is(Stream::Stdin) && atty::is(Stream::Stderr)
}

fn is_repackage_prompt(outcome: &ExecutionOutcome) -> bool {
    outcome.status == CommandStatus::UserError
        && outcome.reason() == Some("already_packaged")
        && outcome
            .details
            .get("bag_id")
            .map_or(true, Value::is_null)
}

fn bag_request_from_args(args: &BagArgs) -> BagRequest {
    BagRequest {
        path: args.path.clone(),
        force: args.force,
        bagname: args.bagname.clone(),
        bag_type: args.bag_type.clone(),
        item: args.item.clone(),
        title: args.title.clone(),
        local_id: args.local_id.clone(),
        collection: args.collection.clone(),
        project: args.project.clone(),
        item_type: args.item_type.clone(),
        machine: args.machine.clone(),
        access_path: args.access_path.clone(),
    }
}

fn copy_request_from_args(args: &CopyArgs) -> CopyRequest {
    CopyRequest {
        path: args.path.clone(),
        destination: args.destination.clone(),
        volume: args.volume.clone(),
        host: args.host.clone(),
        user: args.user.clone(),
        port: args.port,
        machine: args.machine.clone(),
    }
}

fn core_call<F>(action: F) -> ExecutionOutcome
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    match action() {
        Ok(outcome) => outcome,
        Err(err) => error_outcome(&err),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn only_unregistered_bags_prompt() {
        let packaged = ExecutionOutcome::user_error(
            "already a bag",
            json!({ "reason": "already_packaged", "bag_id": null }),
        );
        assert!(is_repackage_prompt(&packaged));

        let registered = ExecutionOutcome::user_error(
            "already a bag",
            json!({ "reason": "already_packaged", "bag_id": "B1" }),
        );
        assert!(!is_repackage_prompt(&registered));

        let other = ExecutionOutcome::user_error("nope", json!({ "reason": "not_packaged" }));
        assert!(!is_repackage_prompt(&other));
    }
}

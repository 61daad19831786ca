use clint_domain::EntityError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::Display;

use super::outcome::{CommandStatus, ExecutionOutcome, OperatorError};
use crate::core::lifecycle::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CommandGroup {
    Show,
    Add,
    Edit,
    Bag,
    Rebag,
    Validate,
    Copy,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandInfo {
    pub group: CommandGroup,
    pub name: &'static str,
}

impl CommandInfo {
    #[must_use]
    pub const fn new(group: CommandGroup, name: &'static str) -> Self {
        Self { group, name }
    }
}

pub fn to_json_response(info: CommandInfo, outcome: &ExecutionOutcome) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError => "user-error",
        CommandStatus::Failure => "error",
    };
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": status,
        "message": format_status_message(info, &outcome.message),
        "details": details,
    })
}

#[must_use]
pub fn format_status_message(info: CommandInfo, message: &str) -> String {
    let group_name = info.group.to_string();
    let prefix = if group_name == info.name {
        format!("clint {}", info.name)
    } else {
        format!("clint {} {}", group_name, info.name)
    };
    if message.is_empty() {
        prefix
    } else if message.starts_with(&prefix) {
        message.to_string()
    } else {
        format!("{prefix}: {message}")
    }
}

/// Turns an error escaping a command into an outcome. Errors the crate
/// knows how to report keep their details; anything else is an internal
/// failure with its cause chain attached.
pub fn error_outcome(err: &anyhow::Error) -> ExecutionOutcome {
    if let Some(operator) = err.downcast_ref::<OperatorError>() {
        return ExecutionOutcome::from_error(operator, Value::Null);
    }
    if let Some(entity) = err.downcast_ref::<EntityError>() {
        return ExecutionOutcome::from_error(entity, Value::Null);
    }
    if let Some(lifecycle) = err.downcast_ref::<LifecycleError>() {
        return ExecutionOutcome::from_error(lifecycle, Value::Null);
    }
    let issues: Vec<String> = err.chain().map(ToString::to_string).collect();
    ExecutionOutcome::failure(
        err.to_string(),
        json!({
            "reason": "internal_error",
            "issues": issues,
        }),
    )
}

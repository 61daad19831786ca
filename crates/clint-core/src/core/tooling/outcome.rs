//! What a command hands back to the CLI: a status that picks the exit code,
//! a one-line message, and a details object that always names a `reason`
//! when something went wrong and a `state` when a bag was involved.

use clint_domain::EntityError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::lifecycle::{BagState, LifecycleError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    /// The operator can fix this: bad input, missing configuration, a bag
    /// in the wrong state, a volume without room.
    UserError,
    /// The catalog, a remote host or the disk let us down.
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    /// A lifecycle step that left the bag in `state`.
    pub fn reached(state: BagState, message: impl Into<String>, mut details: Value) -> Self {
        if let Value::Object(map) = &mut details {
            map.insert("state".into(), json!(state));
        }
        Self::success(message, details)
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    /// Reports `err`. Keys in `context` (the path, host or id the command
    /// was given) fill in around the error's own details, never over them.
    pub fn from_error<E: ReportedError + ?Sized>(err: &E, context: Value) -> Self {
        let mut details = err.details();
        details.insert("reason".into(), json!(err.reason()));
        if let Value::Object(context) = context {
            for (key, value) in context {
                details.entry(key).or_insert(value);
            }
        }
        let details = Value::Object(details);
        if err.is_user_error() {
            Self::user_error(err.to_string(), details)
        } else {
            Self::failure(err.to_string(), details)
        }
    }

    /// The `reason` string from the details object, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.details.get("reason").and_then(Value::as_str)
    }
}

/// An error a command reports as an outcome instead of propagating.
pub trait ReportedError: std::fmt::Display {
    /// Stable snake_case code scripts match on.
    fn reason(&self) -> &str;

    fn is_user_error(&self) -> bool;

    fn details(&self) -> Map<String, Value> {
        Map::new()
    }
}

impl ReportedError for LifecycleError {
    fn reason(&self) -> &str {
        LifecycleError::reason(self)
    }

    fn is_user_error(&self) -> bool {
        LifecycleError::is_user_error(self)
    }

    /// Carries the `state` the bag was left in and every identity involved.
    fn details(&self) -> Map<String, Value> {
        match LifecycleError::details(self) {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Lookup and input problems are the operator's to fix; anything the
/// catalog or network did is a failure.
impl ReportedError for EntityError {
    fn reason(&self) -> &str {
        EntityError::reason(self)
    }

    fn is_user_error(&self) -> bool {
        self.is_caller_error()
    }

    fn details(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(status) = self.status() {
            map.insert("status".into(), json!(status));
        }
        match self {
            EntityError::Catalog { body, .. } => {
                map.insert("body".into(), json!(body));
            }
            EntityError::Transport(source) => {
                let issues: Vec<String> = source.chain().map(ToString::to_string).collect();
                map.insert("issues".into(), json!(issues));
            }
            _ => {}
        }
        map
    }
}

/// A setup problem found before any bag or record is touched, such as a
/// missing catalog URL. Travels through `anyhow` to the command boundary.
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct OperatorError {
    reason: &'static str,
    message: String,
    hint: Option<String>,
    context: Map<String, Value>,
}

impl OperatorError {
    pub fn new(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            hint: None,
            context: Map::new(),
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

impl ReportedError for OperatorError {
    fn reason(&self) -> &str {
        self.reason
    }

    fn is_user_error(&self) -> bool {
        true
    }

    fn details(&self) -> Map<String, Value> {
        let mut map = self.context.clone();
        if let Some(hint) = &self.hint {
            map.insert("hint".into(), json!(hint));
        }
        map
    }
}

//! Outcome shaping for the command layer and the CLI.

pub(crate) mod outcome;
pub(crate) mod response;

pub use outcome::{CommandStatus, ExecutionOutcome, OperatorError, ReportedError};
pub use response::{
    error_outcome, format_status_message, to_json_response, CommandGroup, CommandInfo,
};

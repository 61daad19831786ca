mod effects;
#[cfg(test)]
pub(crate) mod fake;
mod process;
mod shell;

pub use effects::{Effects, SharedEffects, SystemEffects};
pub use process::{run_command, RunOutput};
pub use shell::{shell_quote, HostContext, RemoteShell, SshShell};

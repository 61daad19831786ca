// Public surface of `clint-core`.
//
// The CLI imports from here so the crate root can stay small and the set of
// types other crates depend on is explicit.

pub use crate::commands::{
    bag_copy, bag_package, bag_rebag, bag_validate, entity_add, entity_edit, entity_show,
    AddRequest, BagRequest, CopyRequest, EditRequest, RebagRequest, ShowRequest,
    ValidateRequest,
};
pub use crate::core::bagit::{BagItPackager, Manifest, Packager, PackagingError};
pub use crate::core::catalog::HttpCatalog;
pub use crate::core::config::{
    BaggingConfig, CatalogConfig, CommandContext, Config, EnvSnapshot, GlobalOptions,
    RemoteConfig, ReplicationConfig,
};
pub use crate::core::lifecycle::{BagController, BagState, ItemOrigin, LifecycleError};
pub use crate::core::replication::{CopyPlan, ReplicationPlanner, RemoteProbe};
pub use crate::core::runtime::{Effects, HostContext, RemoteShell, SharedEffects, SystemEffects};
pub use crate::core::tooling::{
    error_outcome, format_status_message, to_json_response, CommandGroup, CommandInfo,
    CommandStatus, ExecutionOutcome, OperatorError, ReportedError,
};

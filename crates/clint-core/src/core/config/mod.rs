pub(crate) mod context;
pub(crate) mod settings;

pub use context::CommandContext;
pub use settings::{
    BaggingConfig, CatalogConfig, Config, EnvSnapshot, GlobalOptions, RemoteConfig,
    ReplicationConfig,
};

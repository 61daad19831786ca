use std::sync::Arc;

use anyhow::Result;
use clint_domain::SharedCatalog;

use super::shell::{RemoteShell, SshShell};
use crate::core::bagit::{BagItPackager, Packager};
use crate::core::catalog::HttpCatalog;
use crate::core::config::CatalogConfig;

/// Every side-effecting collaborator a command may reach for.
pub trait Effects: Send + Sync {
    fn shell(&self) -> &dyn RemoteShell;
    fn packager(&self) -> &dyn Packager;
    /// Opens the catalog described by `config`. Called lazily so commands
    /// that never touch the catalog work without one configured.
    fn catalog(&self, config: &CatalogConfig) -> Result<SharedCatalog>;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    shell: Arc<SshShell>,
    packager: Arc<BagItPackager>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: Arc::new(SshShell),
            packager: Arc::new(BagItPackager),
        }
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn shell(&self) -> &dyn RemoteShell {
        self.shell.as_ref()
    }

    fn packager(&self) -> &dyn Packager {
        self.packager.as_ref()
    }

    fn catalog(&self, config: &CatalogConfig) -> Result<SharedCatalog> {
        Ok(Arc::new(HttpCatalog::new(config)?))
    }
}

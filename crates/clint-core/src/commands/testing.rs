use std::sync::Arc;

use anyhow::Result;
use clint_domain::{MemoryCatalog, SharedCatalog};

use crate::core::bagit::{BagItPackager, Packager};
use crate::core::catalog::HttpCatalog;
use crate::core::config::{CatalogConfig, CommandContext, Config, EnvSnapshot, GlobalOptions};
use crate::core::runtime::fake::FakeShell;
use crate::core::runtime::{Effects, RemoteShell};

/// Effects backed by a scripted shell and an in-memory catalog. Without a
/// catalog, opening one goes through the real constructor and fails on the
/// missing URL.
pub(crate) struct TestEffects {
    shell: FakeShell,
    packager: BagItPackager,
    catalog: Option<Arc<MemoryCatalog>>,
}

impl Effects for TestEffects {
    fn shell(&self) -> &dyn RemoteShell {
        &self.shell
    }

    fn packager(&self) -> &dyn Packager {
        &self.packager
    }

    fn catalog(&self, config: &CatalogConfig) -> Result<SharedCatalog> {
        match &self.catalog {
            Some(catalog) => Ok(catalog.clone()),
            None => Ok(Arc::new(HttpCatalog::new(config)?)),
        }
    }
}

pub(crate) struct TestEnv {
    pub catalog: Arc<MemoryCatalog>,
    global: GlobalOptions,
    effects: Arc<TestEffects>,
}

impl TestEnv {
    pub(crate) fn new() -> Self {
        Self::build(FakeShell::new(), true)
    }

    pub(crate) fn with_shell(shell: FakeShell) -> Self {
        Self::build(shell, true)
    }

    pub(crate) fn without_catalog() -> Self {
        Self::build(FakeShell::new(), false)
    }

    fn build(shell: FakeShell, with_catalog: bool) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let effects = TestEffects {
            shell,
            packager: BagItPackager,
            catalog: with_catalog.then(|| catalog.clone()),
        };
        Self {
            catalog,
            global: GlobalOptions::default(),
            effects: Arc::new(effects),
        }
    }

    pub(crate) fn context(&self) -> CommandContext<'_> {
        CommandContext::with_config(
            &self.global,
            self.effects.clone(),
            EnvSnapshot::testing(&[]),
            Config::testing(),
        )
    }
}

use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;
use clint_domain::SharedCatalog;

use super::settings::{Config, EnvSnapshot, GlobalOptions};
use crate::core::bagit::Packager;
use crate::core::runtime::{Effects, RemoteShell, SharedEffects};

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    env: EnvSnapshot,
    config: Config,
    catalog: OnceLock<SharedCatalog>,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Creates a command context from the process environment and the
    /// config file selected by `--config`, `CLINT_CONFIG` or the default
    /// location.
    ///
    /// # Errors
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn new(global: &'a GlobalOptions, effects: SharedEffects) -> Result<Self> {
        let env = EnvSnapshot::capture();
        let config = Config::from_snapshot(&env, global.config.as_deref().map(Path::new))?;
        Ok(Self::with_config(global, effects, env, config))
    }

    #[must_use]
    pub fn with_config(
        global: &'a GlobalOptions,
        effects: SharedEffects,
        env: EnvSnapshot,
        config: Config,
    ) -> Self {
        Self {
            global,
            env,
            config,
            catalog: OnceLock::new(),
            effects,
        }
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn shared_effects(&self) -> SharedEffects {
        self.effects.clone()
    }

    pub fn shell(&self) -> &dyn RemoteShell {
        self.effects.shell()
    }

    pub fn packager(&self) -> &dyn Packager {
        self.effects.packager()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Prompts are suppressed under CI even on a terminal.
    #[must_use]
    pub fn is_ci(&self) -> bool {
        self.env.flag_is_enabled("CI")
    }

    /// The catalog, opened on first use and shared for the rest of the
    /// command.
    ///
    /// # Errors
    /// Returns an operator error when no catalog URL is configured.
    pub fn catalog(&self) -> Result<SharedCatalog> {
        if let Some(catalog) = self.catalog.get() {
            return Ok(catalog.clone());
        }
        let catalog = self.effects.catalog(self.config.catalog())?;
        Ok(self.catalog.get_or_init(|| catalog).clone())
    }
}

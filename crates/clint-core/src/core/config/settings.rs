use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use toml_edit::{DocumentMut, Item};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub config: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        matches!(self.vars.get(key).map(String::as_str), Some("1"))
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[must_use]
    pub fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) source: Option<PathBuf>,
    pub(crate) catalog: CatalogConfig,
    pub(crate) remote: RemoteConfig,
    pub(crate) replication: ReplicationConfig,
    pub(crate) bagging: BaggingConfig,
}

#[derive(Clone, Default)]
pub struct CatalogConfig {
    pub url: Option<String>,
    pub api_version: String,
    pub user: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("url", &self.url)
            .field("api_version", &self.api_version)
            .field("user", &self.user)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Share of a volume's capacity kept free as headroom.
    pub reserved_percent: u8,
    /// Whether a copy into a non-writable destination may use sudo.
    pub allow_elevation: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            reserved_percent: 10,
            allow_elevation: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaggingConfig {
    pub default_machine: Option<String>,
    pub contact: Option<String>,
}

impl Config {
    /// Builds a configuration from the current process environment and the
    /// config file it points at.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be read or parsed,
    /// or a value has the wrong type.
    pub fn from_env(explicit: Option<&Path>) -> Result<Self> {
        let snapshot = EnvSnapshot::capture();
        Self::from_snapshot(&snapshot, explicit)
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot, explicit: Option<&Path>) -> Result<Self> {
        let (source, required) = match explicit {
            Some(path) => (Some(path.to_path_buf()), true),
            None => match snapshot.var("CLINT_CONFIG") {
                Some(path) => (Some(PathBuf::from(path)), true),
                None => (default_config_path(), false),
            },
        };
        let document = match &source {
            Some(path) => load_document(path, required)?,
            None => None,
        };
        let file = FileValues {
            document: document.as_ref(),
        };
        if let Some(path) = source.as_ref().filter(|_| document.is_some()) {
            debug!(path = %path.display(), "loaded config file");
        }

        let catalog = CatalogConfig {
            url: snapshot
                .var("CLINT_CATALOG_URL")
                .map(ToOwned::to_owned)
                .or(file.string("catalog", "url")?),
            api_version: snapshot
                .var("CLINT_API_VERSION")
                .map(ToOwned::to_owned)
                .or(file.string("catalog", "api_version")?)
                .unwrap_or_else(|| "v1".to_string()),
            user: snapshot
                .var("CLINT_CATALOG_USER")
                .map(ToOwned::to_owned)
                .or(file.string("catalog", "user")?),
            api_key: snapshot
                .var("CLINT_CATALOG_API_KEY")
                .map(ToOwned::to_owned)
                .or(file.string("catalog", "api_key")?),
            timeout: match snapshot.var("CLINT_CATALOG_TIMEOUT") {
                Some(raw) => Some(parse_env("CLINT_CATALOG_TIMEOUT", raw)?),
                None => file.integer("catalog", "timeout_secs")?,
            }
            .map(Duration::from_secs),
        };

        let remote = RemoteConfig {
            host: snapshot
                .var("CLINT_REMOTE_HOST")
                .map(ToOwned::to_owned)
                .or(file.string("remote", "host")?),
            user: snapshot
                .var("CLINT_REMOTE_USER")
                .map(ToOwned::to_owned)
                .or(file.string("remote", "user")?),
            port: match snapshot.var("CLINT_REMOTE_PORT") {
                Some(raw) => Some(parse_env("CLINT_REMOTE_PORT", raw)?),
                None => file
                    .integer("remote", "port")?
                    .map(|port| u16::try_from(port).context("remote.port is out of range"))
                    .transpose()?,
            },
        };

        let defaults = ReplicationConfig::default();
        let reserved_percent = match snapshot.var("CLINT_RESERVED_PERCENT") {
            Some(raw) => clint_domain::parse_percent(raw)
                .with_context(|| format!("invalid CLINT_RESERVED_PERCENT '{raw}'"))?,
            None => match file.integer("replication", "reserved_percent")? {
                Some(value) => u8::try_from(value)
                    .ok()
                    .filter(|percent| *percent <= 100)
                    .ok_or_else(|| anyhow!("replication.reserved_percent must be 0-100"))?,
                None => defaults.reserved_percent,
            },
        };
        let allow_elevation = match snapshot.var("CLINT_ALLOW_ELEVATION") {
            Some(raw) => parse_bool("CLINT_ALLOW_ELEVATION", raw)?,
            None => file
                .boolean("replication", "allow_elevation")?
                .unwrap_or(defaults.allow_elevation),
        };

        let bagging = BaggingConfig {
            default_machine: file.string("bagging", "default_machine")?,
            contact: file.string("bagging", "contact")?,
        };

        Ok(Self {
            source: source.filter(|_| document.is_some()),
            catalog,
            remote,
            replication: ReplicationConfig {
                reserved_percent,
                allow_elevation,
            },
            bagging,
        })
    }

    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogConfig {
        &self.catalog
    }

    #[must_use]
    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    #[must_use]
    pub fn replication(&self) -> ReplicationConfig {
        self.replication
    }

    #[must_use]
    pub fn bagging(&self) -> &BaggingConfig {
        &self.bagging
    }

    #[cfg(test)]
    pub(crate) fn testing() -> Self {
        Self {
            source: None,
            catalog: CatalogConfig {
                api_version: "v1".to_string(),
                ..CatalogConfig::default()
            },
            remote: RemoteConfig::default(),
            replication: ReplicationConfig::default(),
            bagging: BaggingConfig::default(),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("clint").join("config.toml"))
}

fn load_document(path: &Path, required: bool) -> Result<Option<DocumentMut>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("reading config {}", path.display()));
        }
    };
    let document = contents
        .parse::<DocumentMut>()
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(Some(document))
}

struct FileValues<'a> {
    document: Option<&'a DocumentMut>,
}

impl FileValues<'_> {
    fn item(&self, table: &str, key: &str) -> Option<&Item> {
        self.document?
            .get(table)
            .and_then(|section| section.get(key))
            .filter(|item| !item.is_none())
    }

    fn string(&self, table: &str, key: &str) -> Result<Option<String>> {
        self.item(table, key)
            .map(|item| {
                item.as_str()
                    .map(ToOwned::to_owned)
                    .ok_or_else(|| anyhow!("{table}.{key} must be a string"))
            })
            .transpose()
    }

    fn integer(&self, table: &str, key: &str) -> Result<Option<u64>> {
        self.item(table, key)
            .map(|item| {
                item.as_integer()
                    .and_then(|value| u64::try_from(value).ok())
                    .ok_or_else(|| anyhow!("{table}.{key} must be a non-negative integer"))
            })
            .transpose()
    }

    fn boolean(&self, table: &str, key: &str) -> Result<Option<bool>> {
        self.item(table, key)
            .map(|item| {
                item.as_bool()
                    .ok_or_else(|| anyhow!("{table}.{key} must be true or false"))
            })
            .transpose()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("invalid {key} '{raw}'"))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("invalid {key} '{raw}'")),
    }
}

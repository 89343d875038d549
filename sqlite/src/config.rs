//! Host module configuration.
//!
//! A [`Connector`](crate::Connector) belongs to one host module and keeps
//! its database at `<base>/<module name>.db`, where the base directory comes
//! from the host's configuration store under [`DB_PATH_KEY`].
//!
//! [`ModuleConfig`] is a ready-made host backed by a YAML file:
//!
//! ```yaml
//! name: inventory
//! values:
//!   GLOBAL_PATH_DB: /var/lib/app/db
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SqlConError};

/// Configuration key holding the database base directory.
pub const DB_PATH_KEY: &str = "GLOBAL_PATH_DB";

/// Read access to a host's key/value configuration.
pub trait ConfigStore {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigStore for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigStore for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// The module a connector stores data for.
pub trait HostModule {
    /// Module name, used as the database file stem.
    fn name(&self) -> &str;

    /// The host's configuration store.
    fn config_store(&self) -> &dyn ConfigStore;
}

/// Resolves `<base>/<module name>.db` for a host module.
///
/// # Errors
///
/// Returns [`SqlConError::ConfigurationMissing`] if the store has no
/// [`DB_PATH_KEY`] entry.
pub fn resolve_db_path(host: &dyn HostModule) -> Result<PathBuf> {
    let base = host.config_store().get(DB_PATH_KEY).ok_or_else(|| {
        SqlConError::ConfigurationMissing(format!(
            "no {DB_PATH_KEY} entry for module '{}'",
            host.name()
        ))
    })?;
    Ok(Path::new(&base).join(format!("{}.db", host.name())))
}

/// YAML-backed host module configuration.
///
/// # Examples
///
/// ```
/// use sqlcon_sqlite::{ModuleConfig, resolve_db_path};
///
/// let module = ModuleConfig::new("inventory").with_value("GLOBAL_PATH_DB", "/data");
/// assert_eq!(
///     resolve_db_path(&module).unwrap(),
///     std::path::Path::new("/data/inventory.db")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module name.
    pub name: String,
    /// Configuration entries.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl ModuleConfig {
    /// Creates a configuration with no entries.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Adds an entry.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](SqlConError::IoError) if the file cannot be read,
    /// or [`YamlError`](SqlConError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](SqlConError::IoError) if the file cannot be
    /// written, or [`YamlError`](SqlConError::YamlError) if serialization
    /// fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}

impl HostModule for ModuleConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_store(&self) -> &dyn ConfigStore {
        &self.values
    }
}

//! # stowage-config
//!
//! Configuration loading and the wiring of the default store set.
//!
//! Configuration comes from `~/.config/stowage/config.toml`, every
//! field optional, with `STOWAGE_*` environment variables taking
//! precedence. [`Config::default_store_set`] turns the settings into
//! the standard store stack: the per-user store first, then any extra
//! read stores, then the machine-wide store, reached through the
//! service socket when it is not directly writable.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use stowage_store::{DirectoryStore, ServiceStore, Store, StoreSet};

pub mod logging;
mod paths;

pub use paths::{config_file_path, default_system_store_dir, default_user_store_dir};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stores: StoresConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoresConfig {
    /// Per-user store, always first in the set.
    pub user_dir: PathBuf,
    /// Machine-wide store.
    pub system_dir: PathBuf,
    /// Additional read-mostly stores, e.g. network mounts.
    pub extra_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Socket of the privileged store service.
    pub socket: PathBuf,
    /// Submit system-store writes to the service when direct access fails.
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stores: StoresConfig::default(),
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoresConfig {
    fn default() -> Self {
        StoresConfig {
            user_dir: paths::default_user_store_dir(),
            system_dir: paths::default_system_store_dir(),
            extra_dirs: Vec::new(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            socket: PathBuf::from(stowage_ipc::default_socket_path()),
            enabled: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load the user config file if it exists, then apply environment
    /// overrides.
    pub fn load() -> Result<Config, ConfigError> {
        let mut config = match paths::config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var("STOWAGE_STORE_DIR") {
            self.stores.user_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("STOWAGE_SYSTEM_STORE_DIR") {
            self.stores.system_dir = PathBuf::from(dir);
        }
        if let Ok(socket) = env::var("STOWAGE_SOCKET") {
            self.service.socket = PathBuf::from(socket);
        }
        if let Ok(level) = env::var("STOWAGE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// The default configuration rendered as TOML.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }

    /// Build the standard store set. Stores that cannot even be opened
    /// are skipped; refusing writes is handled per-operation by the
    /// set itself.
    pub fn default_store_set(&self) -> stowage_store::Result<StoreSet> {
        let mut set = StoreSet::new(Vec::new());
        set.push(Arc::new(DirectoryStore::new(&self.stores.user_dir)?));
        for dir in &self.stores.extra_dirs {
            match DirectoryStore::new(dir) {
                Ok(store) => set.push(Arc::new(store)),
                Err(e) => debug!(dir = %dir.display(), error = %e, "skipping extra store"),
            }
        }
        match self.system_store() {
            Ok(store) => set.push(store),
            Err(e) => debug!(
                dir = %self.stores.system_dir.display(),
                error = %e,
                "skipping system store"
            ),
        }
        Ok(set)
    }

    fn system_store(&self) -> stowage_store::Result<Arc<dyn Store>> {
        let dir = &self.stores.system_dir;
        // an absent directory is created on demand; only an existing
        // unwritable one needs the service
        if dir.exists() && !dir_writable(dir) && self.service.enabled {
            let store = ServiceStore::new(dir, &self.service.socket)?;
            return Ok(Arc::new(store));
        }
        Ok(Arc::new(DirectoryStore::new(dir)?))
    }
}

fn dir_writable(dir: &Path) -> bool {
    nix::unistd::access(dir, nix::unistd::AccessFlags::W_OK).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.service.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.stores.user_dir.ends_with("stowage/implementations"));
        assert!(config.stores.extra_dirs.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[stores]\nuser_dir = \"/custom/impls\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.stores.user_dir, PathBuf::from("/custom/impls"));
        assert_eq!(config.logging.level, "debug");
        // unspecified sections keep their defaults
        assert!(config.service.enabled);
        assert_eq!(config.stores.system_dir, paths::default_system_store_dir());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "stores = 17").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let parsed: Config = toml::from_str(&Config::default_toml()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("STOWAGE_STORE_DIR", "/custom/store");
        env::set_var("STOWAGE_LOG_LEVEL", "trace");
        let mut config = Config::default();
        config.apply_env_overrides();
        env::remove_var("STOWAGE_STORE_DIR");
        env::remove_var("STOWAGE_LOG_LEVEL");

        assert_eq!(config.stores.user_dir, PathBuf::from("/custom/store"));
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_default_store_set_layers() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.stores.user_dir = tmp.path().join("user");
        config.stores.system_dir = tmp.path().join("system");
        config.stores.extra_dirs = vec![tmp.path().join("extra")];

        let set = config.default_store_set().unwrap();
        assert_eq!(set.len(), 3);
        // store roots are canonicalized on open
        assert_eq!(
            set.stores()[0].path(),
            tmp.path().join("user").canonicalize().unwrap()
        );
    }

    #[test]
    fn test_absent_system_store_is_opened_directly() {
        use std::os::unix::fs::PermissionsExt;
        use stowage_store::{digest_directory, AddProgress};

        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.stores.user_dir = tmp.path().join("user");
        config.stores.system_dir = tmp.path().join("system");
        config.service.socket = tmp.path().join("no-service.sock");

        // the system dir does not exist, so no service is consulted
        let set = config.default_store_set().unwrap();
        assert_eq!(set.len(), 2);

        let user_dir = tmp.path().join("user");
        fs::set_permissions(&user_dir, fs::Permissions::from_mode(0o555)).unwrap();
        if dir_writable(&user_dir) {
            // running as root, permissions do not apply
            return;
        }

        let source = TempDir::new().unwrap();
        fs::write(source.path().join("hello.txt"), "hi\n").unwrap();
        let digest = digest_directory(source.path()).unwrap();

        // the unwritable user store is skipped and the write lands in
        // the freshly created system store, not an unreachable service
        let stored = set
            .add_dir(source.path(), &digest, &mut AddProgress::default())
            .unwrap();
        assert!(stored.starts_with(set.stores()[1].path()));

        fs::set_permissions(&user_dir, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_duplicate_store_dirs_collapse() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.stores.user_dir = tmp.path().join("store");
        config.stores.system_dir = tmp.path().join("store");

        let set = config.default_store_set().unwrap();
        assert_eq!(set.len(), 1);
    }
}

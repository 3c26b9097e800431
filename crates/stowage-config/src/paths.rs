//! Well-known filesystem locations.

use std::path::PathBuf;

/// Per-user implementation store, e.g. `~/.cache/stowage/implementations`.
pub fn default_user_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("stowage/implementations")
}

/// Machine-wide implementation store.
pub fn default_system_store_dir() -> PathBuf {
    PathBuf::from("/var/cache/stowage/implementations")
}

/// User config file, e.g. `~/.config/stowage/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stowage/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_dirs_are_absolute() {
        assert!(default_user_store_dir().is_absolute());
        assert!(default_system_store_dir().is_absolute());
    }
}

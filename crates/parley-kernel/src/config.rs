//! Configuration loading from `~/.parley/config.toml` with defaults.

use parley_types::config::ParleyConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load configuration from a TOML file, with defaults.
///
/// A missing, unreadable or malformed file yields the defaults; the reason
/// is logged.
pub fn load_config(path: Option<&Path>) -> ParleyConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return ParleyConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<ParleyConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                ParleyConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            ParleyConfig::default()
        }
    }
}

/// Get the Parley home directory (`~/.parley`).
pub fn parley_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".parley")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    parley_home().join("config.toml")
}

/// SQLite path to use: the configured one, or `~/.parley/peers.db`.
pub fn resolve_db_path(config: &ParleyConfig) -> PathBuf {
    config
        .storage
        .db_path
        .clone()
        .unwrap_or_else(|| parley_home().join("peers.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::config::InboundMode;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("nope.toml")));
        assert_eq!(config.api.listen_addr.port(), 8000);
        assert_eq!(config.chat.listen_addr.port(), 5001);
    }

    #[test]
    fn test_loads_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
listen_addr = "127.0.0.1:9000"

[chat]
inbound_mode = "handshake"
"#
        )
        .unwrap();

        let config = load_config(Some(file.path()));
        assert_eq!(config.api.listen_addr.port(), 9000);
        assert_eq!(config.chat.inbound_mode, InboundMode::Handshake);
        assert_eq!(config.chat.handshake_timeout_ms, 10_000);
        assert!(!config.registry.reaper.enabled);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api\nlisten_addr = ").unwrap();
        let config = load_config(Some(file.path()));
        assert_eq!(config.api.listen_addr.port(), 8000);
    }

    #[test]
    fn test_resolve_db_path() {
        let mut config = ParleyConfig::default();
        assert!(resolve_db_path(&config).ends_with(".parley/peers.db"));
        config.storage.db_path = Some(PathBuf::from("/tmp/custom.db"));
        assert_eq!(resolve_db_path(&config), PathBuf::from("/tmp/custom.db"));
    }
}

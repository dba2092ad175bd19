//! Run configuration
//!
//! One explicit [`DeliveryConfig`] is assembled at startup from CLI flags
//! layered over an optional TOML presets file, then passed by reference to
//! whoever needs it. There is no global settings state.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::deliver::Category;

/// Environment variable naming the presets file when `--settings` is absent
pub const SETTINGS_ENV: &str = "COURIER_SETTINGS_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("port must be 21 for ftp or 22 for sftp (got {0})")]
    BadPort(u16),
    #[error("failed to read settings file ({path}): {reason}")]
    Settings { path: String, reason: String },
}

/// Remote transport, selected by the configured port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Sftp,
    Ftp,
}

impl Transport {
    /// Conventional mapping: 22 is SFTP, 21 is FTP, anything else is a
    /// configuration error.
    pub fn from_port(port: u16) -> Result<Self, ConfigError> {
        match port {
            22 => Ok(Transport::Sftp),
            21 => Ok(Transport::Ftp),
            other => Err(ConfigError::BadPort(other)),
        }
    }
}

/// Everything one delivery run needs to know
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Category to deliver; `None` runs all of them
    pub category: Option<Category>,
    /// Directory holding the conversion utilities; `None` resolves from PATH
    pub tool_dir: Option<String>,
    /// Path to the work-list manifest
    pub manifest: PathBuf,
    /// Local root containing the bases, htdocs and serial directories
    pub source_dir: String,
    /// Remote root with the same layout
    pub destiny_dir: String,
    /// Convert database pairs for the destination OS before sending
    pub compatibility_mode: bool,
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl DeliveryConfig {
    pub fn transport(&self) -> Result<Transport, ConfigError> {
        Transport::from_port(self.port)
    }
}

/// Optional defaults loaded from a TOML file; every field may be omitted
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Presets {
    pub tool_dir: Option<String>,
    pub manifest: Option<PathBuf>,
    pub source_dir: Option<String>,
    pub destiny_dir: Option<String>,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Presets {
    /// Load presets from the file named by `COURIER_SETTINGS_FILE`.
    ///
    /// A missing variable or unreadable file is only a warning; the run
    /// continues with no presets.
    pub fn from_env() -> Self {
        let Ok(path) = std::env::var(SETTINGS_ENV) else {
            warn!("missing env variable {SETTINGS_ENV}, no presets available");
            return Presets::default();
        };
        match Self::from_file(Path::new(&path)) {
            Ok(p) => p,
            Err(e) => {
                warn!("{e}, no presets available");
                Presets::default()
            }
        }
    }

    /// Load presets from an explicitly named file. Unlike [`Presets::from_env`]
    /// this is fatal when the file is missing or malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Settings {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Settings {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Normalize a configured root path: backslashes become `/` and any
/// trailing slash is dropped, so later concatenation is uniform.
pub fn trim_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn transport_follows_port_convention() {
        assert_eq!(Transport::from_port(22).unwrap(), Transport::Sftp);
        assert_eq!(Transport::from_port(21).unwrap(), Transport::Ftp);
        assert!(matches!(
            Transport::from_port(2222),
            Err(ConfigError::BadPort(2222))
        ));
    }

    #[test]
    fn trim_path_normalizes_separators_and_trailing_slash() {
        assert_eq!(trim_path("/var/www/"), "/var/www");
        assert_eq!(trim_path("C:\\scielo\\serial"), "C:/scielo/serial");
        assert_eq!(trim_path("/"), "/");
        assert_eq!(trim_path(""), "");
    }

    #[test]
    fn presets_parse_partial_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "server = \"stage.example.org\"\nport = 21").unwrap();
        let p = Presets::from_file(f.path()).unwrap();
        assert_eq!(p.server.as_deref(), Some("stage.example.org"));
        assert_eq!(p.port, Some(21));
        assert!(p.user.is_none());
    }

    #[test]
    fn presets_from_missing_file_is_an_error() {
        assert!(Presets::from_file(Path::new("/nonexistent/presets.toml")).is_err());
    }
}

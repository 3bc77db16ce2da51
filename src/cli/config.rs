//! Host-side configuration persisted across invocations.

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "fastboot-flash.toml";

/// User-level defaults for the CLI, loaded once at startup and optionally
/// overridden by individual command-line flags.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Restrict device enumeration to this USB vendor id, if set.
    pub vendor_id: Option<u16>,
    /// Restrict device enumeration to this USB product id, if set.
    pub product_id: Option<u16>,
    /// Default value for `--wipe` when the flag is not passed explicitly.
    pub default_wipe: bool,
    /// Per-exchange USB wire timeout, in seconds, for the fastboot session.
    /// `None` uses [`crate::connection::usb::UsbFastbootSession`]'s default.
    pub default_timeout_secs: Option<u64>,
}

impl Config {
    fn path() -> Option<PathBuf> {
        ProjectDirs::from("rs", "", "fastboot-flash")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load the persisted config, or [`Config::default`] if none exists yet
    /// or the config directory can't be resolved on this platform.
    pub fn load() -> Result<Self> {
        let Some(path) = Self::path() else {
            return Ok(Self::default());
        };
        Self::load_from(&path)
    }

    /// Persist this config to disk, creating the config directory if needed.
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    fn load_from(path: &std::path::Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                debug!("loaded config from {}", path.display());
                toml::from_str(&contents).map_err(|err| Error::transport(ConfigError(err.to_string())))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(Error::Io(err)),
        }
    }

    fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|err| Error::transport(ConfigError(err.to_string())))?;
        fs::write(path, contents)?;

        Ok(())
    }
}

#[derive(Debug)]
struct ConfigError(String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = Config {
            vendor_id: Some(0x18d1),
            product_id: Some(0x4ee0),
            default_wipe: true,
            default_timeout_secs: Some(10),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }
}

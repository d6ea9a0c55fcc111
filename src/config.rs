//! Device path and mode catalog configuration.
//!
//! This module provides:
//! - Device path templates, chosen once per process from the filesystem layout
//! - The `FRAMEBUFFER` environment override
//! - Optional TOML configuration loading from `~/.fbcanvas/config.toml`
//!
//! # Configuration File
//!
//! ```toml
//! # Skip VT based resolution and use this device directly (optional)
//! device = "/dev/fb1"
//!
//! modes_file = "/etc/fb.modes"
//!
//! [paths]
//! default_device = "/dev/fb0"
//! device_template = "/dev/fb{}"
//! tty_template = "/dev/tty{}"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

/// Environment variable naming a framebuffer device node directly
pub const DEVICE_ENV: &str = "FRAMEBUFFER";

/// Marker file present when /dev is managed by devfsd
const DEVFS_MARKER: &str = "/dev/.devfsd";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device override; bypasses VT to framebuffer resolution
    pub device: Option<PathBuf>,
    /// Device node locations
    pub paths: DevicePaths,
    /// Display mode catalog
    pub modes_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            paths: DevicePaths::detect(),
            modes_file: PathBuf::from("/etc/fb.modes"),
        }
    }
}

/// Device node locations. `{}` in a template is replaced by an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicePaths {
    pub default_device: PathBuf,
    pub device_template: String,
    pub tty_template: String,
}

impl Default for DevicePaths {
    fn default() -> Self {
        Self::standard()
    }
}

impl DevicePaths {
    /// Classic /dev layout
    pub fn standard() -> Self {
        Self {
            default_device: PathBuf::from("/dev/fb0"),
            device_template: "/dev/fb{}".to_string(),
            tty_template: "/dev/tty{}".to_string(),
        }
    }

    /// devfs layout
    pub fn devfs() -> Self {
        Self {
            default_device: PathBuf::from("/dev/fb/0"),
            device_template: "/dev/fb/{}".to_string(),
            tty_template: "/dev/vc/{}".to_string(),
        }
    }

    /// Pick the layout matching the running system
    pub fn detect() -> Self {
        if Path::new(DEVFS_MARKER).exists() {
            Self::devfs()
        } else {
            Self::standard()
        }
    }

    /// Path of framebuffer number `index`
    pub fn device(&self, index: u32) -> PathBuf {
        PathBuf::from(self.device_template.replace("{}", &index.to_string()))
    }

    /// Path of virtual terminal number `vt`
    pub fn tty(&self, vt: u16) -> PathBuf {
        PathBuf::from(self.tty_template.replace("{}", &vt.to_string()))
    }
}

impl Config {
    /// Load configuration from file, then apply the environment override
    pub fn load() -> Self {
        let mut config = Self::get_config_path()
            .filter(|path| path.exists())
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|content| Self::from_toml(&content).ok())
            .unwrap_or_default();

        if let Some(device) = std::env::var_os(DEVICE_ENV).filter(|v| !v.is_empty()) {
            config.device = Some(PathBuf::from(device));
        }
        config
    }

    /// Parse a configuration document
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".fbcanvas").join("config.toml"))
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates() {
        let paths = DevicePaths::standard();
        assert_eq!(paths.device(1), PathBuf::from("/dev/fb1"));
        assert_eq!(paths.tty(7), PathBuf::from("/dev/tty7"));

        let paths = DevicePaths::devfs();
        assert_eq!(paths.device(2), PathBuf::from("/dev/fb/2"));
        assert_eq!(paths.tty(3), PathBuf::from("/dev/vc/3"));
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_toml(
            "device = \"/dev/fb1\"\n[paths]\ntty_template = \"/dev/vc/{}\"\n",
        )
        .unwrap();

        assert_eq!(config.device, Some(PathBuf::from("/dev/fb1")));
        assert_eq!(config.paths.tty_template, "/dev/vc/{}");
        assert_eq!(config.paths.device_template, "/dev/fb{}");
        assert_eq!(config.modes_file, PathBuf::from("/etc/fb.modes"));
    }

    #[test]
    fn test_bad_config() {
        assert!(Config::from_toml("device = 3").is_err());
    }
}

//! TOML configuration
//!
//! Describes the flashing tool and the flash part, for setups that differ
//! from the stock hardware:
//!
//! ```toml
//! [loader]
//! path = "/opt/openFPGALoader/bin/openFPGALoader"
//! cable = "dirtyJtag"
//!
//! [geometry]
//! page_size = "1 KiB"
//! sector_size = 0x10000
//! ```
//!
//! Every key is optional. The `TILIQUA_OPENFPGALOADER` environment variable
//! takes precedence over `loader.path`.

use std::fmt;
use std::format;
use std::fs;
use std::path::Path;
use std::string::{String, ToString};

use serde::Deserialize;

use crate::layout::FlashGeometry;

/// Environment variable overriding the flashing tool path
pub const LOADER_PATH_ENV: &str = "TILIQUA_OPENFPGALOADER";

/// Errors from loading a configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read
    Io(String),
    /// File is not valid configuration
    Parse(String),
    /// A geometry value is zero or not a power of two
    InvalidGeometry {
        /// Key name
        field: &'static str,
        /// Configured value
        value: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cannot read configuration: {}", msg),
            Self::Parse(msg) => write!(f, "invalid configuration: {}", msg),
            Self::InvalidGeometry { field, value } => write!(
                f,
                "geometry.{} must be a non-zero power of two, got 0x{:x}",
                field, value
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Flashing tool settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Path to the `openFPGALoader` executable
    pub path: Option<String>,
    /// Cable name passed to the tool
    pub cable: Option<String>,
}

/// Flash part settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeometryConfig {
    /// Program page size
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    pub page_size: Option<u32>,
    /// Erase sector size
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    pub sector_size: Option<u32>,
}

/// Configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlashConfig {
    /// `[loader]` table
    #[serde(default)]
    pub loader: LoaderConfig,
    /// `[geometry]` table
    #[serde(default)]
    pub geometry: GeometryConfig,
}

/// Deserialize an optional size that can be an integer or a string
fn deserialize_opt_size<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeOrStr {
        Int(u32),
        Str(String),
    }

    match SizeOrStr::deserialize(deserializer)? {
        SizeOrStr::Int(n) => Ok(Some(n)),
        SizeOrStr::Str(s) => parse_size(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a size like "4096", "0x1000" or "64 KiB"
fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex.trim(), 16).map_err(|e| format!("invalid hex: {}", e));
    }

    let lower = s.to_lowercase();
    let (digits, multiplier) = if let Some(n) = lower.strip_suffix("mib") {
        (n, 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kib") {
        (n, 1024)
    } else {
        (lower.as_str(), 1)
    };
    let n: u32 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size: {}", s))?;
    n.checked_mul(multiplier)
        .ok_or_else(|| format!("size out of range: {}", s))
}

impl FlashConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.geometry()?;
        Ok(config)
    }

    /// Apply the loader path override, if set
    pub fn with_loader_path_override(mut self, path: Option<String>) -> Self {
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            log::debug!("Loader path overridden by {}: {}", LOADER_PATH_ENV, path);
            self.loader.path = Some(path);
        }
        self
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Self {
        self.with_loader_path_override(std::env::var(LOADER_PATH_ENV).ok())
    }

    /// Flash geometry, falling back to the stock part for unset keys
    pub fn geometry(&self) -> Result<FlashGeometry, ConfigError> {
        let defaults = FlashGeometry::default();
        let page_size = self.geometry.page_size.unwrap_or(defaults.page_size);
        let sector_size = self.geometry.sector_size.unwrap_or(defaults.sector_size);
        for (field, value) in [("page_size", page_size), ("sector_size", sector_size)] {
            if !value.is_power_of_two() {
                return Err(ConfigError::InvalidGeometry { field, value });
            }
        }
        Ok(FlashGeometry {
            page_size,
            sector_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x10000"), Ok(0x10000));
        assert_eq!(parse_size("64 KiB"), Ok(0x10000));
        assert_eq!(parse_size("1MiB"), Ok(0x100000));
        assert!(parse_size("lots").is_err());
        assert!(parse_size("8192 MiB").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[loader]
path = "/usr/local/bin/openFPGALoader"
cable = "ft2232"

[geometry]
page_size = 256
sector_size = "0x1000"
"#;
        let config = FlashConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            config.loader.path.as_deref(),
            Some("/usr/local/bin/openFPGALoader")
        );
        assert_eq!(config.loader.cable.as_deref(), Some("ft2232"));
        assert_eq!(
            config.geometry().unwrap(),
            FlashGeometry {
                page_size: 256,
                sector_size: 0x1000
            }
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = FlashConfig::from_toml_str("").unwrap();
        assert_eq!(config, FlashConfig::default());
        assert_eq!(config.geometry().unwrap(), FlashGeometry::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = FlashConfig::from_toml_str("[geometry]\nsector_size = 3000\n").unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidGeometry {
                field: "sector_size",
                value: 3000
            }
        );

        let err = FlashConfig::from_toml_str("[loader]\nbaud = 9600\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_loader_path_override() {
        let config = FlashConfig::from_toml_str("[loader]\npath = \"a\"\n").unwrap();
        let config = config.with_loader_path_override(Some("b".to_string()));
        assert_eq!(config.loader.path.as_deref(), Some("b"));

        let config = config.with_loader_path_override(Some(String::new()));
        assert_eq!(config.loader.path.as_deref(), Some("b"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.toml");
        fs::write(&path, "[geometry]\npage_size = \"1 KiB\"\n").unwrap();
        let config = FlashConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.geometry.page_size, Some(1024));

        let err = FlashConfig::from_toml_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

use crate::export::{ExportOptions, DEFAULT_SHEET_LABEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
///
/// Lives in `<config dir>/stockdash/config.toml`. Every field has a default,
/// so a missing file or a file with only a couple of keys both work.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Load config from default location, defaults if there's no file
    pub fn load() -> crate::Result<Self> {
        Self::load_from(Self::config_path()?)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)
                .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            // No config file? Use defaults
            Ok(Self::default())
        }
    }

    /// Save config to disk
    pub fn save(&self) -> crate::Result<()> {
        self.save_to(Self::config_path()?)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();

        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the config file path
    /// Uses XDG on Linux, Application Support on macOS, AppData on Windows
    pub fn config_path() -> crate::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?
            .join("stockdash");

        Ok(config_dir.join("config.toml"))
    }

    /// Where the settings database lives: configured path or the platform data dir
    pub fn database_path(&self) -> crate::Result<PathBuf> {
        if let Some(path) = &self.storage.database_path {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find data directory".into()))?;
        Ok(data_dir.join("stockdash").join("storage.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// Override for the SQLite file holding settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// Directory exported workbooks are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_max_column_width")]
    pub max_column_width: usize,

    #[serde(default = "default_column_padding")]
    pub column_padding: usize,

    #[serde(default = "default_sheet_label")]
    pub default_sheet_label: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_column_width() -> usize {
    50 // wider than this and nobody can read the sheet next to it
}

fn default_column_padding() -> usize {
    2
}

fn default_sheet_label() -> String {
    DEFAULT_SHEET_LABEL.to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_column_width: default_max_column_width(),
            column_padding: default_column_padding(),
            default_sheet_label: default_sheet_label(),
        }
    }
}

impl ExportConfig {
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            max_column_width: self.max_column_width,
            column_padding: self.column_padding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.export.max_column_width, 50);
        assert_eq!(config.export.column_padding, 2);
        assert_eq!(config.export.default_sheet_label, "Sheet1");
        assert_eq!(config.export.options(), ExportOptions::default());
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("max_column_width"));
        assert!(toml.contains("output_dir"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str("[export]\nmax_column_width = 80\n").unwrap();
        assert_eq!(config.export.max_column_width, 80);
        assert_eq!(config.export.column_padding, 2);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        let mut config = Config::default();
        config.storage.database_path = Some(dir.path().join("db.sqlite"));
        config.export.output_dir = dir.path().join("out");
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
        assert_eq!(config.database_path().unwrap(), dir.path().join("db.sqlite"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(crate::Error::ConfigError(_))
        ));
    }
}

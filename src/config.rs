//! Configuration file (`vtcall.toml`)
//!
//! Every section and field is optional; missing values take their defaults.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [window]
//! title = "Hello, Triangle!"
//! width = 800
//! height = 600
//!
//! [render]
//! clear_color = [0.0, 0.2, 0.4, 1.0]
//! sync_interval = 1
//!
//! [com]
//! apartment = "sta"
//! ```

use crate::com::ApartmentKind;
use crate::logging::{parse_level, LogConfig, LogFormat, LogOutput};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File names searched by `discover`, in order
pub const CONFIG_FILE_NAMES: [&str; 2] = ["vtcall.toml", ".vtcall.toml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub com: ComConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Log file; stderr when absent
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default = "default_false")]
    pub spans: bool,

    /// Extra filter directives
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// RGBA in 0.0..=1.0
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],

    /// Present interval; 0 presents immediately
    #[serde(default)]
    pub sync_interval: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComConfig {
    #[serde(default)]
    pub apartment: ApartmentKind,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            file: None,
            spans: false,
            filter: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: default_clear_color(),
            sync_interval: 0,
        }
    }
}

fn default_false() -> bool { false }
fn default_level() -> String { "info".to_string() }
fn default_title() -> String { "Hello, World!".to_string() }
fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_clear_color() -> [f32; 4] { [1.0, 1.0, 1.0, 1.0] }

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search `start` and its parents for a config file; defaults if none
    pub fn discover_from(start: &Path) -> Result<Self, ConfigError> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            for name in CONFIG_FILE_NAMES {
                let path = dir.join(name);
                if path.is_file() {
                    tracing::debug!(path = %path.display(), "config file found");
                    return Self::load(&path);
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(Self::default())
    }

    /// `discover_from` the current directory
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if parse_level(&self.logging.level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level {:?}",
                self.logging.level
            )));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be non-zero",
                self.window.width, self.window.height
            )));
        }
        if let Some(c) = self
            .render
            .clear_color
            .iter()
            .find(|c| !(0.0..=1.0).contains(*c))
        {
            return Err(ConfigError::Invalid(format!(
                "clear color component {} outside 0.0..=1.0",
                c
            )));
        }
        Ok(())
    }

    /// Logging settings, with environment variables taking precedence
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::default().with_format(self.logging.format);
        if let Some(level) = parse_level(&self.logging.level) {
            config = config.with_level(level);
        }
        if let Some(file) = &self.logging.file {
            config = config.with_output(LogOutput::file(file));
        }
        if let Some(filter) = &self.logging.filter {
            config = config.with_filter(filter.clone());
        }
        config.show_spans = self.logging.spans;
        config.with_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.render.clear_color, [1.0; 4]);
        assert_eq!(config.com.apartment, ApartmentKind::Mta);
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r#"
            [logging]
            level = "debug"
            format = "json"

            [window]
            title = "Hello, Triangle!"
            width = 800

            [render]
            clear_color = [0.0, 0.2, 0.4, 1.0]
            sync_interval = 1

            [com]
            apartment = "sta"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.window.title, "Hello, Triangle!");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.render.sync_interval, 1);
        assert_eq!(config.com.apartment, ApartmentKind::Sta);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Config::parse("[window]\nwidth = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[logging]\nlevel = \"loud\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[render]\nclear_color = [2.0, 0.0, 0.0, 1.0]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[window\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[window]\ntitle = \"from file\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.window.title, "from file");

        let missing = Config::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_discover_walks_parents() {
        let root = tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join("vtcall.toml"), "[window]\nheight = 720\n").unwrap();

        let config = Config::discover_from(&nested).unwrap();
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn test_log_config_mapping() {
        let config = Config::parse("[logging]\nlevel = \"warn\"\nfile = \"logs/run.log\"").unwrap();
        let log = config.log_config();
        if std::env::var("VTCALL_LOG_LEVEL").is_err() {
            assert_eq!(log.level, tracing::Level::WARN);
        }
        if std::env::var("VTCALL_LOG_FILE").is_err() {
            assert_eq!(log.output, LogOutput::file("logs/run.log"));
        }
    }
}

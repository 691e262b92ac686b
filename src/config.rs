use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, TrimoraError};
use crate::files;

fn default_naming_pattern() -> String {
    "{name}_trimmed_{timestamp}".to_string()
}

fn default_recent_files_count() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Explicit ffmpeg binary; discovered when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe binary; looked up next to ffmpeg when unset
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
    /// Kill a run that takes longer than this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where generated output names are placed
    pub directory: PathBuf,
    /// `{name}` and `{timestamp}` are substituted
    #[serde(default = "default_naming_pattern")]
    pub naming_pattern: String,
    /// Open the result in the system viewer after a successful trim
    #[serde(default)]
    pub auto_open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_recent_files_count")]
    pub recent_files_count: usize,
    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: files::default_output_dir(),
            naming_pattern: default_naming_pattern(),
            auto_open: false,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            recent_files_count: default_recent_files_count(),
            log_level: default_log_level(),
        }
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

impl Config {
    /// Read a `.json` or `.toml` configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TrimoraError::Config(format!("Failed to read config file: {}", e)))?;

        if is_toml(path) {
            toml::from_str(&content)
                .map_err(|e| TrimoraError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| TrimoraError::Config(format!("Failed to parse config file: {}", e)))
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| TrimoraError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)?
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, content)
            .map_err(|e| TrimoraError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }

        info!("No config at {}, writing defaults", path.display());
        let config = Self::default();
        config.save_to_file(path)?;
        Ok(config)
    }

    /// `config.json` in the per-user configuration directory.
    pub fn default_path() -> PathBuf {
        files::config_dir().join("config.json")
    }
}

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::debug;

use crate::error::Result;
use crate::validation::sanitize_filename;

/// Entries kept in the recent-files list on disk.
const RECENT_FILES_CAPACITY: usize = 10;

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Per-user configuration directory for trimora.
pub fn config_dir() -> PathBuf {
    let dir = if cfg!(target_os = "windows") {
        env_path("APPDATA").map(|dir| dir.join("Trimora"))
    } else if cfg!(target_os = "macos") {
        env_path("HOME").map(|home| home.join("Library").join("Application Support").join("Trimora"))
    } else {
        env_path("XDG_CONFIG_HOME")
            .map(|dir| dir.join("trimora"))
            .or_else(|| env_path("HOME").map(|home| home.join(".config").join("trimora")))
    };

    dir.unwrap_or_else(|| PathBuf::from(".trimora"))
}

/// `~/Videos/Trimmed`, or the current directory when there is no home.
pub fn default_output_dir() -> PathBuf {
    let home = if cfg!(target_os = "windows") {
        env_path("USERPROFILE")
    } else {
        env_path("HOME")
    };

    home.map(|home| home.join("Videos").join("Trimmed"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Local time as `YYYYMMDD_HHMMSS`.
pub fn timestamp_string() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Output path for `input` in `output_dir` following `pattern`.
pub fn generate_output_filename(input: &Path, output_dir: &Path, pattern: &str) -> PathBuf {
    output_filename_with_stamp(input, output_dir, pattern, &timestamp_string())
}

/// Substitute `{name}` and `{timestamp}`, keep the input's extension and
/// append `_1`, `_2`, ... until the name is free.
pub fn output_filename_with_stamp(input: &Path, output_dir: &Path, pattern: &str, stamp: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let base = sanitize_filename(&pattern.replace("{name}", &stem).replace("{timestamp}", stamp))
        .replace(['/', '\\'], "_");

    let mut candidate = output_dir.join(format!("{}{}", base, extension));
    let mut counter = 1;
    while candidate.exists() {
        candidate = output_dir.join(format!("{}_{}{}", base, counter, extension));
        counter += 1;
    }

    debug!("Generated output name {}", candidate.display());
    candidate
}

/// Most-recently-used output files, newest first, one path per line.
#[derive(Debug, Clone)]
pub struct RecentFiles {
    path: PathBuf,
}

impl RecentFiles {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `recent_files.txt` in the configuration directory.
    pub fn in_config_dir() -> Self {
        Self::new(config_dir().join("recent_files.txt"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Vec<String> {
        std::fs::read_to_string(&self.path)
            .map(|content| {
                content
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Move `file` to the front of the list.
    pub fn add(&self, file: &Path) -> Result<()> {
        let file = file.to_string_lossy().into_owned();
        let mut entries: Vec<String> = self.read_entries().into_iter().filter(|e| *e != file).collect();
        entries.insert(0, file);
        entries.truncate(RECENT_FILES_CAPACITY);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut content = entries.join("\n");
        content.push('\n');
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Up to `max_count` entries that still exist on disk.
    pub fn list(&self, max_count: usize) -> Vec<PathBuf> {
        self.read_entries()
            .into_iter()
            .map(PathBuf::from)
            .filter(|path| path.exists())
            .take(max_count)
            .collect()
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

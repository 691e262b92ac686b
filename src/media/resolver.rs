use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Install locations checked before falling back to `PATH`.
pub fn well_known_paths(binary_name: &str) -> Vec<PathBuf> {
    let dirs: &[&str] = if cfg!(target_os = "windows") {
        &["C:\\ffmpeg\\bin", "C:\\Program Files\\ffmpeg\\bin"]
    } else if cfg!(target_os = "macos") {
        &["/opt/homebrew/bin", "/usr/local/bin", "/opt/local/bin", "/usr/bin"]
    } else {
        &["/usr/bin", "/usr/local/bin", "/bin"]
    };

    let file_name = if cfg!(target_os = "windows") {
        format!("{}.exe", binary_name)
    } else {
        binary_name.to_string()
    };

    dirs.iter().map(|dir| Path::new(dir).join(&file_name)).collect()
}

/// First existing file among `search_roots`, otherwise whatever `fallback_lookup` finds.
pub fn resolve<F>(search_roots: &[PathBuf], fallback_lookup: F) -> Option<PathBuf>
where
    F: FnOnce() -> Option<PathBuf>,
{
    search_roots
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .or_else(fallback_lookup)
        .filter(|path| path.is_file())
}

/// First line of `<binary> -version`, if the binary runs at all.
pub fn probe_version(binary: &Path) -> Option<String> {
    let output = Command::new(binary).arg("-version").output().ok()?;
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };

    text.lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// Located media binary and its version, discovered once at construction.
#[derive(Debug, Clone, Default)]
pub struct BinaryResolver {
    path: Option<PathBuf>,
    version: Option<String>,
}

impl BinaryResolver {
    /// Look for `binary_name`: the explicit override first, then the
    /// well-known install paths, then `PATH`.
    pub fn discover(binary_name: &str, override_path: Option<&Path>) -> Self {
        let mut roots: Vec<PathBuf> = override_path.map(Path::to_path_buf).into_iter().collect();
        roots.extend(well_known_paths(binary_name));

        let path = resolve(&roots, || which::which(binary_name).ok());
        Self::from_resolved(binary_name, path)
    }

    /// Use exactly `path`; not found if it is not a file.
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Self::from_resolved(&name, Some(path).filter(|p| p.is_file()))
    }

    /// A resolver that never finds anything.
    pub fn unavailable() -> Self {
        Self::default()
    }

    fn from_resolved(binary_name: &str, path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => {
                let version = probe_version(&path);
                info!("Found {} at {}", binary_name, path.display());
                debug!("{} version: {}", binary_name, version.as_deref().unwrap_or("unknown"));
                Self {
                    path: Some(path),
                    version,
                }
            }
            None => {
                warn!("{} not found in well-known locations or PATH", binary_name);
                Self::default()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.path.as_deref().is_some_and(Path::is_file)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_first_existing_root() {
        let dir = tempfile::tempdir().unwrap();
        let second = dir.path().join("second");
        let third = dir.path().join("third");
        std::fs::write(&second, b"").unwrap();
        std::fs::write(&third, b"").unwrap();

        let roots = vec![dir.path().join("first"), second.clone(), third];
        let found = resolve(&roots, || panic!("fallback must not run"));
        assert_eq!(found, Some(second));
    }

    #[test]
    fn test_resolve_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let on_path = dir.path().join("ffmpeg");
        std::fs::write(&on_path, b"").unwrap();

        let roots = vec![dir.path().join("missing")];
        assert_eq!(resolve(&roots, || Some(on_path.clone())), Some(on_path));
        assert_eq!(resolve(&roots, || None), None);
        assert_eq!(resolve(&roots, || Some(dir.path().join("gone"))), None);
    }

    #[test]
    fn test_unavailable_resolver() {
        let resolver = BinaryResolver::unavailable();
        assert!(!resolver.is_available());
        assert!(resolver.path().is_none());
        assert!(resolver.version().is_none());

        let resolver = BinaryResolver::with_path("/definitely/not/here/ffmpeg");
        assert!(!resolver.is_available());
    }

    #[test]
    fn test_well_known_paths_use_binary_name() {
        let paths = well_known_paths("ffprobe");
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| p.to_string_lossy().contains("ffprobe")));
    }
}

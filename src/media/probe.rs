use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use super::resolver::BinaryResolver;

/// Read-only duration lookup through ffprobe.
///
/// Every failure collapses to `0.0`, meaning "percentage unavailable".
#[derive(Debug, Clone)]
pub struct DurationProbe {
    binary_path: Option<PathBuf>,
}

impl DurationProbe {
    pub fn new(resolver: &BinaryResolver) -> Self {
        Self {
            binary_path: resolver.path().map(Path::to_path_buf),
        }
    }

    /// ffprobe next to the given ffmpeg, else the usual discovery.
    pub fn beside(ffmpeg: &BinaryResolver, override_path: Option<&Path>) -> Self {
        if override_path.is_none() {
            let sibling = ffmpeg.path().and_then(Path::parent).map(|dir| {
                dir.join(if cfg!(target_os = "windows") { "ffprobe.exe" } else { "ffprobe" })
            });
            if let Some(sibling) = sibling.filter(|p| p.is_file()) {
                return Self {
                    binary_path: Some(sibling),
                };
            }
        }
        Self::new(&BinaryResolver::discover("ffprobe", override_path))
    }

    pub fn is_available(&self) -> bool {
        self.binary_path.is_some()
    }

    pub fn binary_path(&self) -> Option<&Path> {
        self.binary_path.as_deref()
    }

    /// Container duration in seconds, or 0.0.
    pub async fn duration_seconds(&self, media: &Path) -> f64 {
        let Some(binary) = &self.binary_path else {
            debug!("No ffprobe available, duration unknown for {}", media.display());
            return 0.0;
        };

        let output = Command::new(binary)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(media)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let duration = parse_duration_output(&String::from_utf8_lossy(&output.stdout));
                debug!("Probed duration of {}: {:.3}s", media.display(), duration);
                duration
            }
            Ok(output) => {
                warn!(
                    "ffprobe failed for {}: {}",
                    media.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                0.0
            }
            Err(e) => {
                warn!("Failed to execute ffprobe: {}", e);
                0.0
            }
        }
    }
}

fn parse_duration_output(stdout: &str) -> f64 {
    stdout
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_output() {
        assert_eq!(parse_duration_output("12.345000\n"), 12.345);
        assert_eq!(parse_duration_output("N/A\n"), 0.0);
        assert_eq!(parse_duration_output(""), 0.0);
        assert_eq!(parse_duration_output("-3\n"), 0.0);
    }

    #[tokio::test]
    async fn test_missing_probe_yields_zero() {
        let probe = DurationProbe::new(&BinaryResolver::unavailable());
        assert!(!probe.is_available());
        assert_eq!(probe.duration_seconds(Path::new("whatever.mp4")).await, 0.0);
    }
}

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

const DANGEROUS_CHARS: [char; 7] = [';', '&', '|', '$', '`', '\n', '\r'];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File is not readable: {0}")]
    FileNotReadable(String),

    #[error("Path is not a regular file: {0}")]
    InvalidFormat(String),

    #[error("Output directory does not exist: {0}")]
    OutputDirMissing(String),

    #[error("Output directory is not writable: {0}")]
    OutputNotWritable(String),

    #[error("Path contains characters that are not allowed: {0}")]
    PathContainsDangerousChars(String),
}

/// Input must exist, be a regular file and be openable for reading.
pub fn validate_input_file(path: &Path) -> Result<(), ValidationError> {
    let shown = path.display().to_string();

    if !path.exists() {
        return Err(ValidationError::FileNotFound(shown));
    }
    if !path.is_file() {
        return Err(ValidationError::InvalidFormat(shown));
    }
    File::open(path).map_err(|_| ValidationError::FileNotReadable(shown))?;

    Ok(())
}

/// The output's parent directory must exist and not be read-only.
pub fn validate_output_path(path: &Path) -> Result<(), ValidationError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let shown = parent.display().to_string();

    let metadata = std::fs::metadata(parent).map_err(|_| ValidationError::OutputDirMissing(shown.clone()))?;
    if !metadata.is_dir() {
        return Err(ValidationError::OutputDirMissing(shown));
    }
    if metadata.permissions().readonly() {
        return Err(ValidationError::OutputNotWritable(shown));
    }

    Ok(())
}

/// Cheap container sniff: an MP4 carries `ftyp` at bytes 4..8.
pub fn is_valid_mp4(path: &Path) -> bool {
    let mut header = [0u8; 12];
    match File::open(path).and_then(|mut file| file.read_exact(&mut header)) {
        Ok(()) => &header[4..8] == b"ftyp",
        Err(_) => false,
    }
}

pub fn contains_dangerous_chars(path: &str) -> bool {
    path.chars().any(|c| DANGEROUS_CHARS.contains(&c))
}

/// Replace shell metacharacters and newlines with underscores.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if DANGEROUS_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"data").unwrap();

        assert!(validate_input_file(&file).is_ok());
        assert!(matches!(
            validate_input_file(&dir.path().join("missing.mp4")),
            Err(ValidationError::FileNotFound(_))
        ));
        assert!(matches!(
            validate_input_file(dir.path()),
            Err(ValidationError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_validate_output_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_output_path(&dir.path().join("out.mp4")).is_ok());
        assert!(matches!(
            validate_output_path(&dir.path().join("nested").join("out.mp4")),
            Err(ValidationError::OutputDirMissing(_))
        ));
    }

    #[test]
    fn test_is_valid_mp4() {
        let dir = tempfile::tempdir().unwrap();

        let mp4 = dir.path().join("a.mp4");
        let mut file = File::create(&mp4).unwrap();
        file.write_all(&[0, 0, 0, 0x20, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm']).unwrap();
        assert!(is_valid_mp4(&mp4));

        let short = dir.path().join("b.mp4");
        std::fs::write(&short, b"ftyp").unwrap();
        assert!(!is_valid_mp4(&short));

        let text = dir.path().join("c.mp4");
        std::fs::write(&text, b"hello world, not a movie").unwrap();
        assert!(!is_valid_mp4(&text));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a;b&c|d$e`f"), "a_b_c_d_e_f");
        assert_eq!(sanitize_filename("my clip (1).mp4"), "my clip (1).mp4");
        assert!(contains_dangerous_chars("x; rm -rf"));
        assert!(!contains_dangerous_chars("holiday 2024.mp4"));
    }
}

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::timestamp::TimestampError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum TrimoraError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("FFmpeg not found: {0}")]
    BinaryNotFound(String),

    #[error("Input file does not exist: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Failed to create output directory {}: {source}", .path.display())]
    OutputDirCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to execute FFmpeg: {0}")]
    SubprocessLaunchFailed(String),

    #[error("FFmpeg exited with code: {}{}", code_text(.code), detail_text(.detail))]
    SubprocessNonZeroExit { code: Option<i32>, detail: String },

    #[error("Exception: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("FFmpeg did not finish within {0:?}")]
    Timeout(Duration),

    #[error("A trim operation is already running")]
    Busy,

    #[error("Invalid trim request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn code_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

fn detail_text(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(" ({})", detail)
    }
}

pub type Result<T> = std::result::Result<T, TrimoraError>;

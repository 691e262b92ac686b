//! Trimora - fast MP4 trimming on top of ffmpeg
//!
//! Builds ffmpeg argument vectors for single-range and multi-segment trims,
//! runs them as child processes and streams parsed progress back to the
//! caller. Runs can be cancelled at any time, which kills the ffmpeg child.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod files;
pub mod media;
pub mod progress;
pub mod request;
pub mod segment;
pub mod timestamp;
pub mod validation;

pub use error::{Result, TrimoraError};
pub use executor::{CancelToken, ExecutorState, RunHandle, RunOutcome, RunStatus, TrimExecutor};
pub use progress::ProgressSample;
pub use request::TrimRequest;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::segment::TrimSegment;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (.json or .toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cut one range out of a video
    Trim {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file; generated from the naming pattern when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Start time (HH:MM:SS.mmm or seconds)
        #[arg(short, long)]
        start: String,

        /// End time (HH:MM:SS.mmm or seconds)
        #[arg(short, long)]
        end: String,

        /// Re-encode instead of stream copy (frame-accurate, slower)
        #[arg(long)]
        reencode: bool,
    },

    /// Cut several ranges and merge them, or write one file each
    Segments {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (merged) or base name (separate files)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Segment as START,END[,LABEL]; repeat for more segments
        #[arg(short = 'S', long = "segment", required = true, value_parser = parse_segment)]
        segments: Vec<TrimSegment>,

        /// Write each segment to its own file instead of merging
        #[arg(long)]
        separate: bool,

        /// Re-encode instead of stream copy
        #[arg(long)]
        reencode: bool,
    },

    /// Print the duration of a media file
    Probe {
        /// Media file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show which ffmpeg/ffprobe would be used
    Check,

    /// Manage the recent files list
    Recent {
        #[command(subcommand)]
        action: RecentAction,
    },
}

#[derive(Subcommand)]
pub enum RecentAction {
    /// List recently written files
    List,

    /// Forget all recent files
    Clear,
}

/// Parse `START,END[,LABEL]`.
pub fn parse_segment(value: &str) -> Result<TrimSegment, String> {
    let mut parts = value.splitn(3, ',');
    let start = parts.next().map(str::trim).unwrap_or_default();
    let end = parts
        .next()
        .map(str::trim)
        .ok_or_else(|| format!("expected START,END[,LABEL], got '{}'", value))?;
    let label = parts.next().map(str::trim).unwrap_or_default();

    let segment = TrimSegment::new(start, end).named(label);
    segment.bounds().map_err(|e| e.to_string())?;
    Ok(segment)
}

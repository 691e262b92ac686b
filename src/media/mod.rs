// Media binary plumbing
//
// - Resolver: finds ffmpeg/ffprobe and reads their version
// - Commands: argument vectors and multi-step plans for trim requests
// - Probe: duration lookup used to turn progress into a percentage

pub mod commands;
pub mod probe;
pub mod resolver;

pub use commands::*;
pub use probe::*;
pub use resolver::*;

use crate::config::MediaConfig;

/// The media binaries a trim executor works with.
#[derive(Debug, Clone)]
pub struct MediaTools {
    pub ffmpeg: BinaryResolver,
    pub probe: DurationProbe,
}

impl MediaTools {
    /// Discover ffmpeg and ffprobe, honouring configured overrides.
    pub fn discover(config: &MediaConfig) -> Self {
        let ffmpeg = BinaryResolver::discover("ffmpeg", config.ffmpeg_path.as_deref());
        let probe = DurationProbe::beside(&ffmpeg, config.ffprobe_path.as_deref());
        Self { ffmpeg, probe }
    }

    pub fn new(ffmpeg: BinaryResolver, probe: DurationProbe) -> Self {
        Self { ffmpeg, probe }
    }
}

use std::path::PathBuf;

use crate::error::{Result, TrimoraError};
use crate::media::segment_output_path;
use crate::segment::{ExportMode, TrimSegment};

/// Immutable description of one trim operation.
///
/// A single-range trim is a request with one segment. With several enabled
/// segments, `export_mode` decides between one merged output and one file per
/// segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub segments: Vec<TrimSegment>,
    /// `-c copy`: no re-encode, cuts land on keyframes
    pub use_copy_codec: bool,
    pub export_mode: ExportMode,
}

/// An enabled segment with its bounds already resolved to seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSegment {
    pub index: usize,
    pub name: String,
    pub start: f64,
    pub end: f64,
}

impl ResolvedSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl TrimRequest {
    pub fn single<P: Into<PathBuf>, Q: Into<PathBuf>>(
        input: P,
        output: Q,
        start: &str,
        end: &str,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            segments: vec![TrimSegment::new(start, end)],
            use_copy_codec: true,
            export_mode: ExportMode::MergeAll,
        }
    }

    pub fn with_copy_codec(mut self, use_copy_codec: bool) -> Self {
        self.use_copy_codec = use_copy_codec;
        self
    }

    pub fn with_export_mode(mut self, mode: ExportMode) -> Self {
        self.export_mode = mode;
        self
    }

    /// Enabled segments in list order, each checked for `start < end`.
    ///
    /// Overlapping or out-of-order segments are accepted as given.
    pub fn resolved_segments(&self) -> Result<Vec<ResolvedSegment>> {
        let resolved = self
            .segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.enabled)
            .map(|(index, segment)| {
                let (start, end) = segment.bounds()?;
                Ok(ResolvedSegment {
                    index,
                    name: segment.name.clone(),
                    start,
                    end,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if resolved.is_empty() {
            return Err(TrimoraError::InvalidRequest(
                "no enabled segments to export".to_string(),
            ));
        }

        Ok(resolved)
    }

    /// Files a successful run leaves behind.
    pub fn output_paths(&self) -> Result<Vec<PathBuf>> {
        let segments = self.resolved_segments()?;
        if segments.len() > 1 && self.export_mode == ExportMode::SeparateFiles {
            Ok(segments
                .iter()
                .enumerate()
                .map(|(ordinal, segment)| segment_output_path(&self.output, ordinal + 1, &segment.name))
                .collect())
        } else {
            Ok(vec![self.output.clone()])
        }
    }
}

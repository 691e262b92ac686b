use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::request::TrimRequest;
use crate::timestamp::{self, TimestampError};

/// One `[start, end)` range of the source to keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimSegment {
    /// `HH:MM:SS.mmm` or decimal seconds
    pub start_time: String,
    pub end_time: String,
    /// Optional label, used in derived output names
    #[serde(default)]
    pub name: String,
    /// Disabled segments stay in the list but are skipped on export
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TrimSegment {
    pub fn new<S1: Into<String>, S2: Into<String>>(start: S1, end: S2) -> Self {
        Self {
            start_time: start.into(),
            end_time: end.into(),
            name: String::new(),
            enabled: true,
        }
    }

    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Start and end in seconds, requiring `start < end`.
    pub fn bounds(&self) -> Result<(f64, f64), TimestampError> {
        timestamp::validate_time_range(&self.start_time, &self.end_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportMode {
    /// Join every enabled segment, in order, into one file
    #[default]
    MergeAll,
    /// One output file per enabled segment
    SeparateFiles,
}

/// Planning-time list of segments edited by the user before export.
#[derive(Debug, Clone, Default)]
pub struct SegmentManager {
    segments: Vec<TrimSegment>,
    export_mode: ExportMode,
}

impl SegmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_segment(&mut self, segment: TrimSegment) {
        self.segments.push(segment);
    }

    pub fn remove_segment(&mut self, index: usize) -> Option<TrimSegment> {
        (index < self.segments.len()).then(|| self.segments.remove(index))
    }

    pub fn update_segment(&mut self, index: usize, segment: TrimSegment) -> bool {
        match self.segments.get_mut(index) {
            Some(slot) => {
                *slot = segment;
                true
            }
            None => false,
        }
    }

    pub fn clear_segments(&mut self) {
        self.segments.clear();
    }

    /// Move a segment so it ends up at `to_index`; out-of-range indices are ignored.
    pub fn move_segment(&mut self, from_index: usize, to_index: usize) {
        let len = self.segments.len();
        if from_index >= len || to_index >= len || from_index == to_index {
            return;
        }
        let segment = self.segments.remove(from_index);
        self.segments.insert(to_index, segment);
    }

    pub fn segments(&self) -> &[TrimSegment] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&TrimSegment> {
        self.segments.get(index)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn has_segments(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn export_mode(&self) -> ExportMode {
        self.export_mode
    }

    pub fn set_export_mode(&mut self, mode: ExportMode) {
        self.export_mode = mode;
    }

    /// Check the segment's timestamps, prefixing which end was wrong.
    pub fn validate_segment(&self, segment: &TrimSegment) -> Result<(), String> {
        timestamp::validate_timestamp(&segment.start_time)
            .map_err(|e| format!("Invalid start time: {}", e))?;
        timestamp::validate_timestamp(&segment.end_time)
            .map_err(|e| format!("Invalid end time: {}", e))?;
        segment.bounds().map(|_| ()).map_err(|e| e.to_string())
    }

    /// True if any two enabled segments overlap, ignoring `exclude_index`.
    pub fn check_overlaps(&self, exclude_index: Option<usize>) -> bool {
        let ranges: Vec<(f64, f64)> = self
            .segments
            .iter()
            .enumerate()
            .filter(|(i, segment)| segment.enabled && Some(*i) != exclude_index)
            .map(|(_, segment)| {
                (
                    timestamp::timestamp_to_seconds(&segment.start_time).unwrap_or(0.0),
                    timestamp::timestamp_to_seconds(&segment.end_time).unwrap_or(0.0),
                )
            })
            .collect();

        ranges.iter().enumerate().any(|(i, (start_i, end_i))| {
            ranges[i + 1..]
                .iter()
                .any(|(start_j, end_j)| start_i < end_j && end_i > start_j)
        })
    }

    /// Build a request from the current list and export mode.
    pub fn to_request(&self, input: PathBuf, output: PathBuf, use_copy_codec: bool) -> TrimRequest {
        TrimRequest {
            input,
            output,
            segments: self.segments.clone(),
            use_copy_codec,
            export_mode: self.export_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(ranges: &[(&str, &str)]) -> SegmentManager {
        let mut manager = SegmentManager::new();
        for (start, end) in ranges {
            manager.add_segment(TrimSegment::new(*start, *end));
        }
        manager
    }

    #[test]
    fn test_add_remove_update() {
        let mut manager = manager_with(&[("0", "5"), ("10", "15")]);
        assert_eq!(manager.segment_count(), 2);

        assert!(manager.update_segment(1, TrimSegment::new("20", "25").named("outro")));
        assert_eq!(manager.segment(1).unwrap().name, "outro");
        assert!(!manager.update_segment(7, TrimSegment::new("0", "1")));

        assert_eq!(manager.remove_segment(0).unwrap().start_time, "0");
        assert!(manager.remove_segment(5).is_none());
        assert_eq!(manager.segment_count(), 1);

        manager.clear_segments();
        assert!(!manager.has_segments());
    }

    #[test]
    fn test_move_segment() {
        let mut manager = manager_with(&[("0", "1"), ("1", "2"), ("2", "3")]);
        manager.move_segment(0, 2);
        let starts: Vec<&str> = manager.segments().iter().map(|s| s.start_time.as_str()).collect();
        assert_eq!(starts, ["1", "2", "0"]);

        manager.move_segment(0, 9);
        let starts: Vec<&str> = manager.segments().iter().map(|s| s.start_time.as_str()).collect();
        assert_eq!(starts, ["1", "2", "0"]);
    }

    #[test]
    fn test_validate_segment_messages() {
        let manager = SegmentManager::new();
        assert!(manager.validate_segment(&TrimSegment::new("00:00:01.000", "2")).is_ok());

        let err = manager.validate_segment(&TrimSegment::new("00:70:00.000", "2")).unwrap_err();
        assert!(err.starts_with("Invalid start time: Invalid time values"));

        let err = manager.validate_segment(&TrimSegment::new("1", "")).unwrap_err();
        assert_eq!(err, "Invalid end time: Timestamp cannot be empty");

        let err = manager.validate_segment(&TrimSegment::new("5", "2")).unwrap_err();
        assert_eq!(err, "Start time must be less than end time");
    }

    #[test]
    fn test_check_overlaps() {
        let manager = manager_with(&[("0", "5"), ("5", "10")]);
        assert!(!manager.check_overlaps(None));

        let mut manager = manager_with(&[("0", "5"), ("4", "10"), ("20", "30")]);
        assert!(manager.check_overlaps(None));
        assert!(!manager.check_overlaps(Some(1)));

        manager.update_segment(1, TrimSegment::new("4", "10").disabled());
        assert!(!manager.check_overlaps(None));
    }

    #[test]
    fn test_to_request_carries_mode() {
        let mut manager = manager_with(&[("0", "5")]);
        manager.set_export_mode(ExportMode::SeparateFiles);
        let request = manager.to_request("in.mp4".into(), "out.mp4".into(), true);
        assert_eq!(request.export_mode, ExportMode::SeparateFiles);
        assert_eq!(request.segments.len(), 1);
        assert!(request.use_copy_codec);
    }
}

// ffmpeg progress lines
//
// - `-progress` protocol: only `out_time_us=` carries the position; `fps=` and
//   `speed=` arrive on their own lines, `out_time=`/`out_time_ms=` are ignored
// - status line: `frame=  120 fps= 30 ... time=00:00:04.00 bitrate=... speed=1.5x`
//
// Unrecognised lines yield an empty sample.

use std::sync::LazyLock;

use regex::Regex;

static OUT_TIME_US_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"out_time_us=(\d+)").expect("out_time_us pattern"));
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btime=(\d{2}):(\d{2}):(\d{2})\.(\d{2})").expect("time pattern"));
static FPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fps=\s*(\d+\.?\d*)").expect("fps pattern"));
static SPEED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"speed=\s*(\d+\.?\d*)x").expect("speed pattern"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    /// 0..=100
    pub percentage: f64,
    /// Media time written so far, in seconds
    pub elapsed_seconds: f64,
    /// `HH:MM:SS` for the protocol grammar, `HH:MM:SS.CC` for status lines
    pub current_time: String,
    pub fps: String,
    /// e.g. `1.5x`
    pub speed: String,
}

impl ProgressSample {
    /// The synthetic sample reported when a run completes.
    pub fn complete() -> Self {
        Self {
            percentage: 100.0,
            ..Self::default()
        }
    }

    pub fn has_position(&self) -> bool {
        !self.current_time.is_empty()
    }
}

fn percentage_of(elapsed: f64, total_duration: f64) -> f64 {
    if total_duration > 0.0 {
        (elapsed / total_duration * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn format_clock(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", whole / 3600, (whole % 3600) / 60, whole % 60)
}

/// Parse one line of output against a known total duration in seconds.
pub fn parse_progress_line(line: &str, total_duration: f64) -> ProgressSample {
    let mut sample = ProgressSample::default();

    if let Some(caps) = OUT_TIME_US_RE.captures(line) {
        if let Ok(micros) = caps[1].parse::<u64>() {
            let elapsed = micros as f64 / 1_000_000.0;
            sample.elapsed_seconds = elapsed;
            sample.percentage = percentage_of(elapsed, total_duration);
            sample.current_time = format_clock(elapsed);
        }
        return sample;
    }

    if let Some(caps) = TIME_RE.captures(line) {
        let field = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
        let centis = ((field(1) * 60 + field(2)) * 60 + field(3)) * 100 + field(4);
        let elapsed = centis as f64 / 100.0;
        sample.elapsed_seconds = elapsed;
        sample.percentage = percentage_of(elapsed, total_duration);
        sample.current_time = format!("{}:{}:{}.{}", &caps[1], &caps[2], &caps[3], &caps[4]);
    }

    if let Some(caps) = FPS_RE.captures(line) {
        sample.fps = caps[1].to_string();
    }

    if let Some(caps) = SPEED_RE.captures(line) {
        sample.speed = format!("{}x", &caps[1]);
    }

    sample
}

/// Folds per-line samples from a multi-step plan into overall progress.
///
/// Each step gets a weight (its media seconds); the reported percentage is
/// the weighted position across all steps and never decreases. `fps` and
/// `speed`, which the protocol reports on separate lines, are carried forward
/// onto the next positioned sample.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    weights: Vec<f64>,
    step: usize,
    last_percentage: f64,
    fps: String,
    speed: String,
}

impl ProgressTracker {
    pub fn new(weights: Vec<f64>) -> Self {
        Self {
            weights,
            step: 0,
            last_percentage: 0.0,
            fps: String::new(),
            speed: String::new(),
        }
    }

    pub fn begin_step(&mut self, step: usize) {
        self.step = step;
        self.fps.clear();
        self.speed.clear();
    }

    /// Duration to parse the current step's lines against.
    pub fn step_duration(&self) -> f64 {
        self.weights.get(self.step).copied().unwrap_or(0.0)
    }

    pub fn last_percentage(&self) -> f64 {
        self.last_percentage
    }

    /// Fold in a sample from the current step; `Some` when it carries a position.
    pub fn observe(&mut self, sample: ProgressSample) -> Option<ProgressSample> {
        if !sample.fps.is_empty() {
            self.fps = sample.fps.clone();
        }
        if !sample.speed.is_empty() {
            self.speed = sample.speed.clone();
        }
        if !sample.has_position() {
            return None;
        }

        let overall = self.overall_percentage(sample.percentage);
        self.last_percentage = self.last_percentage.max(overall);

        Some(ProgressSample {
            percentage: self.last_percentage,
            fps: if sample.fps.is_empty() { self.fps.clone() } else { sample.fps },
            speed: if sample.speed.is_empty() { self.speed.clone() } else { sample.speed },
            ..sample
        })
    }

    fn overall_percentage(&self, step_percentage: f64) -> f64 {
        let total: f64 = self.weights.iter().sum();
        if total <= 0.0 || self.weights.len() <= 1 {
            return step_percentage;
        }
        let done: f64 = self.weights.iter().take(self.step).sum();
        let current = self.step_duration() * step_percentage / 100.0;
        ((done + current) / total * 100.0).clamp(0.0, 100.0)
    }
}

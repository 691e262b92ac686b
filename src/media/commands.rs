use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::error::Result;
use crate::request::{ResolvedSegment, TrimRequest};
use crate::segment::ExportMode;
use crate::timestamp::format_seconds_arg;
use crate::validation::sanitize_filename;

/// One media binary invocation as an argument vector.
///
/// Arguments are handed to the process verbatim; nothing goes through a shell.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    pub binary_path: PathBuf,
    pub args: Vec<OsString>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<P: Into<PathBuf>, S: Into<String>>(binary_path: P, description: S) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// No banner, so stderr carries only diagnostics
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner")
    }

    /// Machine-readable `key=value` progress blocks on stdout
    pub fn progress_to_stdout(self) -> Self {
        self.arg("-progress").arg("pipe:1").arg("-nostats")
    }

    /// Input seek, in seconds
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(format_seconds_arg(seconds))
    }

    /// Output duration, in seconds
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format_seconds_arg(seconds))
    }

    /// Copy every stream without re-encoding
    pub fn copy_codec(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Human-readable form for logs; never executed.
    pub fn display(&self) -> String {
        std::iter::once(self.binary_path.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| {
                let part = part.to_string_lossy();
                if part.contains(' ') {
                    format!("\"{}\"", part)
                } else {
                    part.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Process ready to spawn with piped stdout/stderr, killed if dropped.
    pub fn to_command(&self) -> Command {
        debug!("Preparing media command: {}", self.display());
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// A step of a plan: one command plus how much of the run it accounts for.
#[derive(Debug)]
pub struct PlanStep {
    pub command: MediaCommand,
    pub output: PathBuf,
    /// Media seconds this step writes, used to weight overall progress
    pub media_seconds: f64,
    /// Seek position in the source, for steps that read it directly
    pub source_start: Option<f64>,
}

/// Ordered commands realising one request.
///
/// Merged exports keep their intermediate segment files in `workspace`, which
/// is removed when the plan is dropped.
#[derive(Debug)]
pub struct TrimPlan {
    pub steps: Vec<PlanStep>,
    pub outputs: Vec<PathBuf>,
    workspace: Option<TempDir>,
}

impl TrimPlan {
    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_ref().map(TempDir::path)
    }

    pub fn total_media_seconds(&self) -> f64 {
        self.steps.iter().map(|step| step.media_seconds).sum()
    }

    /// Shorten step weights that run past the end of a source of `source_seconds`.
    ///
    /// A concatenation step is re-weighted to the sum of the extractions it
    /// joins. Non-positive `source_seconds` (unknown) leaves the plan as is.
    pub fn clamp_to_source(&mut self, source_seconds: f64) {
        if source_seconds <= 0.0 {
            return;
        }
        let mut extracted = 0.0;
        for step in &mut self.steps {
            match step.source_start {
                Some(start) => {
                    step.media_seconds = step.media_seconds.min((source_seconds - start).max(0.0));
                    extracted += step.media_seconds;
                }
                None => step.media_seconds = extracted,
            }
        }
    }

    pub fn weights(&self) -> Vec<f64> {
        self.steps.iter().map(|step| step.media_seconds).collect()
    }
}

/// Builder for trim and concatenation commands
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    binary_path: PathBuf,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<P: Into<PathBuf>>(binary_path: P) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build a single-range trim.
    ///
    /// The range is expressed as seek plus duration rather than an absolute
    /// end, which keeps stream copy cuts the right length.
    pub fn trim<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
        start: f64,
        duration: f64,
        use_copy_codec: bool,
    ) -> MediaCommand {
        let cmd = MediaCommand::new(
            &self.binary_path,
            format!("Trim {}s from {}s", format_seconds_arg(duration), format_seconds_arg(start)),
        )
        .overwrite()
        .quiet()
        .progress_to_stdout()
        .seek(start)
        .input(input_path)
        .duration(duration);

        let cmd = if use_copy_codec { cmd.copy_codec() } else { cmd };
        cmd.output(output_path)
    }

    /// Build a lossless concatenation of the files named in `list_file`.
    pub fn concat<P: AsRef<Path>, Q: AsRef<Path>>(&self, list_file: P, output_path: Q) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Concatenate segments")
            .overwrite()
            .quiet()
            .progress_to_stdout()
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .input(list_file)
            .copy_codec()
            .output(output_path)
    }

    /// Turn a request into the commands that realise it.
    ///
    /// Must run after the output directory exists: merged exports stage their
    /// segments in a temporary directory next to the output.
    pub fn plan(&self, request: &TrimRequest) -> Result<TrimPlan> {
        let segments = request.resolved_segments()?;

        if segments.len() == 1 {
            let segment = &segments[0];
            return Ok(TrimPlan {
                steps: vec![self.segment_step(request, segment, request.output.clone())],
                outputs: vec![request.output.clone()],
                workspace: None,
            });
        }

        match request.export_mode {
            ExportMode::SeparateFiles => {
                let outputs = request.output_paths()?;
                let steps = segments
                    .iter()
                    .zip(&outputs)
                    .map(|(segment, output)| self.segment_step(request, segment, output.clone()))
                    .collect();
                Ok(TrimPlan {
                    steps,
                    outputs,
                    workspace: None,
                })
            }
            ExportMode::MergeAll => self.merge_plan(request, &segments),
        }
    }

    fn segment_step(&self, request: &TrimRequest, segment: &ResolvedSegment, output: PathBuf) -> PlanStep {
        PlanStep {
            command: self.trim(
                &request.input,
                &output,
                segment.start,
                segment.duration(),
                request.use_copy_codec,
            ),
            output,
            media_seconds: segment.duration(),
            source_start: Some(segment.start),
        }
    }

    fn merge_plan(&self, request: &TrimRequest, segments: &[ResolvedSegment]) -> Result<TrimPlan> {
        let parent = parent_dir(&request.output);
        let workspace = tempfile::Builder::new()
            .prefix(".trimora-")
            .tempdir_in(parent)?;
        let extension = extension_of(&request.input);

        let mut steps = Vec::with_capacity(segments.len() + 1);
        let mut list = String::new();
        for (ordinal, segment) in segments.iter().enumerate() {
            let file_name = format!("segment_{:03}.{}", ordinal, extension);
            list.push_str(&concat_list_entry(&file_name));
            steps.push(self.segment_step(request, segment, workspace.path().join(file_name)));
        }

        let list_file = workspace.path().join("segments.txt");
        std::fs::write(&list_file, list)?;

        let total: f64 = segments.iter().map(ResolvedSegment::duration).sum();
        steps.push(PlanStep {
            command: self.concat(&list_file, &request.output),
            output: request.output.clone(),
            media_seconds: total,
            source_start: None,
        });

        Ok(TrimPlan {
            steps,
            outputs: vec![request.output.clone()],
            workspace: Some(workspace),
        })
    }
}

/// `clip.mp4` + 2 + "intro" -> `clip_02_intro.mp4`, in the same directory.
pub fn segment_output_path(base: &Path, ordinal: usize, label: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segment".to_string());
    let label = sanitize_filename(label.trim()).replace(['/', '\\'], "_");

    let mut name = format!("{}_{:02}", stem, ordinal);
    if !label.is_empty() {
        name.push('_');
        name.push_str(&label);
    }
    name.push('.');
    name.push_str(&extension_of(base));

    parent_dir(base).join(name)
}

/// One line of an ffmpeg concat list, quoting the name literally.
fn concat_list_entry(file_name: &str) -> String {
    format!("file '{}'\n", file_name.replace('\'', "'\\''"))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string())
}

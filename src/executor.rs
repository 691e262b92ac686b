// Run controller for trim requests
//
// One active run per executor. `run_async` moves the request and callbacks
// into a spawned task; `run_blocking` drives the same worker on the caller's
// task. Cancelling or timing out kills whatever child is running.

use std::collections::VecDeque;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, TrimoraError};
use crate::media::{MediaCommandBuilder, MediaTools, PlanStep, TrimPlan};
use crate::progress::{ProgressSample, ProgressTracker, parse_progress_line};
use crate::request::TrimRequest;
use crate::validation::{ValidationError, validate_input_file};

const STDERR_TAIL_LINES: usize = 8;
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Status reported through the status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Terminal result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed => RunStatus::Completed,
            RunOutcome::Failed(_) => RunStatus::Failed,
            RunOutcome::Cancelled => RunStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Running,
    /// Subprocess work is over; temporary files are being cleaned up
    Finishing,
}

/// Cloneable cancellation flag that can also be awaited.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag: Arc::new(flag) }
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Slot {
    state: ExecutorState,
    token: Option<CancelToken>,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(self: &Arc<Self>) -> Result<RunGuard> {
        let mut slot = self.lock();
        if slot.state != ExecutorState::Idle {
            return Err(TrimoraError::Busy);
        }
        let token = CancelToken::new();
        slot.state = ExecutorState::Running;
        slot.token = Some(token.clone());
        Ok(RunGuard {
            shared: Arc::clone(self),
            token,
        })
    }

    fn set_state(&self, state: ExecutorState) {
        self.lock().state = state;
    }
}

/// Holds the executor's single run slot; releases it when dropped.
struct RunGuard {
    shared: Arc<Shared>,
    token: CancelToken,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut slot = self.shared.lock();
        slot.state = ExecutorState::Idle;
        slot.token = None;
    }
}

/// Caller's side of a run started with [`TrimExecutor::run_async`].
#[derive(Debug)]
pub struct RunHandle {
    id: Uuid,
    token: CancelToken,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation; the run reports `Cancelled` once it stops.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the terminal outcome.
    pub async fn wait(self) -> RunOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failed(TrimoraError::Internal(e.to_string()).to_string()),
        }
    }
}

/// Runs trim requests through ffmpeg, one at a time.
#[derive(Debug, Clone)]
pub struct TrimExecutor {
    tools: MediaTools,
    timeout: Option<Duration>,
    shared: Arc<Shared>,
}

impl TrimExecutor {
    pub fn new(tools: MediaTools) -> Self {
        Self {
            tools,
            timeout: None,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    state: ExecutorState::Idle,
                    token: None,
                }),
            }),
        }
    }

    /// Discover the media binaries and apply the configured timeout.
    pub fn from_config(config: &Config) -> Self {
        Self::new(MediaTools::discover(&config.media))
            .with_timeout(config.media.timeout_secs.map(Duration::from_secs))
    }

    /// Kill and fail runs that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_available(&self) -> bool {
        self.tools.ffmpeg.is_available()
    }

    pub fn ffmpeg_path(&self) -> Option<&Path> {
        self.tools.ffmpeg.path()
    }

    pub fn ffmpeg_version(&self) -> Option<&str> {
        self.tools.ffmpeg.version()
    }

    pub fn tools(&self) -> &MediaTools {
        &self.tools
    }

    pub fn state(&self) -> ExecutorState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() != ExecutorState::Idle
    }

    /// Cancel the active run, if any.
    pub fn cancel(&self) {
        if let Some(token) = &self.shared.lock().token {
            info!("Cancelling active trim");
            token.cancel();
        }
    }

    /// Run `request` to completion on the current task.
    ///
    /// Progress lines are only logged. Fails with [`TrimoraError::Busy`] if
    /// another run is active and with [`TrimoraError::Cancelled`] if
    /// [`cancel`](Self::cancel) is called meanwhile.
    pub async fn run_blocking(&self, request: &TrimRequest) -> Result<()> {
        let guard = self.shared.claim()?;
        let worker = self.worker(guard.token.clone());
        let span = info_span!("trim", run_id = %worker.run_id);

        let mut log_progress = |sample: ProgressSample| {
            debug!("Progress {:.1}% at {}", sample.percentage, sample.current_time);
        };
        let result = worker
            .execute(request.clone(), &mut log_progress)
            .instrument(span)
            .await;
        drop(guard);

        if worker.token.is_cancelled() {
            return Err(TrimoraError::Cancelled);
        }
        if let Err(e) = &result {
            warn!("Trim failed: {}", e);
        }
        result
    }

    /// Start `request` on a spawned task and return immediately.
    ///
    /// `on_status(Running, ..)` is called before this returns. Afterwards
    /// `on_progress` receives non-decreasing samples, followed by exactly one
    /// terminal `on_status`: `Completed` (preceded by a final 100% sample),
    /// `Failed` with a message, or `Cancelled`. Nothing is reported after a
    /// cancellation has been observed.
    ///
    /// Must be called from within a tokio runtime. A second call while a run
    /// is active fails with [`TrimoraError::Busy`] without touching the
    /// callbacks.
    pub fn run_async<P, S>(&self, request: TrimRequest, on_progress: P, on_status: S) -> Result<RunHandle>
    where
        P: FnMut(ProgressSample) + Send + 'static,
        S: FnMut(RunStatus, &str) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TrimoraError::Internal(format!("no async runtime: {}", e)))?;
        let guard = self.shared.claim()?;
        let worker = self.worker(guard.token.clone());
        let id = worker.run_id;
        let token = guard.token.clone();
        let span = info_span!("trim", run_id = %id);

        let mut on_progress = on_progress;
        let mut on_status = on_status;
        on_status(RunStatus::Running, "Starting FFmpeg...");

        let join = runtime.spawn(
            async move {
                let result = worker.execute(request, &mut on_progress).await;
                let outcome = worker.outcome(result);
                drop(guard);

                match &outcome {
                    RunOutcome::Completed => {
                        on_progress(ProgressSample::complete());
                        on_status(RunStatus::Completed, "Trim completed successfully");
                    }
                    RunOutcome::Failed(message) => on_status(RunStatus::Failed, message.as_str()),
                    RunOutcome::Cancelled => on_status(RunStatus::Cancelled, "Trim cancelled"),
                }
                outcome
            }
            .instrument(span),
        );

        Ok(RunHandle { id, token, join })
    }

    fn worker(&self, token: CancelToken) -> Worker {
        Worker {
            run_id: Uuid::new_v4(),
            builder: self.tools.ffmpeg.path().map(MediaCommandBuilder::new),
            tools: self.tools.clone(),
            timeout: self.timeout,
            token,
            shared: Arc::clone(&self.shared),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct OutputLine {
    stream: Stream,
    text: String,
}

/// State moved into one run; nothing here is shared with the caller except
/// the cancellation token and the executor slot.
struct Worker {
    run_id: Uuid,
    builder: Option<MediaCommandBuilder>,
    tools: MediaTools,
    timeout: Option<Duration>,
    token: CancelToken,
    shared: Arc<Shared>,
}

impl Worker {
    async fn execute(&self, request: TrimRequest, on_progress: &mut (dyn FnMut(ProgressSample) + Send)) -> Result<()> {
        let builder = match (&self.builder, self.tools.ffmpeg.is_available()) {
            (Some(builder), true) => builder,
            _ => return Err(TrimoraError::BinaryNotFound("FFmpeg not found in PATH".to_string())),
        };

        validate_input_file(&request.input).map_err(|e| match e {
            ValidationError::FileNotFound(_) => TrimoraError::InputMissing(request.input.clone()),
            other => TrimoraError::from(other),
        })?;

        if let Some(dir) = request.output.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                info!("Creating output directory {}", dir.display());
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| TrimoraError::OutputDirCreateFailed {
                        path: dir.to_path_buf(),
                        source,
                    })?;
            }
        }

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut plan = builder.plan(&request)?;

        let source_seconds = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(TrimoraError::Cancelled),
            _ = wait_deadline(deadline) => return Err(TrimoraError::Timeout(self.timeout.unwrap_or_default())),
            seconds = self.tools.probe.duration_seconds(&request.input) => seconds,
        };
        plan.clamp_to_source(source_seconds);
        info!(
            "Trimming {} -> {} ({} step(s), {:.3}s of media)",
            request.input.display(),
            request.output.display(),
            plan.steps.len(),
            plan.total_media_seconds()
        );

        let result = self.run_plan(&plan, deadline, on_progress).await;
        self.shared.set_state(ExecutorState::Finishing);
        drop(plan);
        result
    }

    async fn run_plan(
        &self,
        plan: &TrimPlan,
        deadline: Option<Instant>,
        on_progress: &mut (dyn FnMut(ProgressSample) + Send),
    ) -> Result<()> {
        let mut tracker = ProgressTracker::new(plan.weights());

        for (index, step) in plan.steps.iter().enumerate() {
            if self.token.is_cancelled() {
                return Err(TrimoraError::Cancelled);
            }
            tracker.begin_step(index);
            info!("Step {}/{}: {}", index + 1, plan.steps.len(), step.command.description);
            self.run_step(step, deadline, &mut tracker, on_progress).await?;
        }

        Ok(())
    }

    async fn run_step(
        &self,
        step: &PlanStep,
        deadline: Option<Instant>,
        tracker: &mut ProgressTracker,
        on_progress: &mut (dyn FnMut(ProgressSample) + Send),
    ) -> Result<()> {
        let mut child = step
            .command
            .to_command()
            .spawn()
            .map_err(|e| TrimoraError::SubprocessLaunchFailed(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TrimoraError::Internal("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TrimoraError::Internal("Failed to capture stderr".to_string()))?;

        let (tx, mut rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let readers = [
            tokio::spawn(forward_lines(stdout, Stream::Stdout, tx.clone())),
            tokio::spawn(forward_lines(stderr, Stream::Stderr, tx)),
        ];

        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut streams_open = true;

        let waited: Result<ExitStatus> = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break Err(TrimoraError::Cancelled),
                _ = wait_deadline(deadline) => {
                    break Err(TrimoraError::Timeout(self.timeout.unwrap_or_default()));
                }
                line = rx.recv(), if streams_open => match line {
                    Some(line) => self.handle_line(line, tracker, &mut stderr_tail, on_progress),
                    None => streams_open = false,
                },
                status = child.wait(), if !streams_open => break status.map_err(TrimoraError::from),
            }
        };

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                terminate(&mut child).await;
                for reader in &readers {
                    reader.abort();
                }
                return Err(e);
            }
        };

        if status.success() {
            debug!("{} finished", step.command.description);
            Ok(())
        } else {
            Err(TrimoraError::SubprocessNonZeroExit {
                code: status.code(),
                detail: stderr_tail.back().cloned().unwrap_or_default(),
            })
        }
    }

    fn handle_line(
        &self,
        line: OutputLine,
        tracker: &mut ProgressTracker,
        stderr_tail: &mut VecDeque<String>,
        on_progress: &mut (dyn FnMut(ProgressSample) + Send),
    ) {
        debug!(target: "ffmpeg", "{:?}: {}", line.stream, line.text);

        if line.stream == Stream::Stderr {
            if stderr_tail.len() == STDERR_TAIL_LINES {
                stderr_tail.pop_front();
            }
            stderr_tail.push_back(line.text.clone());
        }

        let sample = parse_progress_line(&line.text, tracker.step_duration());
        if let Some(sample) = tracker.observe(sample) {
            if !self.token.is_cancelled() {
                on_progress(sample);
            }
        }
    }

    fn outcome(&self, result: Result<()>) -> RunOutcome {
        if self.token.is_cancelled() {
            info!("Trim cancelled");
            return RunOutcome::Cancelled;
        }
        match result {
            Ok(()) => {
                info!("Trim completed successfully");
                RunOutcome::Completed
            }
            Err(TrimoraError::Cancelled) => RunOutcome::Cancelled,
            Err(e) => {
                warn!("Trim failed: {}", e);
                RunOutcome::Failed(e.to_string())
            }
        }
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("ffmpeg already exited: {}", e);
    }
    match child.wait().await {
        Ok(status) => debug!("ffmpeg terminated: {}", status),
        Err(e) => warn!("Failed to reap ffmpeg: {}", e),
    }
}

/// Forward `\n`- or `\r`-terminated lines; ffmpeg redraws status lines with `\r`.
async fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut chunks = BufReader::new(reader).split(b'\n');
    while let Ok(Some(chunk)) = chunks.next_segment().await {
        let chunk = String::from_utf8_lossy(&chunk);
        for text in chunk.split('\r').map(str::trim_end).filter(|t| !t.is_empty()) {
            let line = OutputLine {
                stream,
                text: text.to_string(),
            };
            if tx.send(line).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{BinaryResolver, DurationProbe};

    fn unavailable_executor() -> TrimExecutor {
        let ffmpeg = BinaryResolver::unavailable();
        let probe = DurationProbe::new(&ffmpeg);
        TrimExecutor::new(MediaTools::new(ffmpeg, probe))
    }

    #[tokio::test]
    async fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        token.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
        token.cancelled().await;
    }

    #[test]
    fn test_claim_is_exclusive() {
        let executor = unavailable_executor();
        let guard = executor.shared.claim().unwrap();
        assert_eq!(executor.state(), ExecutorState::Running);
        assert!(matches!(executor.shared.claim(), Err(TrimoraError::Busy)));

        executor.cancel();
        assert!(guard.token.is_cancelled());

        drop(guard);
        assert_eq!(executor.state(), ExecutorState::Idle);
        assert!(!executor.is_running());
        executor.cancel();
    }

    #[tokio::test]
    async fn test_missing_binary_fails() {
        let executor = unavailable_executor();
        let request = TrimRequest::single("in.mp4", "out.mp4", "0", "1");
        let err = executor.run_blocking(&request).await.unwrap_err();
        assert!(matches!(err, TrimoraError::BinaryNotFound(_)));
        assert!(!executor.is_running());
    }

    #[test]
    fn test_run_async_requires_runtime() {
        let executor = unavailable_executor();
        let request = TrimRequest::single("in.mp4", "out.mp4", "0", "1");
        let result = executor.run_async(request, |_| {}, |_, _| {});
        assert!(matches!(result, Err(TrimoraError::Internal(_))));
        assert!(!executor.is_running());
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(RunOutcome::Completed.status(), RunStatus::Completed);
        assert_eq!(RunOutcome::Failed("x".into()).status(), RunStatus::Failed);
        assert_eq!(RunOutcome::Cancelled.status(), RunStatus::Cancelled);
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::sync::LazyLock;

    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    use crate::media::{BinaryResolver, DurationProbe};
    use crate::segment::{ExportMode, TrimSegment};

    // A script written while another test forks can fail to exec with ETXTBSY.
    static SERIAL: LazyLock<tokio::sync::Mutex<()>> = LazyLock::new(|| tokio::sync::Mutex::new(()));

    /// Stand-in ffmpeg: answers `-version`, logs every other invocation to
    /// `calls.log`, binds `$last` to the final argument and then runs `body`.
    fn fake_ffmpeg(temp: &TempDir, body: &str) -> PathBuf {
        let path = temp.path().join("ffmpeg");
        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"-version\" ]; then echo 'ffmpeg version test'; exit 0; fi\n\
             printf '%s\\n' \"$*\" >> '{}'\n\
             for last; do :; done\n\
             {}\n",
            temp.path().join("calls.log").display(),
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Stand-in ffprobe that records its pid and then hangs.
    fn hanging_ffprobe(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("ffprobe");
        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"-version\" ]; then echo 'ffprobe version test'; exit 0; fi\n\
             echo $$ > '{}'\n\
             exec sleep 30\n",
            temp.path().join("ffprobe.pid").display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn executor_with_probe(ffmpeg: PathBuf, ffprobe: PathBuf) -> TrimExecutor {
        let ffmpeg = BinaryResolver::with_path(ffmpeg);
        let probe = DurationProbe::new(&BinaryResolver::with_path(ffprobe));
        TrimExecutor::new(MediaTools::new(ffmpeg, probe))
    }

    fn executor_for(ffmpeg: PathBuf) -> TrimExecutor {
        let ffmpeg = BinaryResolver::with_path(ffmpeg);
        let probe = DurationProbe::new(&BinaryResolver::unavailable());
        TrimExecutor::new(MediaTools::new(ffmpeg, probe))
    }

    fn input_file(temp: &TempDir) -> PathBuf {
        let input = temp.child("in.mp4");
        input.write_binary(b"\0\0\0\x18ftypmp42").unwrap();
        input.path().to_path_buf()
    }

    fn calls(temp: &TempDir) -> Vec<String> {
        std::fs::read_to_string(temp.path().join("calls.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    async fn wait_for_file(path: &Path) {
        for _ in 0..200 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("{} never appeared", path.display());
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Progress(f64),
        Status(RunStatus, String),
    }

    /// Callback events in the order they were delivered.
    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Recorder {
        fn start(&self, executor: &TrimExecutor, request: TrimRequest) -> Result<RunHandle> {
            let progress = Arc::clone(&self.events);
            let statuses = Arc::clone(&self.events);
            executor.run_async(
                request,
                move |sample| progress.lock().unwrap().push(Event::Progress(sample.percentage)),
                move |status, message| statuses.lock().unwrap().push(Event::Status(status, message.to_string())),
            )
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn progress(&self) -> Vec<f64> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    Event::Progress(percentage) => Some(percentage),
                    Event::Status(..) => None,
                })
                .collect()
        }

        fn statuses(&self) -> Vec<RunStatus> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    Event::Status(status, _) => Some(status),
                    Event::Progress(_) => None,
                })
                .collect()
        }

        fn last_message(&self) -> String {
            match self.events().last() {
                Some(Event::Status(_, message)) => message.clone(),
                _ => String::new(),
            }
        }
    }

    #[tokio::test]
    async fn test_missing_input_fails_without_progress() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_for(fake_ffmpeg(&temp, "exit 0"));
        let missing = temp.path().join("nope.mp4");

        let recorder = Recorder::default();
        let request = TrimRequest::single(missing, temp.path().join("out.mp4"), "0", "1");
        let outcome = recorder.start(&executor, request).unwrap().wait().await;

        match outcome {
            RunOutcome::Failed(message) => assert!(message.contains("nope.mp4"), "{}", message),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(recorder.progress().is_empty());
        assert_eq!(recorder.statuses(), [RunStatus::Running, RunStatus::Failed]);
        assert!(calls(&temp).is_empty());
        assert!(!executor.is_running());
    }

    #[tokio::test]
    async fn test_successful_trim_reports_progress() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_for(fake_ffmpeg(
            &temp,
            "printf 'out_time_ms=1000000\\nout_time_us=1000000\\nout_time=00:00:01.000000\\nprogress=continue\\n'\n\
             printf 'out_time_ms=3000000\\nout_time_us=3000000\\nout_time=00:00:03.000000\\nspeed=2.0x\\nprogress=continue\\n'\n\
             printf 'out_time_ms=2000000\\nout_time_us=2000000\\nout_time=00:00:02.000000\\nprogress=continue\\n'\n\
             : > \"$last\"\n\
             printf 'progress=end\\n'",
        ));
        let input = input_file(&temp);
        let output = temp.path().join("nested").join("dir").join("cut.mp4");

        let recorder = Recorder::default();
        let request = TrimRequest::single(input, output.clone(), "00:00:01.000", "5");
        let outcome = recorder.start(&executor, request).unwrap().wait().await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert!(output.exists());
        assert_eq!(recorder.progress(), [25.0, 75.0, 75.0, 100.0]);
        assert_eq!(recorder.statuses(), [RunStatus::Running, RunStatus::Completed]);
        assert_eq!(recorder.last_message(), "Trim completed successfully");

        let calls = calls(&temp);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("-ss 1.000 -i "), "{}", calls[0]);
        assert!(calls[0].contains("-t 4.000 -c copy "), "{}", calls[0]);
        assert_eq!(executor.state(), ExecutorState::Idle);
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_for(fake_ffmpeg(
            &temp,
            "echo 'in.mp4: Invalid data found when processing input' >&2\nexit 1",
        ));
        let input = input_file(&temp);

        let recorder = Recorder::default();
        let request = TrimRequest::single(input, temp.path().join("out.mp4"), "0", "1");
        let outcome = recorder.start(&executor, request).unwrap().wait().await;

        match outcome {
            RunOutcome::Failed(message) => {
                assert!(message.starts_with("FFmpeg exited with code: 1"), "{}", message);
                assert!(message.contains("Invalid data found"), "{}", message);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(recorder.statuses(), [RunStatus::Running, RunStatus::Failed]);
        assert!(recorder.progress().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_kills_ffmpeg() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("ffmpeg.pid");
        let executor = executor_for(fake_ffmpeg(
            &temp,
            &format!(
                "echo $$ > '{}'\nwhile :; do printf 'out_time_us=500000\\n'; sleep 0.05; done",
                pid_file.display()
            ),
        ));
        let input = input_file(&temp);

        let recorder = Recorder::default();
        let request = TrimRequest::single(input, temp.path().join("out.mp4"), "0", "10");
        let handle = recorder.start(&executor, request).unwrap();
        assert!(executor.is_running());

        wait_for_file(&pid_file).await;
        for _ in 0..200 {
            if recorder.progress().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(recorder.progress().len() >= 2);

        let started = std::time::Instant::now();
        handle.cancel();
        let outcome = handle.wait().await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(recorder.statuses(), [RunStatus::Running, RunStatus::Cancelled]);
        assert_eq!(
            recorder.events().last(),
            Some(&Event::Status(RunStatus::Cancelled, "Trim cancelled".to_string()))
        );

        let seen = recorder.events().len();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(recorder.events().len(), seen);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.trim())
            .status()
            .unwrap();
        assert!(!alive.success(), "ffmpeg {} still running", pid.trim());
        assert!(!executor.is_running());
    }

    #[tokio::test]
    async fn test_cancel_during_duration_lookup() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_with_probe(fake_ffmpeg(&temp, ": > \"$last\""), hanging_ffprobe(&temp));
        let input = input_file(&temp);

        let recorder = Recorder::default();
        let request = TrimRequest::single(input, temp.path().join("out.mp4"), "0", "1");
        let handle = recorder.start(&executor, request).unwrap();

        wait_for_file(&temp.path().join("ffprobe.pid")).await;
        let started = std::time::Instant::now();
        handle.cancel();
        let outcome = handle.wait().await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert_eq!(recorder.statuses(), [RunStatus::Running, RunStatus::Cancelled]);
        assert!(calls(&temp).is_empty());
        assert!(!executor.is_running());
    }

    #[tokio::test]
    async fn test_timeout_during_duration_lookup() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_with_probe(fake_ffmpeg(&temp, ": > \"$last\""), hanging_ffprobe(&temp))
            .with_timeout(Some(Duration::from_millis(200)));
        let input = input_file(&temp);

        let recorder = Recorder::default();
        let request = TrimRequest::single(input, temp.path().join("out.mp4"), "0", "1");
        let started = std::time::Instant::now();
        let outcome = recorder.start(&executor, request).unwrap().wait().await;

        match outcome {
            RunOutcome::Failed(message) => assert!(message.contains("did not finish"), "{}", message),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert!(calls(&temp).is_empty());
    }

    #[tokio::test]
    async fn test_input_directory_is_rejected() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_for(fake_ffmpeg(&temp, "exit 0"));
        let not_a_file = temp.child("clips");
        not_a_file.create_dir_all().unwrap();

        let request = TrimRequest::single(not_a_file.path(), temp.path().join("out.mp4"), "0", "1");
        let err = executor.run_blocking(&request).await.unwrap_err();
        assert!(
            matches!(err, TrimoraError::Validation(ValidationError::InvalidFormat(_))),
            "{:?}",
            err
        );
        assert!(calls(&temp).is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_rejected_while_busy() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_for(fake_ffmpeg(&temp, "exec sleep 30"));
        let input = input_file(&temp);

        let first = Recorder::default();
        let handle = first
            .start(&executor, TrimRequest::single(input.clone(), temp.path().join("a.mp4"), "0", "1"))
            .unwrap();

        let second = Recorder::default();
        let result = second.start(&executor, TrimRequest::single(input, temp.path().join("b.mp4"), "0", "1"));
        assert!(matches!(result, Err(TrimoraError::Busy)));
        assert!(second.statuses().is_empty());

        executor.cancel();
        assert_eq!(handle.wait().await, RunOutcome::Cancelled);
        assert_eq!(executor.state(), ExecutorState::Idle);
    }

    #[tokio::test]
    async fn test_timeout_fails_run() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_for(fake_ffmpeg(&temp, "exec sleep 30"))
            .with_timeout(Some(Duration::from_millis(200)));
        let input = input_file(&temp);

        let recorder = Recorder::default();
        let request = TrimRequest::single(input, temp.path().join("out.mp4"), "0", "1");
        let outcome = recorder.start(&executor, request).unwrap().wait().await;

        match outcome {
            RunOutcome::Failed(message) => assert!(message.contains("did not finish"), "{}", message),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(recorder.statuses(), [RunStatus::Running, RunStatus::Failed]);
    }

    #[tokio::test]
    async fn test_merged_segments_concat_and_clean_up() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_for(fake_ffmpeg(&temp, ": > \"$last\""));
        let input = input_file(&temp);
        let out_dir = temp.child("out");
        out_dir.create_dir_all().unwrap();
        let output = out_dir.path().join("merged.mp4");

        let mut request = TrimRequest::single(input, output.clone(), "0", "2");
        request.segments.push(TrimSegment::new("4", "10").named("b"));
        executor.run_blocking(&request).await.unwrap();

        let calls = calls(&temp);
        assert_eq!(calls.len(), 3);
        assert!(calls[0].contains("segment_000.mp4"));
        assert!(calls[1].contains("-ss 4.000 -i "));
        assert!(calls[1].contains("segment_001.mp4"));
        assert!(calls[2].contains("-f concat -safe 0 -i "));
        assert!(calls[2].ends_with(&format!("-c copy {}", output.display())));

        assert!(output.exists());
        let leftovers: Vec<_> = std::fs::read_dir(out_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, [std::ffi::OsString::from("merged.mp4")]);
    }

    #[tokio::test]
    async fn test_separate_files_export() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_for(fake_ffmpeg(&temp, ": > \"$last\""));
        let input = input_file(&temp);
        let output = temp.path().join("cut.mp4");

        let mut request = TrimRequest::single(input, output, "0", "2")
            .with_copy_codec(false)
            .with_export_mode(ExportMode::SeparateFiles);
        request.segments.push(TrimSegment::new("3", "4").named("outro"));
        executor.run_blocking(&request).await.unwrap();

        for path in request.output_paths().unwrap() {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(temp.path().join("cut_02_outro.mp4").exists());
        assert!(calls(&temp).iter().all(|call| !call.contains("-c copy")));
    }

    #[tokio::test]
    async fn test_run_blocking_reports_cancel() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let executor = executor_for(fake_ffmpeg(&temp, "exec sleep 30"));
        let input = input_file(&temp);

        let canceller = executor.clone();
        tokio::spawn(async move {
            while canceller.state() != ExecutorState::Running {
                tokio::task::yield_now().await;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let request = TrimRequest::single(input, temp.path().join("out.mp4"), "0", "1");
        let err = executor.run_blocking(&request).await.unwrap_err();
        assert!(matches!(err, TrimoraError::Cancelled));
        assert!(!executor.is_running());
    }
}

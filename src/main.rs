//! Trimora command line entry point.
//!
//! Cuts ranges out of MP4 files with ffmpeg, showing live progress and
//! cancelling the running ffmpeg on Ctrl-C.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use trimora::cli::{Args, Commands, RecentAction};
use trimora::config::Config;
use trimora::executor::{RunOutcome, RunStatus, TrimExecutor};
use trimora::files::{self, RecentFiles};
use trimora::media::DurationProbe;
use trimora::request::TrimRequest;
use trimora::segment::{ExportMode, SegmentManager, TrimSegment};
use trimora::timestamp::format_timestamp;
use trimora::validation::{is_valid_mp4, validate_input_file};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => Config::load_or_create(Config::default_path())?,
    };

    setup_logging(args.verbose, &config.general.log_level)?;
    info!("Starting Trimora");

    match args.command {
        Commands::Trim { input, output, start, end, reencode } => {
            let segments = vec![TrimSegment::new(start, end)];
            trim(&config, input, output, segments, ExportMode::MergeAll, reencode).await?;
        }
        Commands::Segments { input, output, segments, separate, reencode } => {
            let mode = if separate { ExportMode::SeparateFiles } else { ExportMode::MergeAll };
            trim(&config, input, output, segments, mode, reencode).await?;
        }
        Commands::Probe { input } => {
            validate_input_file(&input)?;
            let executor = TrimExecutor::from_config(&config);
            let probe = &executor.tools().probe;
            if !probe.is_available() {
                bail!("ffprobe not found");
            }

            let seconds = probe.duration_seconds(&input).await;
            if seconds <= 0.0 {
                bail!("Could not determine the duration of {}", input.display());
            }
            println!("{} ({:.3}s)", format_timestamp(seconds), seconds);
        }
        Commands::Check => {
            let executor = TrimExecutor::from_config(&config);
            print_binary("ffmpeg", executor.ffmpeg_path(), executor.ffmpeg_version());
            print_probe(&executor.tools().probe);
            println!("Output directory: {}", config.output.directory.display());
            println!("Config file: {}", args.config.unwrap_or_else(Config::default_path).display());
        }
        Commands::Recent { action } => {
            let recent = RecentFiles::in_config_dir();
            match action {
                RecentAction::List => {
                    let entries = recent.list(config.general.recent_files_count);
                    if entries.is_empty() {
                        println!("No recent files.");
                    }
                    for (i, entry) in entries.iter().enumerate() {
                        println!("{:>2}. {}", i + 1, entry.display());
                    }
                }
                RecentAction::Clear => {
                    recent.clear()?;
                    println!("Cleared recent files");
                }
            }
        }
    }

    Ok(())
}

async fn trim(
    config: &Config,
    input: PathBuf,
    output: Option<PathBuf>,
    segments: Vec<TrimSegment>,
    mode: ExportMode,
    reencode: bool,
) -> Result<()> {
    validate_input_file(&input)?;
    if !is_valid_mp4(&input) {
        warn!("{} does not look like an MP4 file, trying anyway", input.display());
    }

    let mut manager = SegmentManager::new();
    for segment in segments {
        manager
            .validate_segment(&segment)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Segment {}-{}", segment.start_time, segment.end_time))?;
        manager.add_segment(segment);
    }
    if manager.check_overlaps(None) {
        warn!("Some segments overlap; overlapping ranges will be exported twice");
    }
    manager.set_export_mode(mode);

    let output = output.unwrap_or_else(|| {
        files::generate_output_filename(&input, &config.output.directory, &config.output.naming_pattern)
    });
    let request = manager.to_request(input, output, !reencode);
    let outputs = request.output_paths()?;

    let executor = TrimExecutor::from_config(config);
    if !executor.is_available() {
        bail!("FFmpeg not found. Install it or set media.ffmpeg_path in the config file");
    }

    let outcome = run_with_progress(&executor, request).await?;
    match outcome {
        RunOutcome::Completed => {
            let recent = RecentFiles::in_config_dir();
            for path in &outputs {
                println!("Wrote {}", path.display());
                if let Err(e) = recent.add(path) {
                    warn!("Failed to update recent files: {}", e);
                }
            }
            if config.output.auto_open {
                if let Some(first) = outputs.first() {
                    open_output(first);
                }
            }
            Ok(())
        }
        RunOutcome::Failed(message) => bail!(message),
        RunOutcome::Cancelled => bail!("Trim cancelled"),
    }
}

async fn run_with_progress(executor: &TrimExecutor, request: TrimRequest) -> Result<RunOutcome> {
    let pb = ProgressBar::new(1000);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")?
            .progress_chars("#>-"),
    );

    let progress_bar = pb.clone();
    let status_bar = pb.clone();
    let handle = executor.run_async(
        request,
        move |sample| {
            progress_bar.set_position((sample.percentage * 10.0).round() as u64);
            if !sample.current_time.is_empty() {
                let mut message = sample.current_time.clone();
                if !sample.speed.is_empty() {
                    message.push_str(&format!(" @ {}", sample.speed));
                }
                progress_bar.set_message(message);
            }
        },
        move |status, message| match status {
            RunStatus::Completed => status_bar.finish_with_message(message.to_string()),
            RunStatus::Failed | RunStatus::Cancelled => status_bar.abandon_with_message(message.to_string()),
            _ => status_bar.set_message(message.to_string()),
        },
    )?;

    let token = handle.cancel_token();
    let wait = handle.wait();
    tokio::pin!(wait);

    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping ffmpeg");
            token.cancel();
            wait.await
        }
    };

    Ok(outcome)
}

fn open_output(path: &Path) {
    info!("Opening {}", path.display());
    if let Err(e) = open::that(path) {
        warn!("Failed to open {}: {}", path.display(), e);
    }
}

fn print_binary(name: &str, path: Option<&Path>, version: Option<&str>) {
    match path {
        Some(path) => println!("{}: {} ({})", name, path.display(), version.unwrap_or("unknown version")),
        None => println!("{}: not found", name),
    }
}

fn print_probe(probe: &DurationProbe) {
    match probe.binary_path() {
        Some(path) => println!("ffprobe: {}", path.display()),
        None => println!("ffprobe: not found (progress falls back to requested durations)"),
    }
}

/// Console plus a daily log file under the configuration directory.
fn setup_logging(verbose: bool, configured_level: &str) -> Result<()> {
    let log_dir = files::config_dir().join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "trimora.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose {
        Level::DEBUG
    } else {
        configured_level.parse().unwrap_or(Level::INFO)
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("trimora.log").display());

    Ok(())
}

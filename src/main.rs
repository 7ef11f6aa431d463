use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, warn, LevelFilter};

use mediasort_core::{
    CancellationToken, ExtractorKind, LocationMode, MediaFilter, OrganizeOptions, RunSummary,
    TransferMode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
    #[value(name = "CRITICAL")]
    Critical,
}

impl LogLevel {
    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical => LevelFilter::Error,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mediasort", version, about = "Organize photos and videos into folders by date and camera")]
struct Cli {
    /// Directory to read photos and videos from
    #[arg(short, long)]
    source: PathBuf,

    /// Output directory (created if missing)
    #[arg(short, long)]
    destination: PathBuf,

    /// Write everything into one zip archive instead of copying
    #[arg(short, long)]
    archive: bool,

    /// Archive file name inside the destination
    #[arg(long, default_value = "media.zip")]
    archive_name: String,

    /// Which media to organize
    #[arg(long, value_enum, default_value_t = MediaFilter::Both)]
    media_type: MediaFilter,

    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Metadata backend
    #[arg(long, value_enum, default_value_t = ExtractorKind::Auto)]
    extractor: ExtractorKind,

    /// Add a location folder for files with GPS coordinates
    #[arg(long, value_enum, default_value_t = LocationMode::Off)]
    location: LocationMode,

    /// Files to extract metadata from in parallel
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Show where files would go without writing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Write a JSON run summary to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn options(&self) -> OrganizeOptions {
        OrganizeOptions {
            source: self.source.clone(),
            destination: self.destination.clone(),
            mode: if self.archive {
                TransferMode::Archive
            } else {
                TransferMode::Copy
            },
            archive_name: self.archive_name.clone(),
            media_filter: self.media_type,
            extractor: self.extractor,
            location: self.location,
            jobs: self.jobs,
            dry_run: self.dry_run,
        }
    }
}

fn init_logging(level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(level.filter())
        .format_target(false)
        .parse_default_env()
        .init();
}

fn progress_bar(cli: &Cli) -> anyhow::Result<ProgressBar> {
    // Per-file debug lines would fight with the bar for the terminal
    if cli.no_progress || cli.log_level == LogLevel::Debug {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {wide_msg}")?);
    Ok(pb)
}

fn run(cli: &Cli) -> anyhow::Result<RunSummary> {
    let options = cli.options();

    let token = CancellationToken::new();
    let handle = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing the current file...");
        handle.cancel();
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let pb = progress_bar(cli)?;
    let bar = pb.clone();
    let summary = mediasort_core::organize(&options, Some(&token), &move |_stage, current, total, message| {
        bar.set_length(total);
        bar.set_position(current + 1);
        bar.set_message(message.to_string());
    });
    pb.finish_and_clear();
    let summary = summary?;

    if let Some(report) = &cli.report {
        summary
            .write_report(report)
            .with_context(|| format!("cannot write report to {}", report.display()))?;
    }
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    let verb = if summary.dry_run { "planned" } else { "transferred" };
    eprintln!(
        "{}{} processed, {} {}, {} skipped, {} failed",
        if summary.interrupted { "Interrupted: " } else { "Done! " },
        summary.processed,
        summary.transferred,
        verb,
        summary.skipped,
        summary.failed
    );
    if let Some(archive) = &summary.archive {
        eprintln!("Archive: {}", archive.display());
    }
    for failure in &summary.failures {
        eprintln!("  [{}] {}: {}", failure.stage, failure.path.display(), failure.reason);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match run(&cli) {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

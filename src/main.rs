//! wheel-bot: merges a folder of recordings into one video and hands it to
//! the hamster wheel analyzer.
//!
//! Usage:
//!   wheel-bot                    Same as `wheel-bot run` next to the executable
//!   wheel-bot run [--dir DIR]    Manifest, merge, analyze, then wait for Enter
//!   wheel-bot manifest           Only write mylist.txt
//!   wheel-bot concat             Write mylist.txt and merge
//!   wheel-bot analyze            Analyze an already merged <folder>.mp4
//!   wheel-bot stats <ROOT>       Summarize *_wheel_times.csv per group

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

mod analyzer;
mod concat;
mod config;
mod error;
mod ffmpeg;
mod logging;
mod manifest;
mod pipeline;
mod stats;
mod timeline;

use analyzer::Roi;
use config::Settings;
use pipeline::{Pipeline, Workspace};

#[derive(Parser)]
#[command(
    name = "wheel-bot",
    about = "Merge hamster wheel recordings and run the wheel analyzer",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct FolderArgs {
    /// Folder with the recordings (defaults to the executable's folder)
    #[arg(short, long)]
    dir: Option<PathBuf>,
}

#[derive(Args, Default)]
struct AnalysisArgs {
    /// Motion sensitivity threshold
    #[arg(long)]
    motion_thresh: Option<f64>,

    /// Minimum blob size in pixels
    #[arg(long)]
    min_blob: Option<u32>,

    /// Sampling rate in frames per second
    #[arg(long)]
    fps_sample: Option<f64>,

    /// Minimum streak length in seconds
    #[arg(long)]
    min_streak_sec: Option<f64>,

    /// Wheel region as x,y,w,h
    #[arg(long)]
    roi: Option<Roi>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the manifest, merge the videos and run the analyzer
    Run {
        #[command(flatten)]
        folder: FolderArgs,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Do not wait for Enter before exiting
        #[arg(long)]
        no_pause: bool,

        /// Skip the analyzer when merging fails
        #[arg(long)]
        stop_on_concat_failure: bool,
    },

    /// Only write the manifest
    Manifest {
        #[command(flatten)]
        folder: FolderArgs,
    },

    /// Write the manifest and merge the videos
    Concat {
        #[command(flatten)]
        folder: FolderArgs,
    },

    /// Run the analyzer on an existing merged video
    Analyze {
        #[command(flatten)]
        folder: FolderArgs,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Summarize analyzer timelines across condition folders
    Stats {
        /// Folder containing one subfolder per group
        root: PathBuf,

        /// Group subfolder names, compared first against second
        #[arg(short, long = "group", default_values = ["Meds", "NoMeds"])]
        groups: Vec<String>,

        /// Where to write the summary CSVs (defaults to ROOT)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

impl AnalysisArgs {
    fn apply(self, settings: &mut Settings) {
        let params = &mut settings.analysis;
        if let Some(v) = self.motion_thresh {
            params.motion_thresh = v;
        }
        if let Some(v) = self.min_blob {
            params.min_blob = v;
        }
        if let Some(v) = self.fps_sample {
            params.fps_sample = v;
        }
        if self.min_streak_sec.is_some() {
            params.min_streak_sec = self.min_streak_sec;
        }
        if self.roi.is_some() {
            params.roi = self.roi;
        }
    }
}

/// Loads `wheel-bot.toml` from `dir` and starts logging at its level.
fn init(dir: &Path, verbose: bool) -> Settings {
    let found = Settings::find(dir);
    let level = match &found {
        Ok(Some(settings)) => settings.logging.level.clone(),
        _ => "info".to_string(),
    };
    logging::init_logging(&level, verbose);

    match found {
        Ok(Some(settings)) => {
            tracing::debug!("Loaded settings from {:?}", dir.join(config::CONFIG_FILE_NAME));
            settings
        }
        Ok(None) => Settings::default(),
        Err(e) => {
            tracing::warn!("{}; using defaults", e);
            Settings::default()
        }
    }
}

fn workspace(folder: FolderArgs, verbose: bool) -> anyhow::Result<(Settings, Workspace)> {
    let dir = Workspace::locate(folder.dir)?;
    let settings = init(&dir, verbose);
    let workspace = Workspace::new(dir, &settings.pipeline.manifest_name)?;
    Ok((settings, workspace))
}

/// Prints a failure that happened before the run started and, when `hold`,
/// waits so a double-clicked console stays open.
fn startup_failure(
    error: anyhow::Error,
    hold: bool,
    wait: impl FnOnce() -> io::Result<()>,
) -> anyhow::Result<ExitCode> {
    if !hold {
        return Err(error);
    }
    eprintln!("Error: {:#}", error);
    wait()?;
    Ok(ExitCode::FAILURE)
}

fn run_pipeline(
    folder: FolderArgs,
    analysis: AnalysisArgs,
    no_pause: bool,
    stop_on_concat_failure: bool,
    verbose: bool,
) -> anyhow::Result<ExitCode> {
    let (mut settings, workspace) = match workspace(folder, verbose) {
        Ok(found) => found,
        Err(e) => {
            return startup_failure(e, !no_pause, || pipeline::pause("Press Enter to exit..."));
        }
    };
    analysis.apply(&mut settings);
    if stop_on_concat_failure {
        settings.pipeline.stop_on_concat_failure = true;
    }

    let report = Pipeline::new(&settings, workspace).run();
    report.print();

    if settings.pipeline.pause_on_exit && !no_pause {
        pipeline::pause("Press Enter to exit...")?;
    }

    Ok(if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_stats(
    root: PathBuf,
    groups: Vec<String>,
    out: Option<PathBuf>,
    verbose: bool,
) -> anyhow::Result<ExitCode> {
    let _settings = init(&root, verbose);
    let out = out.unwrap_or_else(|| root.clone());

    let mut all = Vec::with_capacity(groups.len());
    for name in &groups {
        tracing::info!("Processing {}...", name);
        all.push(stats::process_group(name, &root.join(name))?);
    }

    let max_seconds = all.iter().map(|g| g.max_video_seconds).max().unwrap_or(0);
    for group in &all {
        let curve = stats::cumulative_curve(&group.sessions, max_seconds, stats::CURVE_STEP_SECS);
        for path in stats::write_group_outputs(&out, group, &curve)? {
            tracing::info!("Wrote {:?}", path);
        }
    }

    print!("{}", stats::comparison_report(&all));
    println!("\nTables saved in: {}", out.display());
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let command = cli.command.unwrap_or(Commands::Run {
        folder: FolderArgs::default(),
        analysis: AnalysisArgs::default(),
        no_pause: false,
        stop_on_concat_failure: false,
    });

    match command {
        Commands::Run {
            folder,
            analysis,
            no_pause,
            stop_on_concat_failure,
        } => run_pipeline(folder, analysis, no_pause, stop_on_concat_failure, verbose),
        Commands::Manifest { folder } => {
            let (settings, workspace) = workspace(folder, verbose)?;
            let count = Pipeline::new(&settings, workspace.clone()).build_manifest()?;
            println!("{} videos listed in {}", count, workspace.manifest_path().display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Concat { folder } => {
            let (settings, workspace) = workspace(folder, verbose)?;
            let pipeline = Pipeline::new(&settings, workspace);
            pipeline.build_manifest()?;
            pipeline.concat()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Analyze { folder, analysis } => {
            let (mut settings, workspace) = workspace(folder, verbose)?;
            analysis.apply(&mut settings);
            Pipeline::new(&settings, workspace).analyze()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stats { root, groups, out } => run_stats(root, groups, out, verbose),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_default_run() {
        let cli = Cli::try_parse_from(["wheel-bot"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_analysis_overrides() {
        let cli = Cli::try_parse_from([
            "wheel-bot",
            "run",
            "--dir",
            "videos",
            "--min-blob",
            "40",
            "--roi",
            "1,2,3,4",
            "--no-pause",
        ])
        .unwrap();

        let Some(Commands::Run {
            folder,
            analysis,
            no_pause,
            ..
        }) = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(folder.dir, Some(PathBuf::from("videos")));
        assert!(no_pause);

        let mut settings = Settings::default();
        analysis.apply(&mut settings);
        assert_eq!(settings.analysis.min_blob, 40);
        assert_eq!(settings.analysis.motion_thresh, 0.1);
        assert_eq!(settings.analysis.roi, Some(Roi { x: 1, y: 2, w: 3, h: 4 }));
    }

    #[test]
    fn test_startup_failure_waits_before_exit() {
        let mut waited = false;
        let result = startup_failure(anyhow::anyhow!("no such folder"), true, || {
            waited = true;
            Ok(())
        });
        assert!(result.is_ok());
        assert!(waited);

        let result = startup_failure(anyhow::anyhow!("no such folder"), false, || {
            panic!("must not wait with --no-pause")
        });
        assert_eq!(result.unwrap_err().to_string(), "no such folder");
    }

    #[test]
    fn test_missing_folder_fails_to_locate() {
        let dir = tempfile::tempdir().unwrap();
        let folder = FolderArgs {
            dir: Some(dir.path().join("missing")),
        };
        assert!(workspace(folder, false).is_err());
    }

    #[test]
    fn test_stats_default_groups() {
        let cli = Cli::try_parse_from(["wheel-bot", "stats", "data"]).unwrap();
        let Some(Commands::Stats { groups, .. }) = cli.command else {
            panic!("expected stats");
        };
        assert_eq!(groups, vec!["Meds", "NoMeds"]);
    }
}

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use crate::config::ToolPaths;
use crate::error::{WheelError, WheelResult};

pub struct Ffmpeg {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Ffmpeg {
    pub fn from_tools(tools: &ToolPaths) -> Self {
        Ffmpeg {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
        }
    }

    /// Joins everything listed in `manifest` into `output`, copying the video
    /// stream and dropping audio. Progress goes to stdout as key=value lines.
    pub fn concat_command(&self, workdir: &Path, manifest: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command
            .current_dir(workdir)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(manifest)
            .arg("-c:v")
            .arg("copy")
            .arg("-an")
            .arg("-progress")
            .arg("pipe:1")
            .arg(output);
        command
    }

    /// Total length of the joined inputs in seconds, 0 if ffprobe cannot tell.
    pub fn probe_concat_duration(&self, manifest: &Path) -> WheelResult<f64> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg("-safe")
            .arg("0")
            .arg("-f")
            .arg("concat")
            .arg("-i")
            .arg(manifest)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| WheelError::launch("ffprobe", e))?;

        if !output.status.success() {
            tracing::debug!(
                "ffprobe could not read {:?}: {}",
                manifest,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(0.0);
        }

        Ok(parse_probe_duration(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_probe_duration(output: &str) -> f64 {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<f64>().ok())
        .find(|d| d.is_finite() && *d > 0.0)
        .unwrap_or_default()
}

fn progress_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^out_time_ms=(\d+)$").expect("valid regex"))
}

/// Seconds written so far, from an `out_time_ms=` progress line.
///
/// Despite the name ffmpeg reports this field in microseconds.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let cap = progress_pattern().captures(line.trim())?;
    let micros: f64 = cap[1].parse().ok()?;
    Some(micros / 1_000_000.0)
}

pub fn percent_done(current: f64, total: f64) -> Option<f64> {
    if total > 0.0 {
        Some((current / total * 100.0).min(100.0))
    } else {
        None
    }
}

//! Invocation of the external wheel analyzer script.
//!
//! The analyzer itself (motion scoring, blob detection, preview rendering)
//! is a separate Python program; this module only builds its command line
//! and checks how it exited.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use crate::concat::command_line;
use crate::error::{WheelError, WheelResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub motion_thresh: f64,
    pub min_blob: u32,
    pub fps_sample: f64,
    /// Forwarded as `--min_streak_sec` only when set.
    pub min_streak_sec: Option<f64>,
    /// Forwarded as `--roi x,y,w,h` only when set; otherwise the analyzer
    /// asks for the region interactively.
    pub roi: Option<Roi>,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            motion_thresh: 0.1,
            min_blob: 1,
            fps_sample: 1.0,
            min_streak_sec: None,
            roi: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl FromStr for Roi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid ROI {:?}: {}", s, e))?;
        match parts[..] {
            [x, y, w, h] if w > 0 && h > 0 => Ok(Roi { x, y, w, h }),
            [_, _, _, _] => Err(format!("ROI {:?} has zero width or height", s)),
            _ => Err(format!("ROI {:?} must be x,y,w,h", s)),
        }
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.w, self.h)
    }
}

/// `1.0` stays `1.0`; plain `{}` would print `1`.
fn float_arg(value: f64) -> String {
    format!("{:?}", value)
}

pub fn analyzer_args(video: &Path, params: &AnalysisParams, preview: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--video".into(),
        video.into(),
        "--motion_thresh".into(),
        float_arg(params.motion_thresh).into(),
        "--min_blob".into(),
        params.min_blob.to_string().into(),
        "--fps_sample".into(),
        float_arg(params.fps_sample).into(),
        "--preview_out".into(),
        preview.into(),
    ];

    if let Some(streak) = params.min_streak_sec {
        args.push("--min_streak_sec".into());
        args.push(float_arg(streak).into());
    }
    if let Some(roi) = params.roi {
        args.push("--roi".into());
        args.push(roi.to_string().into());
    }
    args
}

pub struct Analyzer<'a> {
    pub python: &'a Path,
    pub script: &'a Path,
}

impl Analyzer<'_> {
    pub fn command(
        &self,
        workdir: &Path,
        video: &Path,
        params: &AnalysisParams,
        preview: &Path,
    ) -> Command {
        let mut command = Command::new(self.python);
        command
            .current_dir(workdir)
            .arg(self.script)
            .args(analyzer_args(video, params, preview));
        command
    }

    /// Runs with inherited stdio so the analyzer's own progress output and
    /// prompts reach the console.
    pub fn run(
        &self,
        workdir: &Path,
        video: &Path,
        params: &AnalysisParams,
        preview: &Path,
    ) -> WheelResult<()> {
        let mut command = self.command(workdir, video, params, preview);
        println!("Executing: {}", command_line(&command));

        let status = command
            .status()
            .map_err(|e| WheelError::launch(self.python.to_string_lossy(), e))?;
        if status.success() {
            Ok(())
        } else {
            Err(WheelError::failed("analyzer", status))
        }
    }
}

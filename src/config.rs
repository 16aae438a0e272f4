//! Settings loaded from `wheel-bot.toml` in the working directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyzer::AnalysisParams;
use crate::error::{WheelError, WheelResult};

pub const CONFIG_FILE_NAME: &str = "wheel-bot.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tools: ToolPaths,
    pub analysis: AnalysisParams,
    pub pipeline: PipelineSettings,
    pub logging: LoggingSettings,
}

/// External executables. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub python: PathBuf,
    /// Relative paths are resolved against the working directory.
    pub analyzer_script: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub manifest_name: String,
    pub pause_on_exit: bool,
    pub stop_on_concat_failure: bool,
    /// Leave `<label>.mp4` and `<label>_preview.mp4` out of the manifest.
    pub skip_own_outputs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. "info" or "wheel_bot=debug,warn".
    pub level: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            python: PathBuf::from("python"),
            analyzer_script: PathBuf::from("..").join("hamster_wheel_analyzer.py"),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            manifest_name: "mylist.txt".to_string(),
            pause_on_exit: true,
            stop_on_concat_failure: false,
            skip_own_outputs: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> WheelResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| WheelError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `wheel-bot.toml` from `dir`, `None` when there is no such file.
    pub fn find(dir: &Path) -> WheelResult<Option<Self>> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    pub fn analyzer_script_in(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.tools.analyzer_script)
    }
}

//! The merge-then-analyze run over one folder of recordings.
//!
//! Steps run strictly in order and each blocks on its external tool. A failed
//! step is recorded but does not roll anything back; later steps still run
//! against whatever is on disk, unless `stop_on_concat_failure` is set.

use std::env;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::analyzer::Analyzer;
use crate::concat;
use crate::config::Settings;
use crate::error::{WheelError, WheelResult};
use crate::ffmpeg::Ffmpeg;
use crate::manifest;

/// Folder being processed and the artifact names derived from it.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub dir: PathBuf,
    pub label: String,
    manifest_name: String,
}

impl Workspace {
    pub fn new(dir: PathBuf, manifest_name: &str) -> WheelResult<Self> {
        let label = manifest::label_for(&dir)?;
        Ok(Workspace {
            dir,
            label,
            manifest_name: manifest_name.to_string(),
        })
    }

    /// `dir` if given, otherwise the folder the executable lives in.
    pub fn locate(dir: Option<PathBuf>) -> WheelResult<PathBuf> {
        let dir = match dir {
            Some(dir) => dir,
            None => env::current_exe()?
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| WheelError::NoLabel(PathBuf::new()))?,
        };
        Ok(strip_verbatim(dir.canonicalize()?))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(&self.manifest_name)
    }

    pub fn combined_path(&self) -> PathBuf {
        self.dir.join(format!("{}.mp4", self.label))
    }

    pub fn preview_path(&self) -> PathBuf {
        self.dir.join(format!("{}_preview.mp4", self.label))
    }
}

/// `canonicalize` on Windows yields `\\?\C:\...`. Plain drive paths are
/// turned back into the normal form before they reach the manifest.
fn strip_verbatim(path: PathBuf) -> PathBuf {
    let plain = path
        .to_str()
        .and_then(|text| text.strip_prefix(r"\\?\"))
        .filter(|rest| !rest.starts_with(r"UNC\"))
        .map(PathBuf::from);
    plain.unwrap_or(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Manifest,
    Concat,
    Analysis,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Manifest => "manifest",
            Step::Concat => "concat",
            Step::Analysis => "analysis",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed(String),
    Skipped,
}

#[derive(Debug)]
pub struct RunReport {
    pub label: String,
    pub video_count: usize,
    pub steps: Vec<(Step, StepStatus)>,
}

impl RunReport {
    fn new(label: &str) -> Self {
        RunReport {
            label: label.to_string(),
            video_count: 0,
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: Step, result: WheelResult<()>) -> bool {
        let status = match result {
            Ok(()) => StepStatus::Succeeded,
            Err(e) => {
                tracing::error!("{} step failed: {}", step, e);
                StepStatus::Failed(e.to_string())
            }
        };
        let ok = status == StepStatus::Succeeded;
        self.steps.push((step, status));
        ok
    }

    pub fn status(&self, step: Step) -> Option<&StepStatus> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, st)| st)
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, status)| *status == StepStatus::Succeeded)
    }

    pub fn print(&self) {
        for (step, status) in &self.steps {
            match status {
                StepStatus::Succeeded => println!("  [OK]   {}", step),
                StepStatus::Failed(reason) => println!("  [FAIL] {}: {}", step, reason),
                StepStatus::Skipped => println!("  [SKIP] {}", step),
            }
        }
        println!("Done processing {}", self.label);
    }
}

pub struct Pipeline<'a> {
    settings: &'a Settings,
    workspace: Workspace,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, workspace: Workspace) -> Self {
        Pipeline {
            settings,
            workspace,
        }
    }

    /// Recreates the manifest and returns how many videos went into it.
    pub fn build_manifest(&self) -> WheelResult<usize> {
        let exclude = if self.settings.pipeline.skip_own_outputs {
            vec![self.workspace.combined_path(), self.workspace.preview_path()]
        } else {
            Vec::new()
        };

        let videos = manifest::discover_videos(&self.workspace.dir, &exclude)?;
        if videos.is_empty() {
            tracing::warn!(
                "No .mp4 files under {:?}; the merge will have nothing to join",
                self.workspace.dir
            );
        }

        let path = self.workspace.manifest_path();
        manifest::write_manifest(&path, &videos)?;
        tracing::info!("Wrote {} entries to {:?}", videos.len(), path);
        Ok(videos.len())
    }

    pub fn concat(&self) -> WheelResult<()> {
        concat::concat_videos(&Ffmpeg::from_tools(&self.settings.tools), &self.workspace)
    }

    pub fn analyze(&self) -> WheelResult<()> {
        let script = self.settings.analyzer_script_in(&self.workspace.dir);
        let analyzer = Analyzer {
            python: &self.settings.tools.python,
            script: &script,
        };
        let preview = PathBuf::from(format!("{}_preview.mp4", self.workspace.label));
        analyzer.run(
            &self.workspace.dir,
            &self.workspace.combined_path(),
            &self.settings.analysis,
            &preview,
        )
    }

    pub fn run(&self) -> RunReport {
        let mut report = RunReport::new(&self.workspace.label);

        tracing::info!("Processing folder {:?}", self.workspace.dir);
        let manifest = self.build_manifest().map(|count| {
            report.video_count = count;
        });
        report.record(Step::Manifest, manifest);

        let merged = report.record(Step::Concat, self.concat());

        if !merged && self.settings.pipeline.stop_on_concat_failure {
            report.steps.push((Step::Analysis, StepStatus::Skipped));
        } else {
            report.record(Step::Analysis, self.analyze());
        }

        report
    }
}

/// Blocks until the user presses Enter.
pub fn pause(prompt: &str) -> io::Result<()> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};

use crate::error::{WheelError, WheelResult};
use crate::ffmpeg::{self, Ffmpeg};
use crate::pipeline::Workspace;

const MILESTONE_STEP: f64 = 10.0;

/// Program and arguments as one printable line.
pub fn command_line(command: &Command) -> String {
    format!(
        "{:?} {}",
        command.get_program(),
        command
            .get_args()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    )
}

/// When `percent` has reached `milestone`, the next 10% step above it.
fn next_milestone_after(percent: f64, milestone: f64) -> Option<f64> {
    if percent < milestone {
        return None;
    }
    let mut next = milestone;
    while next <= percent {
        next += MILESTONE_STEP;
    }
    Some(next)
}

/// Runs the concat demuxer over the workspace manifest, logging progress in
/// 10% steps when the total duration is known.
pub fn concat_videos(tools: &Ffmpeg, workspace: &Workspace) -> WheelResult<()> {
    let manifest = workspace.manifest_path();
    let output = workspace.combined_path();

    let total = tools.probe_concat_duration(&manifest).unwrap_or_else(|e| {
        tracing::warn!("{}; progress will not be shown", e);
        0.0
    });
    if total > 0.0 {
        tracing::info!("Input duration: {:.1}s", total);
    }

    let mut command = tools.concat_command(&workspace.dir, &manifest, &output);
    command.stdout(Stdio::piped());
    println!("Executing: {}", command_line(&command));

    let mut child = command
        .spawn()
        .map_err(|e| WheelError::launch("ffmpeg", e))?;

    if let Some(stdout) = child.stdout.take() {
        let mut next_milestone = MILESTONE_STEP;
        for line in BufReader::new(stdout).lines() {
            let line = line?;
            let Some(seconds) = ffmpeg::parse_progress_line(&line) else {
                continue;
            };
            if let Some(percent) = ffmpeg::percent_done(seconds, total) {
                if let Some(next) = next_milestone_after(percent, next_milestone) {
                    tracing::info!("Merging video files... {:.0}%", percent);
                    next_milestone = next;
                }
            } else {
                tracing::debug!("Merged {:.1}s", seconds);
            }
        }
    }

    let status = child.wait()?;
    if status.success() {
        println!("Successfully merged into {}", output.display());
        Ok(())
    } else {
        Err(WheelError::failed("ffmpeg", status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_lists_program_and_args() {
        let mut command = Command::new("ffmpeg");
        command.arg("-i").arg("mylist.txt");
        assert_eq!(command_line(&command), "\"ffmpeg\" -i mylist.txt");
    }

    #[test]
    fn test_milestones_advance_in_ten_percent_steps() {
        assert_eq!(next_milestone_after(5.0, 10.0), None);
        assert_eq!(next_milestone_after(10.0, 10.0), Some(20.0));
        assert_eq!(next_milestone_after(12.5, 10.0), Some(20.0));
        // A jump over several steps reports once.
        assert_eq!(next_milestone_after(47.0, 20.0), Some(50.0));
        assert_eq!(next_milestone_after(100.0, 90.0), Some(110.0));
        assert_eq!(next_milestone_after(100.0, 110.0), None);
    }
}

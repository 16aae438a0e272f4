//! Concat-demuxer manifest: discovery of input videos and the `file '...'`
//! list that ffmpeg reads.

use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{WheelError, WheelResult};

const VIDEO_EXTENSION: &str = "mp4";

/// Name of the folder, used for `<label>.mp4` and `<label>_preview.mp4`.
pub fn label_for(dir: &Path) -> WheelResult<String> {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| WheelError::NoLabel(dir.to_path_buf()))
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(VIDEO_EXTENSION))
        .unwrap_or(false)
}

/// Every `.mp4` below `root`, absolute, in file-name order per directory.
pub fn discover_videos(root: &Path, exclude: &[PathBuf]) -> WheelResult<Vec<PathBuf>> {
    let root = if root.is_absolute() {
        root.to_path_buf()
    } else {
        env::current_dir()?.join(root)
    };

    let mut videos = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        // Symlinked files count; `is_file` follows the link.
        if !is_video(path) || !path.is_file() {
            continue;
        }
        if exclude.iter().any(|skip| skip == path) {
            tracing::debug!("Skipping own output {:?}", path);
            continue;
        }
        videos.push(path.to_path_buf());
    }
    Ok(videos)
}

/// One manifest line. Quotes are escaped the way the concat demuxer expects.
pub fn manifest_line(path: &Path) -> String {
    format!("file '{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Replaces any previous manifest at `path` with one line per video.
pub fn write_manifest(path: &Path, videos: &[PathBuf]) -> WheelResult<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for video in videos {
        writeln!(writer, "{}", manifest_line(video))?;
    }
    writer.flush()?;
    Ok(())
}

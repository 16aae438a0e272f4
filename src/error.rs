use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WheelError {
    #[error("Failed to parse config {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot derive a label from {0:?}")]
    NoLabel(PathBuf),

    #[error("Failed to execute {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed with exit code: {code}")]
    ToolFailed { tool: String, code: String },

    #[error("{path:?} line {line}: {message}")]
    Timeline {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Group folder {0:?} does not exist")]
    MissingGroup(PathBuf),

    #[error("No timeline CSV files in {0:?}")]
    EmptyGroup(PathBuf),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type WheelResult<T> = Result<T, WheelError>;

impl WheelError {
    pub fn launch(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::ToolLaunch {
            tool: tool.into(),
            source,
        }
    }

    pub fn failed(tool: impl Into<String>, status: std::process::ExitStatus) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            code: status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "terminated by signal".to_string()),
        }
    }
}

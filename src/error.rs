use std::path::PathBuf;

use thiserror::Error;

/// Library error type for media-frame operations.
#[derive(Debug, Error)]
pub enum MediaError {
    /// A photo could not be read, decoded or scaled.
    #[error("failed to decode image {}: {reason}", .path.display())]
    ImageDecode { path: PathBuf, reason: String },

    /// A queued video disappeared between enqueue and playback.
    #[error("video not found: {}", .0.display())]
    VideoNotFound(PathBuf),

    /// The playback engine could not open the file or bind its output.
    #[error("video engine failed to start {}: {reason}", .path.display())]
    EngineAttach { path: PathBuf, reason: String },

    /// The configured media directory is missing or not a directory.
    #[error("media directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub(crate) fn decode(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::ImageDecode {
            path: path.into(),
            reason: format!("{err:#}"),
        }
    }
}

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from the file watching layer.
///
/// Only `Setup` is surfaced to callers. `Runtime` and `ChangeRead` are
/// logged where they occur and never interrupt delivery to other
/// subscribers.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The OS watch could not be started. No watch entry is retained.
    #[error("failed to start watching {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// A post-setup error from the OS watch layer. The watch continues.
    #[error("watch backend error: {0}")]
    Runtime(#[from] notify::Error),

    /// Re-reading a changed file failed. That notification is dropped.
    #[error("failed to re-read {path}: {source}")]
    ChangeRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Error raised by a subscriber callback. Logged per callback; other
/// callbacks for the same event still run.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

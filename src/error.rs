//! Error types for camera, storage, and pipeline operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::traits::Format;

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The sensor did not acknowledge initialization.
    #[error("Camera configuration failed: {0}")]
    Config(String),
    /// A frame was requested before `configure` succeeded.
    #[error("Camera is not configured")]
    NotConfigured,
    /// No frame arrived within the driver timeout.
    #[error("Frame acquisition timed out")]
    Timeout,
    /// The driver failed to deliver a frame.
    #[error("Frame acquisition failed: {0}")]
    Acquire(String),
    /// The delivered frame does not match the configured layout.
    #[error("Frame format mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        /// Format negotiated at configure time.
        expected: Format,
        /// Format reported by the frame.
        actual: Format,
    },
    /// Frame payload is shorter than its format requires.
    #[error("Frame truncated: expected at least {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Bytes implied by the format.
        expected: u32,
        /// Bytes reported by the driver.
        actual: usize,
    },
}

/// Error type for block storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage could not be mounted.
    #[error("Failed to mount {}: {reason}", .mount_point.display())]
    Mount {
        /// Mount point that was requested.
        mount_point: PathBuf,
        /// Why mounting failed.
        reason: String,
    },
    /// Storage could not be unmounted cleanly.
    #[error("Failed to unmount {}: {reason}", .mount_point.display())]
    Unmount {
        /// Mount point that was being released.
        mount_point: PathBuf,
        /// Why unmounting failed.
        reason: String,
    },
    /// A file operation was attempted with no active mount.
    #[error("Storage is not mounted")]
    NotMounted,
    /// I/O error on a file under the mount point.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether this error means the file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Failure of one pipeline run, classified by the stage that failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Camera initialization failed; no image is possible.
    #[error("camera configuration failed: {0}")]
    Config(#[source] CameraError),
    /// Storage is unavailable for this run.
    #[error("storage mount failed: {0}")]
    Mount(#[source] StorageError),
    /// The real capture did not produce a usable frame.
    #[error("capture failed: {0}")]
    Capture(#[source] CameraError),
    /// The sequence number or the image bytes could not be persisted.
    #[error("persist failed: {0}")]
    Persist(#[source] StorageError),
    /// Storage was not released cleanly. Logged only.
    #[error("storage unmount failed: {0}")]
    Unmount(#[source] StorageError),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

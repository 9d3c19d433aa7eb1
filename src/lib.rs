//! Pi-Cam-Snapshot: capture one still image and persist it to removable storage
//!
//! This library provides trait-based abstractions over the camera sensor and
//! the storage card, a durable file sequence counter, and the pipeline that
//! ties them together. Production uses V4L2 and a mounted directory; tests
//! use mock devices.

pub mod config;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod sequence;
pub mod storage;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use config::CaptureConfig;
pub use device::V4l2Camera;
pub use error::{CameraError, PipelineError, StorageError};
pub use pipeline::{CapturePipeline, PipelineState, RunReport, SavedImage, WarmupStats};
pub use sequence::{CounterRecovery, CounterWritePolicy, ImageNaming, SequenceCounter};
pub use storage::{DirectoryStorage, MountSession};
pub use traits::{BlockStorage, CameraDriver, CameraSettings, Format, FourCC, FrameBuffer};

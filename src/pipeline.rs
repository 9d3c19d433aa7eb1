//! Capture-and-persist pipeline.
//!
//! One run configures the camera (first run only), mounts storage, drains
//! warm-up frames, captures a single frame, stores it under the next
//! sequence number, and unmounts. Failures never escape [`CapturePipeline::run`];
//! each one is logged and recorded in the returned [`RunReport`] while the
//! remaining cleanup steps still happen.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::error::{CameraError, PipelineError};
use crate::sequence::SequenceCounter;
use crate::storage::MountSession;
use crate::traits::{BlockStorage, CameraDriver, CameraSettings, Format, FrameBuffer};
use crate::validation::validate_frame;

/// Warm-up frames drained before the real capture by default.
pub const DEFAULT_WARMUP_FRAMES: u32 = 10;

/// Pipeline states, in the order a successful run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing in progress.
    Idle,
    /// Camera initialized.
    CameraConfigured,
    /// Storage mounted and usable.
    StorageMounted,
    /// Discarding early frames.
    WarmingUp,
    /// Acquiring the frame to keep.
    Capturing,
    /// Writing the frame to storage.
    Persisting,
    /// Storage released.
    StorageUnmounted,
    /// The last run failed.
    Error,
}

/// Outcome of the warm-up phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupStats {
    /// Acquire attempts made.
    pub attempted: u32,
    /// Attempts that failed.
    pub failed: u32,
}

/// An image that reached storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    /// Sequence number the file is named after.
    pub sequence: u32,
    /// Full path under the mount point.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: usize,
}

/// Everything one run did.
#[derive(Debug)]
pub struct RunReport {
    /// The saved image, or the failure that prevented it.
    pub outcome: Result<SavedImage, PipelineError>,
    /// Warm-up statistics. Zero when the run stopped before warm-up.
    pub warmup: WarmupStats,
    /// Set when storage did not unmount cleanly. Never affects `outcome`.
    pub unmount_error: Option<PipelineError>,
}

impl RunReport {
    fn failed(err: PipelineError) -> Self {
        Self {
            outcome: Err(err),
            warmup: WarmupStats::default(),
            unmount_error: None,
        }
    }

    /// Whether an image was saved.
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The saved image, if any.
    pub fn saved(&self) -> Option<&SavedImage> {
        self.outcome.as_ref().ok()
    }
}

/// Coordinates a camera, a storage device, and a sequence counter.
pub struct CapturePipeline<C, S> {
    camera: C,
    storage: S,
    settings: CameraSettings,
    counter: SequenceCounter,
    warmup_frames: u32,
    format: Option<Format>,
    state: PipelineState,
}

fn enter(state: &mut PipelineState, next: PipelineState) {
    debug!(from = ?*state, to = ?next, "pipeline transition");
    *state = next;
}

impl<C: CameraDriver, S: BlockStorage> CapturePipeline<C, S> {
    /// Create a pipeline. Nothing is touched until [`Self::run`].
    pub const fn new(
        camera: C,
        storage: S,
        settings: CameraSettings,
        counter: SequenceCounter,
    ) -> Self {
        Self {
            camera,
            storage,
            settings,
            counter,
            warmup_frames: DEFAULT_WARMUP_FRAMES,
            format: None,
            state: PipelineState::Idle,
        }
    }

    /// Set how many frames are discarded before the real capture.
    #[must_use]
    pub const fn with_warmup_frames(mut self, count: u32) -> Self {
        self.warmup_frames = count;
        self
    }

    /// Current state.
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// The camera driver.
    pub const fn camera(&self) -> &C {
        &self.camera
    }

    /// The storage device.
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Give back the camera and storage.
    pub fn into_parts(self) -> (C, S) {
        (self.camera, self.storage)
    }

    /// Run the pipeline once.
    pub fn run(&mut self) -> RunReport {
        let format = match self.configure_once() {
            Ok(format) => format,
            Err(err) => {
                error!(error = %err, "camera init failed");
                enter(&mut self.state, PipelineState::Error);
                return RunReport::failed(PipelineError::Config(err));
            }
        };

        let Self {
            camera,
            storage,
            counter,
            warmup_frames,
            state,
            ..
        } = self;

        let mut session = match MountSession::open(storage) {
            Ok(session) => session,
            Err(err) => {
                error!(error = %err, "failed to mount storage");
                enter(state, PipelineState::Error);
                return RunReport::failed(PipelineError::Mount(err));
            }
        };
        enter(state, PipelineState::StorageMounted);

        enter(state, PipelineState::WarmingUp);
        let warmup = warm_up(camera, *warmup_frames);

        enter(state, PipelineState::Capturing);
        let outcome = capture(camera, counter, &mut session, &format, state);
        match &outcome {
            Ok(saved) => info!(
                path = %saved.path.display(),
                bytes = saved.bytes,
                "image saved"
            ),
            Err(err) => error!(error = %err, "no image saved"),
        }

        let unmount_error = match session.unmount() {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, "failed to unmount storage");
                Some(PipelineError::Unmount(err))
            }
        };
        enter(state, PipelineState::StorageUnmounted);

        let last = if outcome.is_ok() {
            PipelineState::Idle
        } else {
            PipelineState::Error
        };
        enter(state, last);

        RunReport {
            outcome,
            warmup,
            unmount_error,
        }
    }

    fn configure_once(&mut self) -> Result<Format, CameraError> {
        let format = match &self.format {
            Some(format) => format.clone(),
            None => {
                let format = self.camera.configure(&self.settings)?;
                info!(format = %format, "camera initialized");
                self.format = Some(format.clone());
                format
            }
        };
        enter(&mut self.state, PipelineState::CameraConfigured);
        Ok(format)
    }
}

/// Acquire and immediately release `count` frames, tolerating failures.
fn warm_up<C: CameraDriver>(camera: &mut C, count: u32) -> WarmupStats {
    let mut stats = WarmupStats::default();
    for index in 0..count {
        stats.attempted += 1;
        match camera.acquire_frame() {
            Ok(frame) => {
                camera.release_frame(frame);
                debug!(index, "discarded warm-up frame");
            }
            Err(err) => {
                stats.failed += 1;
                warn!(index, error = %err, "warm-up frame failed");
            }
        }
    }
    if stats.failed > 0 {
        warn!(failed = stats.failed, attempted = stats.attempted, "warm-up finished with failures");
    }
    stats
}

/// Acquire one frame, persist it, and release it on every path.
fn capture<C: CameraDriver, S: BlockStorage>(
    camera: &mut C,
    counter: &SequenceCounter,
    session: &mut MountSession<'_, S>,
    format: &Format,
    state: &mut PipelineState,
) -> Result<SavedImage, PipelineError> {
    let frame = camera.acquire_frame().map_err(PipelineError::Capture)?;
    let result = persist(&frame, counter, session, format, state);
    camera.release_frame(frame);
    result
}

fn persist<S: BlockStorage>(
    frame: &FrameBuffer,
    counter: &SequenceCounter,
    session: &mut MountSession<'_, S>,
    format: &Format,
    state: &mut PipelineState,
) -> Result<SavedImage, PipelineError> {
    // The counter is only consumed once the frame is known to be usable
    validate_frame(frame, format).map_err(PipelineError::Capture)?;

    enter(state, PipelineState::Persisting);
    let sequence = counter.next(session).map_err(PipelineError::Persist)?;
    let name = counter.naming().file_name(sequence);
    session
        .write(&name, frame.data())
        .map_err(PipelineError::Persist)?;

    Ok(SavedImage {
        sequence,
        path: session.mount_point().join(&name),
        bytes: frame.len(),
    })
}

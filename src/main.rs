//! Pi-cam-snapshot binary: capture one image to the storage card and exit.

use std::path::PathBuf;

use pi_cam_snapshot::config::ConfigLoadError;
use pi_cam_snapshot::{CaptureConfig, CapturePipeline, V4l2Camera};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pi_cam_snapshot=info")),
        )
        .init();

    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ConfigLoadError> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => CaptureConfig::load(&path)?,
        None => CaptureConfig::default(),
    };

    let mut pipeline = CapturePipeline::new(
        V4l2Camera::new(),
        config.directory_storage(),
        config.camera_settings()?,
        config.sequence_counter(),
    )
    .with_warmup_frames(config.pipeline.warmup_frames);

    // Outcomes are reported through the log only
    let report = pipeline.run();
    match report.saved() {
        Some(saved) => info!(
            sequence = saved.sequence,
            path = %saved.path.display(),
            "capture complete"
        ),
        None => warn!(state = ?pipeline.state(), "capture produced no image"),
    }
    Ok(())
}

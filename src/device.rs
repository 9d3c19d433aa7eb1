//! V4L2 camera driver implementation using the v4l crate.

use std::io;
use std::time::Duration;

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::error::{CameraError, Result};
use crate::traits::{CameraDriver, CameraSettings, Format, FourCC, FrameBuffer};

/// Camera driver backed by a V4L2 device and an mmap capture stream.
///
/// Dequeued buffers are copied into allocations owned by this driver;
/// released frames return their allocation to a small pool so steady-state
/// capture does not allocate.
#[derive(Default)]
pub struct V4l2Camera {
    stream: Option<Stream<'static>>,
    device: Option<Device>,
    format: Option<Format>,
    pool: Vec<Vec<u8>>,
    pool_limit: usize,
}

impl V4l2Camera {
    /// Create an unconfigured driver. The device is opened by `configure`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Format negotiated by the last successful `configure`.
    #[must_use]
    pub const fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }
}

fn config_err(context: &str, err: &io::Error) -> CameraError {
    CameraError::Config(format!("{context}: {err}"))
}

impl CameraDriver for V4l2Camera {
    fn configure(&mut self, settings: &CameraSettings) -> Result<Format> {
        let path = format!("/dev/video{}", settings.device_index);
        let device = Device::new(settings.device_index as usize)
            .map_err(|err| config_err(&format!("failed to open {path}"), &err))?;

        let caps = device
            .query_caps()
            .map_err(|err| config_err("failed to query capabilities", &err))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::Config(format!("{path} cannot capture video")));
        }
        if !caps.capabilities.contains(Flags::STREAMING) {
            return Err(CameraError::Config(format!("{path} does not support streaming")));
        }
        info!(device = %path, card = %caps.card, driver = %caps.driver, "opened camera");

        let mut fmt = device
            .format()
            .map_err(|err| config_err("failed to read format", &err))?;
        fmt.width = settings.format.width;
        fmt.height = settings.format.height;
        fmt.fourcc = settings.format.fourcc.into();
        let fmt = device
            .set_format(&fmt)
            .map_err(|err| config_err("failed to set format", &err))?;

        let actual = Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        };
        if !actual.same_layout(&settings.format) {
            warn!(
                requested = %settings.format,
                actual = %actual,
                "driver substituted a different format"
            );
        }
        debug!(
            xclk_freq_hz = settings.xclk_freq_hz,
            "sensor clock is managed by the kernel driver"
        );

        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, settings.buffer_count)
            .map_err(|err| config_err("failed to create capture stream", &err))?;
        stream.set_timeout(settings.timeout);

        self.stream = Some(stream);
        self.device = Some(device);
        self.format = Some(actual.clone());
        self.pool_limit = settings.buffer_count.max(1) as usize;
        self.pool.clear();

        info!(format = %actual, buffers = settings.buffer_count, "camera configured");
        Ok(actual)
    }

    fn acquire_frame(&mut self) -> Result<FrameBuffer> {
        let (Some(stream), Some(format)) = (self.stream.as_mut(), self.format.as_ref()) else {
            return Err(CameraError::NotConfigured);
        };

        let (buf, meta) = stream.next().map_err(|err| {
            if err.kind() == io::ErrorKind::TimedOut {
                CameraError::Timeout
            } else {
                CameraError::Acquire(err.to_string())
            }
        })?;

        let used = buf.get(..meta.bytesused as usize).unwrap_or(buf);
        let mut data = self.pool.pop().unwrap_or_default();
        data.clear();
        data.extend_from_slice(used);

        // V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        Ok(FrameBuffer::new(
            data,
            format.clone(),
            meta.sequence,
            Duration::new(secs, nanos),
        ))
    }

    fn release_frame(&mut self, frame: FrameBuffer) {
        let data = frame.into_data();
        if self.pool.len() < self.pool_limit {
            self.pool.push(data);
        }
    }
}

//! Core traits and types for the camera and storage adapters.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, StorageError};

/// Pixel format representation (e.g., YUYV, MJPG, RGBP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
    /// RGB565 pixel format (16-bit packed RGB).
    pub const RGB565: Self = Self::new(b"RGBP");
    /// 8-bit greyscale.
    pub const GREY: Self = Self::new(b"GREY");

    /// Bytes per pixel for uncompressed formats, `None` for compressed ones.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> Option<u32> {
        match &self.0 {
            b"YUYV" | b"RGBP" => Some(2),
            b"RGB3" => Some(3),
            b"GREY" => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl FromStr for FourCC {
    type Err = String;

    /// Accepts a raw four-character code or one of the aliases
    /// `RGB565`, `RGB888`, `JPEG`, `GRAYSCALE`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RGB565" => Ok(Self::RGB565),
            "RGB888" => Ok(Self::RGB3),
            "JPEG" => Ok(Self::MJPG),
            "GRAYSCALE" => Ok(Self::GREY),
            _ => {
                let code: [u8; 4] = s
                    .as_bytes()
                    .try_into()
                    .map_err(|_| format!("unknown pixel format '{s}'"))?;
                Ok(Self(code))
            }
        }
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Image format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride), zero for compressed formats.
    pub stride: u32,
    /// Total frame size in bytes, zero for compressed formats.
    pub size: u32,
}

impl Format {
    /// Create a new format specification.
    ///
    /// Sizes that do not fit in `u32` saturate; use [`Self::checked_new`]
    /// for dimensions that come from user input.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = match fourcc.bytes_per_pixel() {
            Some(bpp) => width.saturating_mul(bpp),
            None => 0,
        };
        Self {
            width,
            height,
            fourcc,
            stride,
            size: stride.saturating_mul(height),
        }
    }

    /// Like [`Self::new`], but `None` when stride or size overflow `u32`.
    #[must_use]
    pub const fn checked_new(width: u32, height: u32, fourcc: FourCC) -> Option<Self> {
        let stride = match fourcc.bytes_per_pixel() {
            Some(bpp) => match width.checked_mul(bpp) {
                Some(stride) => stride,
                None => return None,
            },
            None => 0,
        };
        match stride.checked_mul(height) {
            Some(size) => Some(Self {
                width,
                height,
                fourcc,
                stride,
                size,
            }),
            None => None,
        }
    }

    /// Whether two formats describe the same pixel layout.
    #[must_use]
    pub fn same_layout(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.fourcc == other.fourcc
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.fourcc)
    }
}

/// Parameters handed to [`CameraDriver::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    /// Device index (e.g., 0 for /dev/video0). Opaque to the pipeline.
    pub device_index: u32,
    /// Sensor clock frequency in hertz.
    pub xclk_freq_hz: u32,
    /// Requested frame format.
    pub format: Format,
    /// Number of frame buffers the driver keeps.
    pub buffer_count: u32,
    /// Upper bound for a single `acquire_frame` call.
    pub timeout: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            xclk_freq_hz: 20_000_000,
            format: Format::new(96, 96, FourCC::RGB565),
            buffer_count: 1,
            timeout: Duration::from_millis(1000),
        }
    }
}

/// One captured frame, exclusively owned until handed back to the driver.
///
/// Deliberately not `Clone`: the only way to give it up is
/// [`CameraDriver::release_frame`], which takes it by value.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Vec<u8>,
    format: Format,
    sequence: u32,
    timestamp: Duration,
}

impl FrameBuffer {
    /// Wrap driver-provided bytes. `data` must already be truncated to the
    /// bytes the driver reported as used.
    #[must_use]
    pub const fn new(data: Vec<u8>, format: Format, sequence: u32, timestamp: Duration) -> Self {
        Self {
            data,
            format,
            sequence,
            timestamp,
        }
    }

    /// Raw pixel bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of valid bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Format the driver reports for this frame.
    #[must_use]
    pub const fn format(&self) -> &Format {
        &self.format
    }

    /// Driver frame sequence number.
    #[must_use]
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Capture timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Take the backing allocation, for drivers that recycle it.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Abstraction over the camera sensor driver.
pub trait CameraDriver {
    /// Initialize the sensor. Returns the format the driver actually set.
    fn configure(&mut self, settings: &CameraSettings) -> Result<Format>;

    /// Block until a frame is available or the driver timeout elapses.
    fn acquire_frame(&mut self) -> Result<FrameBuffer>;

    /// Hand a frame back to the driver's buffer pool.
    fn release_frame(&mut self, frame: FrameBuffer);
}

/// Abstraction over removable block storage.
///
/// File primitives take names relative to the mount point and fail with
/// [`StorageError::NotMounted`] outside a mount. Callers normally go
/// through [`crate::storage::MountSession`] rather than calling these directly.
pub trait BlockStorage {
    /// Root under which files are addressable while mounted.
    fn mount_point(&self) -> &Path;

    /// Make the mount point's namespace available.
    fn mount(&mut self) -> std::result::Result<(), StorageError>;

    /// Release the device.
    fn unmount(&mut self) -> std::result::Result<(), StorageError>;

    /// Read a whole file.
    fn read(&self, name: &str) -> std::result::Result<Vec<u8>, StorageError>;

    /// Create or truncate a file, write all bytes, flush, and close it.
    fn write(&mut self, name: &str, data: &[u8]) -> std::result::Result<(), StorageError>;

    /// Names of the files at the root of the mount point.
    fn list(&self) -> std::result::Result<Vec<String>, StorageError>;
}

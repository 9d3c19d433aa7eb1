//! Mock camera and storage for testing without hardware.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CameraError, Result, StorageError};
use crate::traits::{BlockStorage, CameraDriver, CameraSettings, Format, FourCC, FrameBuffer};

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Every byte holds the low byte of the frame's acquire index.
    FrameIndex,
    /// Bytes ramp 0..=255 and wrap.
    Ramp,
    /// Every byte holds the given value.
    Solid(u8),
}

/// Mock camera driver with scripted failures and call accounting.
pub struct MockCamera {
    format: Format,
    delivered: Option<Format>,
    pattern: TestPattern,
    fail_configure: bool,
    failing_acquires: HashSet<usize>,
    configured: bool,
    configure_calls: usize,
    acquire_calls: usize,
    release_calls: usize,
    outstanding: usize,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCamera {
    /// Create a new mock camera with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            format: Format::new(96, 96, FourCC::RGB565),
            delivered: None,
            pattern: TestPattern::FrameIndex,
            fail_configure: false,
            failing_acquires: HashSet::new(),
            configured: false,
            configure_calls: 0,
            acquire_calls: 0,
            release_calls: 0,
            outstanding: 0,
        }
    }

    /// Make `configure` fail as if the sensor did not answer.
    #[must_use]
    pub const fn fail_configure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    /// Make the acquire attempts with these zero-based indices fail.
    #[must_use]
    pub fn fail_acquires<I: IntoIterator<Item = usize>>(mut self, indices: I) -> Self {
        self.failing_acquires.extend(indices);
        self
    }

    /// Report this format on frames regardless of what was configured.
    #[must_use]
    pub fn deliver_format(mut self, format: Format) -> Self {
        self.delivered = Some(format);
        self
    }

    /// Set the pattern used for frame payloads.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Number of `configure` calls.
    pub const fn configure_calls(&self) -> usize {
        self.configure_calls
    }

    /// Number of `acquire_frame` calls, failed ones included.
    pub const fn acquire_calls(&self) -> usize {
        self.acquire_calls
    }

    /// Number of `release_frame` calls.
    pub const fn release_calls(&self) -> usize {
        self.release_calls
    }

    /// Frames acquired and not yet released.
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl CameraDriver for MockCamera {
    fn configure(&mut self, settings: &CameraSettings) -> Result<Format> {
        self.configure_calls += 1;
        if self.fail_configure {
            return Err(CameraError::Config("sensor did not respond".to_owned()));
        }
        self.format = settings.format.clone();
        self.configured = true;
        Ok(self.format.clone())
    }

    fn acquire_frame(&mut self) -> Result<FrameBuffer> {
        let index = self.acquire_calls;
        self.acquire_calls += 1;

        if !self.configured {
            return Err(CameraError::NotConfigured);
        }
        if self.failing_acquires.contains(&index) {
            return Err(CameraError::Timeout);
        }

        let format = self.delivered.clone().unwrap_or_else(|| self.format.clone());
        let data = generate_test_frame(&format, self.pattern, index);
        self.outstanding += 1;

        #[allow(clippy::cast_possible_truncation)]
        let seq = index as u32;
        Ok(FrameBuffer::new(
            data,
            format,
            seq,
            Duration::from_millis(u64::from(seq) * 33), // ~30fps
        ))
    }

    fn release_frame(&mut self, frame: FrameBuffer) {
        drop(frame);
        self.release_calls += 1;
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}

/// Generate test frame data based on pattern.
#[allow(clippy::cast_possible_truncation)]
fn generate_test_frame(format: &Format, pattern: TestPattern, index: usize) -> Vec<u8> {
    // Compressed formats get an arbitrary small payload
    let size = if format.size == 0 { 512 } else { format.size as usize };

    match pattern {
        TestPattern::FrameIndex => vec![index as u8; size],
        TestPattern::Ramp => (0..size).map(|i| i as u8).collect(),
        TestPattern::Solid(value) => vec![value; size],
    }
}

/// In-memory block storage with injectable failures.
pub struct MockStorage {
    mount_point: PathBuf,
    files: BTreeMap<String, Vec<u8>>,
    mounted: bool,
    fail_mount: bool,
    fail_unmount: bool,
    failing_writes: HashSet<String>,
    failing_reads: HashSet<String>,
    mount_calls: usize,
    unmount_calls: usize,
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStorage {
    /// Create empty, unmounted storage at `/sdcard`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mount_point: PathBuf::from("/sdcard"),
            files: BTreeMap::new(),
            mounted: false,
            fail_mount: false,
            fail_unmount: false,
            failing_writes: HashSet::new(),
            failing_reads: HashSet::new(),
            mount_calls: 0,
            unmount_calls: 0,
        }
    }

    /// Preload a file.
    #[must_use]
    pub fn with_file(mut self, name: &str, data: &[u8]) -> Self {
        self.files.insert(name.to_owned(), data.to_vec());
        self
    }

    /// Make `mount` fail as if no card were inserted.
    #[must_use]
    pub const fn fail_mount(mut self) -> Self {
        self.fail_mount = true;
        self
    }

    /// Make `unmount` report an error.
    #[must_use]
    pub const fn fail_unmount(mut self) -> Self {
        self.fail_unmount = true;
        self
    }

    /// Make writes to `name` fail.
    #[must_use]
    pub fn fail_write(mut self, name: &str) -> Self {
        self.failing_writes.insert(name.to_owned());
        self
    }

    /// Make reads of `name` fail with a non-`NotFound` error.
    #[must_use]
    pub fn fail_read(mut self, name: &str) -> Self {
        self.failing_reads.insert(name.to_owned());
        self
    }

    /// Contents of a file, if present.
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Whether storage is currently mounted.
    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Number of `mount` calls.
    pub const fn mount_calls(&self) -> usize {
        self.mount_calls
    }

    /// Number of `unmount` calls.
    pub const fn unmount_calls(&self) -> usize {
        self.unmount_calls
    }

    fn io_err(&self, name: &str, kind: io::ErrorKind) -> StorageError {
        StorageError::Io {
            path: self.mount_point.join(name),
            source: io::Error::from(kind),
        }
    }
}

impl BlockStorage for MockStorage {
    fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    fn mount(&mut self) -> std::result::Result<(), StorageError> {
        self.mount_calls += 1;
        if self.fail_mount {
            return Err(StorageError::Mount {
                mount_point: self.mount_point.clone(),
                reason: "no card".to_owned(),
            });
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> std::result::Result<(), StorageError> {
        self.unmount_calls += 1;
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        self.mounted = false;
        if self.fail_unmount {
            return Err(StorageError::Unmount {
                mount_point: self.mount_point.clone(),
                reason: "card busy".to_owned(),
            });
        }
        Ok(())
    }

    fn read(&self, name: &str) -> std::result::Result<Vec<u8>, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        if self.failing_reads.contains(name) {
            return Err(self.io_err(name, io::ErrorKind::InvalidData));
        }
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| self.io_err(name, io::ErrorKind::NotFound))
    }

    fn write(&mut self, name: &str, data: &[u8]) -> std::result::Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        if self.failing_writes.contains(name) {
            return Err(self.io_err(name, io::ErrorKind::PermissionDenied));
        }
        self.files.insert(name.to_owned(), data.to_vec());
        Ok(())
    }

    fn list(&self) -> std::result::Result<Vec<String>, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        Ok(self.files.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_requires_configure() {
        let mut camera = MockCamera::new();
        assert!(matches!(
            camera.acquire_frame(),
            Err(CameraError::NotConfigured)
        ));
    }

    #[test]
    fn test_mock_camera_scripted_failures() {
        let mut camera = MockCamera::new().fail_acquires([1]);
        camera
            .configure(&CameraSettings::default())
            .expect("configure should succeed");

        let frame = camera.acquire_frame().expect("first acquire should succeed");
        assert_eq!(frame.sequence(), 0);
        assert_eq!(frame.len(), 96 * 96 * 2);
        camera.release_frame(frame);

        assert!(camera.acquire_frame().is_err());

        let frame = camera.acquire_frame().expect("third acquire should succeed");
        assert_eq!(frame.data().first(), Some(&2));
        assert_eq!(camera.outstanding(), 1);
        camera.release_frame(frame);

        assert_eq!(camera.acquire_calls(), 3);
        assert_eq!(camera.release_calls(), 2);
        assert_eq!(camera.outstanding(), 0);
    }

    #[test]
    fn test_ramp_pattern() {
        let format = Format::new(16, 16, FourCC::GREY);
        let data = generate_test_frame(&format, TestPattern::Ramp, 0);
        assert_eq!(data.len(), 256);
        assert_eq!(data.get(255), Some(&255));
    }

    #[test]
    fn test_mock_storage_roundtrip() {
        let mut storage = MockStorage::new().with_file("config.txt", b"3");
        assert!(matches!(storage.read("config.txt"), Err(StorageError::NotMounted)));

        storage.mount().expect("mount should succeed");
        assert_eq!(storage.read("config.txt").expect("read failed"), b"3");
        assert!(storage.read("missing").expect_err("should fail").is_not_found());
        storage.write("IMAGE3.BIN", b"px").expect("write failed");
        assert_eq!(storage.list().expect("list failed").len(), 2);
        storage.unmount().expect("unmount failed");
    }
}

//! Block storage backed by a mounted directory, and the scoped mount guard.

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::traits::BlockStorage;

/// Storage rooted at a directory where the card's filesystem is mounted.
///
/// By default `mount` only succeeds when the directory sits on a different
/// device than its parent, so an absent card (missing directory, or an empty
/// directory on the root filesystem) is reported instead of silently writing
/// to the root filesystem. Nothing is ever formatted or created.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    mount_point: PathBuf,
    require_mount_point: bool,
    mounted: bool,
}

impl DirectoryStorage {
    /// Create storage for the given mount point. Nothing is touched yet.
    pub fn new<P: Into<PathBuf>>(mount_point: P) -> Self {
        Self {
            mount_point: mount_point.into(),
            require_mount_point: true,
            mounted: false,
        }
    }

    /// Whether `mount` insists on a real mount point. Disable to use a
    /// plain directory.
    #[must_use]
    pub const fn require_mount_point(mut self, required: bool) -> Self {
        self.require_mount_point = required;
        self
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        Ok(self.mount_point.join(name))
    }
}

impl BlockStorage for DirectoryStorage {
    fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    fn mount(&mut self) -> Result<(), StorageError> {
        let mount_err = |reason: String| StorageError::Mount {
            mount_point: self.mount_point.clone(),
            reason,
        };

        let meta = fs::metadata(&self.mount_point).map_err(|err| mount_err(err.to_string()))?;
        if !meta.is_dir() {
            return Err(mount_err("not a directory".to_owned()));
        }
        if meta.permissions().readonly() {
            return Err(mount_err("directory has no write permission".to_owned()));
        }
        if self.require_mount_point && !is_mount_point(&self.mount_point, &meta) {
            return Err(mount_err("no filesystem mounted here".to_owned()));
        }

        self.mounted = true;
        info!(mount_point = %self.mount_point.display(), "storage mounted");
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        self.mounted = false;

        // Flush directory entries so new files survive power loss.
        File::open(&self.mount_point)
            .and_then(|dir| dir.sync_all())
            .map_err(|err| StorageError::Unmount {
                mount_point: self.mount_point.clone(),
                reason: err.to_string(),
            })?;

        info!(mount_point = %self.mount_point.display(), "storage unmounted");
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_of(name)?;
        fs::read(&path).map_err(|source| StorageError::Io { path, source })
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path_of(name)?;
        let result = File::create(&path).and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        });
        result.map_err(|source| StorageError::Io { path, source })?;
        debug!(file = name, bytes = data.len(), "wrote file");
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let path = self.path_of("")?;
        let entries = fs::read_dir(&path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
            if entry.file_type().is_ok_and(|ty| ty.is_file()) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

/// A directory is a mount point when it lives on a different device than
/// its parent. The filesystem root always counts.
fn is_mount_point(path: &Path, meta: &fs::Metadata) -> bool {
    let Ok(canonical) = fs::canonicalize(path) else {
        return false;
    };
    match canonical.parent() {
        Some(parent) => fs::metadata(parent).is_ok_and(|parent| parent.dev() != meta.dev()),
        None => true,
    }
}

/// Proof that storage is mounted. File access only goes through a session.
///
/// [`MountSession::unmount`] consumes the session; if a session is dropped
/// without it (early return, panic unwinding), the drop handler unmounts
/// and logs. Either way the device is unmounted exactly once per
/// successful mount.
pub struct MountSession<'a, S: BlockStorage> {
    storage: &'a mut S,
    active: bool,
}

impl<'a, S: BlockStorage> MountSession<'a, S> {
    /// Mount `storage` and open a session over it.
    pub fn open(storage: &'a mut S) -> Result<Self, StorageError> {
        storage.mount()?;
        Ok(Self {
            storage,
            active: true,
        })
    }

    /// Root under which files are addressable.
    pub fn mount_point(&self) -> &Path {
        self.storage.mount_point()
    }

    /// Read a whole file.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.storage.read(name)
    }

    /// Create or truncate a file and write `data` durably.
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.storage.write(name, data)
    }

    /// Names of the files at the mount point root.
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        self.storage.list()
    }

    /// End the session and unmount.
    pub fn unmount(mut self) -> Result<(), StorageError> {
        self.active = false;
        self.storage.unmount()
    }
}

impl<S: BlockStorage> Drop for MountSession<'_, S> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            if let Err(err) = self.storage.unmount() {
                warn!(error = %err, "unmount on session drop failed");
            }
        }
    }
}

//! Durable image sequence numbering.
//!
//! The next sequence number lives in a counter file on the card, stored as
//! ASCII decimal with no trailing newline. Reading it, handing out the
//! value, and writing back its successor is the only durable state the
//! capture pipeline keeps.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::StorageError;
use crate::storage::MountSession;
use crate::traits::BlockStorage;

/// Derives image file names of the form `<prefix><N><extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNaming {
    prefix: String,
    extension: String,
}

impl Default for ImageNaming {
    fn default() -> Self {
        Self::new("IMAGE", ".BIN")
    }
}

impl ImageNaming {
    /// Create a naming scheme. `extension` includes its leading dot.
    pub fn new<P: Into<String>, E: Into<String>>(prefix: P, extension: E) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// File name for a sequence number, without zero padding.
    #[must_use]
    pub fn file_name(&self, sequence: u32) -> String {
        format!("{}{sequence}{}", self.prefix, self.extension)
    }

    /// Recover the sequence number from a name this scheme produced.
    #[must_use]
    pub fn parse_sequence(&self, name: &str) -> Option<u32> {
        let digits = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.extension.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Highest sequence number among `names`, ignoring foreign files.
    pub fn highest_sequence<I, S>(&self, names: I) -> Option<u32>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| self.parse_sequence(name.as_ref()))
            .max()
    }
}

/// What to do when the successor cannot be written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterWritePolicy {
    /// Log and hand out the number anyway. The next run will reuse it and
    /// overwrite this run's image.
    #[default]
    Tolerate,
    /// Fail the capture so no image is written under a number that is not
    /// durably consumed.
    Fatal,
}

/// Where numbering restarts when the counter file is missing or corrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterRecovery {
    /// Restart at 0.
    #[default]
    Reset,
    /// Restart one past the highest image already on the card.
    ScanDirectory,
}

/// Parse counter file contents. Surrounding ASCII whitespace is allowed.
#[must_use]
pub fn parse_counter(contents: &[u8]) -> Option<u32> {
    std::str::from_utf8(contents).ok()?.trim().parse().ok()
}

/// Hands out strictly increasing sequence numbers across restarts.
///
/// Not synchronized: `next` takes the mount session mutably, so within one
/// process two calls cannot overlap.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    file_name: String,
    naming: ImageNaming,
    write_policy: CounterWritePolicy,
    recovery: CounterRecovery,
}

impl SequenceCounter {
    /// Counter stored in `file_name` at the mount point root.
    pub fn new<F: Into<String>>(file_name: F, naming: ImageNaming) -> Self {
        Self {
            file_name: file_name.into(),
            naming,
            write_policy: CounterWritePolicy::default(),
            recovery: CounterRecovery::default(),
        }
    }

    /// Set the write-failure policy.
    #[must_use]
    pub const fn with_write_policy(mut self, policy: CounterWritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Set the recovery policy for a missing or corrupt counter.
    #[must_use]
    pub const fn with_recovery(mut self, recovery: CounterRecovery) -> Self {
        self.recovery = recovery;
        self
    }

    /// Naming scheme the counter feeds.
    pub const fn naming(&self) -> &ImageNaming {
        &self.naming
    }

    /// Name of the counter file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Value the next call to [`Self::next`] would return.
    pub fn current<S: BlockStorage>(&self, session: &MountSession<'_, S>) -> u32 {
        match session.read(&self.file_name) {
            Ok(contents) => {
                if let Some(value) = parse_counter(&contents) {
                    return value;
                }
                error!(file = %self.file_name, "failed to parse counter file");
            }
            Err(err) if err.is_not_found() => {
                info!(file = %self.file_name, "counter file not found, starting fresh");
            }
            Err(err) => {
                error!(error = %err, "failed to read counter file");
            }
        }
        self.recover(session)
    }

    fn recover<S: BlockStorage>(&self, session: &MountSession<'_, S>) -> u32 {
        match self.recovery {
            CounterRecovery::Reset => 0,
            CounterRecovery::ScanDirectory => match session.list() {
                Ok(names) => {
                    let start = self
                        .naming
                        .highest_sequence(&names)
                        .map_or(0, |highest| highest.wrapping_add(1));
                    warn!(start, "recovered counter from existing images");
                    start
                }
                Err(err) => {
                    warn!(error = %err, "directory scan failed, starting from 0");
                    0
                }
            },
        }
    }

    /// Consume and return the current sequence number, persisting its
    /// successor.
    ///
    /// # Errors
    ///
    /// Only under [`CounterWritePolicy::Fatal`], when the successor could
    /// not be written.
    pub fn next<S: BlockStorage>(
        &self,
        session: &mut MountSession<'_, S>,
    ) -> Result<u32, StorageError> {
        let current = self.current(session);
        let successor = current.checked_add(1).unwrap_or_else(|| {
            warn!(current, "sequence counter wrapped around");
            0
        });

        if let Err(err) = session.write(&self.file_name, successor.to_string().as_bytes()) {
            match self.write_policy {
                CounterWritePolicy::Tolerate => {
                    error!(
                        error = %err,
                        sequence = current,
                        "failed to persist counter, next capture will reuse this number"
                    );
                }
                CounterWritePolicy::Fatal => return Err(err),
            }
        }

        info!(file = %self.naming.file_name(current), "next filename");
        Ok(current)
    }
}

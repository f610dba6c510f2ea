pub mod byte_order;
pub mod format;
pub mod key;
pub mod timestamp;

use std::fmt;
use std::num::NonZeroU32;

use bitflags::bitflags;
use pcmseq_error::{PcmError, Result};
use serde::{Deserialize, Serialize};

pub use byte_order::{ByteOrder, ByteOrderPolicy};
pub use format::SubFormat;
pub use key::RecordKey;
pub use timestamp::Timestamp;

/// A 1-based entry ordinal within a file.
///
/// Entry numbering starts at 1. Entry 0 does not exist.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EntryNumber(NonZeroU32);

impl EntryNumber {
    /// Entry 1, the first entry of every file.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a new entry number. Returns `None` if `n` is 0.
    #[inline]
    pub const fn new(n: u32) -> Option<Self> {
        match NonZeroU32::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Zero-based position of this entry in a directory.
    #[inline]
    pub const fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// The following entry number, saturating at `u32::MAX`.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Debug for EntryNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryNumber({})", self.0)
    }
}

impl fmt::Display for EntryNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for EntryNumber {
    type Error = PcmError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value).ok_or_else(|| PcmError::range("entry", 0, 1, i64::from(u32::MAX)))
    }
}

/// Directory row for one entry, as recovered by the backward indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Byte offset of the entry header.
    pub offset: u64,
    /// Sample count from the last segment's recordwords, or recovered by scanning.
    pub sample_count: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Stored datetime, undecoded.
    pub raw_time: u64,
}

impl EntryRecord {
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::from_ticks(self.raw_time)
    }
}

/// Answer to a directory lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub sample_count: u32,
    pub sample_rate: u32,
    pub timestamp: Timestamp,
    pub entry_count: u32,
}

bitflags! {
    /// What a file format can represent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capabilities: u32 {
        /// The file holds more than one entry.
        const MULTI_ENTRY = 0x01;
        /// The file stores a per-entry sample rate.
        const SAMPLE_RATE = 0x02;
    }
}

impl Capabilities {
    /// Capabilities of every PCM_SEQ2 file.
    pub const PCM_SEQ2: Self = Self::MULTI_ENTRY.union(Self::SAMPLE_RATE);
}

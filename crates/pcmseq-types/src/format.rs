//! Sub-format geometry of PCM_SEQ2 files.
//!
//! Two on-disk variants exist. Type 1 (VMS record framing) prefixes every
//! record with a 2-byte record-size word; type 2 omits it. Every other offset
//! in an entry header or a segment shifts by that prefix, so the layout is
//! expressed once in terms of [`SubFormat::record_prefix`].
//!
//! Segment layout, relative to the segment start with prefix `p`:
//!
//! | field        | offset          | size   |
//! |--------------|-----------------|--------|
//! | control 1    | `p`             | 2      |
//! | match key    | `p + 2`         | 28     |
//! | recordwords  | `p + 30`        | 4      |
//! | samples 1    | `p + 34`        | 1005×2 |
//! | control 2    | `2p + 2044`     | 2      |
//! | samples 2    | `2p + 2046`     | 1021×2 |
//! | control 3    | `3p + 4088`     | 2      |
//! | samples 3    | `3p + 4090`     | 22×2   |

use pcmseq_error::{PcmError, Result};
use serde::{Deserialize, Serialize};

/// Logical samples per full segment.
pub const SAMPLES_PER_SEGMENT: usize = 2048;
/// Samples in the first sub-block.
pub const FIRST_BLOCK_SAMPLES: usize = 1005;
/// Samples in the middle sub-block.
pub const MIDDLE_BLOCK_SAMPLES: usize = 1021;
/// Samples in the last sub-block.
pub const LAST_BLOCK_SAMPLES: usize = 22;
/// Sample sizes of the three sub-blocks, in file order.
pub const BLOCK_SAMPLES: [usize; 3] = [
    FIRST_BLOCK_SAMPLES,
    MIDDLE_BLOCK_SAMPLES,
    LAST_BLOCK_SAMPLES,
];
/// Segment position at which the middle sub-block begins.
pub const MIDDLE_BLOCK_START: usize = FIRST_BLOCK_SAMPLES;
/// Segment position at which the last sub-block begins.
pub const LAST_BLOCK_START: usize = FIRST_BLOCK_SAMPLES + MIDDLE_BLOCK_SAMPLES;

/// Length of an init key or match key.
pub const KEY_LEN: usize = 28;
/// Marker opening an entry header's init key.
pub const INIT_KEY_MARKER: [u8; 2] = *b" 2";
/// Marker opening a segment's match key.
pub const MATCH_KEY_MARKER: [u8; 2] = *b" 3";
/// Key bytes that must agree between an entry and its segments.
pub const KEY_MATCH_RANGE: std::ops::Range<usize> = 2..18;
/// Key bytes searched for when rescuing a truncated trailing segment.
pub const KEY_SCAN_RANGE: std::ops::Range<usize> = 2..16;

/// Control word opening an entry header.
pub const CONTROL_ENTRY: u16 = 0x0003;
/// Control word opening a segment (first sub-block).
pub const CONTROL_FIRST: u16 = 0x0001;
/// Control word opening the middle sub-block.
pub const CONTROL_MIDDLE: u16 = 0x0000;
/// Control word opening the last sub-block.
pub const CONTROL_LAST: u16 = 0x0002;

/// Type 1 record size of an entry header.
pub const RECORD_SIZE_ENTRY: u16 = 0x0036;
/// Type 1 record size of the first and middle sub-blocks.
pub const RECORD_SIZE_BLOCK: u16 = 0x07fc;
/// Type 1 record size of the last sub-block.
pub const RECORD_SIZE_LAST: u16 = 0x002e;

/// Bytes read when probing for a segment header.
pub const SEGMENT_PROBE_LEN: usize = 36;
/// Bytes read when probing for an entry header.
pub const ENTRY_PROBE_LEN: usize = 56;

/// Values the writer stores in fields readers ignore.
pub const STORED_SEGMENT_SIZE: u32 = 2048;
pub const STORED_PCM_START: u32 = 1;
pub const STORED_GAIN: u32 = 0x20f01;

/// Entry header body size, excluding any record prefix.
const ENTRY_BODY_LEN: usize = 2 + KEY_LEN + 8 + 4 * 4;
/// Segment body size, excluding record prefixes.
const SEGMENT_BODY_LEN: usize = 2 + KEY_LEN + 4 + 2 * 2 + SAMPLES_PER_SEGMENT * 2;

/// On-disk variant of a PCM_SEQ2 file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubFormat {
    /// Legacy variant with 2-byte record-size prefixes.
    Type1,
    /// Unprefixed variant.
    #[default]
    Type2,
}

impl SubFormat {
    /// Classify a file by its first byte.
    pub fn from_discriminator(byte: u8) -> Result<Self> {
        match byte {
            0x36 => Ok(Self::Type1),
            0x03 => Ok(Self::Type2),
            other => Err(PcmError::UnknownSubFormat { byte: other }),
        }
    }

    /// Expected first byte of a file in this variant.
    #[must_use]
    pub const fn discriminator(self) -> u8 {
        match self {
            Self::Type1 => 0x36,
            Self::Type2 => 0x03,
        }
    }

    /// Bytes of record-size prefix before each record.
    #[must_use]
    pub const fn record_prefix(self) -> usize {
        match self {
            Self::Type1 => 2,
            Self::Type2 => 0,
        }
    }

    #[must_use]
    pub const fn entry_header_size(self) -> usize {
        self.record_prefix() + ENTRY_BODY_LEN
    }

    #[must_use]
    pub const fn segment_size(self) -> usize {
        3 * self.record_prefix() + SEGMENT_BODY_LEN
    }

    /// Size of a segment's first sub-block header (prefix, control, key, recordwords).
    #[must_use]
    pub const fn segment_header_size(self) -> usize {
        self.record_prefix() + 2 + KEY_LEN + 4
    }

    /// Size of a middle or last sub-block header (prefix, control).
    #[must_use]
    pub const fn block_header_size(self) -> usize {
        self.record_prefix() + 2
    }

    /// Offset of a record's control word.
    #[must_use]
    pub const fn control_offset(self) -> usize {
        self.record_prefix()
    }

    /// Offset of the key within an entry header or segment.
    #[must_use]
    pub const fn key_offset(self) -> usize {
        self.record_prefix() + 2
    }

    /// Offset of the recordwords field within a segment.
    #[must_use]
    pub const fn recordwords_offset(self) -> usize {
        self.key_offset() + KEY_LEN
    }

    /// Offset of the raw datetime within an entry header.
    #[must_use]
    pub const fn datetime_offset(self) -> usize {
        self.key_offset() + KEY_LEN
    }

    /// Offset of the sample rate within an entry header.
    #[must_use]
    pub const fn sample_rate_offset(self) -> usize {
        self.datetime_offset() + 8 + 12
    }

    /// Offsets of the three sub-blocks' sample data within a segment.
    #[must_use]
    pub const fn block_sample_offsets(self) -> [usize; 3] {
        let first = self.segment_header_size();
        let middle = first + FIRST_BLOCK_SAMPLES * 2 + self.block_header_size();
        let last = middle + MIDDLE_BLOCK_SAMPLES * 2 + self.block_header_size();
        [first, middle, last]
    }

    /// Offsets of the middle and last sub-block control words within a segment.
    #[must_use]
    pub const fn block_control_offsets(self) -> [usize; 2] {
        let [_, middle, last] = self.block_sample_offsets();
        [middle - 2, last - 2]
    }

    /// Whether `probe` starts with a valid segment header for this variant.
    #[must_use]
    pub fn is_segment_probe(self, probe: &[u8]) -> bool {
        let p = self.record_prefix();
        let prefix_ok = match self {
            Self::Type1 => probe.get(..2) == Some(&RECORD_SIZE_BLOCK.to_le_bytes()[..]),
            Self::Type2 => true,
        };
        prefix_ok && probe.get(p..p + 4) == Some(&[0x01, 0x00, 0x20, 0x33][..])
    }

    /// Whether `probe` starts with a valid entry header for this variant.
    #[must_use]
    pub fn is_entry_probe(self, probe: &[u8]) -> bool {
        let p = self.record_prefix();
        let prefix_ok = match self {
            Self::Type1 => probe.get(..2) == Some(&RECORD_SIZE_ENTRY.to_le_bytes()[..]),
            Self::Type2 => true,
        };
        prefix_ok && probe.get(p..p + 4) == Some(&[0x03, 0x00, 0x20, 0x32][..])
    }

    /// Distance from a key-scan match back to the start of its segment.
    #[must_use]
    pub const fn key_scan_backoff(self) -> usize {
        self.key_offset() + KEY_SCAN_RANGE.start
    }
}

impl std::fmt::Display for SubFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type1 => f.write_str("type1"),
            Self::Type2 => f.write_str("type2"),
        }
    }
}

use pcmseq_types::{ByteOrderPolicy, SubFormat};
use serde::{Deserialize, Serialize};

/// Sample rate written when the caller never sets one.
pub const DEFAULT_SAMPLE_RATE: u32 = 20_000;

/// Where a read handle keeps the decoded samples of the last entry read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Anonymous memory map sized to the entry.
    #[default]
    Mmap,
    /// Plain heap vector.
    Heap,
}

/// Settings applied when a handle is opened.
///
/// Stored byte order is not a setting: every PCM_SEQ2 file is little-endian
/// and the handle only swaps when the host differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PcmConfig {
    pub sample_rate: u32,
    pub allocation: AllocationStrategy,
    /// Sub-format used for newly written files.
    pub sub_format: SubFormat,
}

impl Default for PcmConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            allocation: AllocationStrategy::default(),
            sub_format: SubFormat::default(),
        }
    }
}

impl PcmConfig {
    /// Conversion policy for every handle, derived from the host alone.
    #[must_use]
    pub const fn byte_order_policy(&self) -> ByteOrderPolicy {
        ByteOrderPolicy::PCM_SEQ2
    }
}

//! Per-handle scratch storage for the most recently read entry.

use memmap2::MmapMut;
use pcmseq_error::{PcmError, Result};
use tracing::trace;
use zerocopy::FromBytes;

use crate::config::AllocationStrategy;

/// Decoded samples of one entry, owned by a read handle.
///
/// Each [`ScratchBuffer::prepare`] releases the previous allocation before
/// acquiring the next, so at most one entry is ever held.
#[derive(Debug, Default)]
pub enum ScratchBuffer {
    #[default]
    Empty,
    Heap(Vec<i16>),
    Mapped(MmapMut),
}

impl ScratchBuffer {
    /// Drop the current contents and return a zeroed slice of `len` samples.
    ///
    /// Zero-length requests always use the heap; an empty anonymous map is
    /// not portable.
    pub fn prepare(&mut self, strategy: AllocationStrategy, len: usize) -> Result<&mut [i16]> {
        self.release();
        *self = match strategy {
            AllocationStrategy::Mmap if len > 0 => {
                let bytes = len
                    .checked_mul(2)
                    .ok_or_else(|| PcmError::internal("scratch buffer size overflow"))?;
                trace!(bytes, "mapping anonymous scratch buffer");
                Self::Mapped(MmapMut::map_anon(bytes)?)
            }
            _ => Self::Heap(vec![0; len]),
        };
        match self {
            Self::Empty => Ok(&mut []),
            Self::Heap(samples) => Ok(samples.as_mut_slice()),
            Self::Mapped(map) => <[i16]>::mut_from_bytes(&mut map[..])
                .map_err(|_| PcmError::internal("anonymous map is not i16-aligned")),
        }
    }

    /// Samples held by the buffer.
    pub fn samples(&self) -> Result<&[i16]> {
        match self {
            Self::Empty => Ok(&[]),
            Self::Heap(samples) => Ok(samples),
            Self::Mapped(map) => <[i16]>::ref_from_bytes(&map[..])
                .map_err(|_| PcmError::internal("anonymous map is not i16-aligned")),
        }
    }

    pub fn release(&mut self) {
        *self = Self::Empty;
    }

    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

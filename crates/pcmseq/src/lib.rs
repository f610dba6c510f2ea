//! Read and write PCM_SEQ2 multi-entry sample files.
//!
//! ```no_run
//! use pcmseq::{Mode, PcmFile};
//!
//! # fn main() -> pcmseq::Result<()> {
//! let mut out = PcmFile::open("site_1.pcm_seq2", Mode::Write)?;
//! out.write(&[0, 120, -340, 5])?;
//! out.seek(2)?;
//! out.write(&[7; 5000])?;
//! out.close()?;
//!
//! let mut input = PcmFile::open("site_1.pcm_seq2", Mode::Read)?;
//! input.seek(2)?;
//! assert_eq!(input.read()?.len(), 5000);
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod buffer;
pub mod config;
pub mod file;
pub mod format;

pub use align::{EpisodeAlignment, align};
pub use config::{AllocationStrategy, DEFAULT_SAMPLE_RATE, PcmConfig};
pub use file::{Control, ControlValue, Mode, PcmFile, Stat};
pub use format::FormatKind;
pub use pcmseq_error::{ErrorCode, PcmError, Result};
pub use pcmseq_types::{
    ByteOrder, ByteOrderPolicy, Capabilities, EntryInfo, EntryNumber, SubFormat, Timestamp,
};

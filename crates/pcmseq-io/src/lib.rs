//! Byte-level machinery for PCM_SEQ2 files.
//!
//! Files carry no global index. Entry boundaries are recovered by walking the
//! file backward from its end ([`Directory::build`]), after which the
//! [`SeqReader`] can seek to any entry and stream any sample range. The
//! [`SeqWriter`] is the append-only counterpart that packs arbitrary sample
//! chunks into fixed 2048-sample segments and backpatches each entry's size
//! when it is closed.
//!
//! Every type here is generic over the stream, so the same code runs against
//! `std::fs::File` and `std::io::Cursor<Vec<u8>>`.

pub mod header;
pub mod index;
pub mod reader;
pub mod segment;
pub mod writer;

use std::io::{self, Read, Seek, SeekFrom};

use pcmseq_types::{ByteOrderPolicy, SubFormat};

pub use header::EntryHeader;
pub use index::Directory;
pub use reader::SeqReader;
pub use segment::{DecodedSegment, SegmentHeader, SubBlock};
pub use writer::{DeferredRecordWords, SeqWriter};

/// Sub-format plus byte-order policy: everything needed to lay out a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordCodec {
    format: SubFormat,
    order: ByteOrderPolicy,
}

impl RecordCodec {
    #[must_use]
    pub const fn new(format: SubFormat, order: ByteOrderPolicy) -> Self {
        Self { format, order }
    }

    #[must_use]
    pub const fn format(&self) -> SubFormat {
        self.format
    }

    #[must_use]
    pub const fn order(&self) -> ByteOrderPolicy {
        self.order
    }

    fn put_u16(&self, out: &mut Vec<u8>, value: u16) {
        out.extend_from_slice(&self.order.convert_u16(value).to_ne_bytes());
    }

    fn put_u32(&self, out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&self.order.convert_u32(value).to_ne_bytes());
    }

    /// Append a record-size prefix when the sub-format uses one.
    fn put_record_size(&self, out: &mut Vec<u8>, size: u16) {
        if self.format.record_prefix() > 0 {
            self.put_u16(out, size);
        }
    }
}

/// Read until `buf` is full or the stream ends; returns the bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Length of a seekable stream. Leaves the position at the end.
pub(crate) fn stream_len<S: Seek + ?Sized>(stream: &mut S) -> io::Result<u64> {
    stream.seek(SeekFrom::End(0))
}

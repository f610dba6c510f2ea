//! Streaming entry writer.
//!
//! Samples arrive in chunks of any size and are packed into 2048-sample
//! segments as they come. The writer tracks `cursamp`, the position inside
//! the current segment, which decides the sub-block receiving the next
//! sample:
//!
//! ```text
//!   cursamp   0 ........ 1004 | 1005 ........ 2025 | 2026 .. 2047
//!   block     First           | Middle             | Last
//! ```
//!
//! A segment's opening header is emitted when its first sample arrives, so
//! an entry whose length is an exact multiple of 2048 never ends with an
//! empty padding segment. The entry total is unknown until the entry is
//! closed; the offset of the open segment's recordwords field is held as a
//! [`DeferredRecordWords`] and patched on close.

use std::io::{Seek, SeekFrom, Write};

use pcmseq_error::Result;
use pcmseq_types::format::SAMPLES_PER_SEGMENT;
use pcmseq_types::{ByteOrderPolicy, RecordKey, SubFormat};
use tracing::{debug, trace};

use crate::segment::SubBlock;
use crate::{EntryHeader, RecordCodec};

static ZERO_PAD: [i16; SAMPLES_PER_SEGMENT] = [0; SAMPLES_PER_SEGMENT];

/// Pending backpatch of a segment's recordwords field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredRecordWords {
    offset: u64,
}

impl DeferredRecordWords {
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    /// File offset of the field.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Write `total` into the field, then return to the end of the stream.
    pub fn apply<F: Write + Seek>(
        self,
        file: &mut F,
        order: ByteOrderPolicy,
        total: u32,
    ) -> Result<()> {
        file.seek(SeekFrom::Start(self.offset))?;
        file.write_all(&order.convert_u32(total).to_ne_bytes())?;
        file.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

/// Appends entries to a PCM_SEQ2 stream.
///
/// Call [`SeqWriter::write_header`] to open an entry, [`SeqWriter::write_data`]
/// any number of times, and pass `is_last = true` (or call
/// [`SeqWriter::finish_entry`]) to close it. Writing data without first
/// opening an entry is not detected; the samples land in segments keyed
/// with the last header's key.
#[derive(Debug)]
pub struct SeqWriter<F> {
    file: F,
    codec: RecordCodec,
    match_key: RecordKey,
    cursamp: usize,
    segment_open: bool,
    entry_open: bool,
    entry_samples: u32,
    deferred: Option<DeferredRecordWords>,
    scratch: Vec<u8>,
}

impl<F: Write + Seek> SeqWriter<F> {
    pub fn new(file: F, format: SubFormat, order: ByteOrderPolicy) -> Self {
        Self {
            file,
            codec: RecordCodec::new(format, order),
            match_key: RecordKey::from_bytes([b' '; pcmseq_types::format::KEY_LEN]).to_match_key(),
            cursamp: 0,
            segment_open: false,
            entry_open: false,
            entry_samples: 0,
            deferred: None,
            scratch: Vec::with_capacity(format.segment_size()),
        }
    }

    #[must_use]
    pub const fn format(&self) -> SubFormat {
        self.codec.format()
    }

    /// Position within the current 2048-sample segment.
    #[must_use]
    pub const fn cursamp(&self) -> usize {
        self.cursamp
    }

    /// Samples written to the open entry so far, excluding padding.
    #[must_use]
    pub const fn entry_samples(&self) -> u32 {
        self.entry_samples
    }

    #[must_use]
    pub const fn entry_open(&self) -> bool {
        self.entry_open
    }

    #[must_use]
    pub const fn deferred(&self) -> Option<DeferredRecordWords> {
        self.deferred
    }

    /// Start a new entry. An entry still open is closed first.
    pub fn write_header(&mut self, header: &EntryHeader) -> Result<()> {
        if self.entry_open {
            self.finish_entry()?;
        }
        self.scratch.clear();
        self.codec.encode_entry_header(header, &mut self.scratch);
        let offset = self.file.stream_position()?;
        self.file.write_all(&self.scratch)?;

        self.match_key = header.init_key.to_match_key();
        self.cursamp = 0;
        self.segment_open = false;
        self.entry_open = true;
        self.entry_samples = 0;
        self.deferred = None;
        debug!(
            offset,
            sample_rate = header.sample_rate,
            key = ?header.init_key,
            "entry header written"
        );
        Ok(())
    }

    /// Append samples to the open entry; `is_last` closes it afterwards.
    pub fn write_data(&mut self, samples: &[i16], is_last: bool) -> Result<()> {
        if samples.is_empty() && !self.entry_open {
            return Ok(());
        }
        self.append(samples)?;
        let added = u32::try_from(samples.len()).unwrap_or(u32::MAX);
        self.entry_samples = self.entry_samples.saturating_add(added);
        self.entry_open = true;
        if is_last {
            self.close_entry()?;
        }
        Ok(())
    }

    /// Close the open entry and return its sample total.
    pub fn finish_entry(&mut self) -> Result<u32> {
        let total = self.entry_samples;
        self.write_data(&[], true)?;
        Ok(total)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    #[must_use]
    pub const fn get_ref(&self) -> &F {
        &self.file
    }

    /// Give back the underlying stream. An open entry is left unterminated.
    pub fn into_inner(self) -> F {
        self.file
    }

    fn close_entry(&mut self) -> Result<()> {
        if !self.segment_open && self.entry_samples == 0 {
            self.open_segment()?;
        }
        if self.segment_open {
            let pad = SAMPLES_PER_SEGMENT - self.cursamp;
            trace!(pad, "padding final segment");
            self.append(&ZERO_PAD[..pad])?;
        }
        if let Some(deferred) = self.deferred.take() {
            deferred.apply(&mut self.file, self.codec.order(), self.entry_samples)?;
        }
        debug!(samples = self.entry_samples, "entry finalised");
        self.entry_open = false;
        self.cursamp = 0;
        Ok(())
    }

    /// Stream samples into segments, emitting sub-block headers at boundaries.
    fn append(&mut self, mut samples: &[i16]) -> Result<()> {
        while !samples.is_empty() {
            if !self.segment_open {
                self.open_segment()?;
            }
            let block = SubBlock::containing(self.cursamp);
            let take = samples.len().min(block.end() - self.cursamp);
            let (chunk, rest) = samples.split_at(take);

            self.scratch.clear();
            self.codec.order().encode_samples(chunk, &mut self.scratch);
            self.cursamp += take;
            if self.cursamp == block.end() {
                match block.next() {
                    Some(next) => self.codec.encode_block_header(next, &mut self.scratch),
                    None => {
                        self.cursamp = 0;
                        self.segment_open = false;
                    }
                }
            }
            self.file.write_all(&self.scratch)?;
            samples = rest;
        }
        Ok(())
    }

    fn open_segment(&mut self) -> Result<()> {
        self.scratch.clear();
        self.codec
            .encode_segment_header(&self.match_key, 0, &mut self.scratch);
        let start = self.file.stream_position()?;
        self.file.write_all(&self.scratch)?;
        self.deferred = Some(DeferredRecordWords::new(
            start + self.codec.format().recordwords_offset() as u64,
        ));
        self.segment_open = true;
        trace!(offset = start, "segment opened");
        Ok(())
    }
}

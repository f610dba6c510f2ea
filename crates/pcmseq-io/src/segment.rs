//! Segment codec.
//!
//! A segment is one control header plus three sample sub-blocks of 1005,
//! 1021 and 22 samples. Decoding works on a whole segment at once. Encoding
//! is exposed piecewise (one sub-block header at a time) because the writer
//! streams samples into a segment across many calls and never holds a full
//! segment in memory.

use pcmseq_error::{PcmError, Result};
use pcmseq_types::RecordKey;
use pcmseq_types::format::{
    BLOCK_SAMPLES, CONTROL_FIRST, CONTROL_LAST, CONTROL_MIDDLE, FIRST_BLOCK_SAMPLES,
    LAST_BLOCK_START, MIDDLE_BLOCK_START, RECORD_SIZE_BLOCK, RECORD_SIZE_LAST,
    SAMPLES_PER_SEGMENT,
};

use crate::RecordCodec;

/// One of the three sample sub-blocks of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubBlock {
    First,
    Middle,
    Last,
}

impl SubBlock {
    pub const ALL: [Self; 3] = [Self::First, Self::Middle, Self::Last];

    /// Sub-block holding segment position `cursamp` (0..2048).
    #[must_use]
    pub const fn containing(cursamp: usize) -> Self {
        if cursamp < MIDDLE_BLOCK_START {
            Self::First
        } else if cursamp < LAST_BLOCK_START {
            Self::Middle
        } else {
            Self::Last
        }
    }

    #[must_use]
    pub const fn ordinal(self) -> usize {
        match self {
            Self::First => 0,
            Self::Middle => 1,
            Self::Last => 2,
        }
    }

    /// First segment position covered by this sub-block.
    #[must_use]
    pub const fn start(self) -> usize {
        match self {
            Self::First => 0,
            Self::Middle => MIDDLE_BLOCK_START,
            Self::Last => LAST_BLOCK_START,
        }
    }

    /// One past the last segment position covered by this sub-block.
    #[must_use]
    pub const fn end(self) -> usize {
        self.start() + BLOCK_SAMPLES[self.ordinal()]
    }

    #[must_use]
    pub const fn control(self) -> u16 {
        match self {
            Self::First => CONTROL_FIRST,
            Self::Middle => CONTROL_MIDDLE,
            Self::Last => CONTROL_LAST,
        }
    }

    /// Type 1 record-size word for this sub-block.
    #[must_use]
    pub const fn record_size(self) -> u16 {
        match self {
            Self::First | Self::Middle => RECORD_SIZE_BLOCK,
            Self::Last => RECORD_SIZE_LAST,
        }
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::First => Some(Self::Middle),
            Self::Middle => Some(Self::Last),
            Self::Last => None,
        }
    }
}

/// Fields of a segment's first sub-block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub control: u16,
    pub match_key: RecordKey,
    /// Entry total in the last segment of an entry; 0 elsewhere.
    pub recordwords: i32,
}

/// A fully decoded segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSegment {
    pub header: SegmentHeader,
    pub middle_control: u16,
    pub last_control: u16,
    /// The 2048 samples in host order.
    pub samples: Vec<i16>,
}

impl Default for DecodedSegment {
    fn default() -> Self {
        Self {
            header: SegmentHeader {
                control: CONTROL_FIRST,
                match_key: RecordKey::from_bytes([b' '; pcmseq_types::format::KEY_LEN]),
                recordwords: 0,
            },
            middle_control: CONTROL_MIDDLE,
            last_control: CONTROL_LAST,
            samples: vec![0; SAMPLES_PER_SEGMENT],
        }
    }
}

impl RecordCodec {
    /// Parse the first sub-block header and check its control word.
    pub fn decode_segment_header(&self, raw: &[u8], offset: u64) -> Result<SegmentHeader> {
        let format = self.format();
        let size = format.segment_header_size();
        if raw.len() < size {
            return Err(PcmError::ShortRead {
                offset,
                expected: size,
                actual: raw.len(),
            });
        }
        let control = self
            .order()
            .read_u16(&raw[format.control_offset()..])
            .ok_or_else(|| PcmError::internal("segment control word out of bounds"))?;
        if control != CONTROL_FIRST {
            return Err(PcmError::format(
                offset,
                format!("expected segment control word 0x0001, found {control:#06x}"),
            ));
        }
        let match_key = RecordKey::from_slice(&raw[format.key_offset()..])
            .ok_or_else(|| PcmError::internal("segment key out of bounds"))?;
        let recordwords = self
            .order()
            .read_i32(&raw[format.recordwords_offset()..])
            .ok_or_else(|| PcmError::internal("segment recordwords out of bounds"))?;
        Ok(SegmentHeader {
            control,
            match_key,
            recordwords,
        })
    }

    /// Decode a whole segment, checking that it belongs to the entry keyed by `init_key`.
    pub fn decode_segment(
        &self,
        raw: &[u8],
        init_key: &RecordKey,
        offset: u64,
    ) -> Result<DecodedSegment> {
        let mut segment = DecodedSegment::default();
        self.decode_segment_into(raw, init_key, offset, &mut segment)?;
        Ok(segment)
    }

    /// Like [`RecordCodec::decode_segment`], reusing `out`'s sample buffer.
    pub fn decode_segment_into(
        &self,
        raw: &[u8],
        init_key: &RecordKey,
        offset: u64,
        out: &mut DecodedSegment,
    ) -> Result<()> {
        let format = self.format();
        let size = format.segment_size();
        if raw.len() < size {
            return Err(PcmError::ShortRead {
                offset,
                expected: size,
                actual: raw.len(),
            });
        }

        let header = self.decode_segment_header(raw, offset)?;
        if !header.match_key.has_match_marker() || !init_key.matches(&header.match_key) {
            return Err(PcmError::format(
                offset,
                "segment match key does not belong to this entry",
            ));
        }

        let [middle_at, last_at] = format.block_control_offsets();
        let control_at = |at: usize| {
            self.order()
                .read_u16(&raw[at..])
                .ok_or_else(|| PcmError::internal("sub-block control word out of bounds"))
        };
        out.header = header;
        out.middle_control = control_at(middle_at)?;
        out.last_control = control_at(last_at)?;

        out.samples.resize(SAMPLES_PER_SEGMENT, 0);
        for (block, data_at) in SubBlock::ALL.into_iter().zip(format.block_sample_offsets()) {
            let len = block.end() - block.start();
            let src = &raw[data_at..data_at + len * 2];
            self.order()
                .decode_samples(src, &mut out.samples[block.start()..block.end()]);
        }
        Ok(())
    }

    /// Append the header that opens a segment (first sub-block).
    pub fn encode_segment_header(&self, match_key: &RecordKey, recordwords: i32, out: &mut Vec<u8>) {
        self.put_record_size(out, SubBlock::First.record_size());
        self.put_u16(out, CONTROL_FIRST);
        out.extend_from_slice(match_key.as_bytes());
        self.put_u32(out, recordwords as u32);
    }

    /// Append the header that opens the middle or last sub-block.
    pub fn encode_block_header(&self, block: SubBlock, out: &mut Vec<u8>) {
        debug_assert!(block != SubBlock::First, "first sub-block uses encode_segment_header");
        self.put_record_size(out, block.record_size());
        self.put_u16(out, block.control());
    }

    /// Encode one full segment from 2048 samples.
    ///
    /// The writer builds segments incrementally; this bulk form exists for
    /// tools that synthesise files.
    pub fn encode_segment(
        &self,
        match_key: &RecordKey,
        recordwords: i32,
        samples: &[i16],
        out: &mut Vec<u8>,
    ) -> Result<()> {
        if samples.len() != SAMPLES_PER_SEGMENT {
            return Err(PcmError::range(
                "segment sample count",
                samples.len() as i64,
                SAMPLES_PER_SEGMENT as i64,
                SAMPLES_PER_SEGMENT as i64,
            ));
        }
        out.reserve(self.format().segment_size());
        self.encode_segment_header(match_key, recordwords, out);
        self.order()
            .encode_samples(&samples[..FIRST_BLOCK_SAMPLES], out);
        for block in [SubBlock::Middle, SubBlock::Last] {
            self.encode_block_header(block, out);
            self.order()
                .encode_samples(&samples[block.start()..block.end()], out);
        }
        Ok(())
    }
}

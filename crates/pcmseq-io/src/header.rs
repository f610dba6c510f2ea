//! Entry header codec.

use pcmseq_error::{PcmError, Result};
use pcmseq_types::format::{
    CONTROL_ENTRY, RECORD_SIZE_ENTRY, STORED_GAIN, STORED_PCM_START, STORED_SEGMENT_SIZE,
};
use pcmseq_types::{RecordKey, Timestamp};

use crate::RecordCodec;

/// Per-entry metadata block that opens every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub control: u16,
    pub init_key: RecordKey,
    /// Raw 100 ns tick count; stored little-endian regardless of byte-order policy.
    pub datetime: u64,
    pub segment_size: u32,
    pub pcm_start: u32,
    pub gain: u32,
    pub sample_rate: u32,
}

impl EntryHeader {
    /// Header as the writer produces it: fixed segment size, pcm start and gain.
    #[must_use]
    pub fn new(init_key: RecordKey, timestamp: Timestamp, sample_rate: u32) -> Self {
        Self {
            control: CONTROL_ENTRY,
            init_key,
            datetime: timestamp.to_ticks(),
            segment_size: STORED_SEGMENT_SIZE,
            pcm_start: STORED_PCM_START,
            gain: STORED_GAIN,
            sample_rate,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::from_ticks(self.datetime)
    }
}

impl RecordCodec {
    /// Decode and validate an entry header starting at `raw[0]`.
    ///
    /// `offset` is the header's file position and only feeds diagnostics.
    pub fn decode_entry_header(&self, raw: &[u8], offset: u64) -> Result<EntryHeader> {
        let format = self.format();
        let order = self.order();
        let size = format.entry_header_size();
        if raw.len() < size {
            return Err(PcmError::ShortRead {
                offset,
                expected: size,
                actual: raw.len(),
            });
        }

        let control_at = format.control_offset();
        let control = order
            .read_u16(&raw[control_at..])
            .ok_or_else(|| PcmError::internal("entry header control word out of bounds"))?;
        if control != CONTROL_ENTRY {
            return Err(PcmError::format(
                offset,
                format!("expected entry control word 0x0003, found {control:#06x}"),
            ));
        }

        let init_key = RecordKey::from_slice(&raw[format.key_offset()..])
            .ok_or_else(|| PcmError::internal("entry header key out of bounds"))?;
        if !init_key.has_init_marker() {
            return Err(PcmError::format(offset, "entry header key lacks the \" 2\" marker"));
        }

        let datetime_at = format.datetime_offset();
        let datetime = raw[datetime_at..datetime_at + 8]
            .try_into()
            .map(u64::from_le_bytes)
            .map_err(|_| PcmError::internal("entry header datetime out of bounds"))?;
        let field = |at: usize| {
            order
                .read_u32(&raw[at..])
                .ok_or_else(|| PcmError::internal("entry header field out of bounds"))
        };

        Ok(EntryHeader {
            control,
            init_key,
            datetime,
            segment_size: field(datetime_at + 8)?,
            pcm_start: field(datetime_at + 12)?,
            gain: field(datetime_at + 16)?,
            sample_rate: field(format.sample_rate_offset())?,
        })
    }

    /// Append the on-disk form of `header` to `out`.
    pub fn encode_entry_header(&self, header: &EntryHeader, out: &mut Vec<u8>) {
        self.put_record_size(out, RECORD_SIZE_ENTRY);
        self.put_u16(out, header.control);
        out.extend_from_slice(header.init_key.as_bytes());
        out.extend_from_slice(&header.datetime.to_le_bytes());
        self.put_u32(out, header.segment_size);
        self.put_u32(out, header.pcm_start);
        self.put_u32(out, header.gain);
        self.put_u32(out, header.sample_rate);
    }
}

//! Random-access entry reader.

use std::io::{Read, Seek, SeekFrom};

use pcmseq_error::{PcmError, Result};
use pcmseq_types::format::{CONTROL_ENTRY, CONTROL_FIRST, SAMPLES_PER_SEGMENT};
use pcmseq_types::{ByteOrderPolicy, EntryInfo, EntryNumber, EntryRecord};
use tracing::{debug, trace, warn};

use crate::segment::{DecodedSegment, SubBlock};
use crate::{Directory, RecordCodec, read_full};

/// Reads entries of an indexed PCM_SEQ2 stream.
///
/// The directory is built once in [`SeqReader::open`]; the stream is assumed
/// not to change underneath the reader afterwards.
#[derive(Debug)]
pub struct SeqReader<F> {
    file: F,
    directory: Directory,
    codec: RecordCodec,
    current: EntryNumber,
    segment_buf: Vec<u8>,
    decoded: DecodedSegment,
}

impl<F: Read + Seek> SeqReader<F> {
    /// Index `file` and position the reader at entry 1.
    pub fn open(mut file: F, order: ByteOrderPolicy) -> Result<Self> {
        let directory = Directory::build(&mut file, order)?;
        file.seek(SeekFrom::Start(0))?;
        let codec = RecordCodec::new(directory.format(), order);
        Ok(Self {
            file,
            segment_buf: vec![0; codec.format().segment_size()],
            directory,
            codec,
            current: EntryNumber::ONE,
            decoded: DecodedSegment::default(),
        })
    }

    #[must_use]
    pub const fn directory(&self) -> &Directory {
        &self.directory
    }

    #[must_use]
    pub fn entry_count(&self) -> u32 {
        self.directory.entry_count()
    }

    #[must_use]
    pub const fn current_entry(&self) -> EntryNumber {
        self.current
    }

    /// Position the stream at the header of `entry`.
    pub fn seek_to_entry(&mut self, entry: u32) -> Result<EntryNumber> {
        let number = self.directory.entry_number(entry)?;
        let offset = self.record(number)?.offset;
        self.file.seek(SeekFrom::Start(offset))?;
        self.current = number;
        Ok(number)
    }

    /// Directory lookup for `entry`.
    pub fn get_info(&self, entry: u32) -> Result<EntryInfo> {
        self.directory.info(entry)
    }

    /// Read every sample of `entry`.
    pub fn read_entry(&mut self, entry: u32) -> Result<Vec<i16>> {
        let count = self.directory.lookup(entry)?.sample_count;
        if count == 0 {
            self.seek_to_entry(entry)?;
            return Ok(Vec::new());
        }
        self.read_range(entry, 0, count - 1)
    }

    /// Read samples `start..=stop` of `entry`.
    ///
    /// `stop` is clamped to the last sample of the entry. If the stream ends
    /// before the range is filled the samples that were available are
    /// returned.
    pub fn read_range(&mut self, entry: u32, start: u32, stop: u32) -> Result<Vec<i16>> {
        let (start, stop) = self.clamp_range(entry, start, stop)?;
        let mut out = vec![0_i16; (stop - start + 1) as usize];
        let filled = self.read_range_into(entry, start, stop, &mut out)?;
        out.truncate(filled);
        Ok(out)
    }

    /// Read samples `start..=stop` of `entry` into `out`, returning the count written.
    ///
    /// On failure the stream position is restored and the current entry is
    /// left unchanged.
    pub fn read_range_into(
        &mut self,
        entry: u32,
        start: u32,
        stop: u32,
        out: &mut [i16],
    ) -> Result<usize> {
        let (start, stop) = self.clamp_range(entry, start, stop)?;
        let wanted = (stop - start + 1) as usize;
        if out.len() < wanted {
            return Err(PcmError::range(
                "output buffer length",
                out.len() as i64,
                wanted as i64,
                i64::MAX,
            ));
        }
        let number = self.directory.entry_number(entry)?;
        let record = *self.record(number)?;

        let saved = self.file.stream_position()?;
        match self.read_segments(&record, u64::from(start), u64::from(stop), &mut out[..wanted]) {
            Ok(filled) => {
                if filled < wanted {
                    warn!(
                        entry,
                        requested = wanted,
                        delivered = filled,
                        "entry ended before the requested range was filled"
                    );
                }
                self.current = number;
                Ok(filled)
            }
            Err(err) => {
                self.file.seek(SeekFrom::Start(saved))?;
                debug!(entry, error = %err, "read failed; stream position restored");
                Err(err)
            }
        }
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> F {
        self.file
    }

    fn record(&self, number: EntryNumber) -> Result<&EntryRecord> {
        self.directory
            .get(number)
            .ok_or_else(|| PcmError::internal("validated entry number missing from directory"))
    }

    fn clamp_range(&self, entry: u32, start: u32, stop: u32) -> Result<(u32, u32)> {
        let count = self.directory.lookup(entry)?.sample_count;
        let last = count.checked_sub(1).ok_or_else(|| {
            PcmError::range("start sample", i64::from(start), 0, -1)
        })?;
        let stop = stop.min(last);
        if start > stop {
            return Err(PcmError::range(
                "start sample",
                i64::from(start),
                0,
                i64::from(stop),
            ));
        }
        Ok((start, stop))
    }

    /// Walk the entry's segments, copying the overlap with `start..=stop`.
    fn read_segments(
        &mut self,
        record: &EntryRecord,
        start: u64,
        stop: u64,
        out: &mut [i16],
    ) -> Result<usize> {
        let format = self.codec.format();
        self.file.seek(SeekFrom::Start(record.offset))?;

        let header_len = format.entry_header_size();
        let mut raw_header = vec![0_u8; header_len];
        let got = read_full(&mut self.file, &mut raw_header)?;
        let header = self
            .codec
            .decode_entry_header(&raw_header[..got], record.offset)
            .map_err(|err| PcmError::invalid_data(err.to_string()))?;

        let segment_samples = SAMPLES_PER_SEGMENT as u64;
        let segment_size = format.segment_size();
        // Prefix and control word of each record, read ahead of its body.
        let head_len = format.record_prefix() + 2;
        let mut offset = record.offset + got as u64;
        let mut block_start = 0_u64;
        let mut filled = 0_usize;

        while block_start <= stop {
            let head = read_full(&mut self.file, &mut self.segment_buf[..head_len])?;
            if head < head_len {
                trace!(offset, "end of stream inside entry");
                break;
            }
            let control = self
                .codec
                .order()
                .read_u16(&self.segment_buf[format.control_offset()..head_len])
                .ok_or_else(|| PcmError::internal("record head shorter than control word"))?;
            match control {
                CONTROL_ENTRY => {
                    trace!(offset, "reached next entry header");
                    break;
                }
                CONTROL_FIRST => {}
                other => {
                    return Err(PcmError::invalid_data(format!(
                        "unexpected control word {other:#06x} at offset {offset}"
                    )));
                }
            }

            let block_stop = block_start + segment_samples - 1;
            if block_stop < start {
                self.file
                    .seek(SeekFrom::Current((segment_size - head_len) as i64))?;
                offset += segment_size as u64;
                block_start += segment_samples;
                continue;
            }

            let got = head_len + read_full(&mut self.file, &mut self.segment_buf[head_len..])?;
            if got < segment_size {
                trace!(offset, got, "truncated trailing segment");
                break;
            }
            self.codec
                .decode_segment_into(&self.segment_buf, &header.init_key, offset, &mut self.decoded)
                .map_err(|err| PcmError::invalid_data(err.to_string()))?;

            for block in SubBlock::ALL {
                let lo = block_start + block.start() as u64;
                let hi = block_start + block.end() as u64 - 1;
                if hi < start || lo > stop {
                    continue;
                }
                let from = start.max(lo);
                let to = stop.min(hi);
                let src = &self.decoded.samples
                    [(from - block_start) as usize..=(to - block_start) as usize];
                out[filled..filled + src.len()].copy_from_slice(src);
                filled += src.len();
            }
            offset += segment_size as u64;
            block_start += segment_samples;
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pcmseq_types::{RecordKey, SubFormat, Timestamp};

    use super::*;
    use crate::{EntryHeader, SeqWriter};

    fn samples(len: usize, seed: i16) -> Vec<i16> {
        (0..len)
            .map(|i| (i as i16).wrapping_mul(7).wrapping_add(seed))
            .collect()
    }

    fn write_file(format: SubFormat, entries: &[Vec<i16>]) -> Vec<u8> {
        let mut writer = SeqWriter::new(Cursor::new(Vec::new()), format, ByteOrderPolicy::PCM_SEQ2);
        for (i, data) in entries.iter().enumerate() {
            let key = RecordKey::for_entry("reader.pcm_seq2", i as u32 + 1);
            writer
                .write_header(&EntryHeader::new(key, Timestamp::new(100, 0), 20_000))
                .unwrap();
            writer.write_data(data, true).unwrap();
        }
        writer.into_inner().into_inner()
    }

    fn open(bytes: Vec<u8>) -> SeqReader<Cursor<Vec<u8>>> {
        SeqReader::open(Cursor::new(bytes), ByteOrderPolicy::PCM_SEQ2).unwrap()
    }

    /// Stream that counts seeks which move the position backward.
    struct SeekCounter {
        inner: Cursor<Vec<u8>>,
        backward: usize,
    }

    impl Read for SeekCounter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for SeekCounter {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            let before = self.inner.position();
            let after = self.inner.seek(pos)?;
            if after < before {
                self.backward += 1;
            }
            Ok(after)
        }
    }

    #[test]
    fn segment_walk_never_seeks_backward() {
        let data = samples(5 * 2048, 9);
        let file = SeekCounter {
            inner: Cursor::new(write_file(SubFormat::Type2, &[data.clone(), samples(10, 1)])),
            backward: 0,
        };
        let mut reader = SeqReader::open(file, ByteOrderPolicy::PCM_SEQ2).unwrap();
        reader.seek_to_entry(2).unwrap();
        reader.file.backward = 0;

        // Entry header of entry 1 lies behind the stream position: one seek back.
        assert_eq!(reader.read_entry(1).unwrap(), data);
        assert_eq!(reader.file.backward, 1);
        assert_eq!(reader.read_range(1, 9000, 9100).unwrap(), data[9000..=9100]);
        assert_eq!(reader.file.backward, 2);
    }

    #[test]
    fn partial_range_spanning_two_segments() {
        let data = samples(3000, 3);
        let mut reader = open(write_file(SubFormat::Type2, &[data.clone()]));
        let got = reader.read_range(1, 1000, 2500).unwrap();
        assert_eq!(got.len(), 1501);
        assert_eq!(got, data[1000..=2500]);
    }

    #[test]
    fn ranges_inside_each_sub_block() {
        let data = samples(4096, -9);
        let mut reader = open(write_file(SubFormat::Type1, &[data.clone()]));
        for (start, stop) in [(0, 0), (1004, 1005), (2025, 2026), (2047, 2048), (4090, 4095)] {
            let got = reader.read_range(1, start, stop).unwrap();
            assert_eq!(got, data[start as usize..=stop as usize], "range {start}..={stop}");
        }
    }

    #[test]
    fn stop_is_clamped_to_entry_length() {
        let data = samples(100, 1);
        let mut reader = open(write_file(SubFormat::Type2, &[data.clone()]));
        assert_eq!(reader.read_range(1, 90, 10_000).unwrap(), data[90..]);
    }

    #[test]
    fn start_past_end_is_a_range_error() {
        let mut reader = open(write_file(SubFormat::Type2, &[samples(100, 1)]));
        assert!(matches!(
            reader.read_range(1, 100, 200),
            Err(PcmError::Range { .. })
        ));
    }

    #[test]
    fn reads_each_entry_of_a_multi_entry_file() {
        let entries = vec![samples(10, 1), samples(2048, 2), samples(5000, 3)];
        let mut reader = open(write_file(SubFormat::Type2, &entries));
        assert_eq!(reader.entry_count(), 3);
        for (i, data) in entries.iter().enumerate() {
            assert_eq!(&reader.read_entry(i as u32 + 1).unwrap(), data);
        }
        assert_eq!(reader.current_entry().get(), 3);
    }

    #[test]
    fn seek_bounds() {
        let mut reader = open(write_file(SubFormat::Type2, &[samples(5, 0), samples(6, 0)]));
        assert!(matches!(reader.seek_to_entry(0), Err(PcmError::Range { .. })));
        assert!(matches!(reader.seek_to_entry(3), Err(PcmError::Range { .. })));
        assert_eq!(reader.seek_to_entry(2).unwrap().get(), 2);
        assert_eq!(reader.get_info(2).unwrap().sample_count, 6);
    }

    #[test]
    fn corrupt_segment_restores_position() {
        let mut bytes = write_file(SubFormat::Type2, &[samples(3000, 5)]);
        // Break the second segment's match key.
        let second_key = 54 + 4134 + 2 + 5;
        bytes[second_key] ^= 0xff;
        let mut reader = open(bytes);
        reader.seek_to_entry(1).unwrap();
        let err = reader.read_range(1, 0, 2999).unwrap_err();
        match err {
            PcmError::Io(inner) => assert_eq!(inner.kind(), std::io::ErrorKind::InvalidData),
            other => panic!("expected InvalidData, got {other:?}"),
        }
        assert_eq!(reader.into_inner().position(), 0);
    }

    #[test]
    fn first_segment_only_read_skips_corrupt_tail() {
        let mut bytes = write_file(SubFormat::Type2, &[samples(3000, 5)]);
        let second_key = 54 + 4134 + 2 + 5;
        bytes[second_key] ^= 0xff;
        let mut reader = open(bytes);
        assert_eq!(reader.read_range(1, 0, 10).unwrap().len(), 11);
    }
}

//! Backward indexer.
//!
//! PCM_SEQ2 has no table of contents. The only place an entry's length is
//! recorded is the recordwords field of its last segment, so the directory
//! is built from the end of the file toward the start:
//!
//! 1. Probe the last segment header and read its recordwords.
//! 2. Derive the entry start from the segment count, probe the entry header
//!    there (retrying one segment earlier for files whose writer emitted a
//!    trailing padding segment).
//! 3. Step back one segment from that entry header and repeat until an entry
//!    starts at offset 0.
//!
//! Two recovery paths exist. A truncated trailing segment is located by
//! searching for the key of the first entry header near the end of the file.
//! A zero or negative recordwords is bypassed by bisecting backward over
//! segment headers until the entry header is reached.

use std::io::{Read, Seek, SeekFrom};

use memchr::memmem;
use pcmseq_error::{PcmError, Result};
use pcmseq_types::format::{ENTRY_PROBE_LEN, SAMPLES_PER_SEGMENT, SEGMENT_PROBE_LEN};
use pcmseq_types::{ByteOrderPolicy, EntryInfo, EntryNumber, EntryRecord, SubFormat};
use tracing::{debug, error, trace, warn};

use crate::{RecordCodec, read_full, stream_len};

/// Initial stride, in segments, of the entry-start bisection.
const SCAN_INITIAL_STRIDE: i64 = 256;

/// In-memory entry directory, ordered by entry number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    format: SubFormat,
    entries: Vec<EntryRecord>,
}

impl Directory {
    /// Index `file` by walking it backward from its end.
    ///
    /// Any failure to establish the directory is reported as
    /// [`PcmError::Index`]; underlying I/O failures propagate as
    /// [`PcmError::Io`].
    pub fn build<F: Read + Seek>(file: &mut F, order: ByteOrderPolicy) -> Result<Self> {
        let file_len = stream_len(file)?;
        file.seek(SeekFrom::Start(0))?;
        let mut first = [0_u8; 1];
        if read_full(file, &mut first)? == 0 {
            error!("cannot index an empty file");
            return Err(PcmError::index("file is empty"));
        }
        let format = SubFormat::from_discriminator(first[0]).map_err(|err| {
            error!(byte = first[0], "unrecognized sub-format discriminator");
            PcmError::index(err.to_string())
        })?;

        let mut indexer = BackwardIndexer {
            file,
            codec: RecordCodec::new(format, order),
            file_len: file_len as i64,
            segment_size: format.segment_size() as i64,
            header_size: format.entry_header_size() as i64,
        };
        let mut entries = indexer.walk()?;
        entries.reverse();

        debug!(
            sub_format = %format,
            entries = entries.len(),
            file_len,
            "pcm_seq2 directory built"
        );
        Ok(Self { format, entries })
    }

    #[must_use]
    pub const fn format(&self) -> SubFormat {
        self.format
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries as a 32-bit count.
    #[must_use]
    pub fn entry_count(&self) -> u32 {
        u32::try_from(self.entries.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, entry: EntryNumber) -> Option<&EntryRecord> {
        self.entries.get(entry.index())
    }

    /// Validate a raw entry number against this directory.
    pub fn entry_number(&self, entry: u32) -> Result<EntryNumber> {
        EntryNumber::new(entry)
            .filter(|n| n.index() < self.entries.len())
            .ok_or_else(|| {
                PcmError::range("entry", i64::from(entry), 1, i64::from(self.entry_count()))
            })
    }

    /// Directory row for a raw entry number.
    pub fn lookup(&self, entry: u32) -> Result<&EntryRecord> {
        let number = self.entry_number(entry)?;
        self.get(number)
            .ok_or_else(|| PcmError::internal("validated entry number missing from directory"))
    }

    /// Sample count, rate, timestamp and entry count for one entry.
    pub fn info(&self, entry: u32) -> Result<EntryInfo> {
        let record = self.lookup(entry)?;
        Ok(EntryInfo {
            sample_count: record.sample_count,
            sample_rate: record.sample_rate,
            timestamp: record.timestamp(),
            entry_count: self.entry_count(),
        })
    }
}

/// Scan state for one directory build.
struct BackwardIndexer<'a, F> {
    file: &'a mut F,
    codec: RecordCodec,
    file_len: i64,
    segment_size: i64,
    header_size: i64,
}

impl<F: Read + Seek> BackwardIndexer<'_, F> {
    /// Collect entries from last to first.
    fn walk(&mut self) -> Result<Vec<EntryRecord>> {
        let format = self.codec.format();
        let mut records = Vec::new();
        let mut segment_pos = self.file_len - self.segment_size;
        let mut rescued = false;

        loop {
            let from_last = records.len();
            let probe = self.probe::<SEGMENT_PROBE_LEN>(segment_pos)?;
            let Some(probe) = probe.filter(|p| format.is_segment_probe(p)) else {
                if from_last == 0 && !rescued {
                    rescued = true;
                    if let Some(start) = self.rescue_truncated_segment(segment_pos)? {
                        if let Some(record) = self.interrupted_entry_after(start)? {
                            records.push(record);
                        }
                        segment_pos = start;
                        continue;
                    }
                }
                error!(
                    offset = segment_pos,
                    entry_from_last = from_last,
                    "cannot read or validate last segment header"
                );
                return Err(PcmError::index(format!(
                    "can't read or validate last segment header of entry (last - {from_last}) at offset {segment_pos}"
                )));
            };

            let recordwords = self
                .codec
                .order()
                .read_i32(&probe[format.recordwords_offset()..])
                .ok_or_else(|| PcmError::internal("segment probe shorter than header"))?;

            let (sample_count, mut entry_start) = if recordwords <= 0 {
                warn!(
                    entry_from_last = from_last,
                    recordwords,
                    offset = segment_pos,
                    "entry has invalid recordwords field; scanning for entry start"
                );
                let start = self.scan_to_entry_start(segment_pos)?;
                let segments =
                    (segment_pos + self.segment_size - start - self.header_size) / self.segment_size;
                let samples = u32::try_from(segments * SAMPLES_PER_SEGMENT as i64)
                    .map_err(|_| PcmError::index("recovered entry size overflows 32 bits"))?;
                (samples, start)
            } else {
                let samples = recordwords as u32;
                let segments = i64::from(samples.div_ceil(SAMPLES_PER_SEGMENT as u32));
                let start =
                    segment_pos + self.segment_size - segments * self.segment_size - self.header_size;
                (samples, start)
            };

            let header = match self.probe::<ENTRY_PROBE_LEN>(entry_start)? {
                Some(raw) if format.is_entry_probe(&raw) => raw,
                _ => {
                    let retry = entry_start - self.segment_size;
                    trace!(
                        expected = entry_start,
                        retry,
                        "entry header not at computed offset; retrying one segment earlier"
                    );
                    match self.probe::<ENTRY_PROBE_LEN>(retry)? {
                        Some(raw) if format.is_entry_probe(&raw) => {
                            entry_start = retry;
                            raw
                        }
                        _ => {
                            error!(
                                entry_from_last = from_last,
                                offset = retry,
                                "cannot read or validate entry header"
                            );
                            return Err(PcmError::index(format!(
                                "can't read or validate entry header of entry (last - {from_last}) at offset {retry}"
                            )));
                        }
                    }
                }
            };

            let record = self.record_from_probe(&header, entry_start, sample_count)?;
            trace!(
                entry_from_last = from_last,
                offset = record.offset,
                samples = record.sample_count,
                "indexed entry"
            );
            records.push(record);

            if entry_start == 0 {
                return Ok(records);
            }
            segment_pos = entry_start - self.segment_size;
        }
    }

    fn record_from_probe(
        &self,
        header: &[u8; ENTRY_PROBE_LEN],
        offset: i64,
        sample_count: u32,
    ) -> Result<EntryRecord> {
        let format = self.codec.format();
        let datetime_at = format.datetime_offset();
        let raw_time = header[datetime_at..datetime_at + 8]
            .try_into()
            .map(u64::from_le_bytes)
            .map_err(|_| PcmError::internal("entry probe shorter than header"))?;
        let sample_rate = self
            .codec
            .order()
            .read_u32(&header[format.sample_rate_offset()..])
            .ok_or_else(|| PcmError::internal("entry probe shorter than header"))?;
        Ok(EntryRecord {
            offset: offset as u64,
            sample_count,
            sample_rate,
            raw_time,
        })
    }

    /// Read `N` bytes at `pos`; `None` when `pos` is negative or the file ends first.
    fn probe<const N: usize>(&mut self, pos: i64) -> Result<Option<[u8; N]>> {
        if pos < 0 {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(pos as u64))?;
        let mut buf = [0_u8; N];
        let read = read_full(self.file, &mut buf)?;
        Ok((read == N).then_some(buf))
    }

    fn is_segment_at(&mut self, pos: i64) -> Result<bool> {
        let format = self.codec.format();
        Ok(self
            .probe::<SEGMENT_PROBE_LEN>(pos)?
            .is_some_and(|p| format.is_segment_probe(&p)))
    }

    /// Locate the last complete segment when the final write was cut short.
    ///
    /// Searches the `segment_size` bytes ending at the failed probe's end for
    /// the interior of the first entry's init key, accepting the first hit
    /// that sits inside a valid segment header.
    fn rescue_truncated_segment(&mut self, failed_pos: i64) -> Result<Option<i64>> {
        let probe_end = failed_pos + SEGMENT_PROBE_LEN as i64;
        if probe_end < self.segment_size {
            return Ok(None);
        }

        let header_len = self.codec.format().entry_header_size();
        let mut raw = vec![0_u8; header_len];
        self.file.seek(SeekFrom::Start(0))?;
        if read_full(self.file, &mut raw)? < header_len {
            return Ok(None);
        }
        let Ok(first_header) = self.codec.decode_entry_header(&raw, 0) else {
            return Ok(None);
        };

        let window_start = probe_end - self.segment_size;
        let mut window = vec![0_u8; self.segment_size as usize];
        self.file.seek(SeekFrom::Start(window_start as u64))?;
        let filled = read_full(self.file, &mut window)?;
        window.truncate(filled);

        let needle = first_header.init_key.scan_needle();
        let backoff = self.codec.format().key_scan_backoff() as i64;
        let hits: Vec<i64> = memmem::find_iter(&window, needle)
            .map(|at| window_start + at as i64 - backoff)
            .collect();
        for start in hits {
            if self.is_segment_at(start)? {
                let dropped = self.file_len - (start + self.segment_size);
                warn!(
                    segment_offset = start,
                    dropped_bytes = dropped,
                    segment_size = self.segment_size,
                    "last segment interrupted; resuming from previous segment"
                );
                return Ok(Some(start));
            }
        }
        Ok(None)
    }

    /// An entry header directly after the rescued segment belongs to an entry
    /// cut off before its first segment was complete. It is kept with no
    /// samples so the entry count still covers it.
    fn interrupted_entry_after(&mut self, rescued: i64) -> Result<Option<EntryRecord>> {
        let format = self.codec.format();
        let tail = rescued + self.segment_size;
        let Some(raw) = self
            .probe::<ENTRY_PROBE_LEN>(tail)?
            .filter(|p| format.is_entry_probe(p))
        else {
            return Ok(None);
        };
        warn!(
            offset = tail,
            dropped_bytes = self.file_len - tail - self.header_size,
            "interrupted entry has no complete segment; indexed with 0 samples"
        );
        self.record_from_probe(&raw, tail, 0).map(Some)
    }

    /// Bisect backward from the segment at `pos` to the start of its entry.
    ///
    /// Returns the offset of the entry header.
    fn scan_to_entry_start(&mut self, pos: i64) -> Result<i64> {
        if !self.is_segment_at(pos)? {
            error!(offset = pos, "entry-start scan called from invalid file position");
            return Err(PcmError::index(format!(
                "entry-start scan called from invalid position {pos}"
            )));
        }

        let mut pos = pos;
        let mut stride = SCAN_INITIAL_STRIDE;
        loop {
            while stride > 0 && stride * self.segment_size > pos {
                stride /= 2;
            }
            if stride == 0 {
                break;
            }
            let candidate = pos - stride * self.segment_size;
            if self.is_segment_at(candidate)? {
                trace!(stride, offset = candidate, "stepped back within entry");
                pos = candidate;
            } else {
                stride /= 2;
                if stride == 0 {
                    break;
                }
            }
        }
        Ok(pos - self.header_size)
    }
}

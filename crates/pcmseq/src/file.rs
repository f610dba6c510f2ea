//! Open-file handle: the operations exposed to dispatch and scripting layers.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use pcmseq_error::{PcmError, Result};
use pcmseq_io::{EntryHeader, SeqReader, SeqWriter};
use pcmseq_types::{Capabilities, EntryNumber, RecordKey, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::buffer::ScratchBuffer;
use crate::config::{AllocationStrategy, PcmConfig};
use crate::format::FormatKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Read,
    Write,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Snapshot of a handle's current entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub entry: u32,
    pub nsamples: u32,
    pub sample_rate: u32,
    pub timestamp: Timestamp,
    pub entry_count: u32,
    pub capabilities: Capabilities,
}

/// Enumerated get/set requests accepted by [`PcmFile::control`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Hold read samples in an anonymous memory map. Read mode, before the first read.
    UseMmap,
    /// Hold read samples on the heap. Read mode, before the first read.
    UseHeap,
    SetSampleRate(u32),
    /// Whole seconds of the timestamp stamped on subsequent entries.
    SetTimestamp(i64),
    /// Microsecond part of the timestamp stamped on subsequent entries.
    SetTimeFraction(u32),
    GetSize,
    GetSampleRate,
    GetEntry,
    GetTimestamp,
    GetTimeFraction,
    GetCapabilities,
    GetEntryCount,
}

impl Control {
    const fn name(self) -> &'static str {
        match self {
            Self::UseMmap => "use_mmap",
            Self::UseHeap => "use_heap",
            Self::SetSampleRate(_) => "set_sample_rate",
            Self::SetTimestamp(_) => "set_timestamp",
            Self::SetTimeFraction(_) => "set_time_fraction",
            Self::GetSize => "get_size",
            Self::GetSampleRate => "get_sample_rate",
            Self::GetEntry => "get_entry",
            Self::GetTimestamp => "get_timestamp",
            Self::GetTimeFraction => "get_time_fraction",
            Self::GetCapabilities => "get_capabilities",
            Self::GetEntryCount => "get_entry_count",
        }
    }
}

/// Answer to a [`Control`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlValue {
    /// A set request was applied.
    Done,
    Size(u32),
    SampleRate(u32),
    Entry(u32),
    Timestamp(i64),
    TimeFraction(u32),
    Capabilities(Capabilities),
    EntryCount(u32),
}

struct ReadState {
    reader: SeqReader<BufReader<File>>,
    entry: EntryNumber,
    allocation: AllocationStrategy,
    buffer: ScratchBuffer,
    filled: usize,
}

struct WriteState {
    writer: SeqWriter<BufWriter<File>>,
    file_name: String,
    entry: EntryNumber,
    entry_started: bool,
    entries_started: u32,
    sample_rate: u32,
    timestamp: Option<i64>,
    time_fraction: u32,
}

enum HandleState {
    Read(Box<ReadState>),
    Write(Box<WriteState>),
    Closed,
}

/// An open PCM_SEQ2 file.
///
/// Read handles index the file when opened and then serve whole entries.
/// Write handles start an entry on the first [`PcmFile::write`] after open or
/// [`PcmFile::seek`], and finalise it on the next seek or on close.
pub struct PcmFile {
    path: PathBuf,
    kind: FormatKind,
    state: HandleState,
}

impl std::fmt::Debug for PcmFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmFile")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl PcmFile {
    /// Open `path` with default settings.
    pub fn open(path: impl AsRef<Path>, mode: Mode) -> Result<Self> {
        Self::open_with(path, mode, &PcmConfig::default())
    }

    /// Recognize the format of `path` from its suffix and open it.
    pub fn open_with(path: impl AsRef<Path>, mode: Mode, config: &PcmConfig) -> Result<Self> {
        let path = path.as_ref();
        FormatKind::recognize(path)?.open(path, mode, config)
    }

    pub(crate) fn open_kind(
        kind: FormatKind,
        path: &Path,
        mode: Mode,
        config: &PcmConfig,
    ) -> Result<Self> {
        let order = config.byte_order_policy();
        let state = match mode {
            Mode::Read => {
                let file = BufReader::new(File::open(path)?);
                let reader = SeqReader::open(file, order)?;
                info!(
                    path = %path.display(),
                    entries = reader.entry_count(),
                    format = %reader.directory().format(),
                    "opened for reading"
                );
                HandleState::Read(Box::new(ReadState {
                    reader,
                    entry: EntryNumber::ONE,
                    allocation: config.allocation,
                    buffer: ScratchBuffer::default(),
                    filled: 0,
                }))
            }
            Mode::Write => {
                let file = BufWriter::new(File::create(path)?);
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                debug!(path = %path.display(), format = %config.sub_format, "opened for writing");
                HandleState::Write(Box::new(WriteState {
                    writer: SeqWriter::new(file, config.sub_format, order),
                    file_name,
                    entry: EntryNumber::ONE,
                    entry_started: false,
                    entries_started: 0,
                    sample_rate: config.sample_rate,
                    timestamp: None,
                    time_fraction: 0,
                }))
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            kind,
            state,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn kind(&self) -> FormatKind {
        self.kind
    }

    /// `None` once the handle is closed.
    #[must_use]
    pub const fn mode(&self) -> Option<Mode> {
        match self.state {
            HandleState::Read(_) => Some(Mode::Read),
            HandleState::Write(_) => Some(Mode::Write),
            HandleState::Closed => None,
        }
    }

    /// Read every sample of the current entry.
    ///
    /// The returned slice borrows the handle's scratch buffer, which is
    /// replaced by the next read.
    pub fn read(&mut self) -> Result<&[i16]> {
        self.read_window("read", 0, u32::MAX, true)
    }

    /// Read samples `start..=stop` of the current entry, decoding only the
    /// segments that overlap the range.
    ///
    /// `stop` is clamped to the entry's last sample. The slice borrows the
    /// scratch buffer like [`PcmFile::read`].
    pub fn read_range(&mut self, start: u32, stop: u32) -> Result<&[i16]> {
        self.read_window("read_range", start, stop, false)
    }

    fn read_window(
        &mut self,
        op: &'static str,
        start: u32,
        stop: u32,
        allow_empty: bool,
    ) -> Result<&[i16]> {
        let HandleState::Read(state) = &mut self.state else {
            return Err(PcmError::Unsupported { op });
        };
        let state = &mut **state;
        let entry = state.entry.get();
        let count = state.reader.get_info(entry)?.sample_count;
        state.filled = 0;
        let Some(last) = count.checked_sub(1) else {
            if allow_empty {
                state.buffer.prepare(state.allocation, 0)?;
                debug!(entry, "empty entry read");
                return Ok(&[]);
            }
            return Err(PcmError::range("start sample", i64::from(start), 0, -1));
        };
        let stop = stop.min(last);
        if start > stop {
            return Err(PcmError::range(
                "start sample",
                i64::from(start),
                0,
                i64::from(stop),
            ));
        }
        let buf = state
            .buffer
            .prepare(state.allocation, (stop - start) as usize + 1)?;
        state.filled = state.reader.read_range_into(entry, start, stop, buf)?;
        debug!(
            entry,
            start,
            samples = state.filled,
            mapped = state.buffer.is_mapped(),
            "entry read"
        );
        Ok(&state.buffer.samples()?[..state.filled])
    }

    /// Append samples to the current entry, starting it if needed.
    pub fn write(&mut self, samples: &[i16]) -> Result<()> {
        let HandleState::Write(state) = &mut self.state else {
            return Err(PcmError::Unsupported { op: "write" });
        };
        let state = &mut **state;
        if !state.entry_started {
            let timestamp = state.timestamp.map_or_else(Timestamp::now, |seconds| {
                Timestamp::new(seconds, state.time_fraction)
            });
            let header = EntryHeader::new(
                RecordKey::for_entry(&state.file_name, state.entry.get()),
                timestamp,
                state.sample_rate,
            );
            state.writer.write_header(&header)?;
            state.entry_started = true;
            state.entries_started = state.entries_started.saturating_add(1);
        }
        state.writer.write_data(samples, false)
    }

    /// Select the entry for the next read, or the number of the next entry written.
    pub fn seek(&mut self, entry: u32) -> Result<()> {
        match &mut self.state {
            HandleState::Read(state) => {
                state.entry = state.reader.seek_to_entry(entry)?;
                Ok(())
            }
            HandleState::Write(state) => {
                let number = EntryNumber::new(entry).ok_or_else(|| {
                    PcmError::range("entry", i64::from(entry), 1, i64::from(u32::MAX))
                })?;
                if state.entry_started {
                    let total = state.writer.finish_entry()?;
                    debug!(entry = state.entry.get(), samples = total, "entry closed by seek");
                    state.entry_started = false;
                }
                state.entry = number;
                Ok(())
            }
            HandleState::Closed => Err(PcmError::Unsupported { op: "seek" }),
        }
    }

    pub fn stat(&self) -> Result<Stat> {
        match &self.state {
            HandleState::Read(state) => {
                let info = state.reader.get_info(state.entry.get())?;
                Ok(Stat {
                    entry: state.entry.get(),
                    nsamples: info.sample_count,
                    sample_rate: info.sample_rate,
                    timestamp: info.timestamp,
                    entry_count: info.entry_count,
                    capabilities: Capabilities::PCM_SEQ2,
                })
            }
            HandleState::Write(state) => Ok(Stat {
                entry: state.entry.get(),
                nsamples: state.writer.entry_samples(),
                sample_rate: state.sample_rate,
                timestamp: Timestamp::new(state.timestamp.unwrap_or(0), state.time_fraction),
                entry_count: state.entries_started,
                capabilities: Capabilities::PCM_SEQ2,
            }),
            HandleState::Closed => Err(PcmError::Unsupported { op: "stat" }),
        }
    }

    /// Apply one get or set request. Requests not valid for the handle's
    /// mode fail with [`PcmError::Unsupported`].
    pub fn control(&mut self, request: Control) -> Result<ControlValue> {
        let unsupported = || PcmError::Unsupported { op: request.name() };
        match request {
            Control::GetSize => Ok(ControlValue::Size(self.stat()?.nsamples)),
            Control::GetSampleRate => Ok(ControlValue::SampleRate(self.stat()?.sample_rate)),
            Control::GetEntry => Ok(ControlValue::Entry(self.stat()?.entry)),
            Control::GetEntryCount => Ok(ControlValue::EntryCount(self.stat()?.entry_count)),
            Control::GetCapabilities => Ok(ControlValue::Capabilities(self.stat()?.capabilities)),
            Control::GetTimestamp | Control::GetTimeFraction => {
                if self.mode() != Some(Mode::Read) {
                    return Err(unsupported());
                }
                let timestamp = self.stat()?.timestamp;
                Ok(if request == Control::GetTimestamp {
                    ControlValue::Timestamp(timestamp.seconds)
                } else {
                    ControlValue::TimeFraction(timestamp.micros)
                })
            }
            Control::UseMmap | Control::UseHeap => {
                let HandleState::Read(state) = &mut self.state else {
                    return Err(unsupported());
                };
                // Fixed once the first entry has been read.
                if !state.buffer.is_empty() {
                    return Err(unsupported());
                }
                state.allocation = if request == Control::UseMmap {
                    AllocationStrategy::Mmap
                } else {
                    AllocationStrategy::Heap
                };
                Ok(ControlValue::Done)
            }
            Control::SetSampleRate(_) | Control::SetTimestamp(_) | Control::SetTimeFraction(_) => {
                let HandleState::Write(state) = &mut self.state else {
                    return Err(unsupported());
                };
                match request {
                    Control::SetSampleRate(rate) => state.sample_rate = rate,
                    Control::SetTimestamp(seconds) => state.timestamp = Some(seconds),
                    Control::SetTimeFraction(micros) => state.time_fraction = micros,
                    _ => return Err(unsupported()),
                }
                Ok(ControlValue::Done)
            }
        }
    }

    /// Finalise any open entry, flush, and release the handle's resources.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, HandleState::Closed) {
            HandleState::Write(mut state) => {
                if state.entry_started {
                    let total = state.writer.finish_entry()?;
                    debug!(entry = state.entry.get(), samples = total, "entry closed");
                }
                state.writer.flush()?;
                debug!(path = %self.path.display(), entries = state.entries_started, "closed");
                Ok(())
            }
            HandleState::Read(mut state) => {
                state.buffer.release();
                debug!(path = %self.path.display(), "closed");
                Ok(())
            }
            HandleState::Closed => Ok(()),
        }
    }
}

impl Drop for PcmFile {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!(path = %self.path.display(), error = %err, "failed to finalise file on drop");
        }
    }
}

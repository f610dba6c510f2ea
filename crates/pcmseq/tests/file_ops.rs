//! End-to-end behaviour of `PcmFile` handles on real files.

use std::path::PathBuf;

use pcmseq::{
    AllocationStrategy, Capabilities, Control, ControlValue, Mode, PcmConfig, PcmError, PcmFile,
    SubFormat, Timestamp,
};
use tempfile::TempDir;

fn scratch(name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

fn ramp(len: usize, step: i16) -> Vec<i16> {
    (0..len).map(|i| (i as i16).wrapping_mul(step)).collect()
}

#[test]
fn write_then_read_three_entries() {
    let (_dir, path) = scratch("site_3.pcm_seq2");
    let entries = [ramp(3000, 3), ramp(2048, -1), ramp(17, 1000)];

    let mut out = PcmFile::open(&path, Mode::Write).unwrap();
    out.control(Control::SetTimestamp(1_234_567_890)).unwrap();
    out.control(Control::SetTimeFraction(500)).unwrap();
    for (i, samples) in entries.iter().enumerate() {
        out.seek(i as u32 + 1).unwrap();
        // Split across calls to exercise partial segment buffering.
        let (head, tail) = samples.split_at(samples.len() / 3);
        out.write(head).unwrap();
        out.write(tail).unwrap();
    }
    out.close().unwrap();

    let mut input = PcmFile::open(&path, Mode::Read).unwrap();
    assert_eq!(input.kind().name(), "pcm_seq2");
    for (i, samples) in entries.iter().enumerate() {
        input.seek(i as u32 + 1).unwrap();
        assert_eq!(input.read().unwrap(), samples.as_slice());
        let stat = input.stat().unwrap();
        assert_eq!(stat.entry, i as u32 + 1);
        assert_eq!(stat.nsamples as usize, samples.len());
        assert_eq!(stat.sample_rate, 20_000);
        assert_eq!(stat.entry_count, 3);
        assert_eq!(stat.timestamp, Timestamp::new(1_234_567_890, 500));
        assert_eq!(stat.capabilities, Capabilities::MULTI_ENTRY | Capabilities::SAMPLE_RATE);
    }
}

#[test]
fn unknown_suffix_is_rejected_before_touching_disk() {
    let (_dir, path) = scratch("notes.wav");
    let err = PcmFile::open(&path, Mode::Write).unwrap_err();
    assert!(matches!(err, PcmError::UnsupportedFormat { .. }));
    assert!(!path.exists());
}

#[test]
fn read_mode_seek_bounds() {
    let (_dir, path) = scratch("bounds.pcmseq");
    let mut out = PcmFile::open(&path, Mode::Write).unwrap();
    out.write(&ramp(10, 1)).unwrap();
    out.seek(2).unwrap();
    out.write(&ramp(10, 2)).unwrap();
    drop(out);

    let mut input = PcmFile::open(&path, Mode::Read).unwrap();
    assert!(matches!(input.seek(0), Err(PcmError::Range { .. })));
    assert!(matches!(input.seek(3), Err(PcmError::Range { .. })));
    input.seek(2).unwrap();
    assert_eq!(input.read().unwrap(), ramp(10, 2).as_slice());
}

#[test]
fn controls_by_mode() {
    let (_dir, path) = scratch("ctl.pcm_seq2");
    let config = PcmConfig {
        sample_rate: 32_000,
        ..PcmConfig::default()
    };
    let mut out = PcmFile::open_with(&path, Mode::Write, &config).unwrap();
    assert_eq!(out.control(Control::GetSampleRate).unwrap(), ControlValue::SampleRate(32_000));
    out.control(Control::SetSampleRate(44_100)).unwrap();
    out.write(&ramp(100, 1)).unwrap();
    assert_eq!(out.control(Control::GetSize).unwrap(), ControlValue::Size(100));
    assert_eq!(out.control(Control::GetEntry).unwrap(), ControlValue::Entry(1));
    assert_eq!(out.control(Control::GetEntryCount).unwrap(), ControlValue::EntryCount(1));
    assert!(matches!(
        out.control(Control::UseHeap),
        Err(PcmError::Unsupported { op: "use_heap" })
    ));
    assert!(matches!(out.control(Control::GetTimestamp), Err(PcmError::Unsupported { .. })));
    assert!(matches!(out.read(), Err(PcmError::Unsupported { op: "read" })));
    out.close().unwrap();

    let mut input = PcmFile::open(&path, Mode::Read).unwrap();
    assert_eq!(input.control(Control::GetSampleRate).unwrap(), ControlValue::SampleRate(44_100));
    assert_eq!(input.control(Control::GetSize).unwrap(), ControlValue::Size(100));
    assert_eq!(
        input.control(Control::GetCapabilities).unwrap(),
        ControlValue::Capabilities(Capabilities::PCM_SEQ2)
    );
    assert!(matches!(
        input.control(Control::SetSampleRate(1)),
        Err(PcmError::Unsupported { .. })
    ));
    assert!(matches!(input.write(&[1]), Err(PcmError::Unsupported { op: "write" })));
}

#[test]
fn allocation_strategy_is_fixed_after_first_read() {
    let (_dir, path) = scratch("alloc.pcm_seq2");
    let mut out = PcmFile::open(&path, Mode::Write).unwrap();
    out.write(&ramp(5000, 7)).unwrap();
    out.close().unwrap();

    for strategy in [AllocationStrategy::Mmap, AllocationStrategy::Heap] {
        let config = PcmConfig {
            allocation: strategy,
            ..PcmConfig::default()
        };
        let mut input = PcmFile::open_with(&path, Mode::Read, &config).unwrap();
        assert_eq!(input.read().unwrap(), ramp(5000, 7).as_slice());
        assert!(matches!(input.control(Control::UseMmap), Err(PcmError::Unsupported { .. })));
    }

    let mut input = PcmFile::open(&path, Mode::Read).unwrap();
    assert_eq!(input.control(Control::UseHeap).unwrap(), ControlValue::Done);
    assert_eq!(input.read().unwrap().len(), 5000);
}

#[test]
fn drop_finalises_open_entry() {
    let (_dir, path) = scratch("dropped.pcm_seq2");
    {
        let mut out = PcmFile::open(&path, Mode::Write).unwrap();
        out.write(&ramp(4097, 1)).unwrap();
    }
    let mut input = PcmFile::open(&path, Mode::Read).unwrap();
    assert_eq!(input.stat().unwrap().nsamples, 4097);
    assert_eq!(input.read().unwrap(), ramp(4097, 1).as_slice());
}

#[test]
fn seek_without_write_leaves_no_entry() {
    let (_dir, path) = scratch("skip.pcm_seq2");
    let mut out = PcmFile::open(&path, Mode::Write).unwrap();
    out.seek(5).unwrap();
    out.write(&ramp(30, 1)).unwrap();
    out.close().unwrap();

    let input = PcmFile::open(&path, Mode::Read).unwrap();
    assert_eq!(input.stat().unwrap().entry_count, 1);
}

#[test]
fn legacy_sub_format_through_handle() {
    let (_dir, path) = scratch("legacy.pcm_seq2");
    let config = PcmConfig {
        sub_format: SubFormat::Type1,
        ..PcmConfig::default()
    };
    let mut out = PcmFile::open_with(&path, Mode::Write, &config).unwrap();
    out.write(&ramp(2100, 5)).unwrap();
    out.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap()[0], 0x36);
    let mut input = PcmFile::open(&path, Mode::Read).unwrap();
    assert_eq!(input.read().unwrap(), ramp(2100, 5).as_slice());
}

#[test]
fn config_from_toml_drives_handle() {
    let (_dir, path) = scratch("toml.pcm_seq2");
    let config: PcmConfig = toml::from_str("sample_rate = 8000\nallocation = \"heap\"").unwrap();
    let mut out = PcmFile::open_with(&path, Mode::Write, &config).unwrap();
    out.write(&[1, 2, 3]).unwrap();
    out.close().unwrap();

    let input = PcmFile::open_with(&path, Mode::Read, &config).unwrap();
    let stat = input.stat().unwrap();
    assert_eq!(stat.sample_rate, 8000);
    let json = serde_json::to_value(stat).unwrap();
    assert_eq!(json["nsamples"], 3);
}

#[test]
fn written_fields_are_little_endian_and_order_is_not_configurable() {
    assert!(toml::from_str::<PcmConfig>("byte_order = \"big\"").is_err());

    let (_dir, path) = scratch("order.pcm_seq2");
    let config: PcmConfig = toml::from_str("sample_rate = 32000").unwrap();
    let mut out = PcmFile::open_with(&path, Mode::Write, &config).unwrap();
    out.write(&[0x0102, -2]).unwrap();
    out.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], &[0x03, 0x00, 0x20, 0x32]);
    assert_eq!(&bytes[50..54], &32_000_u32.to_le_bytes());
    // First samples follow the 54-byte header and the 34-byte segment header.
    assert_eq!(&bytes[88..92], &[0x02, 0x01, 0xfe, 0xff]);

    let mut input = PcmFile::open_with(&path, Mode::Read, &config).unwrap();
    assert_eq!(input.read().unwrap(), &[0x0102, -2]);
}

#[test]
fn read_range_returns_clamped_window_of_current_entry() {
    let (_dir, path) = scratch("window.pcm_seq2");
    let data = ramp(5000, 7);
    let mut out = PcmFile::open(&path, Mode::Write).unwrap();
    out.write(&[9; 10]).unwrap();
    out.seek(2).unwrap();
    out.write(&data).unwrap();
    out.close().unwrap();

    let mut input = PcmFile::open(&path, Mode::Read).unwrap();
    input.seek(2).unwrap();
    assert_eq!(input.read_range(4100, 4200).unwrap(), &data[4100..=4200]);
    assert_eq!(input.read_range(4990, u32::MAX).unwrap(), &data[4990..]);
    let err = input.read_range(5000, 5001).unwrap_err();
    assert!(matches!(err, PcmError::Range { .. }));
    assert_eq!(input.read().unwrap(), data.as_slice());

    let (_wdir, wpath) = scratch("w.pcm_seq2");
    let mut writer = PcmFile::open(&wpath, Mode::Write).unwrap();
    assert!(matches!(
        writer.read_range(0, 1),
        Err(PcmError::Unsupported { op: "read_range" })
    ));
}

//! Writer output read back through the backward indexer and reader.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Cursor};
use std::path::Path;

use pcmseq_error::PcmError;
use pcmseq_io::{Directory, EntryHeader, SeqReader, SeqWriter};
use pcmseq_types::{ByteOrderPolicy, RecordKey, SubFormat, Timestamp};
use proptest::prelude::*;
use tempfile::tempdir;

fn sample_payload(len: usize, seed: u32) -> Vec<i16> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as i16
        })
        .collect()
}

fn header(name: &str, entry: u32, rate: u32) -> EntryHeader {
    EntryHeader::new(
        RecordKey::for_entry(name, entry),
        Timestamp::new(1_600_000_000 + i64::from(entry), 250),
        rate,
    )
}

/// Write each entry as a sequence of chunks, closing with an empty final call.
fn write_chunked(format: SubFormat, entries: &[Vec<Vec<i16>>]) -> Vec<u8> {
    let mut writer = SeqWriter::new(Cursor::new(Vec::new()), format, ByteOrderPolicy::PCM_SEQ2);
    for (i, chunks) in entries.iter().enumerate() {
        writer
            .write_header(&header("prop.pcm_seq2", i as u32 + 1, 20_000))
            .unwrap();
        for chunk in chunks {
            writer.write_data(chunk, false).unwrap();
        }
        writer.write_data(&[], true).unwrap();
    }
    writer.into_inner().into_inner()
}

fn write_file(path: &Path, format: SubFormat, entries: &[Vec<i16>]) {
    let file = File::create(path).unwrap();
    let mut writer = SeqWriter::new(BufWriter::new(file), format, ByteOrderPolicy::PCM_SEQ2);
    for (i, data) in entries.iter().enumerate() {
        writer
            .write_header(&header("disk.pcm_seq2", i as u32 + 1, 32_000))
            .unwrap();
        writer.write_data(data, true).unwrap();
    }
    writer.flush().unwrap();
}

fn open_file(path: &Path) -> SeqReader<BufReader<File>> {
    SeqReader::open(BufReader::new(File::open(path).unwrap()), ByteOrderPolicy::PCM_SEQ2).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn chunked_writes_read_back_unchanged(
        entries in prop::collection::vec(
            prop::collection::vec(prop::collection::vec(any::<i16>(), 0..2600), 1..5),
            1..4,
        ),
        type1 in any::<bool>(),
    ) {
        let format = if type1 { SubFormat::Type1 } else { SubFormat::Type2 };
        let bytes = write_chunked(format, &entries);
        let mut reader = SeqReader::open(Cursor::new(bytes), ByteOrderPolicy::PCM_SEQ2).unwrap();
        prop_assert_eq!(reader.entry_count() as usize, entries.len());

        for (i, chunks) in entries.iter().enumerate() {
            let expected: Vec<i16> = chunks.concat();
            let entry = i as u32 + 1;
            if expected.is_empty() {
                // An empty entry is stored as one zero segment whose size is
                // recovered by scanning.
                let got = reader.read_entry(entry).unwrap();
                prop_assert_eq!(got.len(), 2048);
                prop_assert!(got.iter().all(|&s| s == 0));
            } else {
                prop_assert_eq!(reader.read_entry(entry).unwrap(), expected);
            }
        }
    }
}

#[test]
fn indexing_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("twice.pcm_seq2");
    let entries = vec![
        sample_payload(3000, 1),
        sample_payload(1, 2),
        sample_payload(8192, 3),
    ];
    write_file(&path, SubFormat::Type2, &entries);

    let first = Directory::build(&mut File::open(&path).unwrap(), ByteOrderPolicy::PCM_SEQ2).unwrap();
    let second = Directory::build(&mut File::open(&path).unwrap(), ByteOrderPolicy::PCM_SEQ2).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert_eq!(first.entries()[1].sample_rate, 32_000);
}

#[test]
fn seek_boundaries_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bounds.pcm_seq2");
    write_file(&path, SubFormat::Type2, &[sample_payload(10, 1), sample_payload(20, 2)]);

    let mut reader = open_file(&path);
    let count = reader.entry_count();
    assert!(matches!(reader.seek_to_entry(0), Err(PcmError::Range { .. })));
    assert!(matches!(reader.seek_to_entry(count + 1), Err(PcmError::Range { .. })));
    assert_eq!(reader.seek_to_entry(count).unwrap().get(), count);
}

#[test]
fn partial_range_of_three_thousand_sample_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.pcm_seq2");
    let full = sample_payload(3000, 7);
    write_file(&path, SubFormat::Type2, &[full.clone()]);

    let mut reader = open_file(&path);
    let got = reader.read_range(1, 1000, 2500).unwrap();
    assert_eq!(got.len(), 1501);
    assert_eq!(got, full[1000..2501]);
}

#[test]
fn truncated_final_segment_recovers_partial_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cut.pcm_seq2");
    let first = sample_payload(3000, 11);
    let second = sample_payload(6000, 12);
    write_file(&path, SubFormat::Type2, &[first.clone(), second.clone()]);

    let len = std::fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 2500).unwrap();
    drop(file);

    let mut reader = open_file(&path);
    assert_eq!(reader.entry_count(), 2);
    assert_eq!(reader.get_info(1).unwrap().sample_count, 3000);
    let info = reader.get_info(2).unwrap();
    assert_eq!(info.sample_count, 2 * 2048);
    assert_eq!(reader.read_entry(1).unwrap(), first);
    assert_eq!(reader.read_entry(2).unwrap(), second[..4096]);
}

#[test]
fn entry_cut_inside_its_only_segment_is_still_counted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cut_short.pcm_seq2");
    let first = sample_payload(3000, 21);
    write_file(&path, SubFormat::Type2, &[first.clone(), sample_payload(500, 22)]);

    let len = std::fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 2500).unwrap();
    drop(file);

    let mut reader = open_file(&path);
    assert_eq!(reader.entry_count(), 2);
    assert_eq!(reader.read_entry(1).unwrap(), first);
    let info = reader.get_info(2).unwrap();
    assert_eq!(info.sample_count, 0);
    assert_eq!(info.sample_rate, 32_000);
    assert!(reader.read_entry(2).unwrap().is_empty());
}

#[test]
fn type1_files_round_trip_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.pcm_seq2");
    let entries = vec![sample_payload(2048, 1), sample_payload(4097, 2)];
    write_file(&path, SubFormat::Type1, &entries);

    assert_eq!(std::fs::read(&path).unwrap()[0], 0x36);
    let mut reader = open_file(&path);
    assert_eq!(reader.directory().format(), SubFormat::Type1);
    assert_eq!(reader.read_entry(2).unwrap(), entries[1]);
    assert_eq!(reader.get_info(2).unwrap().timestamp, Timestamp::new(1_600_000_002, 250));
}

#[test]
fn corrupted_recordwords_are_recovered_by_scanning() {
    let entries = vec![sample_payload(100, 1), sample_payload(5000, 2)];
    let mut bytes = write_chunked(
        SubFormat::Type2,
        &entries.iter().map(|e| vec![e.clone()]).collect::<Vec<_>>(),
    );
    // Last segment of entry 2 starts one segment from the end.
    let last_segment = bytes.len() - 4134;
    bytes[last_segment + 30..last_segment + 34].copy_from_slice(&(-1_i32).to_le_bytes());

    let mut reader = SeqReader::open(Cursor::new(bytes), ByteOrderPolicy::PCM_SEQ2).unwrap();
    assert_eq!(reader.get_info(2).unwrap().sample_count, 3 * 2048);
    let got = reader.read_entry(2).unwrap();
    assert_eq!(got[..5000], entries[1][..]);
    assert!(got[5000..].iter().all(|&s| s == 0));
}

#[test]
fn legacy_trailing_padding_segment_is_indexed() {
    // Older writers emitted the next segment header eagerly, leaving an
    // all-zero segment after entries that filled their last segment exactly.
    let codec_key = RecordKey::for_entry("old.pcm_seq2", 1);
    let mut writer = SeqWriter::new(Cursor::new(Vec::new()), SubFormat::Type2, ByteOrderPolicy::PCM_SEQ2);
    writer.write_header(&EntryHeader::new(codec_key, Timestamp::new(0, 0), 20_000)).unwrap();
    writer.write_data(&sample_payload(2048, 3), false).unwrap();
    writer.write_data(&[0; 2048], true).unwrap();
    let mut bytes = writer.into_inner().into_inner();
    let last_segment = bytes.len() - 4134;
    bytes[last_segment + 30..last_segment + 34].copy_from_slice(&2048_i32.to_le_bytes());

    let dir = Directory::build(&mut Cursor::new(bytes), ByteOrderPolicy::PCM_SEQ2).unwrap();
    assert_eq!(dir.len(), 1);
    assert_eq!(dir.entries()[0].offset, 0);
    assert_eq!(dir.entries()[0].sample_count, 2048);
}

use std::{
  fs::File,
  io::{self, BufRead, BufReader, Seek, SeekFrom},
};

use crate::{
  error::CoreError,
  index::{IndexShared, LineIndex},
};

/// Random-access retrieval of the raw text of one line.
///
/// Stateless view over a `LineIndex`; the resume state it relies on
/// (`between_offsets`, `active_sample`) lives under the index mutex, so
/// concurrent readers serialize and the warm-up they do is shared.
pub struct LineReader<'a> {
  index: &'a LineIndex,
}

impl<'a> LineReader<'a> {
  pub fn new(index: &'a LineIndex) -> Self {
    Self { index }
  }

  /// The line's bytes decoded as UTF-8 (lossily), with trailing whitespace
  /// (including `\r`) stripped. `line` must be below the currently published
  /// `line_count`.
  pub fn get_line(&self, line: usize) -> Result<String, CoreError> {
    let total = self.index.line_count();
    if line >= total {
      return Err(CoreError::OutOfRange { line, total });
    }
    let mut shared = self.index.shared().lock();
    fetch_line(&mut shared, line, self.index.file_size()).map_err(CoreError::from)
  }
}

/// Locate and read line `n`, reusing previously cached positions within the
/// active sample so no already-seen line is ever rescanned.
fn fetch_line(shared: &mut IndexShared, n: usize, file_size: u64) -> io::Result<String> {
  let ratio = shared.lines_per_sample.max(1);
  let sample = n / ratio;
  let remainder = n % ratio;

  if shared.active_sample != Some(sample) {
    shared.between_offsets.clear();
    shared.active_sample = Some(sample);
  }

  let IndexShared {
    reader,
    sample_offsets,
    between_offsets,
    ..
  } = shared;

  let sample_start = sample_offsets.get(sample).copied().ok_or_else(|| {
    io::Error::new(io::ErrorKind::InvalidData, "sample offset not published")
  })?;
  let cap = ratio - 1;
  let mut scratch: Vec<u8> = Vec::new();

  // The requested line is the sample line itself.
  if remainder == 0 {
    reader.seek(SeekFrom::Start(sample_start))?;
    let bytes = read_record(reader, &mut scratch)?;
    if between_offsets.is_empty() {
      note_offset(between_offsets, cap, sample_start + bytes, file_size);
    }
    return Ok(decode(&scratch));
  }

  // Nothing cached yet: walk from the sample line, remembering every
  // position on the way.
  if between_offsets.is_empty() {
    reader.seek(SeekFrom::Start(sample_start))?;
    let mut pos = sample_start;
    for _ in 0..remainder {
      let bytes = read_record(reader, &mut scratch)?;
      pos += bytes;
      note_offset(between_offsets, cap, pos, file_size);
    }
    let bytes = read_record(reader, &mut scratch)?;
    note_offset(between_offsets, cap, pos + bytes, file_size);
    return Ok(decode(&scratch));
  }

  // The cached run already covers the requested line.
  if remainder <= between_offsets.len() {
    let start = between_offsets[remainder - 1];
    reader.seek(SeekFrom::Start(start))?;
    let bytes = read_record(reader, &mut scratch)?;
    if remainder == between_offsets.len() {
      note_offset(between_offsets, cap, start + bytes, file_size);
    }
    return Ok(decode(&scratch));
  }

  // Partial cache: the last cached offset addresses an unread line, resume
  // there and extend the run up to the requested line.
  let have = between_offsets.len();
  let start = between_offsets[have - 1];
  reader.seek(SeekFrom::Start(start))?;
  let mut pos = start;
  for _ in have..remainder {
    let bytes = read_record(reader, &mut scratch)?;
    pos += bytes;
    note_offset(between_offsets, cap, pos, file_size);
  }
  let bytes = read_record(reader, &mut scratch)?;
  note_offset(between_offsets, cap, pos + bytes, file_size);
  Ok(decode(&scratch))
}

fn note_offset(between_offsets: &mut Vec<u64>, cap: usize, pos: u64, file_size: u64) {
  if between_offsets.len() < cap && pos < file_size {
    between_offsets.push(pos);
  }
}

fn read_record(reader: &mut BufReader<File>, buf: &mut Vec<u8>) -> io::Result<u64> {
  buf.clear();
  let n = reader.read_until(b'\n', buf)?;
  Ok(n as u64)
}

fn decode(bytes: &[u8]) -> String {
  String::from_utf8_lossy(bytes).trim_end().to_string()
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  // Ten 6-byte lines ("line0\n".."line9\n"), 60 bytes total, so every
  // offset is predictable: line i starts at i * 6.
  fn shared_over(ratio: usize) -> (tempfile::TempDir, IndexShared) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    for i in 0..10 {
      writeln!(file, "line{i}").unwrap();
    }
    drop(file);

    let shared = IndexShared {
      sample_offsets: (0..10).step_by(ratio).map(|i| (i * 6) as u64).collect(),
      lines_per_sample: ratio,
      between_offsets: Vec::new(),
      active_sample: None,
      reader: BufReader::new(std::fs::File::open(&path).unwrap()),
    };
    (dir, shared)
  }

  const FILE_SIZE: u64 = 60;

  #[test]
  fn sample_line_itself() {
    let (_dir, mut shared) = shared_over(4);
    assert_eq!(fetch_line(&mut shared, 4, FILE_SIZE).unwrap(), "line4");
    assert_eq!(shared.active_sample, Some(1));
    assert_eq!(shared.between_offsets, vec![30]);
  }

  #[test]
  fn cold_sample_walks_and_caches_every_offset() {
    let (_dir, mut shared) = shared_over(4);
    assert_eq!(fetch_line(&mut shared, 6, FILE_SIZE).unwrap(), "line6");
    // Start offsets of lines 5, 6 and 7; the run is capped at ratio - 1.
    assert_eq!(shared.between_offsets, vec![30, 36, 42]);
  }

  #[test]
  fn warm_sample_seeks_directly_without_growing_the_cache() {
    let (_dir, mut shared) = shared_over(4);
    fetch_line(&mut shared, 6, FILE_SIZE).unwrap();
    assert_eq!(fetch_line(&mut shared, 5, FILE_SIZE).unwrap(), "line5");
    assert_eq!(shared.between_offsets, vec![30, 36, 42]);
  }

  #[test]
  fn partial_cache_resumes_from_the_last_offset() {
    let (_dir, mut shared) = shared_over(4);
    fetch_line(&mut shared, 5, FILE_SIZE).unwrap();
    assert_eq!(shared.between_offsets, vec![30, 36]);
    assert_eq!(fetch_line(&mut shared, 7, FILE_SIZE).unwrap(), "line7");
    assert_eq!(shared.between_offsets, vec![30, 36, 42]);
  }

  #[test]
  fn switching_sample_resets_the_cached_run() {
    let (_dir, mut shared) = shared_over(4);
    fetch_line(&mut shared, 6, FILE_SIZE).unwrap();
    assert_eq!(fetch_line(&mut shared, 9, FILE_SIZE).unwrap(), "line9");
    assert_eq!(shared.active_sample, Some(2));
    // Only line 9's start; the position after the final line is not stored.
    assert_eq!(shared.between_offsets, vec![54]);
  }

  #[test]
  fn dense_index_reads_directly() {
    let (_dir, mut shared) = shared_over(1);
    assert_eq!(fetch_line(&mut shared, 3, FILE_SIZE).unwrap(), "line3");
    assert!(shared.between_offsets.is_empty());
  }
}

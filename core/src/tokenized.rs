use std::{collections::BTreeMap, path::Path};

use tracing::debug;

use crate::{
  dialect::detect_dialect,
  error::CoreError,
  index::LineIndex,
  models::{ScanHooks, TableOptions, TokenizerParams},
  reader::LineReader,
  tokenizer::tokenize,
};

/// On-demand tokenization of lines, with a bounded cache.
///
/// This is the facade a viewer talks to. It owns the `LineIndex` (and with
/// it the scan worker) and keeps up to `cache_capacity` parsed rows. When the
/// cache is full, the evicted entry is whichever extreme key (smallest or
/// largest) lies farther from the requested line; the header row is never
/// evicted.
#[derive(Debug)]
pub struct TokenizedLines {
  lines: LineIndex,
  params: TokenizerParams,
  cache: BTreeMap<usize, Vec<String>>,
  cache_capacity: usize,
}

impl TokenizedLines {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
    Self::open_with(path, TableOptions::default(), ScanHooks::default())
  }

  pub fn open_with(
    path: impl AsRef<Path>,
    options: TableOptions,
    hooks: ScanHooks,
  ) -> Result<Self, CoreError> {
    if options.cache_capacity <= 4 {
      return Err(CoreError::InvalidArg(format!(
        "cache capacity must exceed 4, got {}",
        options.cache_capacity
      )));
    }
    check_params(&options.tokenizer)?;
    let lines = LineIndex::open_with(path, hooks)?;
    Ok(Self {
      lines,
      params: options.tokenizer,
      cache: BTreeMap::new(),
      cache_capacity: options.cache_capacity,
    })
  }

  /// Open a file with its separator and quote detected from the first line.
  /// When detection is ambiguous the tokenizer in `options` is kept as-is.
  pub fn open_with_dialect(
    path: impl AsRef<Path>,
    mut options: TableOptions,
    hooks: ScanHooks,
  ) -> Result<Self, CoreError> {
    let dialect = detect_dialect(path.as_ref())?;
    if let Some(separator) = dialect.separator {
      options.tokenizer.separator = separator;
      options.tokenizer.quote = dialect.quote;
    }
    Self::open_with(path, options, hooks)
  }

  pub fn index(&self) -> &LineIndex {
    &self.lines
  }

  pub fn line_count(&self) -> usize {
    self.lines.line_count()
  }

  pub fn limit_reached(&self) -> bool {
    self.lines.limit_reached()
  }

  pub fn scan_finished(&self) -> bool {
    self.lines.scan_finished()
  }

  pub fn request_stop(&self) {
    self.lines.request_stop()
  }

  pub fn join(&mut self) -> Result<(), CoreError> {
    self.lines.join()
  }

  pub fn tokenizer_params(&self) -> TokenizerParams {
    self.params
  }

  /// Replace the tokenizer triple. Changing any of the three flushes the
  /// cache; setting the same triple again is a no-op.
  pub fn set_tokenizer(&mut self, params: TokenizerParams) -> Result<(), CoreError> {
    check_params(&params)?;
    if params != self.params {
      debug!(?params, "tokenizer changed, flushing cache");
      self.params = params;
      self.cache.clear();
    }
    Ok(())
  }

  /// Number of fields on the header row; it defines the table's width even
  /// when later rows disagree.
  pub fn column_count(&mut self) -> Result<usize, CoreError> {
    Ok(self.get_tokenized_line(0)?.len())
  }

  /// Parsed fields of line `n`. The returned slice stays valid until the
  /// next call that mutates the cache.
  pub fn get_tokenized_line(&mut self, n: usize) -> Result<&[String], CoreError> {
    if !self.cache.contains_key(&n) {
      let raw = LineReader::new(&self.lines).get_line(n)?;
      let fields = tokenize(&raw, &self.params);
      if self.cache.len() >= self.cache_capacity {
        self.evict_around(n);
      }
      self.cache.insert(n, fields);
    }
    Ok(self.cache.get(&n).map(Vec::as_slice).unwrap_or_default())
  }

  /// Evict the extreme key farther from `n`; ties evict the smaller key.
  /// Line 0 is exempt.
  fn evict_around(&mut self, n: usize) {
    let mut keys = self.cache.keys().copied();
    let first = match keys.next() {
      Some(0) => keys.next(),
      other => other,
    };
    let (Some(first), Some(last)) = (first, self.cache.keys().next_back().copied()) else {
      return;
    };
    let victim = if n.abs_diff(first) >= n.abs_diff(last) {
      first
    } else {
      last
    };
    self.cache.remove(&victim);
  }
}

fn check_params(params: &TokenizerParams) -> Result<(), CoreError> {
  if params.separator == '\0' {
    return Err(CoreError::InvalidArg(
      "separator must not be the NUL character".into(),
    ));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  fn table_with_capacity(rows: usize, cache_capacity: usize) -> (tempfile::TempDir, TokenizedLines) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "id,value").unwrap();
    for i in 1..rows {
      writeln!(file, "{i},row{i}").unwrap();
    }
    drop(file);

    let options = TableOptions {
      cache_capacity,
      ..TableOptions::default()
    };
    let mut table = TokenizedLines::open_with(&path, options, ScanHooks::default()).unwrap();
    table.join().unwrap();
    (dir, table)
  }

  fn cached_keys(table: &TokenizedLines) -> Vec<usize> {
    table.cache.keys().copied().collect()
  }

  #[test]
  fn eviction_prefers_the_farther_extreme() {
    let (_dir, mut table) = table_with_capacity(30, 6);
    for n in 0..6 {
      table.get_tokenized_line(n).unwrap();
    }
    assert_eq!(cached_keys(&table), vec![0, 1, 2, 3, 4, 5]);

    // 6 is far from 1 (the smallest evictable) and close to 5.
    table.get_tokenized_line(6).unwrap();
    assert_eq!(cached_keys(&table), vec![0, 2, 3, 4, 5, 6]);

    // Walking back down evicts from the top end.
    table.get_tokenized_line(1).unwrap();
    assert_eq!(cached_keys(&table), vec![0, 1, 2, 3, 4, 5]);
  }

  #[test]
  fn tie_evicts_the_smaller_key() {
    let (_dir, mut table) = table_with_capacity(30, 5);
    for n in [0, 6, 8, 10, 12] {
      table.get_tokenized_line(n).unwrap();
    }
    // 9 is equidistant from 6 and 12.
    table.get_tokenized_line(9).unwrap();
    assert_eq!(cached_keys(&table), vec![0, 8, 9, 10, 12]);
  }

  #[test]
  fn header_is_never_evicted() {
    let (_dir, mut table) = table_with_capacity(30, 6);
    table.get_tokenized_line(0).unwrap();
    for n in 20..29 {
      table.get_tokenized_line(n).unwrap();
    }
    assert!(table.cache.contains_key(&0));
    assert_eq!(table.cache.len(), 6);
  }

  #[test]
  fn changing_params_empties_the_cache() {
    let (_dir, mut table) = table_with_capacity(10, 6);
    for n in 0..4 {
      table.get_tokenized_line(n).unwrap();
    }
    let mut params = table.tokenizer_params();
    params.quote = Some('\'');
    table.set_tokenizer(params).unwrap();
    assert!(table.cache.is_empty());

    // The same triple again is a no-op.
    table.get_tokenized_line(1).unwrap();
    table.set_tokenizer(params).unwrap();
    assert_eq!(cached_keys(&table), vec![1]);
  }

  #[test]
  fn tiny_capacity_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.csv");
    std::fs::write(&path, "a,b\n").unwrap();
    let options = TableOptions {
      cache_capacity: 4,
      ..TableOptions::default()
    };
    let err = TokenizedLines::open_with(&path, options, ScanHooks::default()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidArg(_)));
  }
}

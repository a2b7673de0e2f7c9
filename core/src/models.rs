use serde::{Deserialize, Serialize};

/// Field separator and quote character describing a CSV variant.
///
/// `None` means "not detected": an ambiguous first line yields neither, a
/// plain unquoted file yields a separator only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
  pub separator: Option<char>,
  pub quote: Option<char>,
}

/// Parameters of the escaped-list tokenizer.
///
/// `escape == None` disables escaping entirely. The separator must not be
/// the NUL character; `TokenizedLines::set_tokenizer` rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerParams {
  pub escape: Option<char>,
  pub separator: char,
  pub quote: Option<char>,
}

impl Default for TokenizerParams {
  fn default() -> Self {
    Self {
      escape: None,
      separator: ',',
      quote: Some('"'),
    }
  }
}

/// Progress snapshot emitted by the scan worker.
///
/// `lines` is the number of lines seen so far; `percent` is derived from
/// bytes consumed. The final event of a completed scan is always
/// `(final_line_count, 100)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanProgress {
  pub lines: usize,
  pub percent: u8,
}

pub type ProgressFn = Box<dyn FnMut(ScanProgress) + Send + 'static>;
pub type CancelFn = Box<dyn FnMut() -> bool + Send + 'static>;

/// Callbacks invoked from the scan worker thread.
///
/// Both are optional. Implementations must be thread-safe and non-blocking;
/// nothing here marshals onto a UI thread. `is_cancelled` is polled at most
/// every 100 ms; `request_stop` on the index is the push-style alternative.
#[derive(Default)]
pub struct ScanHooks {
  pub on_progress: Option<ProgressFn>,
  pub is_cancelled: Option<CancelFn>,
}

impl ScanHooks {
  pub fn with_progress(mut self, f: impl FnMut(ScanProgress) + Send + 'static) -> Self {
    self.on_progress = Some(Box::new(f));
    self
  }

  pub fn with_cancel_probe(mut self, f: impl FnMut() -> bool + Send + 'static) -> Self {
    self.is_cancelled = Some(Box::new(f));
    self
  }
}

#[derive(Debug, Clone)]
pub struct TableOptions {
  /// Capacity of the tokenized-line cache. Must be greater than 4.
  pub cache_capacity: usize,
  pub tokenizer: TokenizerParams,
}

impl Default for TableOptions {
  fn default() -> Self {
    Self {
      cache_capacity: 10_000,
      tokenizer: TokenizerParams::default(),
    }
  }
}

use std::{
  fs::File,
  io::{BufRead, BufReader},
  path::{Path, PathBuf},
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
  thread::{self, JoinHandle},
  time::Instant,
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
  error::CoreError,
  models::{ScanHooks, ScanProgress},
};

/// Hard cap on the number of indexed lines, chosen to stay representable as
/// a signed 32-bit row index for the hosting grid.
pub const MAX_LINES: usize = i32::MAX as usize;

/// Lines read before the total is approximated and the sampling ratio fixed.
const MIN_PROBE: usize = 1000;

/// Upper bound on the number of sampled offsets kept for one file.
const MAX_SAMPLES: usize = 10_000;

/// Sampled offsets accumulated privately before publishing under the lock.
const FLUSH_BATCH: usize = 1000;

/// Wall-clock checks (cancel poll, progress publish) run every this many lines.
const WALL_CHECK_LINES: usize = 50;

const CANCEL_POLL_MS: u128 = 100;
const PROGRESS_PUBLISH_MS: u128 = 500;

/// State shared between the scan worker and retrieval, guarded by one mutex.
///
/// `sample_offsets[k]` is the byte offset of line `k * lines_per_sample`.
/// `between_offsets[j]`, when present, is the byte offset of line
/// `active_sample * lines_per_sample + j + 1`; it is rebuilt from scratch
/// whenever the active sample changes.
#[derive(Debug)]
pub(crate) struct IndexShared {
  pub(crate) sample_offsets: Vec<u64>,
  pub(crate) lines_per_sample: usize,
  pub(crate) between_offsets: Vec<u64>,
  pub(crate) active_sample: Option<usize>,
  pub(crate) reader: BufReader<File>,
}

#[derive(Debug)]
struct IndexInner {
  path: PathBuf,
  file_size: u64,
  shared: Mutex<IndexShared>,
  total_lines: AtomicUsize,
  stop_requested: AtomicBool,
  limit_reached: AtomicBool,
  scan_finished: AtomicBool,
}

/// Sparse byte-offset index over the lines of one file.
///
/// Construction validates the path, seeds the sample table with offset 0 and
/// spawns a background worker that scans the file sequentially on its own
/// handle. The retrieval handle lives inside the shared record so readers
/// serialize on the same mutex the worker publishes under.
#[derive(Debug)]
pub struct LineIndex {
  inner: Arc<IndexInner>,
  worker: Option<JoinHandle<Result<(), CoreError>>>,
}

impl LineIndex {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
    Self::open_with(path, ScanHooks::default())
  }

  pub fn open_with(path: impl AsRef<Path>, hooks: ScanHooks) -> Result<Self, CoreError> {
    let path = path.as_ref().to_path_buf();
    let meta = match std::fs::metadata(&path) {
      Ok(m) => m,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(CoreError::FileMissing(path));
      }
      Err(e) => return Err(CoreError::OpenFailed { path, source: e }),
    };
    if !meta.is_file() {
      return Err(CoreError::NotRegular(path));
    }
    let file_size = meta.len();
    if file_size == 0 {
      return Err(CoreError::EmptyFile(path));
    }

    let retrieval = open_handle(&path)?;
    let scan = open_handle(&path)?;

    let inner = Arc::new(IndexInner {
      path,
      file_size,
      shared: Mutex::new(IndexShared {
        sample_offsets: vec![0],
        lines_per_sample: 1,
        between_offsets: Vec::new(),
        active_sample: None,
        reader: BufReader::new(retrieval),
      }),
      total_lines: AtomicUsize::new(0),
      stop_requested: AtomicBool::new(false),
      limit_reached: AtomicBool::new(false),
      scan_finished: AtomicBool::new(false),
    });

    let worker = {
      let inner = inner.clone();
      thread::spawn(move || scan_worker(&inner, scan, hooks))
    };

    Ok(Self {
      inner,
      worker: Some(worker),
    })
  }

  /// Current lower bound on the number of lines. Monotonically non-decreasing
  /// while the scan runs; final once `scan_finished` is true.
  pub fn line_count(&self) -> usize {
    self.inner.total_lines.load(Ordering::SeqCst)
  }

  /// True if the scan halted because `MAX_LINES` was reached.
  pub fn limit_reached(&self) -> bool {
    self.inner.limit_reached.load(Ordering::SeqCst)
  }

  pub fn scan_finished(&self) -> bool {
    self.inner.scan_finished.load(Ordering::SeqCst)
  }

  pub fn file_size(&self) -> u64 {
    self.inner.file_size
  }

  pub fn path(&self) -> &Path {
    &self.inner.path
  }

  /// Lines per sample. 1 until the probe phase fixes a larger ratio.
  pub fn sampling_ratio(&self) -> usize {
    self.inner.shared.lock().lines_per_sample
  }

  /// Byte offset of line `s * sampling_ratio()`, if that sample is published.
  pub fn offset_of_sample(&self, s: usize) -> Option<u64> {
    self.inner.shared.lock().sample_offsets.get(s).copied()
  }

  /// Cooperative cancellation; idempotent. The worker observes the flag at
  /// least every 100 ms of wall time. Already-indexed lines stay retrievable.
  pub fn request_stop(&self) {
    self.inner.stop_requested.store(true, Ordering::SeqCst);
  }

  pub fn stop_requested(&self) -> bool {
    self.inner.stop_requested.load(Ordering::SeqCst)
  }

  /// Wait for the scan worker to terminate. A mid-scan stream error surfaces
  /// here as `ReadFailed`; cancellation and the line limit do not.
  pub fn join(&mut self) -> Result<(), CoreError> {
    match self.worker.take() {
      Some(handle) => handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
      None => Ok(()),
    }
  }

  pub(crate) fn shared(&self) -> &Mutex<IndexShared> {
    &self.inner.shared
  }
}

impl Drop for LineIndex {
  fn drop(&mut self) {
    if let Some(handle) = self.worker.take() {
      self.inner.stop_requested.store(true, Ordering::SeqCst);
      let _ = handle.join();
    }
  }
}

fn open_handle(path: &Path) -> Result<File, CoreError> {
  File::open(path).map_err(|e| CoreError::OpenFailed {
    path: path.to_path_buf(),
    source: e,
  })
}

fn scan_worker(inner: &IndexInner, file: File, mut hooks: ScanHooks) -> Result<(), CoreError> {
  trace!(path = %inner.path.display(), file_size = inner.file_size, "scan started");

  let file_size = inner.file_size;
  let mut reader = BufReader::with_capacity(1 << 20, file);
  let mut ratio = 1usize;
  let mut buffer: Vec<u64> = Vec::new();
  let mut line_buf: Vec<u8> = Vec::new();
  let mut prev_line: Vec<u8> = Vec::new();
  let mut lines = 0usize;
  let mut pos = 0u64;
  let mut last_cancel_poll = Instant::now();
  let mut last_publish = Instant::now();
  let mut last_percent = 0u8;

  let result = loop {
    if inner.stop_requested.load(Ordering::SeqCst) {
      debug!(lines, "scan cancelled");
      break Ok(());
    }
    if lines == MAX_LINES {
      warn!(lines, "line limit reached, scan stopped");
      inner.limit_reached.store(true, Ordering::SeqCst);
      break Ok(());
    }

    if lines % WALL_CHECK_LINES == 0 {
      let now = Instant::now();
      if let Some(probe) = hooks.is_cancelled.as_mut() {
        if now.duration_since(last_cancel_poll).as_millis() >= CANCEL_POLL_MS {
          last_cancel_poll = now;
          if probe() {
            inner.stop_requested.store(true, Ordering::SeqCst);
            continue;
          }
        }
      }
      if now.duration_since(last_publish).as_millis() >= PROGRESS_PUBLISH_MS {
        let percent = percent_of(pos, file_size);
        if percent != last_percent {
          last_publish = now;
          last_percent = percent;
          publish(inner, &mut buffer, lines);
          if let Some(on_progress) = hooks.on_progress.as_mut() {
            on_progress(ScanProgress { lines, percent });
          }
        }
      }
    }

    line_buf.clear();
    let bytes = match reader.read_until(b'\n', &mut line_buf) {
      Ok(b) => b,
      Err(e) => {
        warn!(line = lines, error = %e, "scan read failed");
        break Err(read_failed_at(lines, &prev_line));
      }
    };
    if bytes == 0 {
      break Ok(());
    }

    if lines % ratio == 0 && lines != 0 {
      buffer.push(pos);
    }
    pos += bytes as u64;
    lines += 1;
    std::mem::swap(&mut prev_line, &mut line_buf);

    if buffer.len() == FLUSH_BATCH {
      publish(inner, &mut buffer, lines);
    }

    if lines == MIN_PROBE && ratio == 1 {
      ratio = resample(inner, &mut buffer, lines, pos);
    }
  };

  publish(inner, &mut buffer, lines);
  inner.scan_finished.store(true, Ordering::SeqCst);

  match &result {
    Ok(()) => {
      debug!(lines, "scan finished");
      if let Some(on_progress) = hooks.on_progress.as_mut() {
        on_progress(ScanProgress { lines, percent: 100 });
      }
    }
    Err(e) => warn!(error = %e, "scan terminated"),
  }
  result
}

/// Flush privately buffered sample offsets and the line count in one step,
/// so retrieval never observes a count whose samples are not yet published.
fn publish(inner: &IndexInner, buffer: &mut Vec<u64>, lines: usize) {
  let mut shared = inner.shared.lock();
  shared.sample_offsets.append(buffer);
  inner.total_lines.store(lines, Ordering::SeqCst);
}

/// Approximate the total line count from the first `MIN_PROBE` lines and fix
/// the sampling ratio for the rest of the scan. The approximation excludes
/// the header: long header lines would otherwise skew the per-line estimate.
fn resample(inner: &IndexInner, buffer: &mut Vec<u64>, lines: usize, pos: u64) -> usize {
  let mut shared = inner.shared.lock();
  shared.sample_offsets.append(buffer);
  inner.total_lines.store(lines, Ordering::SeqCst);

  let second = match shared.sample_offsets.get(1) {
    Some(&off) => off,
    None => return 1,
  };
  if pos <= second {
    return 1;
  }

  let approx = (lines as u64).saturating_mul(inner.file_size - second) / (pos - second);
  let ratio = ((approx as usize + MAX_SAMPLES / 2) / MAX_SAMPLES).max(1);
  if ratio > 1 {
    let kept: Vec<u64> = shared.sample_offsets.iter().step_by(ratio).copied().collect();
    shared.sample_offsets = kept;
    shared.lines_per_sample = ratio;
    shared.between_offsets.clear();
    shared.active_sample = None;
    debug!(approx_lines = approx, ratio, "sampling ratio fixed");
  }
  ratio
}

fn percent_of(pos: u64, file_size: u64) -> u8 {
  if file_size == 0 {
    return 100;
  }
  (pos.saturating_mul(100) / file_size).min(100) as u8
}

fn read_failed_at(line: usize, prev_line: &[u8]) -> CoreError {
  let decoded = String::from_utf8_lossy(prev_line);
  let column = decoded.trim_end().chars().count() + 1;
  CoreError::ReadFailed { line, column }
}

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("io error: {0}")]
  Io(#[from] io::Error),
  #[error("file not found: {}", .0.display())]
  FileMissing(PathBuf),
  #[error("not a regular file: {}", .0.display())]
  NotRegular(PathBuf),
  #[error("file is empty: {}", .0.display())]
  EmptyFile(PathBuf),
  #[error("unable to open {} for reading: {source}", .path.display())]
  OpenFailed { path: PathBuf, source: io::Error },
  #[error("read failed after line {line}, column {column}")]
  ReadFailed { line: usize, column: usize },
  #[error("line {line} out of range ({total} lines)")]
  OutOfRange { line: usize, total: usize },
  #[error("invalid argument: {0}")]
  InvalidArg(String),
}

mod dialect;
mod error;
mod index;
mod models;
mod reader;
mod tokenized;
mod tokenizer;

pub use crate::dialect::detect_dialect;
pub use crate::error::CoreError;
pub use crate::index::{LineIndex, MAX_LINES};
pub use crate::models::{
  CancelFn, Dialect, ProgressFn, ScanHooks, ScanProgress, TableOptions, TokenizerParams,
};
pub use crate::reader::LineReader;
pub use crate::tokenized::TokenizedLines;

use std::{
  fs::File,
  io::{BufRead, BufReader},
  path::Path,
};

use tracing::trace;

use crate::{error::CoreError, models::Dialect};

const TAB: char = '\t';
const PIPE: char = '|';
const SEMICOLON: char = ';';
const COMMA: char = ',';
const SPACE: char = ' ';
const DOUBLE_QUOTE: char = '"';
const SINGLE_QUOTE: char = '\'';

/// Guess the field separator and quote character from a file's first line.
///
/// A tab wins outright; otherwise exactly one of `|`, `;`, `,` must occur
/// (two distinct candidates are ambiguous and yield neither separator nor
/// quote); a space is the last resort. The quote is taken from the trimmed
/// line's ends, or failing that from separator-adjacent quote bigraphs.
/// An empty first line yields `(',', none)` so empty files stay openable.
pub fn detect_dialect(path: impl AsRef<Path>) -> Result<Dialect, CoreError> {
  let path = path.as_ref();
  let file = File::open(path).map_err(|e| CoreError::OpenFailed {
    path: path.to_path_buf(),
    source: e,
  })?;
  let mut reader = BufReader::new(file);
  let mut buf = Vec::new();
  reader
    .read_until(b'\n', &mut buf)
    .map_err(|_| CoreError::ReadFailed { line: 0, column: 1 })?;
  let decoded = String::from_utf8_lossy(&buf);
  let line = decoded.trim();

  if line.is_empty() {
    return Ok(Dialect {
      separator: Some(COMMA),
      quote: None,
    });
  }

  let separator = if line.contains(TAB) {
    Some(TAB)
  } else {
    let mut found: Option<char> = None;
    for ch in line.chars() {
      if ch == PIPE || ch == SEMICOLON || ch == COMMA {
        match found {
          None => found = Some(ch),
          Some(prev) if prev != ch => {
            trace!(first = %prev, second = %ch, "ambiguous separator candidates");
            return Ok(Dialect {
              separator: None,
              quote: None,
            });
          }
          Some(_) => {}
        }
      }
    }
    if found.is_none() && line.contains(SPACE) {
      found = Some(SPACE);
    }
    found
  };

  let quote = detect_quote(line, separator);
  trace!(?separator, ?quote, "dialect detected");
  Ok(Dialect { separator, quote })
}

fn detect_quote(line: &str, separator: Option<char>) -> Option<char> {
  if line.starts_with(DOUBLE_QUOTE) || line.ends_with(DOUBLE_QUOTE) {
    return Some(DOUBLE_QUOTE);
  }
  if line.starts_with(SINGLE_QUOTE) || line.ends_with(SINGLE_QUOTE) {
    return Some(SINGLE_QUOTE);
  }
  let sep = separator?;
  for quote in [DOUBLE_QUOTE, SINGLE_QUOTE] {
    let opening: String = [sep, quote].into_iter().collect();
    let closing: String = [quote, sep].into_iter().collect();
    if line.contains(&opening) && line.contains(&closing) {
      return Some(quote);
    }
  }
  None
}

use crate::models::TokenizerParams;

/// Split one line into fields with escaped-list rules:
/// - an unquoted separator terminates the field;
/// - the quote character opens/closes a literal run in which separators are
///   data;
/// - the escape character (when enabled) passes the next character through,
///   including quotes and separators;
/// - consecutive separators produce empty fields.
///
/// A quote left open at end of line, or a dangling trailing escape,
/// finalizes the in-progress field as-is.
pub(crate) fn tokenize(line: &str, params: &TokenizerParams) -> Vec<String> {
  let mut fields = Vec::new();
  let mut field = String::new();
  let mut in_quote = false;
  let mut chars = line.chars();

  while let Some(ch) = chars.next() {
    if params.escape == Some(ch) {
      if let Some(next) = chars.next() {
        field.push(next);
      }
      continue;
    }
    if params.quote == Some(ch) {
      in_quote = !in_quote;
      continue;
    }
    if ch == params.separator && !in_quote {
      fields.push(std::mem::take(&mut field));
      continue;
    }
    field.push(ch);
  }
  fields.push(field);
  fields
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params(escape: Option<char>, separator: char, quote: Option<char>) -> TokenizerParams {
    TokenizerParams {
      escape,
      separator,
      quote,
    }
  }

  #[test]
  fn plain_fields() {
    let fields = tokenize("a,b,c", &TokenizerParams::default());
    assert_eq!(fields, vec!["a", "b", "c"]);
  }

  #[test]
  fn consecutive_separators_make_empty_fields() {
    let fields = tokenize("a,,c,", &TokenizerParams::default());
    assert_eq!(fields, vec!["a", "", "c", ""]);
  }

  #[test]
  fn quoted_separator_is_data() {
    let fields = tokenize("x,\"a,b\",y", &TokenizerParams::default());
    assert_eq!(fields, vec!["x", "a,b", "y"]);
  }

  #[test]
  fn escape_passes_anything_through() {
    let fields = tokenize(r"a\,b,c\\d", &params(Some('\\'), ',', Some('"')));
    assert_eq!(fields, vec![r"a,b", r"c\d"]);
  }

  #[test]
  fn escaped_quote_stays_literal() {
    let fields = tokenize(r#""a\"b",c"#, &params(Some('\\'), ',', Some('"')));
    assert_eq!(fields, vec![r#"a"b"#, "c"]);
  }

  #[test]
  fn disabled_escape_is_plain_data() {
    let fields = tokenize(r"a\,b", &TokenizerParams::default());
    assert_eq!(fields, vec![r"a\", "b"]);
  }

  #[test]
  fn unterminated_quote_finalizes_field() {
    let fields = tokenize("\"a,b", &TokenizerParams::default());
    assert_eq!(fields, vec!["a,b"]);
  }

  #[test]
  fn dangling_escape_finalizes_field() {
    let fields = tokenize("a,b\\", &params(Some('\\'), ',', Some('"')));
    assert_eq!(fields, vec!["a", "b"]);
  }

  #[test]
  fn single_quote_dialect() {
    let fields = tokenize("'id';'name';3", &params(None, ';', Some('\'')));
    assert_eq!(fields, vec!["id", "name", "3"]);
  }

  #[test]
  fn empty_line_is_one_empty_field() {
    let fields = tokenize("", &TokenizerParams::default());
    assert_eq!(fields, vec![""]);
  }
}

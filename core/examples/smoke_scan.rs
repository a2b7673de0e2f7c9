use std::path::PathBuf;

use csvgrid_core::{ScanHooks, TableOptions, TokenizedLines};

fn main() -> Result<(), String> {
  tracing_subscriber::fmt().init();

  let path = std::env::args()
    .nth(1)
    .ok_or_else(|| "usage: cargo run -p csvgrid_core --example smoke_scan -- <path-to-csv>".to_string())?;
  let path = PathBuf::from(path);

  let hooks = ScanHooks::default()
    .with_progress(|p| println!("scanned {} lines ({}%)", p.lines, p.percent));

  let mut table = TokenizedLines::open_with_dialect(&path, TableOptions::default(), hooks)
    .map_err(|e| e.to_string())?;
  table.join().map_err(|e| e.to_string())?;

  println!("lines={}", table.line_count());
  println!("sampling_ratio={}", table.index().sampling_ratio());
  println!("columns={}", table.column_count().map_err(|e| e.to_string())?);
  println!(
    "header={:?}",
    table.get_tokenized_line(0).map_err(|e| e.to_string())?
  );
  if table.line_count() > 1 {
    println!(
      "row1={:?}",
      table.get_tokenized_line(1).map_err(|e| e.to_string())?
    );
  }
  Ok(())
}

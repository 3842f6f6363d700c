use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ember::Ember;

/// Runs an Ember script file.
#[derive(Parser)]
#[command(name = "ember", author, version, about, long_about = None)]
struct Cli {
  /// Path to the script to run.
  file: PathBuf,
}

fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let source = std::fs::read_to_string(&cli.file)
    .with_context(|| format!("failed to read {}", cli.file.display()))?;
  let path = cli.file.display().to_string();

  let mut ember = Ember::default();
  if let Err(e) = ember.run(&path, &source) {
    report_error(&e, &path, &source);
    anyhow::bail!("failed to run {path}");
  }
  Ok(())
}

/// Prints each source-annotated report `e` carries, falling back to its plain
/// `Display` wording if a report's span happens to fall outside `source`.
fn report_error(e: &ember::Error, path: &str, source: &str) {
  for report in ember::error::reports(e, path, source) {
    match report.emit_to_string() {
      Ok(text) => eprint!("{text}"),
      Err(_) => eprintln!("{e}"),
    }
  }
}

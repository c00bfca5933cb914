use std::{
  fs, io,
  path::{Path, PathBuf},
  time::SystemTime,
};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
  config,
  error::{CyberpilotError, Result},
};

const LOG_PREFIX: &str = "cyberpilot";
const LOG_SUFFIX: &str = "log";

/// Daily `cyberpilot.YYYY-MM-DD.log` files under `log_dir`. The appender keeps
/// the current file open and rolls over at midnight UTC.
pub fn daily_appender(log_dir: &Path) -> Result<RollingFileAppender> {
  fs::create_dir_all(log_dir)?;
  RollingFileAppender::builder()
    .rotation(Rotation::DAILY)
    .filename_prefix(LOG_PREFIX)
    .filename_suffix(LOG_SUFFIX)
    .build(log_dir)
    .map_err(|err| CyberpilotError::RuntimeError(format!("Failed to open log file: {err}")))
}

/// Installs the global subscriber: stderr always, the daily file when
/// `debug` is on. `RUST_LOG` overrides the default level.
pub fn init(debug: bool) -> Result<()> {
  let default_level = if debug { "debug" } else { "info" };
  let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  let console = tracing_subscriber::fmt::layer()
    .with_writer(io::stderr)
    .with_filter(filter());
  let file = if debug {
    let writer = daily_appender(&config::log_dir_path())?;
    Some(
      tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter()),
    )
  } else {
    None
  };

  // A second init (tests, embedding) keeps the first subscriber.
  let _ = tracing_subscriber::registry()
    .with(console)
    .with(file)
    .try_init();
  Ok(())
}

pub fn read_recent_logs(max_lines: usize) -> Result<String> {
  read_recent_logs_in(&config::log_dir_path(), max_lines)
}

/// Tail of the most recently modified `.log` file in `log_dir`.
pub fn read_recent_logs_in(log_dir: &Path, max_lines: usize) -> Result<String> {
  if !log_dir.exists() {
    return Ok(String::new());
  }
  let mut newest: Option<(SystemTime, PathBuf)> = None;
  for entry in fs::read_dir(log_dir)? {
    let entry = entry?;
    let path = entry.path();
    if path.extension().and_then(|e| e.to_str()) != Some(LOG_SUFFIX) {
      continue;
    }
    let modified = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    match &newest {
      Some((time, _)) if *time >= modified => {}
      _ => newest = Some((modified, path)),
    }
  }
  let Some((_, path)) = newest else {
    return Ok(String::new());
  };
  let content = fs::read_to_string(path)?;
  let lines: Vec<&str> = content.lines().collect();
  if lines.len() <= max_lines {
    return Ok(content);
  }
  Ok(lines[lines.len() - max_lines..].join("\n"))
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn appender_writes_one_dated_file() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let mut appender = daily_appender(&log_dir).unwrap();
    appender.write_all(b"first\n").unwrap();
    appender.write_all(b"second\n").unwrap();
    appender.flush().unwrap();

    let files = fs::read_dir(&log_dir)
      .unwrap()
      .map(|entry| entry.unwrap().path())
      .collect::<Vec<_>>();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().and_then(|name| name.to_str()).unwrap();
    assert!(name.starts_with("cyberpilot.") && name.ends_with(".log"), "{name}");
    assert_eq!(fs::read_to_string(&files[0]).unwrap(), "first\nsecond\n");
    assert_eq!(read_recent_logs_in(&log_dir, 1).unwrap(), "second");
  }

  #[test]
  fn recent_logs_returns_the_tail() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
    fs::write(dir.path().join("cyberpilot.2026-01-01.log"), "a\nb\nc\nd\n").unwrap();

    assert_eq!(read_recent_logs_in(dir.path(), 2).unwrap(), "c\nd");
    assert_eq!(read_recent_logs_in(dir.path(), 10).unwrap(), "a\nb\nc\nd\n");
    assert_eq!(
      read_recent_logs_in(&dir.path().join("missing"), 5).unwrap(),
      ""
    );
  }
}

use chrono::{SecondsFormat, Utc};
use color_eyre::config::{Frame, HookBuilder, Theme};
use color_eyre::owo_colors::{OwoColorize, Style};
use env_logger::Env;
use env_logger::fmt::Formatter;
use log::{Level, LevelFilter, Record, debug};
use std::io::Write;
use std::path::Path;

/// Frames of these crates are hidden from error backtraces
const HIDDEN_FRAME_PREFIXES: &[&str] = &[
  "__rust_try",
  "alloc::",
  "color_eyre::",
  "core::",
  "eyre::",
  "ndarray::",
  "ndarray_linalg::",
  "std::",
];

const HIDDEN_PATH_PREFIXES: &[&str] = &["/rustc/"];

/// One letter for the level, colored by severity
fn level_tag(level: Level) -> String {
  let letter = &level.as_str()[..1];
  let tag = match level {
    Level::Error => letter.red().to_string(),
    Level::Warn => letter.yellow().to_string(),
    Level::Info => letter.cyan().dimmed().to_string(),
    Level::Debug => letter.green().dimmed().to_string(),
    Level::Trace => letter.dimmed().to_string(),
  };
  format!("{}{tag}{}", "[".dimmed(), "]".dimmed())
}

/// `file.rs:42:` of the log call site, or nothing if unknown
fn source_location(record: &Record) -> String {
  let file = record
    .file()
    .and_then(|path| Path::new(path).file_name())
    .map(|name| name.to_string_lossy().into_owned());
  let location = match (file, record.line()) {
    (Some(file), Some(line)) => format!("{file}:{line}:"),
    (Some(file), None) => format!("{file}:"),
    (None, _) => return String::new(),
  };
  location.dimmed().to_string()
}

/// Log lines look like `2024-01-01T00:00:00.000Z [W] model.rs:42: message`
fn format_record(buf: &mut Formatter, record: &Record) -> std::io::Result<()> {
  let date = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
  writeln!(
    buf,
    "{} {} {} {}",
    date.dimmed(),
    level_tag(record.level()),
    source_location(record),
    record.args()
  )
}

/// Installs the colored `env_logger`. `RUST_LOG` overrides `filter_level` for individual modules.
///
/// Returns false if a logger was already installed, which happens when several tests initialize the process.
pub fn setup_logger(filter_level: LevelFilter) -> bool {
  let installed = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
    .filter_level(filter_level)
    .format(format_record)
    .try_init();
  match installed {
    Ok(()) => true,
    Err(err) => {
      debug!("Keeping the logger installed earlier: {err}");
      false
    }
  }
}

fn is_hidden_frame(frame: &Frame) -> bool {
  let hidden_name = frame.name.as_deref().is_some_and(|name| {
    HIDDEN_FRAME_PREFIXES
      .iter()
      .any(|&prefix| name.starts_with(prefix) || name.strip_prefix('<').is_some_and(|name| name.starts_with(prefix)))
  });
  let hidden_file = frame
    .filename
    .as_ref()
    .is_some_and(|file| HIDDEN_PATH_PREFIXES.iter().any(|&prefix| file.starts_with(prefix)));
  hidden_name || hidden_file
}

/// Installs `color_eyre` report and panic hooks. Returns false if hooks were already installed.
pub fn install_error_hooks() -> bool {
  let theme = Theme::dark()
    .file(Style::new().green())
    .line_number(Style::new().yellow())
    .panic_message(Style::new().bright_red().bold())
    .hidden_frames(Style::new().dimmed())
    .code_hash(Style::new().hidden());

  let installed = HookBuilder::default()
    .theme(theme)
    .panic_section(format!(
      "Rate matrix computations should fail with an error, never panic. Please report this at '{}/issues'",
      env!("CARGO_PKG_REPOSITORY"),
    ))
    .add_frame_filter(Box::new(|frames| frames.retain(|frame| !is_hidden_frame(frame))))
    .install();

  match installed {
    Ok(()) => true,
    Err(err) => {
      debug!("Keeping the error report hooks installed earlier: {err}");
      false
    }
  }
}

/// Sets up logging (warnings and above by default) and error reporting for the process
pub fn global_init() {
  setup_logger(LevelFilter::Warn);
  install_error_hooks();
}

//! Run log: every record is echoed to the console and appended to a
//! timestamped log file.

use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use log::{Level, LevelFilter, Metadata, Record};
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct RunLogger {
    level: LevelFilter,
    file: Mutex<Option<File>>,
}

impl RunLogger {
    fn new(level: LevelFilter, file: Option<File>) -> Self {
        Self {
            level,
            file: Mutex::new(file),
        }
    }
}

/// Format one log line as written to the run log.
pub fn format_line(timestamp: &str, level: Level, message: &str) -> String {
    format!("{} [{}] {}", timestamp, level, message)
}

fn colored_level(level: Level) -> colored::ColoredString {
    match level {
        Level::Error => "ERROR".red().bold(),
        Level::Warn => "WARN".yellow().bold(),
        Level::Info => "INFO".green(),
        Level::Debug => "DEBUG".blue(),
        Level::Trace => "TRACE".dimmed(),
    }
}

impl log::Log for RunLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let message = record.args().to_string();
        let console = format!("{} {}", colored_level(record.level()), message);
        if record.level() <= Level::Warn {
            eprintln!("{}", console);
        } else {
            println!("{}", console);
        }

        if let Ok(mut guard) = self.file.lock()
            && let Some(file) = guard.as_mut()
        {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            let _ = writeln!(file, "{}", format_line(&timestamp, record.level(), &message));
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock()
            && let Some(file) = guard.as_mut()
        {
            let _ = file.flush();
        }
    }
}

pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!(
        "dualstrap-{}.log",
        Local::now().format("%Y%m%d-%H%M%S")
    ))
}

/// Install the global logger. Returns the run log path when the file could be opened.
///
/// A log directory that cannot be created only disables the file sink.
pub fn init(verbose: bool, log_dir: &Path) -> Result<Option<PathBuf>> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let path = log_file_path(log_dir);
    let file = create_dir_all(log_dir)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&path))
        .ok();
    let opened = file.as_ref().map(|_| path.clone());

    log::set_boxed_logger(Box::new(RunLogger::new(level, file)))
        .map(|()| log::set_max_level(level))
        .context("Failed to install logger")?;

    if opened.is_none() {
        log::warn!(
            "Could not open run log in {}, logging to console only",
            log_dir.display()
        );
    }

    Ok(opened)
}

/*
================================================================================
                            Gallery Slider Logging
================================================================================

Standard application logging through the `log` facade (debug!, info!, ...).

- `CompositeLogger`: console output via env_logger plus an in-memory ring
  buffer of this crate's records (last 1000 entries)
- `setup_logger()`: RUST_LOG wins when set; otherwise DEBUG for this crate in
  debug builds and ERROR in release builds
- `export_debug_logs()`: writes the ring buffer to <data_dir>/<app>/logs/debug.log
- `setup_panic_hook()`: writes panics with a backtrace and the buffered log
  lines to panic.log next to debug.log

================================================================================
*/

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use chrono::Utc;
use env_logger::fmt::{Color, Formatter};
use log::{Level, LevelFilter, Log, Metadata, Record};

#[allow(unused_imports)]
use log::{debug, info, warn, error};

const MAX_LOG_LINES: usize = 1000;
const LOG_TARGET: &str = "gallery_slider";

pub type LogBuffer = Arc<Mutex<VecDeque<String>>>;

struct BufferLogger {
    log_buffer: LogBuffer,
}

impl BufferLogger {
    fn new() -> Self {
        Self {
            log_buffer: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES))),
        }
    }

    fn log_to_buffer(&self, message: &str, target: &str, line: Option<u32>) {
        let Ok(mut buffer) = self.log_buffer.lock() else {
            return;
        };
        if buffer.len() == MAX_LOG_LINES {
            buffer.pop_front();
        }

        let formatted_message = if let Some(line_num) = line {
            format!("{target}:{line_num} {message}")
        } else {
            format!("{target} {message}")
        };

        buffer.push_back(formatted_message);
    }

    fn get_shared_buffer(&self) -> LogBuffer {
        Arc::clone(&self.log_buffer)
    }
}

impl log::Log for BufferLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with(LOG_TARGET) && metadata.level() <= LevelFilter::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = format!("{:<5} {}", record.level(), record.args());
            self.log_to_buffer(&message, record.target(), record.line());
        }
    }

    fn flush(&self) {}
}

struct CompositeLogger {
    console_logger: env_logger::Logger,
    buffer_logger: BufferLogger,
}

impl log::Log for CompositeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console_logger.enabled(metadata) || self.buffer_logger.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console_logger.enabled(record.metadata()) {
            self.console_logger.log(record);
        }
        if self.buffer_logger.enabled(record.metadata()) {
            self.buffer_logger.log(record);
        }
    }

    fn flush(&self) {
        self.console_logger.flush();
        self.buffer_logger.flush();
    }
}

// RUST_LOG directives are taken as written; without them only this crate logs
fn console_builder(rust_log: Option<&str>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();

    match rust_log {
        Some(filters) => {
            builder.parse_filters(filters);
        }
        None => {
            // Filter out all other crates' logs
            builder.filter(None, LevelFilter::Off);
            if cfg!(debug_assertions) {
                builder.filter(Some(LOG_TARGET), LevelFilter::Debug);
            } else {
                builder.filter(Some(LOG_TARGET), LevelFilter::Error);
            }
        }
    }
    builder
}

/// Installs the global logger and returns the shared ring buffer.
///
/// Calling it twice keeps the first logger; the second buffer then stays empty.
pub fn setup_logger(_app_name: &str) -> LogBuffer {
    let buffer_logger = BufferLogger::new();
    let shared_buffer = buffer_logger.get_shared_buffer();

    let mut builder = console_builder(std::env::var("RUST_LOG").ok().as_deref());

    // Console output goes to stderr so stdout stays clean for the view dump
    builder.target(env_logger::Target::Stderr);

    builder.format(|buf: &mut Formatter, record: &Record| {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

        let module_info = match (record.module_path(), record.line()) {
            (Some(module), Some(line)) => format!("{module}:{line}"),
            (Some(module), None) => module.to_string(),
            (None, Some(line)) => format!("line:{line}"),
            (None, None) => "unknown".to_string(),
        };

        let mut level_style = buf.style();
        let mut meta_style = buf.style();

        match record.level() {
            Level::Error => level_style.set_color(Color::Red).set_bold(true),
            Level::Warn => level_style.set_color(Color::Yellow).set_bold(true),
            Level::Info => level_style.set_color(Color::Green).set_bold(true),
            Level::Debug => level_style.set_color(Color::Blue).set_bold(true),
            Level::Trace => level_style.set_color(Color::White),
        };

        #[cfg(target_os = "macos")]
        {
            // Color::Rgb does not work on macOS
            meta_style.set_color(Color::Blue);
        }

        #[cfg(not(target_os = "macos"))]
        {
            meta_style.set_color(Color::Rgb(120, 120, 120));
        }

        writeln!(
            buf,
            "{} {} {} {}",
            meta_style.value(timestamp),
            level_style.value(record.level()),
            meta_style.value(module_info),
            record.args()
        )
    });

    let composite_logger = CompositeLogger {
        console_logger: builder.build(),
        buffer_logger,
    };

    if log::set_boxed_logger(Box::new(composite_logger)).is_ok() {
        // Always set the maximum level to Trace so that filtering works correctly
        log::set_max_level(LevelFilter::Trace);
    } else {
        eprintln!("Logger already initialized, keeping the existing one");
    }

    shared_buffer
}

pub fn get_log_directory(app_name: &str) -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(app_name).join("logs")
}

/// Exports the current log buffer to `debug.log` in the log directory.
pub fn export_debug_logs(app_name: &str, log_buffer: &LogBuffer) -> Result<PathBuf, std::io::Error> {
    export_debug_logs_to(get_log_directory(app_name), log_buffer)
}

pub fn export_debug_logs_to(log_dir_path: PathBuf, log_buffer: &LogBuffer) -> Result<PathBuf, std::io::Error> {
    std::fs::create_dir_all(&log_dir_path)?;
    let debug_log_path = log_dir_path.join("debug.log");

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&debug_log_path)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

    // Copy out so the lock is not held across file writes
    let log_entries: Vec<String> = match log_buffer.lock() {
        Ok(buffer) => buffer.iter().cloned().collect(),
        Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
    };

    writeln!(file, "{timestamp} [DEBUG EXPORT] =====================================")?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] Gallery Slider Debug Log Export")?;
    for line in crate::build_info::BuildInfo::detailed_info().lines() {
        writeln!(file, "{timestamp} [DEBUG EXPORT] {line}")?;
    }
    writeln!(file, "{timestamp} [DEBUG EXPORT] Found {} log entries (showing last {MAX_LOG_LINES} max)", log_entries.len())?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] =====================================")?;
    writeln!(file)?;

    for log_entry in &log_entries {
        writeln!(file, "{timestamp} {log_entry}")?;
    }

    file.flush()?;
    info!("Debug logs exported to: {}", debug_log_path.display());

    Ok(debug_log_path)
}

/// Writes panics, their backtrace and the buffered log lines to `panic.log`.
pub fn setup_panic_hook(app_name: &str, log_buffer: LogBuffer) {
    let log_dir = get_log_directory(app_name);
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        warn!("Failed to create log directory {:?}: {}", log_dir, e);
    }
    let log_file_path = log_dir.join("panic.log");

    panic::set_hook(Box::new(move |info| {
        let backtrace = backtrace::Backtrace::new();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

        let location = if let Some(location) = info.location() {
            format!("{}:{}", location.file(), location.line())
        } else {
            "unknown location".to_string()
        };

        let header_msg = format!("[PANIC] at {location} - {info}");
        let backtrace_lines: Vec<String> = format!("{backtrace:?}")
            .lines()
            .map(|line| format!("[BACKTRACE] {}", line.trim()))
            .collect();

        eprintln!("\n\n{header_msg}");
        for line in &backtrace_lines {
            eprintln!("{line}");
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_file_path);
        let Ok(mut file) = file else {
            eprintln!("Failed to open panic log file {:?}", log_file_path);
            return;
        };

        let _ = writeln!(file, "{timestamp} {header_msg}");
        for line in &backtrace_lines {
            let _ = writeln!(file, "{timestamp} {line}");
        }
        let _ = writeln!(file);
        let _ = writeln!(file, "{timestamp} [PANIC] Last {MAX_LOG_LINES} log entries:");

        if let Ok(buffer) = log_buffer.lock() {
            for log in buffer.iter() {
                let _ = writeln!(file, "{timestamp} {log}");
            }
        }
    }));
}

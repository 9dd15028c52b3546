//! truckersmp-cli Logging System
//!
//! Leveled logging to stderr with an optional log file that starts with a
//! system information header.

use chrono::Local;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

// ============================================================================
// System Information (log file header)
// ============================================================================

#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub app_version: String,
    pub distro: String,
    pub kernel: String,
}

impl SystemInfo {
    pub fn detect() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            distro: detect_distro(),
            kernel: detect_kernel(),
        }
    }

    pub fn to_log_header(&self) -> String {
        format!(
r#"================================================================================
truckersmp-cli Log - {}
================================================================================
Application:   truckersmp-cli v{}
  Distro:      {}
  Kernel:      {}
================================================================================"#,
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.app_version,
            self.distro,
            self.kernel,
        )
    }
}

fn detect_distro() -> String {
    if let Ok(file) = File::open("/etc/os-release") {
        let reader = BufReader::new(file);
        for line in reader.lines().map_while(Result::ok) {
            if let Some(name) = line.strip_prefix("PRETTY_NAME=") {
                return name.trim_matches('"').to_string();
            }
        }
    }
    std::env::consts::OS.to_string()
}

fn detect_kernel() -> String {
    if let Ok(output) = Command::new("uname").arg("-r").output() {
        if output.status.success() {
            return String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
    }
    "Unknown".to_string()
}

// ============================================================================
// Log Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Error => "[ERROR]",
            LogLevel::Warning => "[WARNING]",
            LogLevel::Info => "[INFO]",
            LogLevel::Debug => "[DEBUG]",
        }
    }

    /// Threshold for a `-v` count: none shows warnings, once info, twice or more debug.
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => LogLevel::Warning,
            1 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

// ============================================================================
// Logger
// ============================================================================

pub struct Logger {
    threshold: LogLevel,
    log_file: Option<File>,
}

impl Logger {
    pub fn new(threshold: LogLevel, log_path: Option<&Path>) -> Self {
        let log_file = log_path.and_then(|path| {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .map_err(|e| eprintln!("Failed to open log file {}: {}", path.display(), e))
                .ok()
        });

        let mut logger = Self { threshold, log_file };
        if logger.log_file.is_some() {
            let header = SystemInfo::detect().to_log_header();
            logger.write_file(&header);
        }
        logger
    }

    fn write_file(&mut self, msg: &str) {
        if let Some(ref mut file) = self.log_file {
            let _ = writeln!(file, "{}", msg);
            let _ = file.flush();
        }
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.threshold
    }

    pub fn log(&mut self, level: LogLevel, message: &str) {
        if !self.enabled(level) {
            return;
        }
        let formatted = format_line(level, message);
        self.write_file(&formatted);
        eprintln!("{}", formatted);
    }
}

fn format_line(level: LogLevel, message: &str) -> String {
    let timestamp = Local::now().format("%H:%M:%S");
    format!("[{}] {} {}", timestamp, level.prefix(), message)
}

// ============================================================================
// Global Logger Access
// ============================================================================

/// Initialize the global logger (call once at startup, later calls are ignored)
pub fn init_logger(verbose: u8, log_path: Option<&Path>) {
    LOGGER.get_or_init(|| Mutex::new(Logger::new(LogLevel::from_verbosity(verbose), log_path)));
}

fn logger() -> &'static Mutex<Logger> {
    LOGGER.get_or_init(|| Mutex::new(Logger::new(LogLevel::Warning, None)))
}

// ============================================================================
// Convenience Logging Functions
// ============================================================================

pub fn log_error(message: &str) {
    logger().lock().log(LogLevel::Error, message);
}

pub fn log_warning(message: &str) {
    logger().lock().log(LogLevel::Warning, message);
}

pub fn log_info(message: &str) {
    logger().lock().log(LogLevel::Info, message);
}

pub fn log_debug(message: &str) {
    logger().lock().log(LogLevel::Debug, message);
}

//! Error types shared by the launcher and the runtime helper.

use std::io;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, LauncherError>;

/// Broad category of a [`LauncherError`].
///
/// Callers use this to decide whether a failure ends the run or only
/// deserves a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unusable AppID table, contradictory options.
    Configuration,
    /// SteamCMD or DLL could not be downloaded or extracted.
    Provisioning,
    /// An external tool ran but exited non-zero.
    ExternalTool,
    /// The running-process state could not be queried.
    Probe,
    /// Mod files or release assets could not be retrieved.
    Download,
    /// Filesystem or process I/O.
    Io,
}

/// Every failure the launcher can report.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("{0}")]
    Config(String),

    #[error("Failed to {what}: {message}")]
    Provision { what: String, message: String },

    #[error("{tool} exited abnormally{}", .code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
    ToolFailed { tool: String, code: Option<i32> },

    #[error("Failed to get process list: {0}")]
    Probe(String),

    #[error("{0}")]
    Download(String),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Config(_) => ErrorKind::Configuration,
            LauncherError::Provision { .. } => ErrorKind::Provisioning,
            LauncherError::ToolFailed { .. } => ErrorKind::ExternalTool,
            LauncherError::Probe(_) => ErrorKind::Probe,
            LauncherError::Download(_) => ErrorKind::Download,
            LauncherError::Spawn { .. } | LauncherError::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn provision(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        LauncherError::Provision {
            what: what.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        LauncherError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn spawn(program: impl AsRef<std::ffi::OsStr>, source: io::Error) -> Self {
        LauncherError::Spawn {
            program: program.as_ref().to_string_lossy().into_owned(),
            source,
        }
    }
}

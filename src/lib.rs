//! truckersmp-cli - TruckersMP launcher for Linux
//!
//! Library crate shared by the `truckersmp-cli` launcher and the
//! `steamruntime-helper` supervisor.
//! Network and archive handling is only available with the `downloads` feature.

pub mod config;
pub mod error;
pub mod launch;
pub mod logging;
pub mod paths;
pub mod runtime_helper;
pub mod steam;
pub mod utils;

#[cfg(feature = "downloads")]
pub mod dlls;
#[cfg(feature = "downloads")]
pub mod downloads;
#[cfg(feature = "downloads")]
pub mod steamcmd;
#[cfg(feature = "downloads")]
pub mod truckersmp;
#[cfg(feature = "downloads")]
pub mod updater;

#[cfg(feature = "full")]
pub mod cli;

pub use error::{ErrorKind, LauncherError, Result};

//! Steam client integration
//!
//! Detecting, starting and stopping the native or Wine Steam client, and
//! reading its `loginusers.vdf`.

mod login;
mod process;
pub mod vdf;

pub use login::{current_steam_user, wait_for_steam};
pub use process::{is_steam_running, lists_steam_exe, shutdown_steam, SteamClient};

use crate::logging::log_warning;

/// Like [`is_steam_running`], but a failed probe counts as "not running".
pub fn steam_running(client: &SteamClient) -> bool {
    match is_steam_running(client) {
        Ok(running) => running,
        Err(e) => {
            log_warning(&e.to_string());
            false
        }
    }
}

/// Asks both the native and the Wine client to exit before SteamCMD runs.
///
/// Failures are logged; a client that is not installed is not an error.
pub fn shutdown_all(wine: Option<SteamClient>, wine_steam_dir: &std::path::Path) {
    let clients = std::iter::once(SteamClient::Native).chain(wine);
    for client in clients {
        if !steam_running(&client) {
            continue;
        }
        crate::logging::log_info("Closing Steam...");
        if let Err(e) = shutdown_steam(&client, wine_steam_dir) {
            log_warning(&e.to_string());
        }
    }
}

//! Steam login state: remembered accounts and waiting for the client

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, SystemTime};

use super::process::SteamClient;
use super::vdf::parse_login_users;
use super::steam_running;
use crate::logging::{log_debug, log_info, log_warning};
use crate::paths::XDG_DATA_HOME;

/// How long to wait for a freshly started client to log in.
const STEAM_STARTUP_SECS: u32 = 99;

/// Account name of the most recent user with a remembered password.
pub fn current_steam_user(loginvdf_paths: &[PathBuf]) -> Option<String> {
    loginvdf_paths.iter().find_map(|path| {
        let content = fs::read_to_string(path).ok()?;
        parse_login_users(&content)
            .into_iter()
            .find(|user| user.remember_password && user.most_recent)
            .map(|user| user.account_name)
    })
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Steam directory that contains `<steamdir>/config/loginusers.vdf`.
fn steam_dir_of(loginvdf: &Path) -> Option<PathBuf> {
    loginvdf.parent()?.parent().map(Path::to_path_buf)
}

/// Polls until one of `paths` is newer than its entry in `before`.
///
/// Returns the index of the first updated file, or `None` after `attempts`.
fn poll_login(
    paths: &[PathBuf],
    before: &[Option<SystemTime>],
    attempts: u32,
    interval: Duration,
) -> Option<usize> {
    for remaining in (1..=attempts).rev() {
        eprint!("\rWaiting {} seconds for steam to start up. ", remaining);
        let _ = std::io::stderr().flush();
        std::thread::sleep(interval);

        let updated = paths
            .iter()
            .zip(before)
            .position(|(path, old)| modified(path) > *old);
        if updated.is_some() {
            eprintln!();
            return updated;
        }
    }
    eprintln!();
    None
}

/// Index of the most recently written file; the first one on ties.
fn most_recent(stamps: &[Option<SystemTime>]) -> usize {
    let mut best = 0;
    for (idx, stamp) in stamps.iter().enumerate() {
        if *stamp > stamps[best] {
            best = idx;
        }
    }
    best
}

fn start_steam(client: &SteamClient, wine_steam_dir: &Path) -> std::io::Result<()> {
    let mut cmd = Command::new("nohup");
    match client {
        SteamClient::Native => {
            cmd.arg("steam");
        }
        SteamClient::Wine { wine, env } => {
            cmd.arg(wine)
                .arg(wine_steam_dir.join("steam.exe"))
                .arg("-no-cef-sandbox");
            env.apply(&mut cmd);
        }
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

/// Makes sure Steam is running, starting it and waiting for a login if needed.
///
/// For the native client this returns the Steam installation directory
/// (derived from the most recently written `loginusers.vdf`). The Wine
/// client lives in `wine_steam_dir`, so nothing is returned for it.
pub fn wait_for_steam(
    client: &SteamClient,
    loginvdf_paths: &[PathBuf],
    wine_steam_dir: &Path,
) -> Option<PathBuf> {
    let stamps: Vec<Option<SystemTime>> = loginvdf_paths.iter().map(|p| modified(p)).collect();
    let native = matches!(client, SteamClient::Native);

    let updated = if steam_running(client) {
        log_debug("Steam is already running");
        Some(most_recent(&stamps))
    } else {
        log_info("Starting Steam...");
        if let Err(e) = start_steam(client, wine_steam_dir) {
            log_warning(&format!("Failed to start Steam: {}", e));
        }
        poll_login(
            loginvdf_paths,
            &stamps,
            STEAM_STARTUP_SECS,
            Duration::from_secs(1),
        )
    };

    if !native {
        return None;
    }
    match updated.and_then(|idx| loginvdf_paths.get(idx)) {
        Some(path) => steam_dir_of(path),
        None => {
            log_warning("Steam login not detected, assuming the default Steam directory");
            Some(XDG_DATA_HOME.join("Steam"))
        }
    }
}

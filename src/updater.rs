//! In-place updater for truckersmp-cli
//!
//! Compares the installed `RELEASE` with the latest one on GitHub and, when
//! they differ, unpacks the release tarball over the installation.

use std::fs;
use std::path::{Path, PathBuf};

use tar::Archive;
use walkdir::WalkDir;
use xz2::read::XzDecoder;

use crate::downloads::fetch_bytes;
use crate::error::{LauncherError, Result};
use crate::logging::{log_debug, log_info};
use crate::paths::SCRIPT_DIR;

const RELEASE_URL: &str = "https://github.com/lhark/truckersmp-cli/raw/master/RELEASE";
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn release_asset_url(release: &str) -> String {
    format!(
        "https://github.com/lhark/truckersmp-cli/releases/download/{0}/truckersmp-cli-{0}.tar.xz",
        release
    )
}

/// First line of a `RELEASE` file.
fn first_line(content: &str) -> String {
    content.lines().next().unwrap_or_default().trim_end().to_string()
}

fn read_release(topdir: &Path) -> Option<String> {
    fs::read_to_string(topdir.join("RELEASE"))
        .ok()
        .map(|content| first_line(&content))
}

/// Version shown by `--version`: the installed `RELEASE`, else the crate version.
pub fn version_string() -> String {
    read_release(&SCRIPT_DIR).unwrap_or_else(|| CURRENT_VERSION.to_string())
}

/// Whether `latest` should replace `current`.
fn is_newer_version(latest: &str, current: &str) -> bool {
    match version_compare::compare(latest, current) {
        Ok(cmp) => cmp == version_compare::Cmp::Gt,
        // unparsable tags: any difference counts
        Err(_) => latest != current,
    }
}

/// Update the installation next to the executable to the latest release.
pub fn perform_self_update() -> Result<()> {
    self_update_in(&SCRIPT_DIR, fetch_bytes)
}

fn self_update_in<F>(topdir: &Path, fetch: F) -> Result<()>
where
    F: Fn(&str) -> Result<Vec<u8>>,
{
    let current = read_release(topdir).ok_or_else(|| {
        LauncherError::Config("'RELEASE' file doesn't exist. Self update aborted.".to_string())
    })?;

    log_info("Retrieving RELEASE from master");
    let latest = fetch(RELEASE_URL)
        .map(|bytes| first_line(&String::from_utf8_lossy(&bytes)))
        .map_err(|e| LauncherError::Download(format!("Failed to retrieve RELEASE file: {}", e)))?;

    if !is_newer_version(&latest, &current) {
        log_info("Already up-to-date.");
        return Ok(());
    }

    let archive_url = release_asset_url(&latest);
    log_info(&format!("Retrieving release asset {}", archive_url));
    let asset = fetch(&archive_url).map_err(|e| {
        LauncherError::Download(format!("Failed to retrieve release asset file: {}", e))
    })?;

    log_info(&format!("Unpacking archive {}", archive_url));
    Archive::new(XzDecoder::new(&asset[..]))
        .unpack(topdir)
        .map_err(|e| LauncherError::provision("unpack release asset file", e))?;

    let archive_dir = topdir.join(format!("truckersmp-cli-{}", latest));
    move_tree(&archive_dir, topdir)?;

    log_info("Self update complete");
    Ok(())
}

/// Move everything under `src` into `dest`, replacing files, then remove `src`.
fn move_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).contents_first(true) {
        let entry = entry.map_err(|e| LauncherError::provision("update files", e))?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target: PathBuf = dest.join(relative);

        if entry.file_type().is_dir() {
            log_debug(&format!("Creating directory {}", target.display()));
            fs::create_dir_all(&target)
                .map_err(|e| LauncherError::io(format!("Failed to create {}", target.display()), e))?;
            fs::remove_dir(entry.path()).map_err(|e| {
                LauncherError::io(format!("Failed to remove {}", entry.path().display()), e)
            })?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LauncherError::io(format!("Failed to create {}", parent.display()), e))?;
        }
        log_info(&format!(
            "Copying {} as {}",
            entry.path().display(),
            target.display()
        ));
        fs::rename(entry.path(), &target).map_err(|e| {
            LauncherError::io(format!("Failed to replace {}", target.display()), e)
        })?;
    }
    Ok(())
}

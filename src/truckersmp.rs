//! TruckersMP services: downgrade detection and multiplayer mod files

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::Game;
use crate::downloads::{check_hash, download_files, fetch_bytes, fetch_string, FileDownload};
use crate::error::{LauncherError, Result};
use crate::logging::{log_debug, log_info, log_warning};

pub const STATS_URL: &str = "https://stats.truckersmp.com";
pub const DOWNGRADE_HELP_URL: &str = "https://truckersmp.com/kb/26";
pub const VERSION_API_URL: &str = "https://api.truckersmp.com/v2/version";
pub const FILE_LIST_URL: &str = "https://update.ets2mp.com/files.json";
pub const DOWNLOAD_URL: &str = "https://download.ets2mp.com";
pub const DOWNLOAD_URL_ALT: &str = "https://update.ets2mp.com";
pub const ISSUE_URL: &str = "https://github.com/lhark/truckersmp-cli/issues";

// ============================================================================
// Downgrade Detection
// ============================================================================

/// Which titles the stats page says need a downgrade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Downgrade {
    pub ets2: bool,
    pub ats: bool,
}

impl Downgrade {
    pub fn needed(&self, game: Game) -> bool {
        match game {
            Game::Ets2 => self.ets2,
            Game::Ats => self.ats,
        }
    }
}

/// Scans the stats page for text inside elements linking to the downgrade help.
pub fn parse_downgrade_html(html: &str) -> Downgrade {
    let mut info = Downgrade::default();
    let mut in_link = false;
    let mut rest = html;

    while !rest.is_empty() {
        if rest.starts_with('<') {
            let end = rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
            let tag = &rest[..end];
            if tag.starts_with("</") || tag.ends_with("/>") {
                in_link = false;
            } else if links_to(tag, DOWNGRADE_HELP_URL) {
                in_link = true;
            }
            rest = &rest[end..];
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            if in_link {
                let text = &rest[..end];
                info.ets2 |= text.contains("ETS2");
                info.ats |= text.contains("ATS");
            }
            rest = &rest[end..];
        }
    }
    info
}

fn links_to(tag: &str, url: &str) -> bool {
    tag.contains(&format!("href=\"{}\"", url)) || tag.contains(&format!("href='{}'", url))
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    supported_game_version: String,
    supported_ats_game_version: String,
}

/// Game versions TruckersMP currently supports, e.g. `1.36.2.55`.
pub fn parse_supported_versions(json: &[u8]) -> Option<(String, String)> {
    let info: VersionInfo = serde_json::from_slice(json).ok()?;
    // the API marks versions as "1.36.2.55s"
    Some((
        info.supported_game_version.replace('s', ""),
        info.supported_ats_game_version.replace('s', ""),
    ))
}

/// `1.36.2.55` -> `temporary_1_36`
pub fn branch_for_version(version: &str) -> Option<String> {
    let mut parts = version.split('.');
    let major = parts.next().filter(|p| !p.is_empty())?;
    let minor = parts.next().filter(|p| !p.is_empty())?;
    Some(format!("temporary_{}_{}", major, minor))
}

/// The beta branch to install for TruckersMP compatibility, if a downgrade
/// is currently required. Network or parse failures yield `None`.
pub fn get_beta_branch_name(game: Game) -> Option<String> {
    let html = match fetch_string(STATS_URL) {
        Ok(html) => html,
        Err(e) => {
            log_debug(&format!("Could not check for downgrades: {}", e));
            return None;
        }
    };
    if !parse_downgrade_html(&html).needed(game) {
        return None;
    }

    let json = fetch_bytes(VERSION_API_URL).ok()?;
    let (ets2, ats) = parse_supported_versions(&json)?;
    let version = match game {
        Game::Ets2 => ets2,
        Game::Ats => ats,
    };
    branch_for_version(&version)
}

// ============================================================================
// Mod Files
// ============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModFile {
    #[serde(rename = "Md5")]
    pub md5: String,
    #[serde(rename = "FilePath")]
    pub file_path: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(rename = "Files")]
    files: Vec<ModFile>,
}

pub fn parse_file_list(json: &[u8]) -> Result<Vec<ModFile>> {
    let fail = |message: String| {
        LauncherError::Download(format!(
            "Failed to parse files.json: {}\nPlease report an issue: {}",
            message, ISSUE_URL
        ))
    };
    let list: FileList = serde_json::from_slice(json).map_err(|e| fail(e.to_string()))?;
    if list.files.is_empty() {
        return Err(fail("File list is empty".to_string()));
    }
    Ok(list.files)
}

/// Files under `moddir` that are missing or whose MD5 differs.
pub fn pending_mod_files(moddir: &Path, files: &[ModFile]) -> Result<Vec<FileDownload>> {
    let mut pending = Vec::new();
    for file in files {
        let dest = moddir.join(file.file_path.trim_start_matches('/'));
        let up_to_date = dest.is_file()
            && check_hash(&dest, &file.md5).map_err(|e| {
                LauncherError::io(format!("Failed to read {}", dest.display()), e)
            })?;
        if !up_to_date {
            pending.push(FileDownload {
                path: format!("/files{}", file.file_path),
                dest,
                md5: file.md5.clone(),
            });
        }
    }
    Ok(pending)
}

/// Download missing or outdated multiplayer mod files into `moddir`.
pub fn update_mod(moddir: &Path) -> Result<()> {
    update_mod_from(moddir, FILE_LIST_URL, &[DOWNLOAD_URL, DOWNLOAD_URL_ALT])
}

fn update_mod_from(moddir: &Path, list_url: &str, hosts: &[&str]) -> Result<()> {
    if !moddir.is_dir() {
        log_debug(&format!("Creating directory {}", moddir.display()));
    }
    fs::create_dir_all(moddir)
        .map_err(|e| LauncherError::io(format!("Failed to create {}", moddir.display()), e))?;

    let json = fetch_bytes(list_url)
        .map_err(|e| LauncherError::Download(format!("Failed to download files.json: {}", e)))?;
    let files = parse_file_list(&json)?;

    let mut pending = pending_mod_files(moddir, &files)?;
    if pending.is_empty() {
        log_debug("No files to download");
        return Ok(());
    }
    let listing: Vec<String> = pending.iter().map(|f| format!("  {}", f.path)).collect();
    log_info(&format!("Files to download:\n{}", listing.join("\n")));

    for host in hosts {
        match download_files(host, &mut pending) {
            Ok(()) => return Ok(()),
            Err(e) => log_warning(&format!("Download from {} failed: {}", host, e)),
        }
    }
    Err(LauncherError::Download("Failed to download mod files.".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloads::tests::{md5_hex, serve};
    use std::collections::HashMap;

    #[test]
    fn downgrade_link_text_is_detected() {
        let html = r#"<div><p>Game version</p>
<a class="btn" href="https://truckersmp.com/kb/26">How to downgrade ETS2</a>
<a href="https://truckersmp.com/rules">ATS rules</a></div>"#;
        let info = parse_downgrade_html(html);
        assert!(info.ets2);
        assert!(!info.ats);
        assert!(info.needed(Game::Ets2));
    }

    #[test]
    fn text_after_the_link_does_not_count() {
        let html = "<a href='https://truckersmp.com/kb/26'>Downgrade</a> ETS2 ATS";
        assert_eq!(parse_downgrade_html(html), Downgrade::default());
        assert_eq!(parse_downgrade_html(""), Downgrade::default());
    }

    #[test]
    fn supported_versions_strip_suffix() {
        let json = br#"{"name": "1.0", "supported_game_version": "1.36.2.55s", "supported_ats_game_version": "1.36.1.40s"}"#;
        let (ets2, ats) = parse_supported_versions(json).unwrap();
        assert_eq!(ets2, "1.36.2.55");
        assert_eq!(ats, "1.36.1.40");
        assert!(parse_supported_versions(b"{}").is_none());
    }

    #[test]
    fn branch_names() {
        assert_eq!(branch_for_version("1.36.2.55"), Some("temporary_1_36".to_string()));
        assert_eq!(branch_for_version("1"), None);
        assert_eq!(branch_for_version(""), None);
    }

    #[test]
    fn file_list_must_not_be_empty() {
        let files = parse_file_list(br#"{"Files": [{"Md5": "abc", "FilePath": "/core_ets2mp.dll"}]}"#)
            .unwrap();
        assert_eq!(files[0].file_path, "/core_ets2mp.dll");

        let err = parse_file_list(br#"{"Files": []}"#).unwrap_err();
        assert!(err.to_string().contains("File list is empty"));
        assert!(parse_file_list(b"not json").is_err());
    }

    #[test]
    fn only_missing_or_changed_files_are_pending() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.dll"), b"good").unwrap();
        fs::write(dir.path().join("stale.dll"), b"old").unwrap();
        let files = vec![
            ModFile { md5: md5_hex(b"good"), file_path: "/good.dll".to_string() },
            ModFile { md5: md5_hex(b"new"), file_path: "/stale.dll".to_string() },
            ModFile { md5: md5_hex(b"x"), file_path: "/data/missing.scs".to_string() },
        ];
        let pending = pending_mod_files(dir.path(), &files).unwrap();
        let paths: Vec<&str> = pending.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["/files/stale.dll", "/files/data/missing.scs"]);
        assert_eq!(pending[1].dest, dir.path().join("data/missing.scs"));
    }

    #[test]
    fn fallback_host_gets_the_remainder() {
        let list = format!(
            r#"{{"Files": [{{"Md5": "{}", "FilePath": "/a.dll"}}, {{"Md5": "{}", "FilePath": "/b.dll"}}]}}"#,
            md5_hex(b"a"),
            md5_hex(b"b")
        );
        let primary = serve(HashMap::from([
            ("/files.json".to_string(), list.into_bytes()),
            ("/files/a.dll".to_string(), b"a".to_vec()),
        ]));
        let fallback = serve(HashMap::from([("/files/b.dll".to_string(), b"b".to_vec())]));

        let dir = tempfile::tempdir().unwrap();
        update_mod_from(
            dir.path(),
            &format!("{}/files.json", primary),
            &[primary.as_str(), fallback.as_str()],
        )
        .unwrap();
        assert_eq!(fs::read(dir.path().join("a.dll")).unwrap(), b"a");
        assert_eq!(fs::read(dir.path().join("b.dll")).unwrap(), b"b");
    }

    #[test]
    fn all_hosts_failing_is_an_error() {
        let list = format!(r#"{{"Files": [{{"Md5": "{}", "FilePath": "/c.dll"}}]}}"#, md5_hex(b"c"));
        let server = serve(HashMap::from([("/files.json".to_string(), list.into_bytes())]));
        let dir = tempfile::tempdir().unwrap();
        let err = update_mod_from(dir.path(), &format!("{}/files.json", server), &[server.as_str()])
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to download mod files.");
    }
}

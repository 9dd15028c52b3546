//! Detecting and shutting down a running Steam client

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{LauncherError, Result};
use crate::launch::EnvMap;
use crate::utils::current_user;

/// Which Steam client to look at.
#[derive(Debug, Clone, Copy)]
pub enum SteamClient<'a> {
    /// Linux Steam, used with Proton
    Native,
    /// Windows Steam inside the prefix selected by `env`
    Wine { wine: &'a OsStr, env: &'a EnvMap },
}

/// Whether the Steam client is running.
///
/// `Ok(false)` when nothing was found; `Err` only when the process list
/// itself could not be obtained.
pub fn is_steam_running(client: &SteamClient) -> Result<bool> {
    match client {
        SteamClient::Native => {
            let user = current_user();
            let status = Command::new("pgrep")
                .args(["-u", &user, "-x", "steam"])
                .stdout(Stdio::null())
                .status()
                .map_err(|e| LauncherError::Probe(format!("pgrep: {}", e)))?;
            match status.code() {
                Some(0) => Ok(true),
                Some(1) => Ok(false),
                _ => Err(LauncherError::Probe(format!("pgrep exited with {}", status))),
            }
        }
        SteamClient::Wine { wine, env } => {
            let mut env_wine = (*env).clone();
            env_wine.set("WINEDLLOVERRIDES", "winex11.drv=");

            let mut cmd = Command::new(wine);
            cmd.args(["winedbg", "--command", "info process"])
                .stderr(Stdio::null());
            env_wine.apply(&mut cmd);
            let output = cmd
                .output()
                .map_err(|e| LauncherError::Probe(format!("Wine process list: {}", e)))?;
            if !output.status.success() {
                return Err(LauncherError::Probe(format!(
                    "winedbg exited with {}",
                    output.status
                )));
            }
            Ok(lists_steam_exe(&String::from_utf8_lossy(&output.stdout)))
        }
    }
}

/// Scans `winedbg` "info process" output for `steam.exe`.
///
/// Lines end with the quoted executable name, e.g. ` 00000020 3  'steam.exe'`.
pub fn lists_steam_exe(output: &str) -> bool {
    output.lines().any(|line| {
        let mut chars = line.chars();
        chars.next_back(); // closing quote
        let line = chars.as_str();
        line.rfind('\'')
            .map(|idx| line[idx + 1..].to_lowercase().ends_with("steam.exe"))
            .unwrap_or(false)
    })
}

/// Asks the client to exit. Does not wait for it to be gone.
pub fn shutdown_steam(client: &SteamClient, wine_steam_dir: &Path) -> Result<()> {
    let status = match client {
        SteamClient::Native => Command::new("steam")
            .arg("-shutdown")
            .status()
            .map_err(|e| LauncherError::spawn("steam", e))?,
        SteamClient::Wine { wine, env } => {
            let mut cmd = Command::new(wine);
            cmd.arg(wine_steam_dir.join("steam.exe")).arg("-shutdown");
            env.apply(&mut cmd);
            cmd.status().map_err(|e| LauncherError::spawn(wine, e))?
        }
    };
    if !status.success() {
        crate::logging::log_debug(&format!("Steam shutdown request exited with {}", status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_steam_in_winedbg_output() {
        let output = "\
 pid      threads  executable (all id:s are in hex)
 00000020 3        'start.exe'
 00000028 33       'steam.exe'
 =00000038 2       \\_ 'steamwebhelper.exe'
";
        assert!(lists_steam_exe(output));
    }

    #[test]
    fn ignores_other_processes() {
        let output = "\
 pid      threads  executable (all id:s are in hex)
 00000020 3        'explorer.exe'
 00000030 5        'steamwebhelper.exe'
";
        assert!(!lists_steam_exe(output));
        assert!(!lists_steam_exe(""));
    }

    #[test]
    fn matches_case_insensitively_with_path() {
        assert!(lists_steam_exe(" 00000028 33 'C:\\Program Files (x86)\\Steam\\Steam.exe'"));
    }

    #[test]
    fn missing_wine_is_a_probe_error() {
        let env = EnvMap::default();
        let client = SteamClient::Wine {
            wine: OsStr::new("/nonexistent/wine"),
            env: &env,
        };
        let err = is_steam_running(&client).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Probe);
    }
}

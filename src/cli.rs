//! Command line of the `truckersmp-cli` binary and its resolution into a
//! [`LaunchConfig`].

use std::path::{Path, PathBuf};

use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};

use crate::config::{default_wine_steam_dir, AppIdTable, CompatLayer, Game, LaunchConfig, Mode};
use crate::error::{LauncherError, Result};
use crate::logging::{log_debug, log_info};
use crate::paths::{self, LOGINVDF_INNER, SCRIPT_DIR};
use crate::steam::current_steam_user;

const DESCRIPTION: &str = "\
A simple launcher for TruckersMP to play ATS or ETS2 in multiplayer.

truckersmp-cli allows to download TruckersMP and handles starting TruckersMP
through Wine while supporting the Windows versions of
American Truck Simulator and Euro Truck Simulator 2.

The Windows version of Steam should already be able to run in the same
Wine prefix. The Windows versions of ATS and ETS2 can be installed and updated
via SteamCMD while all running Steam processes will be stopped
to prevent Steam from losing connection. Your Steam password
and guard code are required by SteamCMD once for this to work.

On Linux it's possible to start TruckersMP through Proton.
A working native Steam installation is needed for this.
SteamCMD can use your saved credentials for convenience.";

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "truckersmp-cli", about = "A simple launcher for TruckersMP", long_about = DESCRIPTION)]
pub struct Args {
    /// Use American Truck Simulator
    #[arg(short = 'a', long)]
    pub ats: bool,

    /// Set game version to VERSION, useful for downgrading (e.g. "temporary_1_35")
    #[arg(short = 'b', long, value_name = "VERSION")]
    pub beta: Option<String>,

    /// Use Direct3D 11 instead of OpenGL
    #[arg(short = 'd', long)]
    pub enable_d3d11: bool,

    /// Use Euro Truck Simulator 2 [Default if neither ATS or ETS2 are specified]
    #[arg(short = 'e', long)]
    pub ets2: bool,

    /// Choose a different directory for the game files
    /// [Default: $XDG_DATA_HOME/truckersmp-cli/(Game name)/data]
    #[arg(short = 'g', long, value_name = "DIR")]
    pub gamedir: Option<PathBuf>,

    /// Choose a different AppID for Proton (Needs an update for changes)
    #[arg(short = 'i', long, value_name = "APPID")]
    pub proton_appid: Option<u32>,

    /// Write log into LOG, "-vv" option is recommended
    #[arg(short = 'l', long, value_name = "LOG")]
    pub logfile: Option<PathBuf>,

    /// Choose a different directory for the mod files
    /// [Default: $XDG_DATA_HOME/truckersmp-cli/TruckersMP, Fallback: ./truckersmp]
    #[arg(short = 'm', long, value_name = "DIR")]
    pub moddir: Option<PathBuf>,

    /// Steam account name to use (should own the game and ideally be logged
    /// in with saved credentials)
    #[arg(short = 'n', long, value_name = "NAME")]
    pub account: Option<String>,

    /// Choose a different Proton directory [Default: $XDG_DATA_HOME/truckersmp-cli/Proton]
    #[arg(short = 'o', long, value_name = "DIR")]
    pub protondir: Option<PathBuf>,

    /// Start the game with Proton [Default on Linux if neither Proton or Wine are specified]
    #[arg(short = 'p', long)]
    pub proton: bool,

    /// Start the game [Default if neither start or update are specified]
    #[arg(short = 's', long)]
    pub start: bool,

    /// Update the game [Default if neither start or update are specified]
    #[arg(short = 'u', long)]
    pub update: bool,

    /// Verbose output (none: warnings, once: info, twice or more: debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Start the game with Wine [Default on other systems if neither Proton or Wine are specified]
    #[arg(short = 'w', long)]
    pub wine: bool,

    /// Choose a different directory for the prefix
    /// [Default: $XDG_DATA_HOME/truckersmp-cli/(Game name)/prefix]
    #[arg(short = 'x', long, value_name = "DIR")]
    pub prefixdir: Option<PathBuf>,

    /// Activate native 64-bit d3dcompiler_47.dll when starting (Needed for D3D11 renderer)
    #[arg(long = "activate-native-d3dcompiler-47")]
    pub activate_native_d3dcompiler_47: bool,

    /// Disable Steam Overlay when using Proton
    #[arg(long)]
    pub disable_proton_overlay: bool,

    /// Update files to the latest release and quit
    #[arg(long)]
    pub self_update: bool,

    /// Start singleplayer game, useful for save editing, using/testing DXVK in singleplayer, etc.
    #[arg(long)]
    pub singleplayer: bool,

    /// Use OpenGL-based D3D11 instead of DXVK when using Proton
    #[arg(long)]
    pub use_wined3d: bool,

    /// Choose a directory for Windows version of Steam
    /// [Default: "C:\Program Files (x86)\Steam" in the prefix]
    #[arg(long, value_name = "DIR")]
    pub wine_steam_dir: Option<PathBuf>,

    /// Print version information and quit
    #[arg(long)]
    pub version: bool,
}

/// Help epilog listing the known Proton versions.
pub fn proton_epilog(table: &AppIdTable) -> String {
    let mut epilog = String::from("Proton AppID list:\n");
    for (version, appid) in table.iter() {
        let default_mark = if table.default_version() == Some(version) {
            " (Default)"
        } else {
            ""
        };
        epilog.push_str(&format!("    Proton {:13}: {:>10}{}\n", version, appid, default_mark));
    }
    epilog
}

/// Parse the process arguments, exiting with usage on error.
pub fn parse_args(table: &AppIdTable) -> Args {
    let matches = Args::command().after_help(proton_epilog(table)).get_matches();
    Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

/// Host facts the resolution depends on.
#[derive(Debug, Clone)]
pub struct Host {
    pub linux: bool,
    /// Native Steam `loginusers.vdf` locations
    pub loginvdf_paths: Vec<PathBuf>,
    /// `<script dir>/truckersmp`, used when the default mod directory is absent
    pub fallback_moddir: PathBuf,
}

impl Host {
    pub fn detect() -> Self {
        Self {
            linux: std::env::consts::OS == "linux",
            loginvdf_paths: paths::loginusers_paths(),
            fallback_moddir: SCRIPT_DIR.join("truckersmp"),
        }
    }
}

impl Args {
    /// Resolve against the running system.
    pub fn into_config(self, table: &AppIdTable) -> Result<LaunchConfig> {
        self.resolve(table, &Host::detect())
    }

    pub fn resolve(self, table: &AppIdTable, host: &Host) -> Result<LaunchConfig> {
        let (mut start, mut update) = (self.start, self.update);
        if !start && !update {
            log_info("--update/--start not specified, doing both.");
            start = true;
            update = true;
        }

        let game = match (self.ats, self.ets2) {
            (true, true) => {
                return Err(LauncherError::Config(
                    "It's only possible to use one game at a time.".to_string(),
                ))
            }
            (true, false) => Game::Ats,
            (false, true) => Game::Ets2,
            (false, false) => {
                log_info("--ats/--ets2 not specified, choosing ETS2.");
                Game::Ets2
            }
        };

        let compat = match (self.proton, self.wine) {
            (true, true) => {
                return Err(LauncherError::Config(
                    "Start with Proton (-p) or Wine (-w)?".to_string(),
                ))
            }
            (true, false) => CompatLayer::Proton,
            (false, true) => CompatLayer::Wine,
            (false, false) if host.linux => {
                log_info("Platform is Linux, use Proton");
                CompatLayer::Proton
            }
            (false, false) => {
                log_info("Platform is not Linux, use Wine");
                CompatLayer::Wine
            }
        };

        let mode = if self.singleplayer {
            Mode::Singleplayer
        } else {
            Mode::Multiplayer
        };

        let mut config = LaunchConfig::new(game, mode, compat);
        config.start = start;
        config.update = update;
        config.proton_appid = table.resolve_proton_appid(self.proton_appid)?;
        config.beta = self.beta;
        config.activate_native_d3dcompiler_47 = self.activate_native_d3dcompiler_47;
        config.disable_proton_overlay = self.disable_proton_overlay;
        config.enable_d3d11 = self.enable_d3d11;
        config.use_wined3d = self.use_wined3d;

        if let Some(gamedir) = self.gamedir {
            config.gamedir = gamedir;
        }
        if let Some(protondir) = self.protondir {
            config.protondir = protondir;
        }
        if let Some(prefixdir) = self.prefixdir {
            config.prefixdir = prefixdir;
        }
        // Wine and Proton share the default prefix: Wine uses its "pfx"
        if compat == CompatLayer::Wine
            && (config.prefixdir == Game::Ets2.default_prefixdir()
                || config.prefixdir == Game::Ats.default_prefixdir())
        {
            log_debug("Prefix directory is the default while using Wine, using the one Proton uses");
            config.prefixdir = config.prefixdir.join("pfx");
        }
        config.wine_steam_dir = self
            .wine_steam_dir
            .unwrap_or_else(|| default_wine_steam_dir(&config.prefixdir, compat));

        config.moddir = match self.moddir {
            Some(moddir) => moddir,
            None if !config.moddir.is_dir() && host.fallback_moddir.is_dir() => {
                log_debug("No moddir set and fallback found");
                host.fallback_moddir.clone()
            }
            None => {
                log_debug("No moddir set, setting to default");
                config.moddir
            }
        };
        log_info(&format!("Mod directory: {}", config.moddir.display()));

        if start && !update {
            check_installed(&config)?;
        }

        config.account = self.account;
        if update && config.account.is_none() {
            let mut loginvdf_paths = Vec::new();
            if compat == CompatLayer::Wine {
                loginvdf_paths.push(config.wine_steam_dir.join(LOGINVDF_INNER));
            }
            loginvdf_paths.extend(host.loginvdf_paths.iter().cloned());
            config.account = current_steam_user(&loginvdf_paths);
            if config.account.is_none() {
                log_info("Unable to find logged in steam user automatically.");
                return Err(LauncherError::Config(
                    "Need the steam account name (-n name) to update.".to_string(),
                ));
            }
        }

        log_info(&format!("AppID/GameID: {} ({})", config.game_appid, game.key()));
        log_info(&format!("Game directory: {}", config.gamedir.display()));
        log_info(&format!("Prefix: {}", config.prefixdir.display()));
        if compat == CompatLayer::Proton {
            log_info(&format!("Proton directory: {}", config.protondir.display()));
        }
        Ok(config)
    }
}

/// Starting without updating needs the game (and Proton) already installed.
fn check_installed(config: &LaunchConfig) -> Result<()> {
    let has_game = [Game::Ets2, Game::Ats]
        .iter()
        .any(|game| game.exe_path(&config.gamedir).is_file());
    if !has_game {
        return Err(LauncherError::Config(format!(
            "Game not found in {}\nNeed to download (-u) the game?",
            config.gamedir.display()
        )));
    }
    if config.compat == CompatLayer::Proton && !proton_installed(&config.protondir) {
        return Err(LauncherError::Config(format!(
            "Proton and no update wanted but Proton not found in {}\nNeed to download (-u) Proton?",
            config.protondir.display()
        )));
    }
    Ok(())
}

fn proton_installed(protondir: &Path) -> bool {
    protondir.join("proton").is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    const PROTON_JSON: &str = r#"{"5.0": 1245040, "4.11": 1113280, "default": "5.0"}"#;

    fn table() -> AppIdTable {
        AppIdTable::from_json(PROTON_JSON).unwrap()
    }

    fn host(linux: bool) -> Host {
        Host {
            linux,
            loginvdf_paths: Vec::new(),
            fallback_moddir: PathBuf::from("/nonexistent/truckersmp"),
        }
    }

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("truckersmp-cli").chain(argv.iter().copied())).unwrap()
    }

    fn installed_game(dir: &Path, game: Game) {
        let exe = game.exe_path(dir);
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(exe, b"MZ").unwrap();
    }

    #[test]
    fn parses_short_and_long_options() {
        let args = parse(&["-a", "-vv", "-w", "--singleplayer", "-b", "temporary_1_35", "-i", "1113280"]);
        assert!(args.ats && args.wine && args.singleplayer);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.beta.as_deref(), Some("temporary_1_35"));
        assert_eq!(args.proton_appid, Some(1113280));

        let args = parse(&["--activate-native-d3dcompiler-47", "--disable-proton-overlay"]);
        assert!(args.activate_native_d3dcompiler_47 && args.disable_proton_overlay);
    }

    #[test]
    fn defaults_to_update_and_start_with_account() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse(&["-n", "trucker", "-g", dir.path().to_str().unwrap()]);
        let config = args.resolve(&table(), &host(true)).unwrap();
        assert!(config.start && config.update);
        assert_eq!(config.game, Game::Ets2);
        assert_eq!(config.compat, CompatLayer::Proton);
        assert_eq!(config.mode, Mode::Multiplayer);
        assert_eq!(config.proton_appid, 1245040);
        assert_eq!(config.account.as_deref(), Some("trucker"));
    }

    #[test]
    fn platform_decides_layer() {
        let config = parse(&["-u", "-n", "t"]).resolve(&table(), &host(false)).unwrap();
        assert_eq!(config.compat, CompatLayer::Wine);
    }

    #[test]
    fn contradictory_options_are_rejected() {
        let err = parse(&["-a", "-e"]).resolve(&table(), &host(true)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(parse(&["-p", "-w"]).resolve(&table(), &host(true)).is_err());
    }

    #[test]
    fn wine_shares_default_prefix_with_proton() {
        let config = parse(&["-u", "-w", "-a", "-n", "t"]).resolve(&table(), &host(true)).unwrap();
        assert_eq!(config.prefixdir, Game::Ats.default_prefixdir().join("pfx"));
        assert_eq!(
            config.wine_steam_dir,
            config.prefixdir.join("dosdevices/c:/Program Files (x86)/Steam")
        );

        let config = parse(&["-u", "-w", "-n", "t", "-x", "/custom/prefix"])
            .resolve(&table(), &host(true))
            .unwrap();
        assert_eq!(config.prefixdir, PathBuf::from("/custom/prefix"));
    }

    #[test]
    fn start_only_requires_installed_game_and_proton() {
        let game = tempfile::tempdir().unwrap();
        let proton = tempfile::tempdir().unwrap();
        let gamedir = game.path().to_str().unwrap();
        let protondir = proton.path().to_str().unwrap();

        let err = parse(&["-s", "-p", "-g", gamedir, "-o", protondir])
            .resolve(&table(), &host(true))
            .unwrap_err();
        assert!(err.to_string().starts_with("Game not found in"));

        installed_game(game.path(), Game::Ats);
        let err = parse(&["-s", "-p", "-g", gamedir, "-o", protondir])
            .resolve(&table(), &host(true))
            .unwrap_err();
        assert!(err.to_string().contains("Proton not found"));

        // Wine does not need Proton
        parse(&["-s", "-w", "-g", gamedir]).resolve(&table(), &host(true)).unwrap();

        fs::write(proton.path().join("proton"), "#!/usr/bin/env python3\n").unwrap();
        let config = parse(&["-s", "-p", "-g", gamedir, "-o", protondir])
            .resolve(&table(), &host(true))
            .unwrap();
        assert!(config.start && !config.update);
        assert!(config.account.is_none());
    }

    #[test]
    fn update_detects_account_or_fails() {
        let steam = tempfile::tempdir().unwrap();
        let vdf = steam.path().join("config/loginusers.vdf");
        let mut host = host(true);
        host.loginvdf_paths = vec![vdf.clone()];

        let err = parse(&["-u"]).resolve(&table(), &host).unwrap_err();
        assert_eq!(err.to_string(), "Need the steam account name (-n name) to update.");

        fs::create_dir_all(vdf.parent().unwrap()).unwrap();
        fs::write(
            &vdf,
            r#""users" { "1" { "AccountName" "trucker" "RememberPassword" "1" "mostrecent" "1" } }"#,
        )
        .unwrap();
        let config = parse(&["-u"]).resolve(&table(), &host).unwrap();
        assert_eq!(config.account.as_deref(), Some("trucker"));
    }

    #[test]
    fn wine_checks_its_own_steam_first() {
        let wine_steam = tempfile::tempdir().unwrap();
        let vdf = wine_steam.path().join(LOGINVDF_INNER);
        fs::create_dir_all(vdf.parent().unwrap()).unwrap();
        fs::write(
            &vdf,
            r#""users" { "1" { "AccountName" "winetrucker" "RememberPassword" "1" "MostRecent" "1" } }"#,
        )
        .unwrap();
        let config = parse(&["-u", "-w", "--wine-steam-dir", wine_steam.path().to_str().unwrap()])
            .resolve(&table(), &host(true))
            .unwrap();
        assert_eq!(config.account.as_deref(), Some("winetrucker"));
    }

    #[test]
    fn missing_default_proton_is_fatal_without_appid() {
        let table = AppIdTable::from_json(r#"{"5.0": 1245040}"#).unwrap();
        let err = parse(&["-u", "-n", "t"]).resolve(&table, &host(true)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let config = parse(&["-u", "-n", "t", "-i", "1245040"])
            .resolve(&table, &host(true))
            .unwrap();
        assert_eq!(config.proton_appid, 1245040);
    }

    #[test]
    fn moddir_fallback_is_used_when_present() {
        let fallback = tempfile::tempdir().unwrap();
        let mut host = host(true);
        host.fallback_moddir = fallback.path().to_path_buf();
        let config = parse(&["-u", "-n", "t"]).resolve(&table(), &host).unwrap();
        if !paths::default_moddir().is_dir() {
            assert_eq!(config.moddir, fallback.path());
        }

        let config = parse(&["-u", "-n", "t", "-m", "/mods"]).resolve(&table(), &host).unwrap();
        assert_eq!(config.moddir, PathBuf::from("/mods"));
    }

    #[test]
    fn epilog_marks_default() {
        let epilog = proton_epilog(&table());
        assert!(epilog.starts_with("Proton AppID list:\n"));
        assert!(epilog.contains("Proton 5.0          :    1245040 (Default)"));
        assert!(epilog.contains("Proton 4.11         :    1113280\n"));
    }
}

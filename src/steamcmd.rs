//! Game and Proton updates through SteamCMD
//!
//! Proton setups use the Linux SteamCMD; Wine setups run the Windows one
//! inside a prefix of its own so that the login is remembered between runs.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use flate2::read::GzDecoder;

use crate::config::{CompatLayer, Game, LaunchConfig};
use crate::downloads::fetch_bytes;
use crate::error::{LauncherError, Result};
use crate::launch::{wine_command, CommandSpec, EnvMap};
use crate::logging::{log_debug, log_info};
use crate::paths;
use crate::steam::{shutdown_all, SteamClient};

pub const STEAMCMD_LINUX_URL: &str =
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz";
pub const STEAMCMD_WINDOWS_URL: &str =
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd.zip";

/// Which SteamCMD build a compatibility layer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteamCmdKind {
    /// `steamcmd.sh` from a .tar.gz
    Linux,
    /// `steamcmd.exe` from a .zip, run through Wine
    Windows,
}

impl SteamCmdKind {
    pub fn for_layer(layer: CompatLayer) -> Self {
        match layer {
            CompatLayer::Proton => SteamCmdKind::Linux,
            CompatLayer::Wine => SteamCmdKind::Windows,
        }
    }

    pub fn binary_name(&self) -> &'static str {
        match self {
            SteamCmdKind::Linux => "steamcmd.sh",
            SteamCmdKind::Windows => "steamcmd.exe",
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            SteamCmdKind::Linux => STEAMCMD_LINUX_URL,
            SteamCmdKind::Windows => STEAMCMD_WINDOWS_URL,
        }
    }
}

// ============================================================================
// Provisioning
// ============================================================================

/// Download and unpack SteamCMD into `dir` unless it is already there.
pub fn ensure_steamcmd(kind: SteamCmdKind, dir: &Path) -> Result<PathBuf> {
    ensure_steamcmd_with(kind, dir, fetch_bytes)
}

/// [`ensure_steamcmd`] with a custom fetcher.
pub fn ensure_steamcmd_with<F>(kind: SteamCmdKind, dir: &Path, fetch: F) -> Result<PathBuf>
where
    F: FnOnce(&str) -> Result<Vec<u8>>,
{
    let steamcmd = dir.join(kind.binary_name());
    if steamcmd.is_file() {
        return Ok(steamcmd);
    }

    fs::create_dir_all(dir)
        .map_err(|e| LauncherError::io(format!("Failed to create {}", dir.display()), e))?;

    log_debug("Retrieving SteamCMD");
    let archive = fetch(kind.url()).map_err(|e| LauncherError::provision("retrieve SteamCMD", e))?;

    log_debug("Extracting SteamCMD");
    extract(kind, &archive, dir).map_err(|e| LauncherError::provision("extract SteamCMD", e))?;
    if !steamcmd.is_file() {
        return Err(LauncherError::provision(
            "extract SteamCMD",
            format!("{} not found in archive", kind.binary_name()),
        ));
    }
    Ok(steamcmd)
}

fn extract(kind: SteamCmdKind, archive: &[u8], dir: &Path) -> io::Result<()> {
    match kind {
        SteamCmdKind::Linux => tar::Archive::new(GzDecoder::new(archive)).unpack(dir),
        SteamCmdKind::Windows => {
            let mut zip = zip::ZipArchive::new(Cursor::new(archive)).map_err(io::Error::other)?;
            let mut entry = zip.by_name(kind.binary_name()).map_err(io::Error::other)?;
            let dest = dir.join(kind.binary_name());
            let mut out = File::create(&dest)?;
            io::copy(&mut entry, &mut out)?;
            fs::set_permissions(&dest, fs::Permissions::from_mode(0o755))
        }
    }
}

// ============================================================================
// SteamCMD Commands
// ============================================================================

/// Explicit branch, else the detected TruckersMP downgrade branch, else `public`.
/// An empty explicit branch counts as none.
pub fn resolve_branch<F>(explicit: Option<&str>, detect: F) -> String
where
    F: FnOnce() -> Option<String>,
{
    if let Some(branch) = explicit.filter(|branch| !branch.is_empty()) {
        return branch.to_string();
    }
    detect().unwrap_or_else(|| "public".to_string())
}

pub fn proton_update_args(account: &str, protondir: &Path, appid: u32) -> Vec<OsString> {
    vec![
        "+login".into(),
        account.into(),
        "+force_install_dir".into(),
        protondir.into(),
        "+app_update".into(),
        appid.to_string().into(),
        "validate".into(),
        "+quit".into(),
    ]
}

pub fn game_update_args(account: &str, gamedir: &OsStr, appid: u32, branch: &str) -> Vec<OsString> {
    vec![
        "+@sSteamCmdForcePlatformType".into(),
        "windows".into(),
        "+login".into(),
        account.into(),
        "+force_install_dir".into(),
        gamedir.into(),
        "+app_update".into(),
        appid.to_string().into(),
        "-beta".into(),
        branch.into(),
        "validate".into(),
        "+quit".into(),
    ]
}

/// Environments for one update run: `(steamcmd, steam_client)`.
///
/// SteamCMD gets its own prefix; the Steam client probe and shutdown use
/// the game prefix.
pub fn update_environments(
    config: &LaunchConfig,
    base: EnvMap,
    steamcmd_prefix: &Path,
) -> (EnvMap, EnvMap) {
    let mut env = base;
    env.set("WINEDEBUG", "-all");
    env.set("WINEARCH", "win64");

    let mut env_steam = env.clone();
    env_steam.set("WINEPREFIX", config.wineprefix().to_string_lossy());

    env.set("WINEPREFIX", steamcmd_prefix.to_string_lossy());
    // no "Wine configuration is being updated" dialog, no Gecko/Mono installs
    env.set("WINEDLLOVERRIDES", "winex11.drv=");
    (env, env_steam)
}

/// The SteamCMD invocations of one update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub proton: Option<CommandSpec>,
    pub game: CommandSpec,
}

/// Build the update commands. `gamedir` is already in the form SteamCMD
/// expects (a Windows path for the Windows build).
pub fn plan_update(
    config: &LaunchConfig,
    steamcmd: &Path,
    wine: Option<&OsStr>,
    env: &EnvMap,
    gamedir: &OsStr,
    account: &str,
    branch: &str,
) -> UpdatePlan {
    let mut prefix: Vec<OsString> = Vec::new();
    if config.compat == CompatLayer::Wine {
        if let Some(wine) = wine {
            prefix.push(wine.to_os_string());
        }
    }
    prefix.push(steamcmd.as_os_str().to_os_string());

    let proton = (config.compat == CompatLayer::Proton).then(|| {
        let mut argv = vec![steamcmd.as_os_str().to_os_string()];
        argv.extend(proton_update_args(account, &config.protondir, config.proton_appid));
        CommandSpec::new(argv, EnvMap::inherit())
    });

    let mut argv = prefix;
    argv.extend(game_update_args(account, gamedir, config.game_appid, branch));
    UpdatePlan {
        proton,
        game: CommandSpec::new(argv, env.clone()),
    }
}

// ============================================================================
// Update Host
// ============================================================================

/// Everything an update run does outside the process: downloads, Wine
/// calls, the Steam clients and SteamCMD itself.
pub trait UpdateHost {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    fn wine_available(&self, wine: &OsStr, env: &EnvMap) -> bool;

    /// `path` as seen from inside the Wine prefix of `env`.
    fn windows_path(&self, wine: &OsStr, env: &EnvMap, path: &Path) -> Result<OsString>;

    fn shutdown_clients(&self, wine: Option<SteamClient<'_>>, wine_steam_dir: &Path);

    fn beta_branch(&self, game: Game) -> Option<String>;

    fn run_steamcmd(&self, spec: &CommandSpec) -> Result<()>;
}

/// The real system: network, Wine and SteamCMD processes.
pub struct SystemHost;

impl UpdateHost for SystemHost {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        fetch_bytes(url)
    }

    fn wine_available(&self, wine: &OsStr, env: &EnvMap) -> bool {
        let mut cmd = Command::new(wine);
        cmd.arg("--version").stdout(Stdio::null()).stderr(Stdio::null());
        env.apply(&mut cmd);
        matches!(cmd.status(), Ok(status) if status.success())
    }

    fn windows_path(&self, wine: &OsStr, env: &EnvMap, path: &Path) -> Result<OsString> {
        let what = "convert game directory to Windows path";
        let mut cmd = Command::new(wine);
        cmd.args([OsStr::new("winepath"), OsStr::new("-w"), path.as_os_str()])
            .stderr(Stdio::null());
        env.apply(&mut cmd);
        let output = cmd.output().map_err(|e| LauncherError::provision(what, e))?;
        if !output.status.success() {
            return Err(LauncherError::provision(
                what,
                format!("winepath exited with {}", output.status),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().into())
    }

    fn shutdown_clients(&self, wine: Option<SteamClient<'_>>, wine_steam_dir: &Path) {
        shutdown_all(wine, wine_steam_dir);
    }

    fn beta_branch(&self, game: Game) -> Option<String> {
        crate::truckersmp::get_beta_branch_name(game)
    }

    fn run_steamcmd(&self, spec: &CommandSpec) -> Result<()> {
        run_steamcmd(spec)
    }
}

fn run_steamcmd(spec: &CommandSpec) -> Result<()> {
    let status = spec
        .to_command()
        .status()
        .map_err(|e| LauncherError::spawn(spec.program(), e))?;
    if status.success() {
        Ok(())
    } else {
        Err(LauncherError::ToolFailed {
            tool: "SteamCMD".to_string(),
            code: status.code(),
        })
    }
}

fn render_steps(spec: &CommandSpec, shown_vars: &[&str]) -> String {
    let mut output = String::from("Command:");
    for key in shown_vars {
        if let Some(value) = spec.env.get(key) {
            output.push_str(&format!("\n  {}={}", key, value));
        }
    }
    let argv: Vec<String> = spec
        .argv
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    // program (and its wine launcher), then one line per "+command"
    let split = argv.iter().position(|arg| arg.starts_with('+')).unwrap_or(argv.len());
    output.push_str(&format!("\n  {}", argv[..split].join(" ")));
    for arg in &argv[split..] {
        if arg.starts_with('+') {
            output.push_str("\n    ");
        } else {
            output.push(' ');
        }
        output.push_str(arg);
    }
    output
}

/// Update Proton (Proton setups only) and the game through SteamCMD.
///
/// Running Steam clients are asked to exit first: updating while a client
/// is logged in makes it lose its session.
pub fn update_game(config: &LaunchConfig) -> Result<()> {
    update_game_with(config, &paths::steamcmd_dir(), EnvMap::inherit(), &SystemHost)
}

/// [`update_game`] with SteamCMD kept in `steamcmd_dir` and a custom host.
pub fn update_game_with(
    config: &LaunchConfig,
    steamcmd_dir: &Path,
    inherited: EnvMap,
    host: &dyn UpdateHost,
) -> Result<()> {
    let account = config.account.as_deref().ok_or_else(|| {
        LauncherError::Config("A Steam account name is required to update the game".to_string())
    })?;

    // Windows SteamCMD keeps its own prefix so the login is remembered
    let steamcmd_prefix = steamcmd_dir.join("pfx");
    let wine_cmd = wine_command(&inherited);
    let (env, env_steam) = update_environments(config, inherited, &steamcmd_prefix);

    fs::create_dir_all(&steamcmd_prefix).map_err(|e| {
        LauncherError::io(format!("Failed to create {}", steamcmd_prefix.display()), e)
    })?;
    let wine = if host.wine_available(&wine_cmd, &env) {
        log_debug(&format!("Wine ({}) is available", wine_cmd.to_string_lossy()));
        Some(wine_cmd.as_os_str())
    } else {
        log_debug("Wine is not available");
        None
    };

    let kind = SteamCmdKind::for_layer(config.compat);
    let gamedir = match kind {
        SteamCmdKind::Linux => config.gamedir.clone().into_os_string(),
        SteamCmdKind::Windows => {
            let wine = wine.ok_or_else(|| {
                LauncherError::Config(format!(
                    "Wine ({}) is not available.",
                    wine_cmd.to_string_lossy()
                ))
            })?;
            host.windows_path(wine, &env, &config.gamedir)?
        }
    };

    let steamcmd = ensure_steamcmd_with(kind, steamcmd_dir, |url| host.fetch(url))?;
    log_info(&format!("SteamCMD: {}", steamcmd.display()));

    let wine_client = wine.map(|wine| SteamClient::Wine {
        wine,
        env: &env_steam,
    });
    host.shutdown_clients(wine_client, &config.wine_steam_dir);

    let branch = resolve_branch(config.beta.as_deref(), || host.beta_branch(config.game));
    let plan = plan_update(config, &steamcmd, wine, &env, &gamedir, account, &branch);

    if let Some(proton) = &plan.proton {
        fs::create_dir_all(&config.protondir).map_err(|e| {
            LauncherError::io(format!("Failed to create {}", config.protondir.display()), e)
        })?;
        log_debug(&format!("Updating Proton (AppID:{})", config.proton_appid));
        log_info(&render_steps(proton, &[]));
        host.run_steamcmd(proton)?;
    }

    log_info(&format!("Game branch: {}", branch));
    fs::create_dir_all(&config.gamedir).map_err(|e| {
        LauncherError::io(format!("Failed to create {}", config.gamedir.display()), e)
    })?;
    log_debug(&format!("Updating Game (AppID:{})", config.game_appid));
    let shown: &[&str] = match kind {
        SteamCmdKind::Linux => &[],
        SteamCmdKind::Windows => &["WINEDEBUG", "WINEARCH", "WINEPREFIX", "WINEDLLOVERRIDES"],
    };
    log_info(&render_steps(&plan.game, shown));
    host.run_steamcmd(&plan.game)
}

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LauncherError, Result};

// ============================================================================
// Game Titles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Game {
    Ets2,
    Ats,
}

impl Game {
    /// Steam AppID of the Windows version.
    pub fn appid(&self) -> u32 {
        match self {
            Game::Ets2 => 227300,
            Game::Ats => 270880,
        }
    }

    pub fn exe_name(&self) -> &'static str {
        match self {
            Game::Ets2 => "eurotrucks2.exe",
            Game::Ats => "amtrucks.exe",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Game::Ets2 => "Euro Truck Simulator 2",
            Game::Ats => "American Truck Simulator",
        }
    }

    /// Short key used by the TruckersMP services ("ets2"/"ats").
    pub fn key(&self) -> &'static str {
        match self {
            Game::Ets2 => "ets2",
            Game::Ats => "ats",
        }
    }

    /// Game executable relative to the game directory.
    pub fn exe_path(&self, gamedir: &Path) -> PathBuf {
        gamedir.join("bin/win_x64").join(self.exe_name())
    }

    pub fn default_gamedir(&self) -> PathBuf {
        crate::data_path!(self.display_name(), "data")
    }

    pub fn default_prefixdir(&self) -> PathBuf {
        crate::data_path!(self.display_name(), "prefix")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Singleplayer,
    Multiplayer,
}

/// The compatibility layer used to run the Windows game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatLayer {
    Proton,
    Wine,
}

impl CompatLayer {
    pub fn name(&self) -> &'static str {
        match self {
            CompatLayer::Proton => "Proton",
            CompatLayer::Wine => "Wine",
        }
    }
}

// ============================================================================
// Proton AppID Table (proton.json)
// ============================================================================

/// Proton version → Steam AppID, plus the version used by default.
///
/// `proton.json` looks like `{"5.0": 1245040, "4.11": 1113280, "default": "5.0"}`.
#[derive(Debug, Clone, Default)]
pub struct AppIdTable {
    versions: BTreeMap<String, u32>,
    default: Option<String>,
}

impl AppIdTable {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| LauncherError::Config(format!("Failed to load proton.json: {}", e)))?;
        Self::from_json(&content)
            .map_err(|e| LauncherError::Config(format!("Failed to load proton.json: {}", e)))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(content)
            .map_err(|e| LauncherError::Config(e.to_string()))?;
        let object = root
            .as_object()
            .ok_or_else(|| LauncherError::Config("expected a JSON object".to_string()))?;

        let mut table = AppIdTable::default();
        for (key, value) in object {
            if key == "default" {
                let version = value.as_str().ok_or_else(|| {
                    LauncherError::Config("\"default\" must name a Proton version".to_string())
                })?;
                table.default = Some(version.to_string());
                continue;
            }
            let appid = value
                .as_u64()
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| {
                    LauncherError::Config(format!("AppID for Proton {} is not a number", key))
                })?;
            table.versions.insert(key.clone(), appid);
        }
        Ok(table)
    }

    pub fn get(&self, version: &str) -> Option<u32> {
        self.versions.get(version).copied()
    }

    pub fn default_version(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// AppID of the default Proton version.
    pub fn default_appid(&self) -> Result<u32> {
        let version = self.default.as_deref().ok_or_else(|| {
            LauncherError::Config("proton.json has no \"default\" Proton version".to_string())
        })?;
        self.get(version).ok_or_else(|| {
            LauncherError::Config(format!(
                "Default Proton version {} is not listed in proton.json",
                version
            ))
        })
    }

    /// An explicitly requested AppID wins; otherwise the default must exist.
    pub fn resolve_proton_appid(&self, explicit: Option<u32>) -> Result<u32> {
        match explicit {
            Some(appid) => Ok(appid),
            None => self.default_appid(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.versions.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// ============================================================================
// Launch Config
// ============================================================================

/// Validated run parameters, built once from the command line and then only read.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub game: Game,
    pub mode: Mode,
    pub compat: CompatLayer,
    pub update: bool,
    pub start: bool,

    pub gamedir: PathBuf,
    pub protondir: PathBuf,
    /// Proton: `STEAM_COMPAT_DATA_PATH` (contains `pfx`). Wine: the `WINEPREFIX` itself.
    pub prefixdir: PathBuf,
    pub moddir: PathBuf,
    pub wine_steam_dir: PathBuf,
    pub injector: PathBuf,

    pub account: Option<String>,
    pub game_appid: u32,
    pub proton_appid: u32,
    pub beta: Option<String>,

    pub activate_native_d3dcompiler_47: bool,
    pub disable_proton_overlay: bool,
    pub enable_d3d11: bool,
    pub use_wined3d: bool,
}

impl LaunchConfig {
    /// A config with default directories for `game`, used as the base for
    /// command line resolution and in tests.
    pub fn new(game: Game, mode: Mode, compat: CompatLayer) -> Self {
        let prefixdir = game.default_prefixdir();
        Self {
            game,
            mode,
            compat,
            update: false,
            start: true,
            gamedir: game.default_gamedir(),
            protondir: crate::paths::default_protondir(),
            wine_steam_dir: default_wine_steam_dir(&prefixdir, compat),
            prefixdir,
            moddir: crate::paths::default_moddir(),
            injector: crate::paths::inject_exe(),
            account: None,
            game_appid: game.appid(),
            proton_appid: 0,
            beta: None,
            activate_native_d3dcompiler_47: false,
            disable_proton_overlay: false,
            enable_d3d11: false,
            use_wined3d: false,
        }
    }

    pub fn singleplayer(&self) -> bool {
        self.mode == Mode::Singleplayer
    }

    /// The Wine prefix inside `prefixdir` (Proton keeps it in `pfx`).
    pub fn wineprefix(&self) -> PathBuf {
        match self.compat {
            CompatLayer::Proton => self.prefixdir.join("pfx"),
            CompatLayer::Wine => self.prefixdir.clone(),
        }
    }
}

/// `C:\Program Files (x86)\Steam` inside the prefix.
pub fn default_wine_steam_dir(prefixdir: &Path, compat: CompatLayer) -> PathBuf {
    let wineprefix = match compat {
        CompatLayer::Proton => prefixdir.join("pfx"),
        CompatLayer::Wine => prefixdir.to_path_buf(),
    };
    wineprefix.join("dosdevices/c:/Program Files (x86)/Steam")
}

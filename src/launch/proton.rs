//! Starting the game through Valve's Proton

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{CompatTool, EnvMap};
use crate::config::{CompatLayer, LaunchConfig};
use crate::paths::OVERLAYRENDERER_INNER;

pub struct ProtonLauncher {
    /// Native Steam installation, needed for the overlay and compat paths
    steam_dir: PathBuf,
}

impl ProtonLauncher {
    pub fn new(steam_dir: impl AsRef<Path>) -> Self {
        Self {
            steam_dir: steam_dir.as_ref().to_path_buf(),
        }
    }

    pub fn overlay_renderer(&self) -> PathBuf {
        self.steam_dir.join(OVERLAYRENDERER_INNER)
    }
}

impl CompatTool for ProtonLauncher {
    fn layer(&self) -> CompatLayer {
        CompatLayer::Proton
    }

    fn wine_binary(&self, config: &LaunchConfig) -> OsString {
        // Proton 5.13+ ships "files", older releases "dist"
        let files = config.protondir.join("files/bin/wine");
        if files.exists() {
            return files.into_os_string();
        }
        config.protondir.join("dist/bin/wine").into_os_string()
    }

    /// `python3 <protondir>/proton run`
    fn launcher_prefix(&self, config: &LaunchConfig) -> Vec<OsString> {
        vec![
            OsString::from("python3"),
            config.protondir.join("proton").into_os_string(),
            OsString::from("run"),
        ]
    }

    fn build_environment(&self, config: &LaunchConfig, mut env: EnvMap) -> EnvMap {
        let appid = config.game_appid.to_string();
        env.set("SteamGameId", appid.clone());
        env.set("SteamAppId", appid);
        env.set("STEAM_COMPAT_DATA_PATH", config.prefixdir.to_string_lossy());
        env.set("STEAM_COMPAT_CLIENT_INSTALL_PATH", self.steam_dir.to_string_lossy());
        env.set("PROTON_USE_WINED3D", if config.use_wined3d { "1" } else { "0" });
        env.set("PROTON_NO_D3D11", if config.enable_d3d11 { "0" } else { "1" });

        let overlay = self.overlay_renderer();
        let overlay = overlay.to_string_lossy();
        if config.disable_proton_overlay {
            env.remove_entry("LD_PRELOAD", ':', &overlay);
        } else {
            env.append("LD_PRELOAD", ":", &overlay);
        }
        env
    }

    fn shown_vars(&self) -> &'static [&'static str] {
        &[
            "SteamGameId",
            "SteamAppId",
            "STEAM_COMPAT_DATA_PATH",
            "STEAM_COMPAT_CLIENT_INSTALL_PATH",
            "PROTON_USE_WINED3D",
            "PROTON_NO_D3D11",
            "LD_PRELOAD",
        ]
    }
}

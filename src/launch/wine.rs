//! Starting the game through a system Wine

use std::ffi::{OsStr, OsString};

use super::{CompatTool, EnvMap};
use crate::config::{CompatLayer, LaunchConfig};

pub struct WineLauncher {
    wine: OsString,
}

impl WineLauncher {
    pub fn new(wine: impl Into<OsString>) -> Self {
        Self { wine: wine.into() }
    }
}

/// Variables every Wine invocation in the user's prefix gets.
pub fn wine_base_env(config: &LaunchConfig, mut env: EnvMap) -> EnvMap {
    env.set("WINEDEBUG", "-all");
    env.set("WINEARCH", "win64");
    env.set("WINEPREFIX", config.prefixdir.to_string_lossy());
    env
}

impl CompatTool for WineLauncher {
    fn layer(&self) -> CompatLayer {
        CompatLayer::Wine
    }

    fn wine_binary(&self, _config: &LaunchConfig) -> OsString {
        self.wine.clone()
    }

    fn launcher_prefix(&self, _config: &LaunchConfig) -> Vec<OsString> {
        vec![self.wine.clone()]
    }

    fn build_environment(&self, config: &LaunchConfig, base: EnvMap) -> EnvMap {
        let mut env = wine_base_env(config, base);
        let mut overrides = env
            .get_os("WINEDLLOVERRIDES")
            .map(OsStr::to_os_string)
            .unwrap_or_default();
        if !config.enable_d3d11 {
            // OpenGL renderer: keep Wine's D3D11/DXGI out of the way
            overrides.push(";d3d11=;dxgi=");
        }
        env.set_os("WINEDLLOVERRIDES", overrides);
        env
    }

    fn shown_vars(&self) -> &'static [&'static str] {
        &["WINEDEBUG", "WINEARCH", "WINEPREFIX", "WINEDLLOVERRIDES"]
    }
}
